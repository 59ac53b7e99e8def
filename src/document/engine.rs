//! Typst rendering engine.
//!
//! Every render gets its own temporary directory holding the entry source,
//! the template and any images it references. The directory is removed when
//! the `TempDir` guard drops, on success and on every error path.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::{tempdir, TempDir};

use super::DocumentError;

const ENTRY_FILE: &str = "main.typ";
const OUTPUT_FILE: &str = "output.pdf";

/// A file placed next to the entry source before compiling.
#[derive(Debug, Clone)]
pub struct BundleFile {
    pub name: String,
    pub contents: Vec<u8>,
}

impl BundleFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Runs the `typst` CLI.
#[derive(Debug, Clone)]
pub struct TypstRenderEngine {
    binary: PathBuf,
    font_dir: Option<PathBuf>,
}

impl TypstRenderEngine {
    pub fn new(binary: impl Into<PathBuf>, font_dir: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            font_dir: font_dir.filter(|dir| dir.is_dir()),
        }
    }

    /// Compile `source` together with `files` and return the PDF bytes.
    pub fn render(&self, source: &str, files: &[BundleFile]) -> Result<Vec<u8>, DocumentError> {
        let temp_dir = tempdir().map_err(DocumentError::TempDir)?;

        for file in files {
            let path = temp_dir.path().join(&file.name);
            fs::write(&path, &file.contents).map_err(DocumentError::WriteSource)?;
        }
        fs::write(temp_dir.path().join(ENTRY_FILE), source).map_err(DocumentError::WriteSource)?;

        self.compile(&temp_dir)
    }

    fn compile(&self, temp_dir: &TempDir) -> Result<Vec<u8>, DocumentError> {
        let root = temp_dir.path();
        let output_path = root.join(OUTPUT_FILE);

        let mut command = Command::new(&self.binary);
        command
            .arg("compile")
            .arg("--root")
            .arg(root)
            .arg(root.join(ENTRY_FILE))
            .arg(&output_path)
            .current_dir(root);
        if let Some(font_dir) = &self.font_dir {
            command.arg("--font-path").arg(font_dir);
        }

        let output = command.output().map_err(DocumentError::RenderIo)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("typst compile failed: {}", stderr.trim());
            return Err(DocumentError::RenderExit {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        read_output(&output_path)
    }
}

fn read_output(path: &Path) -> Result<Vec<u8>, DocumentError> {
    fs::read(path).map_err(DocumentError::ReadOutput)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_render_io() {
        let engine = TypstRenderEngine::new("/nonexistent/typst-binary", None);
        let err = engine.render("Hello", &[]).unwrap_err();
        assert!(matches!(err, DocumentError::RenderIo(_)));
    }

    #[test]
    fn test_missing_font_dir_is_ignored() {
        let engine = TypstRenderEngine::new("typst", Some(PathBuf::from("/no/such/fonts")));
        assert!(engine.font_dir.is_none());
    }

    #[test]
    #[ignore = "requires typst CLI"]
    fn test_compiles_minimal_document() {
        let engine = TypstRenderEngine::new("typst", None);
        let pdf = engine
            .render("#import \"part.typ\": greet\n#greet()", &[BundleFile::new("part.typ", "#let greet() = [Halo]")])
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }
}
