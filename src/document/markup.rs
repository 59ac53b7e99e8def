//! Letter body markup.
//!
//! Bodies come from a rich-text editor as a small HTML subset. They are parsed
//! into a flat block model (paragraphs and list items made of styled runs)
//! that both the height estimator and the Typst emitter consume. Unknown tags
//! are dropped and their text kept.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Run {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<Run>),
    ListItem {
        ordered: bool,
        number: usize,
        depth: usize,
        runs: Vec<Run>,
    },
}

impl Block {
    pub fn runs(&self) -> &[Run] {
        match self {
            Block::Paragraph(runs) => runs,
            Block::ListItem { runs, .. } => runs,
        }
    }

    pub fn plain_text(&self) -> String {
        self.runs().iter().map(|r| r.text.as_str()).collect()
    }
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| {
        Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9]*)\b[^>]*?>|<!--.*?-->")
            .unwrap_or_else(|e| panic!("invalid tag pattern: {e}"))
    })
}

#[derive(Default)]
struct Parser {
    blocks: Vec<Block>,
    runs: Vec<Run>,
    bold: usize,
    italic: usize,
    underline: usize,
    lists: Vec<(bool, usize)>,
    in_item: bool,
}

impl Parser {
    fn push_text(&mut self, raw: &str) {
        let decoded = decode_entities(raw);
        let mut text = String::with_capacity(decoded.len());
        let mut last_space = self
            .runs
            .last()
            .map(|r| r.text.ends_with(' '))
            .unwrap_or(true);
        for c in decoded.chars() {
            if c.is_whitespace() && c != '\u{a0}' {
                if !last_space {
                    text.push(' ');
                    last_space = true;
                }
            } else {
                text.push(if c == '\u{a0}' { ' ' } else { c });
                last_space = false;
            }
        }
        if text.is_empty() {
            return;
        }

        let style = (self.bold > 0, self.italic > 0, self.underline > 0);
        match self.runs.last_mut() {
            Some(last) if (last.bold, last.italic, last.underline) == style => last.text.push_str(&text),
            _ => self.runs.push(Run {
                text,
                bold: style.0,
                italic: style.1,
                underline: style.2,
            }),
        }
    }

    fn flush(&mut self) {
        let mut runs = std::mem::take(&mut self.runs);
        if let Some(last) = runs.last_mut() {
            let trimmed = last.text.trim_end().len();
            last.text.truncate(trimmed);
        }
        if let Some(first) = runs.first_mut() {
            first.text = first.text.trim_start().to_string();
        }
        runs.retain(|r| !r.text.is_empty());
        if runs.is_empty() {
            return;
        }

        let depth = self.lists.len().saturating_sub(1);
        let block = match (self.in_item, self.lists.last_mut()) {
            (true, Some((ordered, counter))) => {
                *counter += 1;
                Block::ListItem {
                    ordered: *ordered,
                    number: *counter,
                    depth,
                    runs,
                }
            }
            _ => Block::Paragraph(runs),
        };
        self.blocks.push(block);
    }

    fn open(&mut self, tag: &str) {
        match tag {
            "b" | "strong" => self.bold += 1,
            "i" | "em" => self.italic += 1,
            "u" | "ins" => self.underline += 1,
            "ol" | "ul" => {
                self.flush();
                self.lists.push((tag == "ol", 0));
            }
            "li" => {
                self.flush();
                self.in_item = true;
            }
            "br" | "p" | "div" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "blockquote" => {
                self.flush()
            }
            "td" | "th" => self.push_text(" "),
            _ => {}
        }
    }

    fn close(&mut self, tag: &str) {
        match tag {
            "b" | "strong" => self.bold = self.bold.saturating_sub(1),
            "i" | "em" => self.italic = self.italic.saturating_sub(1),
            "u" | "ins" => self.underline = self.underline.saturating_sub(1),
            "li" => {
                self.flush();
                self.in_item = false;
            }
            "ol" | "ul" => {
                self.flush();
                self.lists.pop();
                self.in_item = false;
            }
            "p" | "div" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "blockquote" => {
                self.flush()
            }
            _ => {}
        }
    }
}

/// Parse a body into blocks. Input without any tags is treated as plain text
/// with one paragraph per line.
pub fn parse_markup(input: &str) -> Vec<Block> {
    let re = tag_regex();
    if !re.is_match(input) {
        return input
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| {
                Block::Paragraph(vec![Run {
                    text: decode_entities(l),
                    ..Default::default()
                }])
            })
            .collect();
    }

    let mut parser = Parser::default();
    let mut cursor = 0;
    for caps in re.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        parser.push_text(&input[cursor..whole.start()]);
        cursor = whole.end();

        let Some(name) = caps.get(2) else { continue };
        let name = name.as_str().to_ascii_lowercase();
        if caps.get(1).map(|m| m.as_str() == "/").unwrap_or(false) {
            parser.close(&name);
        } else {
            parser.open(&name);
        }
    }
    parser.push_text(&input[cursor..]);
    parser.flush();
    parser.blocks
}

/// Text content with tags removed and whitespace collapsed.
pub fn strip_tags(input: &str) -> String {
    let without = tag_regex().replace_all(input, " ");
    decode_entities(&without)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    input
        .replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&rsquo;", "\u{2019}")
        .replace("&lsquo;", "\u{2018}")
        .replace("&ndash;", "\u{2013}")
        .replace("&mdash;", "\u{2014}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> Run {
        Run {
            text: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_text_lines_become_paragraphs() {
        let blocks = parse_markup("Baris satu\n\nBaris dua\n");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].plain_text(), "Baris dua");
    }

    #[test]
    fn test_paragraphs_and_styles() {
        let blocks = parse_markup("<p>Dengan <strong>hormat</strong>,</p><p><em>Terima</em> kasih</p>");
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[0],
            Block::Paragraph(vec![
                run("Dengan "),
                Run {
                    text: "hormat".into(),
                    bold: true,
                    ..Default::default()
                },
                run(","),
            ])
        );
        assert!(blocks[1].runs()[0].italic);
    }

    #[test]
    fn test_ordered_list_numbers() {
        let blocks = parse_markup("<p>Agenda:</p><ol><li>Pembukaan</li><li>Laporan</li></ol><p>Akhir</p>");
        assert_eq!(blocks.len(), 4);
        match &blocks[2] {
            Block::ListItem { ordered, number, depth, .. } => {
                assert!(*ordered);
                assert_eq!(*number, 2);
                assert_eq!(*depth, 0);
            }
            other => panic!("expected list item, got {other:?}"),
        }
        assert!(matches!(blocks[3], Block::Paragraph(_)));
    }

    #[test]
    fn test_unknown_tags_and_entities() {
        let blocks = parse_markup("<p><span style=\"x\">A &amp; B</span>&nbsp;<script>c</script></p>");
        assert_eq!(blocks[0].plain_text(), "A & B c");
    }

    #[test]
    fn test_empty_paragraphs_are_dropped() {
        assert!(parse_markup("<p><br></p><p>   </p>").is_empty());
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>Halo <b>dunia</b></p><p>lagi</p>"), "Halo dunia lagi");
    }
}
