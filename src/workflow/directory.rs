//! Identity and letter-type lookups.
//!
//! External records come in several historical shapes (flat or nested under
//! `profile`, Indonesian or English keys). They are normalised here, once, into
//! `PersonProfile` and `LetterType`; nothing downstream looks at raw records.

use async_trait::async_trait;
use moka::future::Cache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::StoreError;

pub const DEFAULT_JOB_TITLE: &str = "Staff";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonProfile {
    pub id: String,
    pub prefix_title: String,
    pub name: String,
    pub suffix_title: String,
    pub job_title: String,
    pub unit_code: String,
    pub employee_id: String,
}

impl PersonProfile {
    /// Full name with academic titles, e.g. "Dr. Siti Aminah M.Pd.".
    pub fn display_name(&self) -> String {
        join_non_empty(&[&self.prefix_title, &self.name, &self.suffix_title])
    }

    pub fn display_title(&self) -> String {
        let title = collapse_whitespace(&self.job_title);
        if title.is_empty() {
            DEFAULT_JOB_TITLE.to_string()
        } else {
            title
        }
    }

    /// Identifier printed under the signature ("NIP. ..."); `-` when unknown.
    pub fn signer_id(&self) -> String {
        let nip = self.employee_id.trim();
        if nip.is_empty() {
            "-".to_string()
        } else {
            nip.to_string()
        }
    }

    /// Build a profile from an external record.
    pub fn from_record(id: &str, record: &Value) -> Self {
        let source = record.get("profile").filter(|p| p.is_object()).unwrap_or(record);
        let pick = |keys: &[&str]| first_string(source, keys).or_else(|| first_string(record, keys));

        Self {
            id: id.to_string(),
            prefix_title: pick(&["prefix_title", "gelar_depan", "gelarDepan"]).unwrap_or_default(),
            name: pick(&["name", "nama", "nama_lengkap", "full_name", "displayName"])
                .unwrap_or_default(),
            suffix_title: pick(&["suffix_title", "gelar_belakang", "gelarBelakang"])
                .unwrap_or_default(),
            job_title: pick(&["job_title", "jabatan", "position", "title"]).unwrap_or_default(),
            unit_code: pick(&["unit_code", "unit", "kode_unit", "unitCode"]).unwrap_or_default(),
            employee_id: pick(&["nip", "employee_id", "nik", "niy"]).unwrap_or_default(),
        }
    }
}

/// Numbering rules for one letter type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterType {
    pub code: String,
    pub format_code: String,
    pub requires_committee_code: bool,
}

impl LetterType {
    pub fn from_record(code: &str, record: &Value) -> Self {
        let format_code = first_string(
            record,
            &["format_code", "format", "kode_format", "Format Kode Penomoran"],
        )
        .unwrap_or_else(|| code.to_string());

        let flag = ["requires_committee_code", "need_activity_code", "butuh_kode_kegiatan"]
            .iter()
            .find_map(|k| record.get(*k))
            .map(|v| match v {
                Value::Bool(b) => *b,
                Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "ya" | "yes" | "1"),
                Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
                _ => false,
            });
        let requires_committee_code = flag.unwrap_or_else(|| {
            first_string(record, &["keterangan", "Keterangan", "description"])
                .map(|d| d.to_lowercase().contains("kegiatan"))
                .unwrap_or(false)
        });

        Self {
            code: code.to_string(),
            format_code,
            requires_committee_code,
        }
    }
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_person(&self, id: &str) -> Result<Option<PersonProfile>, StoreError>;
}

#[async_trait]
pub trait LetterTypeDirectory: Send + Sync {
    async fn find_letter_type(&self, code: &str) -> Result<Option<LetterType>, StoreError>;
}

/// Both directories held in memory; used by tests and database-less runs.
#[derive(Default)]
pub struct InMemoryDirectory {
    people: RwLock<HashMap<String, PersonProfile>>,
    letter_types: RwLock<HashMap<String, LetterType>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_person(&self, profile: PersonProfile) {
        self.people.write().insert(profile.id.clone(), profile);
    }

    pub fn insert_letter_type(&self, letter_type: LetterType) {
        self.letter_types
            .write()
            .insert(letter_type.code.clone(), letter_type);
    }

    /// Load a raw user record, normalising it on the way in.
    pub fn load_person_record(&self, id: &str, record: &Value) {
        self.insert_person(PersonProfile::from_record(id, record));
    }

    pub fn load_letter_type_record(&self, code: &str, record: &Value) {
        self.insert_letter_type(LetterType::from_record(code, record));
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryDirectory {
    async fn find_person(&self, id: &str) -> Result<Option<PersonProfile>, StoreError> {
        Ok(self.people.read().get(id).cloned())
    }
}

#[async_trait]
impl LetterTypeDirectory for InMemoryDirectory {
    async fn find_letter_type(&self, code: &str) -> Result<Option<LetterType>, StoreError> {
        Ok(self.letter_types.read().get(code).cloned())
    }
}

/// Read-through cache in front of a letter-type directory.
pub struct CachedLetterTypes {
    inner: Arc<dyn LetterTypeDirectory>,
    cache: Cache<String, LetterType>,
}

impl CachedLetterTypes {
    pub fn new(inner: Arc<dyn LetterTypeDirectory>) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(10 * 60))
            .max_capacity(200)
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl LetterTypeDirectory for CachedLetterTypes {
    async fn find_letter_type(&self, code: &str) -> Result<Option<LetterType>, StoreError> {
        if let Some(hit) = self.cache.get(code).await {
            log::debug!("Letter type cache hit: {}", code);
            return Ok(Some(hit));
        }
        let found = self.inner.find_letter_type(code).await?;
        if let Some(ref letter_type) = found {
            self.cache.insert(code.to_string(), letter_type.clone()).await;
        }
        Ok(found)
    }
}

/// Read-through cache in front of an identity directory.
pub struct CachedPeople {
    inner: Arc<dyn IdentityDirectory>,
    cache: Cache<String, PersonProfile>,
}

impl CachedPeople {
    pub fn new(inner: Arc<dyn IdentityDirectory>) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(10 * 60))
            .max_capacity(1000)
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl IdentityDirectory for CachedPeople {
    async fn find_person(&self, id: &str) -> Result<Option<PersonProfile>, StoreError> {
        if let Some(hit) = self.cache.get(id).await {
            return Ok(Some(hit));
        }
        let found = self.inner.find_person(id).await?;
        if let Some(ref person) = found {
            self.cache.insert(id.to_string(), person.clone()).await;
        }
        Ok(found)
    }
}

fn first_string(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match record.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn join_non_empty(parts: &[&str]) -> String {
    collapse_whitespace(&parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_name_joins_titles() {
        let p = PersonProfile {
            prefix_title: " Dr. ".into(),
            name: "Siti   Aminah".into(),
            suffix_title: "M.Pd.".into(),
            ..Default::default()
        };
        assert_eq!(p.display_name(), "Dr. Siti Aminah M.Pd.");

        let bare = PersonProfile {
            name: "Budi".into(),
            ..Default::default()
        };
        assert_eq!(bare.display_name(), "Budi");
    }

    #[test]
    fn test_job_title_defaults_to_staff() {
        let p = PersonProfile::default();
        assert_eq!(p.display_title(), "Staff");
        assert_eq!(p.signer_id(), "-");
    }

    #[test]
    fn test_person_record_nested_profile() {
        let record = json!({
            "profile": { "nama": "Ahmad", "gelar_depan": "H.", "jabatan": "Kepala Sekolah" },
            "nip": "19800101"
        });
        let p = PersonProfile::from_record("u1", &record);
        assert_eq!(p.display_name(), "H. Ahmad");
        assert_eq!(p.display_title(), "Kepala Sekolah");
        assert_eq!(p.signer_id(), "19800101");
    }

    #[test]
    fn test_letter_type_record_shapes() {
        let t = LetterType::from_record("ST", &json!({ "Format Kode Penomoran": "ST", "Keterangan": "Butuh kode kegiatan" }));
        assert_eq!(t.format_code, "ST");
        assert!(t.requires_committee_code);

        let t = LetterType::from_record("SK", &json!({ "format_code": "SK", "need_activity_code": false }));
        assert!(!t.requires_committee_code);

        let t = LetterType::from_record("UND", &json!({}));
        assert_eq!(t.format_code, "UND");
    }

    #[tokio::test]
    async fn test_cached_letter_types_reads_through() {
        let dir = Arc::new(InMemoryDirectory::new());
        dir.insert_letter_type(LetterType {
            code: "SK".into(),
            format_code: "SK".into(),
            requires_committee_code: false,
        });
        let cached = CachedLetterTypes::new(dir.clone());
        assert!(cached.find_letter_type("SK").await.unwrap().is_some());
        assert!(cached.find_letter_type("XX").await.unwrap().is_none());
    }
}
