//! Process configuration read from the environment (and `.env`).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::document::common::get_static_dir;
use crate::document::DocumentSettings;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_VERIFY_BASE_URL: &str = "https://eoffice.mij.sch.id";
const DEFAULT_ROOT_UNIT_CODE: &str = "MIJ";
const DEFAULT_SIGN_PLACE: &str = "Jakarta";
const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;
const DEFAULT_TYPST_BIN: &str = "typst";
const DEFAULT_COUNTER_MAX_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs with in-memory stores.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub verify_base_url: String,
    pub root_unit_code: String,
    pub assets_dir: PathBuf,
    pub sign_place: String,
    pub utc_offset_hours: i32,
    pub typst_bin: PathBuf,
    pub counter_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            verify_base_url: DEFAULT_VERIFY_BASE_URL.to_string(),
            root_unit_code: DEFAULT_ROOT_UNIT_CODE.to_string(),
            assets_dir: get_static_dir().to_path_buf(),
            sign_place: DEFAULT_SIGN_PLACE.to_string(),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            typst_bin: PathBuf::from(DEFAULT_TYPST_BIN),
            counter_max_attempts: DEFAULT_COUNTER_MAX_ATTEMPTS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let database_url = get("DATABASE_URL");
        if database_url.is_none() {
            log::warn!("DATABASE_URL not set, letters and counters are kept in memory only");
        }

        let verify_base_url = get("VERIFY_BASE_URL").unwrap_or_else(|| {
            log::warn!(
                "VERIFY_BASE_URL not set, QR codes point at {}",
                DEFAULT_VERIFY_BASE_URL
            );
            defaults.verify_base_url.clone()
        });

        Self {
            database_url,
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            verify_base_url,
            root_unit_code: get("ROOT_UNIT_CODE").unwrap_or(defaults.root_unit_code),
            assets_dir: get("ASSETS_DIR").map(PathBuf::from).unwrap_or(defaults.assets_dir),
            sign_place: get("SIGN_PLACE").unwrap_or(defaults.sign_place),
            utc_offset_hours: parse_or("UTC_OFFSET_HOURS", get("UTC_OFFSET_HOURS"), defaults.utc_offset_hours),
            typst_bin: get("TYPST_BIN").map(PathBuf::from).unwrap_or(defaults.typst_bin),
            counter_max_attempts: parse_or(
                "COUNTER_MAX_ATTEMPTS",
                get("COUNTER_MAX_ATTEMPTS"),
                defaults.counter_max_attempts,
            )
            .max(1),
        }
    }

    pub fn document_settings(&self) -> DocumentSettings {
        DocumentSettings {
            assets_dir: self.assets_dir.clone(),
            typst_bin: self.typst_bin.clone(),
            verify_base_url: self.verify_base_url.clone(),
            place_name: self.sign_place.clone(),
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("{} has invalid value '{}', using {}", key, raw, default);
            default
        }),
    }
}
