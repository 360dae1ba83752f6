use std::{path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs the service in demo mode.
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub gemini_image_model: String,
    pub port: u16,
    pub require_product_details: bool,
    pub persist_results: bool,
    pub generation_timeout: Duration,
    pub fetch_timeout: Duration,
    pub max_upload_bytes: usize,
    pub catalog_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_base: DEFAULT_API_BASE.to_string(),
            gemini_image_model: DEFAULT_IMAGE_MODEL.to_string(),
            port: 8080,
            require_product_details: false,
            persist_results: true,
            generation_timeout: Duration::from_secs(120),
            fetch_timeout: Duration::from_secs(30),
            max_upload_bytes: 20 * 1024 * 1024,
            catalog_path: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            gemini_api_key: get("GEMINI_API_KEY").filter(|k| k != "DEMO_KEY"),
            gemini_api_base: get("GEMINI_API_BASE").unwrap_or(defaults.gemini_api_base),
            gemini_image_model: get("GEMINI_IMAGE_MODEL").unwrap_or(defaults.gemini_image_model),
            port: parse_or("PORT", get("PORT"), defaults.port),
            require_product_details: parse_flag("REQUIRE_PRODUCT_DETAILS", get("REQUIRE_PRODUCT_DETAILS"), defaults.require_product_details),
            persist_results: parse_flag("PERSIST_RESULTS", get("PERSIST_RESULTS"), defaults.persist_results),
            generation_timeout: get("GENERATION_TIMEOUT_SECS")
                .map(|v| Duration::from_secs(parse_or("GENERATION_TIMEOUT_SECS", Some(v), 120)))
                .unwrap_or(defaults.generation_timeout),
            fetch_timeout: get("FETCH_TIMEOUT_SECS")
                .map(|v| Duration::from_secs(parse_or("FETCH_TIMEOUT_SECS", Some(v), 30)))
                .unwrap_or(defaults.fetch_timeout),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), defaults.max_upload_bytes),
            catalog_path: get("CATALOG_PATH").map(PathBuf::from),
        }
    }

    pub fn demo_mode(&self) -> bool {
        self.gemini_api_key.is_none()
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid value '{}' for {}, using default", raw, key);
            default
        }),
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => default,
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        Some(other) => {
            warn!("Invalid value '{}' for {}, using default", other, key);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults_and_demo_mode() {
        let cfg = config(&[]);
        assert!(cfg.demo_mode());
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.gemini_image_model, DEFAULT_IMAGE_MODEL);
        assert!(!cfg.require_product_details);
        assert!(cfg.persist_results);
    }

    #[test]
    fn reads_flags_and_durations() {
        let cfg = config(&[
            ("GEMINI_API_KEY", "secret"),
            ("REQUIRE_PRODUCT_DETAILS", "true"),
            ("PERSIST_RESULTS", "off"),
            ("GENERATION_TIMEOUT_SECS", "45"),
            ("PORT", "9000"),
        ]);
        assert!(!cfg.demo_mode());
        assert!(cfg.require_product_details);
        assert!(!cfg.persist_results);
        assert_eq!(cfg.generation_timeout, Duration::from_secs(45));
        assert_eq!(cfg.port, 9000);
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = config(&[("PORT", "http"), ("PERSIST_RESULTS", "maybe"), ("GEMINI_API_KEY", "DEMO_KEY")]);
        assert_eq!(cfg.port, 8080);
        assert!(cfg.persist_results);
        assert!(cfg.demo_mode());
    }
}
