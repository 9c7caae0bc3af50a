use serde::Deserialize;
use serde_json::Value;

use super::multiplex::EmptyUnitPolicy;

pub const DEFAULT_PROGRESS_EVERY: usize = 50;
pub const DEFAULT_MAX_ERROR_SAMPLES: usize = 20;
pub const DEFAULT_MAX_WARNINGS: usize = 200;
pub const DEFAULT_PLACEHOLDER_DOMAIN: &str = "import.local";

/// Knobs for one import run. Built from the workspace `setup.import` and
/// `setup.identity` sections, then overridden by request params or CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportConfig {
    /// Requested delimiter; `None` means comma with semicolon auto-detection.
    pub delimiter: Option<char>,
    pub progress_every: usize,
    pub max_error_samples: usize,
    pub max_warnings: usize,
    pub empty_subject_units: EmptyUnitPolicy,
    pub subject_suffixes: Vec<String>,
    pub placeholder_domain: String,
    pub institutional_domain: Option<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            delimiter: None,
            progress_every: DEFAULT_PROGRESS_EVERY,
            max_error_samples: DEFAULT_MAX_ERROR_SAMPLES,
            max_warnings: DEFAULT_MAX_WARNINGS,
            empty_subject_units: EmptyUnitPolicy::Skip,
            subject_suffixes: vec!["AM1".to_string(), "AM2".to_string()],
            placeholder_domain: DEFAULT_PLACEHOLDER_DOMAIN.to_string(),
            institutional_domain: None,
        }
    }
}

impl ImportConfig {
    /// Merge the two setup sections into one config. Unknown keys are ignored.
    pub fn from_sections(import: &Value, identity: &Value) -> anyhow::Result<Self> {
        let mut merged = serde_json::Map::new();
        for section in [import, identity] {
            if let Some(obj) = section.as_object() {
                for (k, v) in obj {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        let cfg: ImportConfig = serde_json::from_value(Value::Object(merged))?;
        Ok(cfg)
    }
}

/// Accepts `","`, `";"`, `"|"`, `"\t"`, or the words `comma`/`semicolon`/`tab`/`pipe`.
pub fn parse_delimiter(s: &str) -> Option<char> {
    match s {
        "," | "comma" => Some(','),
        ";" | "semicolon" => Some(';'),
        "\t" | "\\t" | "tab" => Some('\t'),
        "|" | "pipe" => Some('|'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sections_merge_over_defaults() {
        let cfg = ImportConfig::from_sections(
            &json!({ "delimiter": ";", "emptySubjectUnits": "persist", "progressEvery": 10 }),
            &json!({ "institutionalDomain": "uni.edu.ar" }),
        )
        .expect("config");
        assert_eq!(cfg.delimiter, Some(';'));
        assert_eq!(cfg.empty_subject_units, EmptyUnitPolicy::Persist);
        assert_eq!(cfg.progress_every, 10);
        assert_eq!(cfg.max_error_samples, 20);
        assert_eq!(cfg.institutional_domain.as_deref(), Some("uni.edu.ar"));
        assert_eq!(cfg.placeholder_domain, "import.local");
    }

    #[test]
    fn null_delimiter_means_auto() {
        let cfg = ImportConfig::from_sections(&json!({ "delimiter": null }), &json!({}))
            .expect("config");
        assert_eq!(cfg.delimiter, None);
    }

    #[test]
    fn delimiter_words() {
        assert_eq!(parse_delimiter("tab"), Some('\t'));
        assert_eq!(parse_delimiter(";"), Some(';'));
        assert_eq!(parse_delimiter("::"), None);
    }
}
