use crate::db;
use crate::import::config::{
    parse_delimiter, DEFAULT_MAX_ERROR_SAMPLES, DEFAULT_MAX_WARNINGS, DEFAULT_PLACEHOLDER_DOMAIN,
    DEFAULT_PROGRESS_EVERY,
};
use crate::import::multiplex::EmptyUnitPolicy;
use crate::import::ImportConfig;
use crate::ipc::error::{bad_params, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Import,
    Identity,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(Self::Import),
            "identity" => Some(Self::Identity),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Import => "setup.import",
            Self::Identity => "setup.identity",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Import => json!({
            "delimiter": null,
            "progressEvery": DEFAULT_PROGRESS_EVERY,
            "maxErrorSamples": DEFAULT_MAX_ERROR_SAMPLES,
            "maxWarnings": DEFAULT_MAX_WARNINGS,
            "emptySubjectUnits": EmptyUnitPolicy::default().as_str(),
            "subjectSuffixes": ["AM1", "AM2"]
        }),
        SetupSection::Identity => json!({
            "placeholderDomain": DEFAULT_PLACEHOLDER_DOMAIN,
            "institutionalDomain": null
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_domain(v: &Value, key: &str) -> Result<String, String> {
    let s = parse_string_max(v, key, 120)?;
    let s = s.trim_start_matches('@').to_ascii_lowercase();
    if s.is_empty() || !s.contains('.') || s.contains(char::is_whitespace) || s.contains('@') {
        return Err(format!("{} must be a domain name like example.edu", key));
    }
    Ok(s)
}

fn parse_suffixes(v: &Value, key: &str) -> Result<Value, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if arr.is_empty() || arr.len() > 8 {
        return Err(format!("{} must hold 1..=8 entries", key));
    }
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let s = parse_string_max(item, key, 16)?;
        if s.is_empty() {
            return Err(format!("{} entries must be non-empty", key));
        }
        if out.iter().any(|o| o.eq_ignore_ascii_case(&s)) {
            return Err(format!("{} entries must be unique: {}", key, s));
        }
        out.push(s);
    }
    Ok(json!(out))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Import => match k.as_str() {
                "delimiter" => {
                    if v.is_null() {
                        obj.insert(k.clone(), Value::Null);
                    } else {
                        let raw = v.as_str().ok_or("delimiter must be string or null")?;
                        let d = parse_delimiter(raw).ok_or(
                            "delimiter must be one of: \",\", \";\", \"|\", \"\\t\", null",
                        )?;
                        obj.insert(k.clone(), Value::String(d.to_string()));
                    }
                }
                "progressEvery" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 10_000)?));
                }
                "maxErrorSamples" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 1_000)?));
                }
                "maxWarnings" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 10_000)?));
                }
                "emptySubjectUnits" => {
                    let s = parse_string_max(v, k, 16)?;
                    let policy = EmptyUnitPolicy::parse(&s)
                        .ok_or("emptySubjectUnits must be one of: skip, persist")?;
                    obj.insert(k.clone(), Value::String(policy.as_str().to_string()));
                }
                "subjectSuffixes" => {
                    obj.insert(k.clone(), parse_suffixes(v, k)?);
                }
                _ => return Err(format!("unknown import field: {}", k)),
            },
            SetupSection::Identity => match k.as_str() {
                "placeholderDomain" => {
                    obj.insert(k.clone(), Value::String(parse_domain(v, k)?));
                }
                "institutionalDomain" => {
                    if v.is_null() || v.as_str().map(|s| s.trim().is_empty()).unwrap_or(false) {
                        obj.insert(k.clone(), Value::Null);
                    } else {
                        obj.insert(k.clone(), Value::String(parse_domain(v, k)?));
                    }
                }
                _ => return Err(format!("unknown identity field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                let _ = merge_section_patch(section, &mut current, &one);
            }
        }
    }
    Ok(current)
}

/// Workspace import settings merged over defaults.
pub fn load_import_config(conn: &rusqlite::Connection) -> anyhow::Result<ImportConfig> {
    let import = load_section(conn, SetupSection::Import)?;
    let identity = load_section(conn, SetupSection::Identity)?;
    ImportConfig::from_sections(&import, &identity)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match state.require_db(&req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let import = match load_section(conn, SetupSection::Import) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let identity = match load_section(conn, SetupSection::Identity) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "import": import,
            "identity": identity
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match state.require_db(&req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(section_raw) = req.str_param("section") else {
        return bad_params(&req.id, "missing section");
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return bad_params(&req.id, "unknown section");
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return bad_params(&req.id, "patch must be an object");
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return bad_params(&req.id, msg);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_into_import_config() {
        let conn = db::open_in_memory().expect("db");
        let cfg = load_import_config(&conn).expect("config");
        assert_eq!(cfg.delimiter, None);
        assert_eq!(cfg.progress_every, DEFAULT_PROGRESS_EVERY);
        assert_eq!(cfg.subject_suffixes, vec!["AM1".to_string(), "AM2".to_string()]);
        assert_eq!(cfg.placeholder_domain, "import.local");
    }

    #[test]
    fn saved_sections_flow_into_config() {
        let conn = db::open_in_memory().expect("db");
        db::settings_set_json(
            &conn,
            "setup.import",
            &json!({ "delimiter": "tab", "emptySubjectUnits": "persist", "maxWarnings": "lots" }),
        )
        .expect("save import");
        db::settings_set_json(
            &conn,
            "setup.identity",
            &json!({ "institutionalDomain": "@Uni.Edu.Ar" }),
        )
        .expect("save identity");

        let cfg = load_import_config(&conn).expect("config");
        assert_eq!(cfg.delimiter, Some('\t'));
        assert_eq!(cfg.empty_subject_units, EmptyUnitPolicy::Persist);
        assert_eq!(cfg.max_warnings, DEFAULT_MAX_WARNINGS);
        assert_eq!(cfg.institutional_domain.as_deref(), Some("uni.edu.ar"));
    }

    #[test]
    fn patch_validation_rejects_bad_values() {
        let mut cur = default_section(SetupSection::Import);
        let bad = json!({ "progressEvery": 0 });
        assert!(merge_section_patch(SetupSection::Import, &mut cur, bad.as_object().expect("obj")).is_err());
        let bad = json!({ "subjectSuffixes": ["AM1", "am1"] });
        assert!(merge_section_patch(SetupSection::Import, &mut cur, bad.as_object().expect("obj")).is_err());
        let bad = json!({ "colour": "red" });
        assert!(merge_section_patch(SetupSection::Import, &mut cur, bad.as_object().expect("obj")).is_err());

        let mut ident = default_section(SetupSection::Identity);
        let bad = json!({ "placeholderDomain": "no spaces.local" });
        assert!(merge_section_patch(SetupSection::Identity, &mut ident, bad.as_object().expect("obj")).is_err());
    }
}
