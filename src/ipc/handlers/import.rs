use crate::db;
use crate::import::config::parse_delimiter;
use crate::import::{ImportConfig, ImportError, Importer};
use crate::ipc::error::{bad_params, err, ok};
use crate::ipc::handlers::setup::load_import_config;
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULT_RUNS_LIMIT: usize = 20;
const MAX_RUNS_LIMIT: usize = 500;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Workspace settings with the per-request overrides applied.
fn request_config(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<ImportConfig, HandlerErr> {
    let mut cfg = load_import_config(conn).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    if let Some(raw) = params.get("delimiter").and_then(|v| v.as_str()) {
        let d = parse_delimiter(raw).ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "delimiter must be one of: \",\", \";\", \"|\", \"\\t\"".to_string(),
            details: Some(json!({ "delimiter": raw })),
        })?;
        cfg.delimiter = Some(d);
    }
    Ok(cfg)
}

fn import_failed(e: ImportError) -> HandlerErr {
    HandlerErr {
        code: "import_failed",
        message: e.to_string(),
        details: Some(json!({ "reason": e.code() })),
    }
}

fn handle_import_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match state.require_db(&req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(in_path) = req.str_param("inPath").map(PathBuf::from) else {
        return bad_params(&req.id, "missing inPath");
    };
    let cfg = match request_config(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match Importer::new(&cfg).preview(&in_path) {
        Ok(report) => match serde_json::to_value(&report) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "import_failed", e.to_string(), None),
        },
        Err(e) => import_failed(e).response(&req.id),
    }
}

fn handle_import_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match state.require_db(&req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(in_path) = req.str_param("inPath").map(PathBuf::from) else {
        return bad_params(&req.id, "missing inPath");
    };
    let report_path = req.str_param("reportPath").map(PathBuf::from);
    let cfg = match request_config(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let started_at = Utc::now().to_rfc3339();
    let report = match Importer::new(&cfg).apply(&in_path, &mut SqliteStore::new(conn)) {
        Ok(r) => r,
        Err(e) => return import_failed(e).response(&req.id),
    };
    let report_json = match serde_json::to_value(&report) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "import_failed", e.to_string(), None),
    };

    // The data is committed at this point, so the run is recorded before
    // anything else can fail.
    let run_id = match db::record_report(conn, &report, &started_at) {
        Ok(id) => id,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    info!(run_id = %run_id, rows_ok = report.rows_ok, rows_error = report.rows_error, "import applied");

    let mut result = json!({
        "runId": run_id,
        "report": report_json,
    });
    if let Some(p) = report_path.as_ref() {
        let written = serde_json::to_string_pretty(&result["report"])
            .map_err(anyhow::Error::from)
            .and_then(|text| std::fs::write(p, text).map_err(anyhow::Error::from));
        if let Err(e) = written {
            warn!(path = %p.to_string_lossy(), error = %e, "report file not written");
            result["reportWriteError"] = json!(format!("{:#}", e));
        }
    }
    ok(&req.id, result)
}

fn handle_import_runs_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match state.require_db(&req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let limit = match req.params.get("limit") {
        None | Some(serde_json::Value::Null) => DEFAULT_RUNS_LIMIT,
        Some(v) => match v.as_u64() {
            Some(n) if n >= 1 && n as usize <= MAX_RUNS_LIMIT => n as usize,
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("limit must be in 1..={}", MAX_RUNS_LIMIT),
                    None,
                )
            }
        },
    };
    match db::list_import_runs(conn, limit) {
        Ok(runs) => ok(&req.id, json!({ "runs": runs })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.preview" => Some(handle_import_preview(state, req)),
        "import.apply" => Some(handle_import_apply(state, req)),
        "import.runs.list" => Some(handle_import_runs_list(state, req)),
        _ => None,
    }
}
