use crate::db;
use crate::ipc::error::{bad_params, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::Path;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "dbPath": state.db_path().map(|p| p.to_string_lossy().to_string()),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = req.str_param("path").map(Path::new) else {
        return bad_params(&req.id, "missing params.path");
    };

    match db::open_db(path) {
        Ok(conn) => {
            info!(workspace = %path.to_string_lossy(), "workspace selected");
            state.select(path, conn);
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "dbPath": path.join(db::DB_FILE_NAME).to_string_lossy(),
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
