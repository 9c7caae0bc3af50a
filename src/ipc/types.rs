use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Deserialize;

use crate::db;
use crate::ipc::error::no_workspace;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Request {
    /// Trimmed string param; blank counts as missing.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Sidecar state: the selected workspace and its open database.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

impl AppState {
    /// Replaces the current workspace; the previous connection is closed on drop.
    pub fn select(&mut self, workspace: &Path, conn: Connection) {
        self.workspace = Some(workspace.to_path_buf());
        self.db = Some(conn);
    }

    pub fn db_path(&self) -> Option<PathBuf> {
        self.workspace.as_ref().map(|w| w.join(db::DB_FILE_NAME))
    }

    /// Every data method answers `no_workspace` until one is selected.
    pub fn require_db(&self, id: &str) -> Result<&Connection, serde_json::Value> {
        self.db.as_ref().ok_or_else(|| no_workspace(id))
    }
}
