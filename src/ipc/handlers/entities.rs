use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

fn handle_entities_counts(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match state.require_db(&req.id) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match db::entity_counts(conn) {
        Ok(counts) => {
            let mut obj = Map::new();
            for (table, n) in counts {
                obj.insert(table.to_string(), Value::from(n));
            }
            ok(&req.id, json!({ "counts": obj }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "entities.counts" => Some(handle_entities_counts(state, req)),
        _ => None,
    }
}
