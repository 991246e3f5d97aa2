use crate::db;
use crate::ipc::helpers::{get_required_str, respond, store_mut, to_json, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Collection;
use crate::store::Store;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "mirrorConnected": state.store.as_ref().is_some_and(Store::mirror_connected),
    }))
}

pub fn open_workspace(state: &mut AppState, path: PathBuf) -> anyhow::Result<()> {
    // Release the previous store (and drain its mirror) before opening another.
    state.store = None;
    state.workspace = None;
    let conn = db::open_db(&path)?;
    let store = Store::open(conn, state.config.clone());
    tracing::info!(
        workspace = %path.to_string_lossy(),
        students = store.snapshot().students.len(),
        mirror = store.mirror_connected(),
        "workspace opened"
    );
    state.workspace = Some(path);
    state.store = Some(store);
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> HandlerResult {
    let path = PathBuf::from(get_required_str(&req.params, "path")?);
    open_workspace(state, path.clone())
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "mirrorConnected": state.store.as_ref().is_some_and(Store::mirror_connected),
    }))
}

/// The whole snapshot, or one collection when `params.collection` is set.
fn handle_state_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = store_mut(state)?;
    let Some(key) = req.params.get("collection").and_then(|v| v.as_str()) else {
        return to_json(store.snapshot());
    };
    let Some(collection) = Collection::parse(key) else {
        return Err(HandlerErr::bad_params(format!("unknown collection: {}", key)));
    };
    let docs = store
        .snapshot()
        .documents(collection)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    Ok(json!({
        "collection": collection,
        "items": docs.into_iter().map(|(_, doc)| doc).collect::<Vec<_>>(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        "state.get" => handle_state_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
