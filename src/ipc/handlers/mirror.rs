use crate::ipc::helpers::{get_required_str, respond, store_mut, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::mirror::RemoteSnapshot;
use crate::model::MirrorConfig;
use serde_json::json;

fn handle_configure(state: &mut AppState, req: &Request) -> HandlerResult {
    let config = MirrorConfig {
        project_id: get_required_str(&req.params, "projectId")?,
        database_path: get_required_str(&req.params, "databasePath")?,
    };
    let store = store_mut(state)?;
    let connected = store.configure_mirror(config);
    Ok(json!({ "connected": connected }))
}

/// A change notification pushed by the remote side for one collection.
fn handle_notify(state: &mut AppState, req: &Request) -> HandlerResult {
    let note: RemoteSnapshot = serde_json::from_value(req.params.clone()).map_err(|e| {
        HandlerErr::bad_params("invalid snapshot notification")
            .with_details(json!({ "error": e.to_string() }))
    })?;
    let store = store_mut(state)?;
    let applied = store.apply_remote_snapshot(note);
    Ok(json!({ "applied": applied }))
}

fn handle_pull(state: &mut AppState, _req: &Request) -> HandlerResult {
    let store = store_mut(state)?;
    if !store.mirror_connected() {
        return Err(HandlerErr::new("not_found", "no mirror configured"));
    }
    let applied = store.pull_remote();
    Ok(json!({ "collectionsApplied": applied }))
}

fn handle_flush(state: &mut AppState, _req: &Request) -> HandlerResult {
    let store = store_mut(state)?;
    store.flush_mirror();
    Ok(json!({ "connected": store.mirror_connected() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "mirror.configure" => handle_configure(state, req),
        "mirror.notify" => handle_notify(state, req),
        "mirror.pull" => handle_pull(state, req),
        "mirror.flush" => handle_flush(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
