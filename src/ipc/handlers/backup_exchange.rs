use crate::backup;
use crate::ipc::helpers::{
    get_bool, get_optional_str, respond, store_mut, to_json, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_backup_download(state: &mut AppState, req: &Request) -> HandlerResult {
    let store = store_mut(state)?;
    let text = store
        .download_backup()
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;

    let out_path = match get_optional_str(&req.params, "outPath") {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return Ok(json!({ "backup": text })),
    };
    let bundle = get_bool(&req.params, "bundle");
    let export = backup::write_backup(&text, &PathBuf::from(&out_path), bundle).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
    })?;
    tracing::info!(path = %out_path, format = %export.bundle_format, "backup written");

    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "bytes": export.bytes,
        "sha256": export.sha256,
    }))
}

/// Accepts either `inPath` (plain JSON or bundle) or inline `text`.
fn handle_backup_restore(state: &mut AppState, req: &Request) -> HandlerResult {
    let (text, format) = match get_optional_str(&req.params, "inPath").filter(|p| !p.trim().is_empty()) {
        Some(in_path) => {
            let src = PathBuf::from(in_path.trim());
            if !src.is_file() {
                return Err(HandlerErr::new("not_found", "backup file not found")
                    .with_details(json!({ "path": in_path })));
            }
            let imported = backup::read_backup(&src).map_err(|e| {
                HandlerErr::new("invalid_backup", e.to_string())
                    .with_details(json!({ "path": in_path }))
            })?;
            (imported.text, imported.bundle_format_detected)
        }
        None => match get_optional_str(&req.params, "text") {
            Some(t) => (t, backup::PLAIN_FORMAT.to_string()),
            None => return Err(HandlerErr::bad_params("missing inPath or text")),
        },
    };
    let push = get_bool(&req.params, "pushToMirror");

    let store = store_mut(state)?;
    let summary = store.restore_backup(&text, push).map_err(|e| {
        tracing::warn!(error = %e, "backup rejected");
        HandlerErr::new("invalid_backup", e.to_string())
    })?;

    let mut result = to_json(&summary)?;
    result["bundleFormatDetected"] = json!(format);
    Ok(result)
}

fn handle_clear_all(state: &mut AppState, _req: &Request) -> HandlerResult {
    let store = store_mut(state)?;
    to_json(&store.clear_all_data())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.download" => handle_backup_download(state, req),
        "backup.restore" => handle_backup_restore(state, req),
        "system.clearAll" => handle_clear_all(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
