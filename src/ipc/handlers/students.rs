use crate::ipc::helpers::{get_optional_str, parse_param, respond, store_mut, to_json, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::Student;
use crate::roster::{self, RosterFilter};
use crate::store::StudentEdit;
use serde_json::json;
use std::path::PathBuf;

fn handle_add(state: &mut AppState, req: &Request) -> HandlerResult {
    let student: Student = parse_param(&req.params, "student")?;
    if student.name.trim().is_empty() {
        return Err(HandlerErr::bad_params("student name is required"));
    }
    let store = store_mut(state)?;
    to_json(&store.add(student))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let student: Student = parse_param(&req.params, "student")?;
    let id = student.id.clone();
    let email = student.email.clone();
    let store = store_mut(state)?;
    match store.update_student(student) {
        StudentEdit::Updated => Ok(json!({ "ok": true, "id": id })),
        StudentEdit::NotFound => {
            Err(HandlerErr::new("not_found", "student not found").with_details(json!({ "id": id })))
        }
        StudentEdit::EmailTaken => Err(HandlerErr::bad_params(
            "email already belongs to another account",
        )
        .with_details(json!({ "id": id, "email": email }))),
    }
}

/// Returns the CSV text, and also writes it when `outPath` is given.
fn handle_export_csv(state: &mut AppState, req: &Request) -> HandlerResult {
    let filter: RosterFilter = if req.params.is_null() {
        RosterFilter::default()
    } else {
        serde_json::from_value(req.params.clone())
            .map_err(|e| HandlerErr::bad_params(format!("invalid roster filter: {}", e)))?
    };
    let store = store_mut(state)?;
    let (csv, rows) = roster::export_csv(store.snapshot(), &filter)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;

    let out_path = get_optional_str(&req.params, "outPath").filter(|p| !p.trim().is_empty());
    if let Some(out) = out_path.as_deref() {
        let out = PathBuf::from(out.trim());
        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                HandlerErr::new("io_failed", e.to_string())
                    .with_details(json!({ "path": parent.to_string_lossy() }))
            })?;
        }
        if let Err(e) = std::fs::write(&out, &csv) {
            return Err(HandlerErr::new("io_failed", e.to_string())
                .with_details(json!({ "path": out.to_string_lossy() })));
        }
    }
    Ok(json!({
        "rowsExported": rows,
        "path": out_path,
        "csv": csv,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.add" => handle_add(state, req),
        "students.update" => handle_update(state, req),
        "students.exportCsv" => handle_export_csv(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
