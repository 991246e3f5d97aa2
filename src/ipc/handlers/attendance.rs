use crate::ipc::helpers::{parse_param, respond, store_mut, to_json, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::AttendanceRecord;
use serde_json::json;

fn check_pair(record: &AttendanceRecord) -> Result<(), HandlerErr> {
    if record.class_id.trim().is_empty() || record.student_id.trim().is_empty() {
        return Err(HandlerErr::bad_params("classId and studentId are required"));
    }
    Ok(())
}

fn handle_mark(state: &mut AppState, req: &Request) -> HandlerResult {
    let record: AttendanceRecord = parse_param(&req.params, "record")?;
    check_pair(&record)?;
    let store = store_mut(state)?;
    to_json(&store.mark_attendance(record))
}

fn handle_mark_bulk(state: &mut AppState, req: &Request) -> HandlerResult {
    let records: Vec<AttendanceRecord> = parse_param(&req.params, "records")?;
    for r in &records {
        check_pair(r)?;
    }
    let store = store_mut(state)?;
    let marked = store.mark_bulk_attendance(records);
    Ok(json!({ "marked": marked }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.mark" => handle_mark(state, req),
        "attendance.markBulk" => handle_mark_bulk(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
