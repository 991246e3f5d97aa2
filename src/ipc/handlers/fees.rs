use crate::calc;
use crate::ipc::helpers::{
    get_optional_str, get_required_f64, get_required_str, respond, store_mut, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use serde_json::json;

fn handle_toggle(state: &mut AppState, req: &Request) -> HandlerResult {
    let class_id = get_required_str(&req.params, "classId")?;
    let student_id = get_required_str(&req.params, "studentId")?;
    let store = store_mut(state)?;

    let amount = match req.params.get("amount") {
        Some(_) => get_required_f64(&req.params, "amount")?,
        // Default to the computed class fee.
        None => store
            .snapshot()
            .schedule
            .iter()
            .find(|c| c.id == class_id)
            .map(|c| calc::class_fee(c, store.snapshot().category(&c.category_id)))
            .unwrap_or(0.0),
    };

    let payment = store.toggle_payment(&class_id, &student_id, amount);
    Ok(json!({
        "paid": payment.is_some(),
        "payment": payment,
    }))
}

fn handle_update(state: &mut AppState, req: &Request) -> HandlerResult {
    let payment_id = get_required_str(&req.params, "paymentId")?;
    let amount = get_required_f64(&req.params, "amount")?;
    let store = store_mut(state)?;
    if !store.update_payment(&payment_id, amount) {
        return Err(HandlerErr::new("not_found", "payment not found")
            .with_details(json!({ "paymentId": payment_id })));
    }
    Ok(json!({ "ok": true }))
}

/// One student's balance with `studentId`, otherwise every active student
/// who owes anything.
fn handle_due(state: &mut AppState, req: &Request) -> HandlerResult {
    let today = match get_optional_str(&req.params, "today") {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| HandlerErr::bad_params("today must be YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };
    let store = store_mut(state)?;
    let snap = store.snapshot();

    if let Some(student_id) = get_optional_str(&req.params, "studentId") {
        let Some(student) = snap.students.iter().find(|s| s.id == student_id) else {
            return Err(HandlerErr::new("not_found", "student not found")
                .with_details(json!({ "studentId": student_id })));
        };
        return Ok(json!({ "due": calc::student_due(snap, student, today) }));
    }
    Ok(json!({ "students": calc::outstanding(snap, today) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "fees.toggle" => handle_toggle(state, req),
        "fees.update" => handle_update(state, req),
        "fees.due" => handle_due(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
