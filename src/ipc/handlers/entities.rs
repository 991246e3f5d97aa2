use crate::ipc::helpers::{get_required_str, parse_param, respond, store_mut, to_json, HandlerErr, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    Announcement, ClassCategory, Collection, Entity, Event, Location, ProgressReport, Reminder,
    ScheduledClass,
};
use serde_json::json;

fn handle_add<T: Entity>(state: &mut AppState, req: &Request, key: &str) -> HandlerResult {
    let item: T = parse_param(&req.params, key)?;
    let store = store_mut(state)?;
    to_json(&store.add(item))
}

fn handle_update<T: Entity>(state: &mut AppState, req: &Request, key: &str) -> HandlerResult {
    let item: T = parse_param(&req.params, key)?;
    let id = item.key().to_string();
    let store = store_mut(state)?;
    if !store.update(item) {
        return Err(HandlerErr::new("not_found", format!("{} not found", T::COLLECTION))
            .with_details(json!({ "id": id })));
    }
    Ok(json!({ "ok": true, "id": id }))
}

fn handle_progress_add(state: &mut AppState, req: &Request) -> HandlerResult {
    let report: ProgressReport = parse_param(&req.params, "report")?;
    let store = store_mut(state)?;
    to_json(&store.add_progress_report(report))
}

fn handle_reminder_add(state: &mut AppState, req: &Request) -> HandlerResult {
    let reminder: Reminder = parse_param(&req.params, "reminder")?;
    if reminder.student_ids.is_empty() {
        return Err(HandlerErr::bad_params("reminder needs at least one student"));
    }
    let store = store_mut(state)?;
    to_json(&store.add_reminder(reminder))
}

fn handle_delete(state: &mut AppState, req: &Request, collection: Collection) -> HandlerResult {
    let id = get_required_str(&req.params, "id")?;
    let store = store_mut(state)?;
    if !store.snapshot().contains(collection, &id) {
        return Err(HandlerErr::new("not_found", format!("{} not found", collection))
            .with_details(json!({ "id": id })));
    }
    to_json(&store.delete_item(collection, &id))
}

fn handle_items_delete(state: &mut AppState, req: &Request) -> HandlerResult {
    let raw = get_required_str(&req.params, "collection")?;
    let Some(collection) = Collection::parse(&raw) else {
        return Err(HandlerErr::bad_params(format!("unknown collection: {}", raw)));
    };
    if collection == Collection::UserAccounts {
        return Err(HandlerErr::bad_params("accounts are only removed by a full reset")
            .with_details(json!({ "collection": raw })));
    }
    handle_delete(state, req, collection)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "categories.add" => handle_add::<ClassCategory>(state, req, "category"),
        "categories.update" => handle_update::<ClassCategory>(state, req, "category"),
        "locations.add" => handle_add::<Location>(state, req, "location"),
        "locations.update" => handle_update::<Location>(state, req, "location"),
        "schedule.add" => handle_add::<ScheduledClass>(state, req, "class"),
        "schedule.update" => handle_update::<ScheduledClass>(state, req, "class"),
        "events.add" => handle_add::<Event>(state, req, "event"),
        "events.update" => handle_update::<Event>(state, req, "event"),
        "announcements.add" => handle_add::<Announcement>(state, req, "announcement"),
        "announcements.update" => handle_update::<Announcement>(state, req, "announcement"),
        "progress.add" => handle_progress_add(state, req),
        "reminders.add" => handle_reminder_add(state, req),
        "reminders.delete" => handle_delete(state, req, Collection::Reminders),
        "items.delete" => handle_items_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
