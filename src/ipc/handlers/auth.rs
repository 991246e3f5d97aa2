use crate::ipc::helpers::{
    get_optional_str, get_required_str, parse_param, respond, store_mut, to_json, HandlerErr,
    HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::UserAccount;
use serde_json::json;

fn handle_login(state: &mut AppState, req: &Request) -> HandlerResult {
    let email = get_required_str(&req.params, "email")?;
    let password = get_optional_str(&req.params, "password").unwrap_or_default();
    let store = store_mut(state)?;
    match store.login(&email, &password) {
        Some(user) => Ok(json!({ "success": true, "user": user })),
        None => Ok(json!({ "success": false, "user": null })),
    }
}

fn handle_register(state: &mut AppState, req: &Request) -> HandlerResult {
    let account: UserAccount = parse_param(&req.params, "account")?;
    let dob = get_optional_str(&req.params, "dob");
    let store = store_mut(state)?;
    to_json(&store.register(account, dob.as_deref()))
}

fn handle_add_user(state: &mut AppState, req: &Request) -> HandlerResult {
    let account: UserAccount = parse_param(&req.params, "account")?;
    let store = store_mut(state)?;
    to_json(&store.add_user(account))
}

fn handle_reset_password(state: &mut AppState, req: &Request) -> HandlerResult {
    let email = get_required_str(&req.params, "email")?;
    let password = get_optional_str(&req.params, "newPassword");
    let store = store_mut(state)?;
    if !store.reset_password(&email, password.as_deref()) {
        return Err(HandlerErr::new("not_found", "account not found")
            .with_details(json!({ "email": email })));
    }
    Ok(json!({ "ok": true }))
}

fn handle_update_email(state: &mut AppState, req: &Request) -> HandlerResult {
    let old_email = get_required_str(&req.params, "oldEmail")?;
    let new_email = get_required_str(&req.params, "newEmail")?;
    let store = store_mut(state)?;
    to_json(&store.update_email(&old_email, &new_email))
}

fn handle_logout(state: &mut AppState, _req: &Request) -> HandlerResult {
    store_mut(state)?.logout();
    Ok(json!({ "ok": true }))
}

fn handle_session(state: &mut AppState, _req: &Request) -> HandlerResult {
    let store = store_mut(state)?;
    Ok(json!({ "user": store.session() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.login" => handle_login(state, req),
        "auth.register" => handle_register(state, req),
        "auth.addUser" => handle_add_user(state, req),
        "auth.resetPassword" => handle_reset_password(state, req),
        "auth.updateEmail" => handle_update_email(state, req),
        "auth.logout" => handle_logout(state, req),
        "auth.session" => handle_session(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
