use crate::db;
use crate::ipc::helpers::{
    db_conn, optional_str, require_capability, required_str, respond, HandlerErr, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::users::{Capability, Role, UserRecord};
use serde_json::json;

fn parse_role(raw: &str) -> Result<Role, HandlerErr> {
    Role::parse(raw).ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {raw}")))
}

fn display_name(raw: &str) -> Result<String, HandlerErr> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > 120 {
        return Err(HandlerErr::bad_params("displayName must be 1..=120 characters"));
    }
    Ok(name.to_string())
}

fn not_found(uid: &str) -> HandlerErr {
    HandlerErr::new("not_found", "user not found").with_details(json!({ "uid": uid }))
}

/// Sign-up. The first account of a workspace becomes Admin; after that
/// accounts are Student unless an admin assigns another role.
fn users_create(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let uid = required_str(req, "uid")?;
    let name = display_name(required_str(req, "displayName")?)?;
    let email = required_str(req, "email")?.to_lowercase();
    if !email.contains('@') || email.len() > 200 {
        return Err(HandlerErr::bad_params("email is not valid"));
    }
    if db::user_get(conn, uid)?.is_some() {
        return Err(HandlerErr::new("conflict", "user already exists").with_details(json!({ "uid": uid })));
    }

    let bootstrap = db::users_list(conn)?.is_empty();
    let role = if bootstrap {
        Role::Admin
    } else {
        let requested = optional_str(req, "role").map(parse_role).transpose()?;
        match requested {
            None | Some(Role::Student) => Role::Student,
            Some(other) => {
                require_capability(conn, req, Capability::ManageUsers)?;
                other
            }
        }
    };

    let user = UserRecord {
        uid: uid.to_string(),
        display_name: name,
        email,
        role,
        created_at: crate::dates::now_rfc3339(),
    };
    db::user_insert(conn, &user)?;
    log::info!("user {} created as {}", user.uid, user.role.as_str());
    Ok(json!({ "user": user }))
}

fn users_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let uid = required_str(req, "uid")?;
    match db::user_get(conn, uid)? {
        Some(u) => Ok(json!({ "user": u })),
        None => Err(not_found(uid)),
    }
}

fn users_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    require_capability(conn, req, Capability::ManageUsers)?;
    Ok(json!({ "users": db::users_list(conn)? }))
}

fn users_set_role(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let actor = require_capability(conn, req, Capability::ManageUsers)?;
    let uid = required_str(req, "uid")?;
    let role = parse_role(required_str(req, "role")?)?;
    let Some(target) = db::user_get(conn, uid)? else {
        return Err(not_found(uid));
    };
    if target.role == Role::Admin && role != Role::Admin {
        let admins = db::users_list(conn)?
            .iter()
            .filter(|u| u.role == Role::Admin)
            .count();
        if admins <= 1 {
            return Err(HandlerErr::new("conflict", "the workspace must keep at least one Admin")
                .with_details(json!({ "uid": uid })));
        }
    }
    if !db::user_set_role(conn, uid, role)? {
        return Err(not_found(uid));
    }
    log::info!("{} set role of {} to {}", actor.uid, uid, role.as_str());
    let user = db::user_get(conn, uid)?.ok_or_else(|| not_found(uid))?;
    Ok(json!({ "user": user }))
}

/// Users rename themselves; renaming someone else takes ManageUsers.
fn users_update_profile(state: &mut AppState, req: &Request) -> HandlerResult {
    let conn = db_conn(state)?;
    let uid = required_str(req, "uid")?;
    if optional_str(req, "actorUid") != Some(uid) {
        require_capability(conn, req, Capability::ManageUsers)?;
    }
    let name = display_name(required_str(req, "displayName")?)?;
    if !db::user_set_display_name(conn, uid, &name)? {
        return Err(not_found(uid));
    }
    let user = db::user_get(conn, uid)?.ok_or_else(|| not_found(uid))?;
    Ok(json!({ "user": user }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.create" => users_create(state, req),
        "users.get" => users_get(state, req),
        "users.list" => users_list(state, req),
        "users.setRole" => users_set_role(state, req),
        "users.updateProfile" => users_update_profile(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
