use crate::error::AppError;
use crate::identity::{self, Session, StudentRegistration};
use crate::ipc::error::{app_err, ok};
use crate::ipc::handlers::{caller, lenient_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use serde_json::json;

fn session_json(session: &Session) -> serde_json::Value {
    json!({
        "token": session.token,
        "expiresAt": session.assertion.expires_at,
        "account": session.account,
    })
}

fn parse_registration(req: &Request) -> Result<StudentRegistration, serde_json::Value> {
    Ok(StudentRegistration {
        email: lenient_str(req, "email")?,
        password: lenient_str(req, "password")?,
        student_number: lenient_str(req, "studentNumber")?,
        name: lenient_str(req, "name")?,
        nationality: lenient_str(req, "nationality")?,
        home_university: lenient_str(req, "homeUniversity")?,
        exchange_period: lenient_str(req, "exchangePeriod")?,
    })
}

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let reg = match parse_registration(req) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let result = identity::register_student(&ws.db, &state.services.hasher, &reg)
        .and_then(|account| identity::start_session(&state.services.tokens, &ws.id, account));
    match result {
        Ok(session) => ok(&req.id, session_json(&session)),
        Err(e) => app_err(req, &e),
    }
}

fn handle_login(state: &mut AppState, req: &Request, role: Role) -> serde_json::Value {
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let key_field = match role {
        Role::Student => "email",
        Role::Admin => "username",
    };
    let (key, password) = match (lenient_str(req, key_field), lenient_str(req, "password")) {
        (Ok(k), Ok(p)) => (k, p),
        (Err(e), _) | (_, Err(e)) => return e,
    };

    match identity::authenticate(
        &ws.db,
        &state.services.hasher,
        &state.services.tokens,
        &ws.id,
        role,
        &key,
        &password,
    ) {
        Ok(session) => ok(&req.id, session_json(&session)),
        Err(e) => app_err(req, &e),
    }
}

fn handle_whoami(state: &mut AppState, req: &Request) -> serde_json::Value {
    let who = match caller(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    match identity::find_account(&ws.db, who.account_id) {
        Ok(Some(account)) => ok(&req.id, json!({ "assertion": who, "account": account })),
        // Token outlived its account (e.g. a different workspace was selected).
        Ok(None) => app_err(req, &AppError::Unauthenticated),
        Err(e) => app_err(req, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.register" => Some(handle_register(state, req)),
        "auth.loginStudent" => Some(handle_login(state, req, Role::Student)),
        "auth.loginAdmin" => Some(handle_login(state, req, Role::Admin)),
        "auth.whoami" => Some(handle_whoami(state, req)),
        _ => None,
    }
}
