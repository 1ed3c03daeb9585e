pub mod attachments;
pub mod auth;
pub mod core;
pub mod submissions;

use crate::access;
use crate::ipc::error::{app_err, err};
use crate::ipc::types::{AppState, Request, Workspace};
use crate::tokens::Assertion;

pub(crate) fn workspace<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Workspace, serde_json::Value> {
    state
        .workspace
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Verifies the request's token. Runs before anything touches storage.
pub(crate) fn caller(state: &AppState, req: &Request) -> Result<Assertion, serde_json::Value> {
    let workspace_id = state.workspace.as_ref().map(|w| w.id.as_str());
    access::authenticate(&state.services.tokens, req.token.as_deref(), workspace_id)
        .map_err(|e| app_err(req, &e))
}

pub(crate) fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Present-or-empty string field; emptiness is judged by the workflow.
pub(crate) fn lenient_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(String::new()),
        Some(v) if v.is_null() => Ok(String::new()),
        Some(v) => v
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be string", key), None)),
    }
}

pub(crate) fn opt_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| {
                err(
                    &req.id,
                    "bad_params",
                    format!("{} must be string or null", key),
                    None,
                )
            }),
    }
}
