use crate::error::AppError;
use crate::ipc::types::Request;
use serde_json::json;
use tracing::error;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Maps a workflow failure onto the wire. Storage faults are logged here with
/// the request's id and method, then reported without detail.
pub fn app_err(req: &Request, e: &AppError) -> serde_json::Value {
    if e.is_storage() {
        error!(
            request_id = %req.id,
            method = %req.method,
            error = ?e,
            "storage failure"
        );
    }
    let details = match e {
        AppError::Validation(fields) => Some(json!({ "fields": fields })),
        AppError::DuplicateKey(field) => Some(json!({ "field": field })),
        AppError::AlreadyDecided { status, .. } => Some(json!({ "status": status })),
        _ => None,
    };
    err(&req.id, e.code(), e.public_message(), details)
}
