use crate::ipc::error::{app_err, err, ok};
use crate::ipc::handlers::{caller, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::workflow;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

fn handle_upload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let who = match caller(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let content_type = match required_str(req, "contentType") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let encoded = match required_str(req, "data") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let bytes = match STANDARD.decode(encoded.as_bytes()) {
        Ok(b) => b,
        Err(_) => return err(&req.id, "bad_params", "data must be base64", None),
    };

    match workflow::upload_attachment(&ws.db, &ws.blobs, &who, &bytes, &content_type) {
        Ok(info) => ok(
            &req.id,
            json!({
                "reference": info.reference,
                "contentType": info.content_type,
                "sizeBytes": info.size_bytes,
                "sha256": info.sha256,
            }),
        ),
        Err(e) => app_err(req, &e),
    }
}

fn handle_fetch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let who = match caller(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ws = match workspace(state, req) {
        Ok(w) => w,
        Err(e) => return e,
    };
    let reference = match required_str(req, "reference") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match workflow::fetch_attachment(&ws.db, &ws.blobs, &who, &reference) {
        Ok((info, bytes)) => ok(
            &req.id,
            json!({
                "reference": info.reference,
                "contentType": info.content_type,
                "sizeBytes": info.size_bytes,
                "sha256": info.sha256,
                "data": STANDARD.encode(bytes),
            }),
        ),
        Err(e) => app_err(req, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attachments.upload" => Some(handle_upload(state, req)),
        "attachments.fetch" => Some(handle_fetch(state, req)),
        _ => None,
    }
}
