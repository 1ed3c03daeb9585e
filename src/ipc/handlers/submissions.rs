use crate::ipc::error::{app_err, err, ok};
use crate::ipc::handlers::{caller, lenient_str, opt_str, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::model::{CertificatePayload, Outcome, Payload, ReportPayload, SubmissionKind};
use crate::tokens::Assertion;
use crate::workflow::{self, Draft, Scope};
use rusqlite::Connection;
use serde_json::json;

/// Token first, then workspace: an unauthenticated call never reaches storage.
fn prelude<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<(Assertion, &'a Connection), serde_json::Value> {
    let who = caller(state, req)?;
    let ws = workspace(state, req)?;
    Ok((who, &ws.db))
}

fn required_id(req: &Request) -> Result<i64, serde_json::Value> {
    req.params
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", "missing id", None))
}

fn opt_kind(req: &Request) -> Result<Option<SubmissionKind>, serde_json::Value> {
    match opt_str(req, "kind")? {
        None => Ok(None),
        Some(k) => SubmissionKind::parse(k.trim()).map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                "kind must be activity_report or enrollment_certificate",
                Some(json!({ "kind": k })),
            )
        }),
    }
}

fn handle_submit(state: &mut AppState, req: &Request, kind: SubmissionKind) -> serde_json::Value {
    let (who, conn) = match prelude(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let parsed = match kind {
        SubmissionKind::ActivityReport => lenient_str(req, "title").and_then(|title| {
            Ok(Payload::ActivityReport(ReportPayload {
                title,
                content: lenient_str(req, "content")?,
            }))
        }),
        SubmissionKind::EnrollmentCertificate => {
            lenient_str(req, "requestType").and_then(|request_type| {
                Ok(Payload::EnrollmentCertificate(CertificatePayload {
                    request_type,
                    purpose: lenient_str(req, "purpose")?,
                }))
            })
        }
    };
    let payload = match parsed {
        Ok(p) => p,
        Err(e) => return e,
    };
    let attachment = match opt_str(req, "attachment") {
        Ok(a) => a,
        Err(e) => return e,
    };

    match workflow::submit(conn, &who, Draft { payload, attachment }) {
        Ok(submission) => ok(&req.id, json!({ "submission": submission })),
        Err(e) => app_err(req, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request, scope: Scope) -> serde_json::Value {
    let (who, conn) = match prelude(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let kind = match opt_kind(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    match workflow::list(conn, &who, scope, kind) {
        Ok(rows) => ok(&req.id, json!({ "submissions": rows })),
        Err(e) => app_err(req, &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (who, conn) = match prelude(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match workflow::get(conn, &who, id) {
        Ok(submission) => ok(&req.id, json!({ "submission": submission })),
        Err(e) => app_err(req, &e),
    }
}

fn handle_decide(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (who, conn) = match prelude(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id = match required_id(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let outcome_raw = match required_str(req, "outcome") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(outcome) = Outcome::parse(&outcome_raw) else {
        return err(
            &req.id,
            "bad_params",
            "outcome must be approved or rejected",
            Some(json!({ "outcome": outcome_raw })),
        );
    };
    let note = match opt_str(req, "note") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match workflow::decide(conn, &who, id, outcome, note.as_deref()) {
        Ok(submission) => ok(&req.id, json!({ "submission": submission })),
        Err(e) => app_err(req, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "activityReports.submit" => Some(handle_submit(state, req, SubmissionKind::ActivityReport)),
        "certificates.submit" => Some(handle_submit(
            state,
            req,
            SubmissionKind::EnrollmentCertificate,
        )),
        "submissions.listOwn" => Some(handle_list(state, req, Scope::Own)),
        "submissions.listAll" => Some(handle_list(state, req, Scope::All)),
        "submissions.get" => Some(handle_get(state, req)),
        "submissions.decide" => Some(handle_decide(state, req)),
        _ => None,
    }
}
