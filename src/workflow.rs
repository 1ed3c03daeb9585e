//! Review workflow: `pending` -> `approved` | `rejected`, nothing after that.
//!
//! Each entry point authorizes through `access::require` first, then touches
//! the repository. Submission rows are only ever written from here.

use crate::access::{self, Operation};
use crate::blobs::{self, BlobStore};
use crate::error::{AppError, AppResult};
use crate::model::{
    FieldViolation, Outcome, Payload, Submission, SubmissionKind, SubmissionView,
};
use crate::store::{self, DecideResult};
use crate::tokens::Assertion;
use rusqlite::Connection;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Own,
    All,
}

#[derive(Debug, Clone)]
pub struct Draft {
    pub payload: Payload,
    pub attachment: Option<String>,
}

pub fn submit(conn: &Connection, who: &Assertion, draft: Draft) -> AppResult<Submission> {
    access::require(Some(who), Operation::CreateSubmission, Some(who.account_id))?;

    let mut violations = draft.payload.violations();
    let attachment = draft
        .attachment
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    if let Some(reference) = attachment {
        // A reference is only usable by the student who uploaded it.
        let owned = blobs::is_valid_reference(reference)
            && store::load_attachment(conn, reference)?
                .is_some_and(|rec| rec.owner_id == who.account_id);
        if !owned {
            violations.push(FieldViolation::new("attachment", "unknown attachment reference"));
        }
    }
    if !violations.is_empty() {
        return Err(AppError::Validation(violations));
    }

    let submission = store::insert_submission(conn, who.account_id, &draft.payload, attachment)?;
    info!(
        submission_id = submission.id,
        owner_id = submission.owner_id,
        kind = submission.kind.as_str(),
        "submission received"
    );
    Ok(submission)
}

pub fn decide(
    conn: &Connection,
    who: &Assertion,
    id: i64,
    outcome: Outcome,
    note: Option<&str>,
) -> AppResult<Submission> {
    access::require(Some(who), Operation::DecideSubmission, None)?;

    let note = note.map(str::trim).filter(|n| !n.is_empty());
    match store::decide_pending(conn, id, who.account_id, outcome, note)? {
        DecideResult::Decided(submission) => {
            info!(
                submission_id = id,
                decider = who.account_id,
                status = submission.status.as_str(),
                "submission decided"
            );
            Ok(submission)
        }
        DecideResult::AlreadyDecided(status) => Err(AppError::AlreadyDecided { id, status }),
        DecideResult::Missing => Err(AppError::NotFound("submission")),
    }
}

pub fn get(conn: &Connection, who: &Assertion, id: i64) -> AppResult<Submission> {
    let submission = store::load_submission(conn, id)?.ok_or(AppError::NotFound("submission"))?;
    access::require(Some(who), Operation::GetSubmission, Some(submission.owner_id))?;
    Ok(submission)
}

pub fn list(
    conn: &Connection,
    who: &Assertion,
    scope: Scope,
    kind: Option<SubmissionKind>,
) -> AppResult<Vec<SubmissionView>> {
    match scope {
        Scope::Own => {
            access::require(Some(who), Operation::ListOwnSubmissions, Some(who.account_id))?;
            store::list_submissions(conn, Some(who.account_id), kind, false)
        }
        Scope::All => {
            access::require(Some(who), Operation::ListAllSubmissions, None)?;
            store::list_submissions(conn, None, kind, true)
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentInfo {
    pub reference: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
}

pub fn upload_attachment(
    conn: &Connection,
    blobs: &dyn BlobStore,
    who: &Assertion,
    bytes: &[u8],
    content_type: &str,
) -> AppResult<AttachmentInfo> {
    access::require(Some(who), Operation::UploadAttachment, Some(who.account_id))?;
    let stored = blobs.store(bytes, content_type)?;
    if let Err(e) = store::insert_attachment(conn, who.account_id, &stored) {
        if let Err(cleanup) = blobs.discard(&stored.reference) {
            warn!(reference = %stored.reference, error = ?cleanup, "orphaned attachment blob");
        }
        return Err(e);
    }
    info!(
        owner_id = who.account_id,
        reference = %stored.reference,
        size_bytes = stored.size_bytes,
        "attachment stored"
    );
    Ok(AttachmentInfo {
        reference: stored.reference,
        content_type: stored.media_type.content_type().to_string(),
        size_bytes: stored.size_bytes as i64,
        sha256: stored.sha256,
    })
}

pub fn fetch_attachment(
    conn: &Connection,
    blobs: &dyn BlobStore,
    who: &Assertion,
    reference: &str,
) -> AppResult<(AttachmentInfo, Vec<u8>)> {
    let record = store::load_attachment(conn, reference)?.ok_or(AppError::NotFound("attachment"))?;
    access::require(Some(who), Operation::FetchAttachment, Some(record.owner_id))?;
    let bytes = blobs.fetch(reference)?;
    Ok((
        AttachmentInfo {
            reference: reference.to_string(),
            content_type: record.content_type,
            size_bytes: record.size_bytes,
            sha256: record.sha256,
        },
        bytes,
    ))
}
