//! Every role rule lives here. Handlers and the workflow never compare roles
//! themselves; they ask `authorize` and act on the decision.

use crate::error::{AppError, AppResult};
use crate::model::Role;
use crate::tokens::{Assertion, TokenService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateSubmission,
    UploadAttachment,
    ListOwnSubmissions,
    GetSubmission,
    FetchAttachment,
    ListAllSubmissions,
    DecideSubmission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// Pure capability check. `resource_owner` is the owning account of the
/// submission or attachment the operation targets, when there is one.
pub fn authorize(
    assertion: Option<&Assertion>,
    operation: Operation,
    resource_owner: Option<i64>,
) -> Decision {
    let Some(who) = assertion else {
        return Decision::Deny(DenyReason::Unauthenticated);
    };
    let allowed = match (who.role, operation) {
        (Role::Admin, Operation::CreateSubmission | Operation::UploadAttachment) => false,
        (Role::Admin, _) => true,

        (Role::Student, Operation::CreateSubmission | Operation::UploadAttachment) => true,
        (Role::Student, Operation::ListOwnSubmissions) => true,
        (Role::Student, Operation::GetSubmission | Operation::FetchAttachment) => {
            resource_owner == Some(who.account_id)
        }
        (Role::Student, Operation::ListAllSubmissions | Operation::DecideSubmission) => false,
    };
    if allowed {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::Forbidden)
    }
}

/// `authorize` as a `Result`, for use with `?`.
pub fn require(
    assertion: Option<&Assertion>,
    operation: Operation,
    resource_owner: Option<i64>,
) -> AppResult<()> {
    match authorize(assertion, operation, resource_owner) {
        Decision::Allow => Ok(()),
        Decision::Deny(DenyReason::Unauthenticated) => Err(AppError::Unauthenticated),
        Decision::Deny(DenyReason::Forbidden) => Err(AppError::Forbidden),
    }
}

/// Turns a presented token into an assertion. Missing, malformed, tampered
/// and expired tokens all fail here, before any role rule or storage access.
/// Tokens issued for a different workspace than `workspace_id` fail too.
pub fn authenticate(
    tokens: &TokenService,
    token: Option<&str>,
    workspace_id: Option<&str>,
) -> AppResult<Assertion> {
    match token.map(str::trim).filter(|t| !t.is_empty()) {
        None => Err(AppError::Unauthenticated),
        Some(t) => tokens.verify(t, workspace_id),
    }
}
