use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    ActivityReport,
    EnrollmentCertificate,
}

impl SubmissionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActivityReport => "activity_report",
            Self::EnrollmentCertificate => "enrollment_certificate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "activity_report" => Some(Self::ActivityReport),
            "enrollment_certificate" => Some(Self::EnrollmentCertificate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Approved,
    Rejected,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two terminal states a decider may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Approved,
    Rejected,
}

impl Outcome {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn status(self) -> Status {
        match self {
            Self::Approved => Status::Approved,
            Self::Rejected => Status::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePayload {
    pub request_type: String,
    pub purpose: String,
}

/// Kind-specific submission fields. Stored as JSON next to a `kind` column;
/// the workflow only inspects it for completeness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    ActivityReport(ReportPayload),
    EnrollmentCertificate(CertificatePayload),
}

impl Payload {
    pub fn kind(&self) -> SubmissionKind {
        match self {
            Self::ActivityReport(_) => SubmissionKind::ActivityReport,
            Self::EnrollmentCertificate(_) => SubmissionKind::EnrollmentCertificate,
        }
    }

    /// Every missing field, in declaration order.
    pub fn violations(&self) -> Vec<FieldViolation> {
        let mut out = Vec::new();
        match self {
            Self::ActivityReport(p) => {
                if p.title.trim().is_empty() {
                    out.push(FieldViolation::new("title", "must not be empty"));
                }
                if p.content.trim().is_empty() {
                    out.push(FieldViolation::new("content", "must not be empty"));
                }
            }
            Self::EnrollmentCertificate(p) => {
                if p.request_type.trim().is_empty() {
                    out.push(FieldViolation::new("requestType", "must not be empty"));
                }
                if p.purpose.trim().is_empty() {
                    out.push(FieldViolation::new("purpose", "must not be empty"));
                }
            }
        }
        out
    }

    pub fn to_stored_json(&self) -> serde_json::Result<String> {
        match self {
            Self::ActivityReport(p) => serde_json::to_string(p),
            Self::EnrollmentCertificate(p) => serde_json::to_string(p),
        }
    }

    pub fn from_stored_json(kind: SubmissionKind, raw: &str) -> serde_json::Result<Self> {
        Ok(match kind {
            SubmissionKind::ActivityReport => Self::ActivityReport(serde_json::from_str(raw)?),
            SubmissionKind::EnrollmentCertificate => {
                Self::EnrollmentCertificate(serde_json::from_str(raw)?)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub role: Role,
    pub external_key: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: i64,
    pub owner_id: i64,
    pub kind: SubmissionKind,
    pub payload: Payload,
    pub attachment: Option<String>,
    pub status: Status,
    pub created_at: String,
    pub decided_at: Option<String>,
    pub decided_by: Option<i64>,
    pub decision_note: Option<String>,
}

/// Read-time copy of the owner's identity for review screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSnapshot {
    pub display_name: String,
    pub external_key: String,
    pub student_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    #[serde(flatten)]
    pub submission: Submission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSnapshot>,
}
