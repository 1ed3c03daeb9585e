//! Submission repository. Only the workflow module calls into this; nothing
//! else writes submission rows.

use crate::blobs::StoredBlob;
use crate::error::{AppError, AppResult};
use crate::model::{
    Outcome, OwnerSnapshot, Payload, Status, Submission, SubmissionKind, SubmissionView,
};
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

const SUBMISSION_COLUMNS: &str = "s.id, s.owner_id, s.kind, s.payload, s.attachment_ref, \
     s.status, s.created_at, s.decided_at, s.decided_by, s.decision_note";

fn conversion_err(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, Type::Text, msg.into())
}

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<Submission> {
    let kind_raw: String = row.get(2)?;
    let kind = SubmissionKind::parse(&kind_raw)
        .ok_or_else(|| conversion_err(2, format!("unknown kind {kind_raw}")))?;
    let payload_raw: String = row.get(3)?;
    let payload = Payload::from_stored_json(kind, &payload_raw)
        .map_err(|e| conversion_err(3, e.to_string()))?;
    let status_raw: String = row.get(5)?;
    let status = Status::parse(&status_raw)
        .ok_or_else(|| conversion_err(5, format!("unknown status {status_raw}")))?;
    Ok(Submission {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        kind,
        payload,
        attachment: row.get(4)?,
        status,
        created_at: row.get(6)?,
        decided_at: row.get(7)?,
        decided_by: row.get(8)?,
        decision_note: row.get(9)?,
    })
}

/// Inserts a `pending` submission. The owner must be an existing student.
pub(crate) fn insert_submission(
    conn: &Connection,
    owner_id: i64,
    payload: &Payload,
    attachment: Option<&str>,
) -> AppResult<Submission> {
    // Take the write lock up front: a deferred read that later upgrades to a
    // write fails immediately under WAL instead of waiting on busy_timeout.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let owner_role: Option<String> = tx
        .query_row("SELECT role FROM accounts WHERE id = ?", [owner_id], |r| {
            r.get(0)
        })
        .optional()?;
    if owner_role.as_deref() != Some("student") {
        return Err(AppError::NotFound("student account"));
    }

    let created_at = now_ts();
    tx.execute(
        "INSERT INTO submissions(owner_id, kind, payload, attachment_ref, status, created_at)
         VALUES(?, ?, ?, ?, 'pending', ?)",
        params![
            owner_id,
            payload.kind().as_str(),
            payload.to_stored_json()?,
            attachment,
            created_at
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(Submission {
        id,
        owner_id,
        kind: payload.kind(),
        payload: payload.clone(),
        attachment: attachment.map(str::to_string),
        status: Status::Pending,
        created_at,
        decided_at: None,
        decided_by: None,
        decision_note: None,
    })
}

pub(crate) fn load_submission(conn: &Connection, id: i64) -> AppResult<Option<Submission>> {
    let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions s WHERE s.id = ?");
    Ok(conn.query_row(&sql, [id], submission_from_row).optional()?)
}

/// Newest first. With `owner` set only that account's rows are returned; with
/// `join_owner` each row carries the owner's current name and keys.
pub(crate) fn list_submissions(
    conn: &Connection,
    owner: Option<i64>,
    kind: Option<SubmissionKind>,
    join_owner: bool,
) -> AppResult<Vec<SubmissionView>> {
    let sql = format!(
        "SELECT {SUBMISSION_COLUMNS}, a.display_name, a.external_key, a.student_number
         FROM submissions s
         JOIN accounts a ON a.id = s.owner_id
         WHERE (?1 IS NULL OR s.owner_id = ?1)
           AND (?2 IS NULL OR s.kind = ?2)
         ORDER BY s.created_at DESC, s.id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner, kind.map(SubmissionKind::as_str)], |row| {
            let submission = submission_from_row(row)?;
            let owner = if join_owner {
                Some(OwnerSnapshot {
                    display_name: row.get(10)?,
                    external_key: row.get(11)?,
                    student_number: row.get(12)?,
                })
            } else {
                None
            };
            Ok(SubmissionView { submission, owner })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug)]
pub(crate) enum DecideResult {
    Decided(Submission),
    AlreadyDecided(Status),
    Missing,
}

/// Moves a pending submission to `outcome` with a single conditional update
/// inside an IMMEDIATE transaction. Of two racing callers exactly one sees
/// `Decided`; the other sees `AlreadyDecided`.
pub(crate) fn decide_pending(
    conn: &Connection,
    id: i64,
    decider: i64,
    outcome: Outcome,
    note: Option<&str>,
) -> AppResult<DecideResult> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let changed = tx.execute(
        "UPDATE submissions
         SET status = ?1,
             decided_at = ?2,
             decided_by = ?3,
             decision_note = CASE WHEN kind = 'activity_report' THEN ?4 ELSE NULL END
         WHERE id = ?5 AND status = 'pending'",
        params![outcome.status().as_str(), now_ts(), decider, note, id],
    )?;

    if changed == 0 {
        let current: Option<String> = tx
            .query_row("SELECT status FROM submissions WHERE id = ?", [id], |r| {
                r.get(0)
            })
            .optional()?;
        return Ok(match current.as_deref().and_then(Status::parse) {
            Some(status) => DecideResult::AlreadyDecided(status),
            None => DecideResult::Missing,
        });
    }

    let decided = load_submission(&tx, id)?.ok_or(AppError::NotFound("submission"))?;
    tx.commit()?;
    Ok(DecideResult::Decided(decided))
}

pub(crate) fn insert_attachment(
    conn: &Connection,
    owner_id: i64,
    blob: &StoredBlob,
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO attachments(reference, owner_id, content_type, size_bytes, sha256, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![
            blob.reference,
            owner_id,
            blob.media_type.content_type(),
            blob.size_bytes as i64,
            blob.sha256,
            now_ts()
        ],
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub(crate) struct AttachmentRecord {
    pub owner_id: i64,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
}

pub(crate) fn load_attachment(
    conn: &Connection,
    reference: &str,
) -> AppResult<Option<AttachmentRecord>> {
    Ok(conn
        .query_row(
            "SELECT owner_id, content_type, size_bytes, sha256 FROM attachments WHERE reference = ?",
            [reference],
            |r| {
                Ok(AttachmentRecord {
                    owner_id: r.get(0)?,
                    content_type: r.get(1)?,
                    size_bytes: r.get(2)?,
                    sha256: r.get(3)?,
                })
            },
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::{CertificatePayload, ReportPayload};

    fn setup() -> (tempfile::TempDir, Connection, i64, i64) {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("open db");
        let mut ids = Vec::new();
        for (role, key) in [("student", "s@example.edu"), ("admin", "admin")] {
            conn.execute(
                "INSERT INTO accounts(role, external_key, password_hash, display_name, student_number, created_at)
                 VALUES(?, ?, 'x', ?, ?, ?)",
                params![
                    role,
                    key,
                    format!("{key} name"),
                    (role == "student").then_some("S9"),
                    now_ts()
                ],
            )
            .expect("insert account");
            ids.push(conn.last_insert_rowid());
        }
        (dir, conn, ids[0], ids[1])
    }

    fn report() -> Payload {
        Payload::ActivityReport(ReportPayload {
            title: "Week 3".into(),
            content: "Visited the lab".into(),
        })
    }

    #[test]
    fn only_students_own_submissions() {
        let (_dir, conn, student, admin) = setup();
        insert_submission(&conn, student, &report(), None).expect("student insert");
        assert!(matches!(
            insert_submission(&conn, admin, &report(), None),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            insert_submission(&conn, 4242, &report(), None),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn decide_is_single_shot() {
        let (_dir, conn, student, admin) = setup();
        let s = insert_submission(&conn, student, &report(), None).expect("insert");

        let DecideResult::Decided(d) =
            decide_pending(&conn, s.id, admin, Outcome::Approved, Some("ok")).expect("decide")
        else {
            panic!("first decision should apply");
        };
        assert_eq!(d.status, Status::Approved);
        assert_eq!(d.decided_by, Some(admin));
        assert_eq!(d.decision_note.as_deref(), Some("ok"));
        assert!(d.decided_at.is_some());

        assert!(matches!(
            decide_pending(&conn, s.id, admin, Outcome::Rejected, None).expect("second"),
            DecideResult::AlreadyDecided(Status::Approved)
        ));
        assert!(matches!(
            decide_pending(&conn, s.id + 100, admin, Outcome::Rejected, None).expect("missing"),
            DecideResult::Missing
        ));
        let reloaded = load_submission(&conn, s.id).expect("load").expect("row");
        assert_eq!(reloaded, d);
    }

    #[test]
    fn certificate_decisions_drop_the_note() {
        let (_dir, conn, student, admin) = setup();
        let cert = Payload::EnrollmentCertificate(CertificatePayload {
            request_type: "Enrollment".into(),
            purpose: "Scholarship".into(),
        });
        let s = insert_submission(&conn, student, &cert, None).expect("insert");
        let DecideResult::Decided(d) =
            decide_pending(&conn, s.id, admin, Outcome::Rejected, Some("ignored")).expect("decide")
        else {
            panic!("expected decision");
        };
        assert_eq!(d.status, Status::Rejected);
        assert_eq!(d.decision_note, None);
    }

    #[test]
    fn listing_filters_and_joins() {
        let (_dir, conn, student, _admin) = setup();
        let first = insert_submission(&conn, student, &report(), None).expect("first");
        let cert = Payload::EnrollmentCertificate(CertificatePayload {
            request_type: "Enrollment".into(),
            purpose: "Visa".into(),
        });
        let second = insert_submission(&conn, student, &cert, None).expect("second");

        let all = list_submissions(&conn, None, None, true).expect("list all");
        assert_eq!(
            all.iter().map(|v| v.submission.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        let owner = all[0].owner.as_ref().expect("owner snapshot");
        assert_eq!(owner.external_key, "s@example.edu");
        assert_eq!(owner.student_number.as_deref(), Some("S9"));

        let reports = list_submissions(
            &conn,
            Some(student),
            Some(SubmissionKind::ActivityReport),
            false,
        )
        .expect("list reports");
        assert_eq!(reports.len(), 1);
        assert!(reports[0].owner.is_none());
        assert!(list_submissions(&conn, Some(student + 99), None, false)
            .expect("other owner")
            .is_empty());
    }

    #[test]
    fn concurrent_submits_from_separate_connections_all_land() {
        let (dir, conn, student, _admin) = setup();
        let workers = 8;
        let per_worker = 25;
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let path = dir.path().to_path_buf();
                std::thread::spawn(move || {
                    let conn = db::open_db(&path).expect("open db");
                    (0..per_worker)
                        .filter(|_| insert_submission(&conn, student, &report(), None).is_err())
                        .count()
                })
            })
            .collect();
        let failures: usize = handles
            .into_iter()
            .map(|h| h.join().expect("worker"))
            .sum();
        assert_eq!(failures, 0);

        let stored = list_submissions(&conn, Some(student), None, false).expect("list");
        assert_eq!(stored.len(), workers * per_worker);
    }
}
