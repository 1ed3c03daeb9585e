use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

pub const DB_FILE: &str = "exchange.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    // Several sidecars may share one workspace; writers wait instead of failing.
    conn.busy_timeout(Duration::from_secs(5))?;
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES('workspace_id', ?)",
        [Uuid::new_v4().to_string()],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            role TEXT NOT NULL CHECK(role IN ('student', 'admin')),
            external_key TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            display_name TEXT NOT NULL,
            student_number TEXT,
            nationality TEXT,
            home_university TEXT,
            exchange_period TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(role, external_key)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_student_number
         ON accounts(student_number) WHERE student_number IS NOT NULL",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attachments(
            reference TEXT PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            content_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(owner_id) REFERENCES accounts(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attachments_owner ON attachments(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('activity_report', 'enrollment_certificate')),
            payload TEXT NOT NULL,
            attachment_ref TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK(status IN ('pending', 'approved', 'rejected')),
            created_at TEXT NOT NULL,
            decided_at TEXT,
            decided_by INTEGER,
            decision_note TEXT,
            FOREIGN KEY(owner_id) REFERENCES accounts(id),
            FOREIGN KEY(attachment_ref) REFERENCES attachments(reference),
            FOREIGN KEY(decided_by) REFERENCES accounts(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_owner ON submissions(owner_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_kind_created
         ON submissions(kind, created_at)",
        [],
    )?;

    // Decisions are final and submissions are never removed, whatever the caller.
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS trg_submissions_terminal
         BEFORE UPDATE ON submissions
         WHEN OLD.status <> 'pending'
         BEGIN
           SELECT RAISE(ABORT, 'submission already decided');
         END",
        [],
    )?;
    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS trg_submissions_no_delete
         BEFORE DELETE ON submissions
         BEGIN
           SELECT RAISE(ABORT, 'submissions are append-only');
         END",
        [],
    )?;

    Ok(conn)
}

/// Stable identity of the workspace, minted on first open. Session tokens are
/// scoped to it.
pub fn workspace_id(conn: &Connection) -> anyhow::Result<String> {
    Ok(conn.query_row(
        "SELECT value FROM meta WHERE key = 'workspace_id'",
        [],
        |r| r.get(0),
    )?)
}
