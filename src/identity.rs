use crate::credentials::CredentialHasher;
use crate::error::{AppError, AppResult};
use crate::model::{Account, FieldViolation, Role};
use crate::store::now_ts;
use crate::tokens::{Assertion, TokenService};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use tracing::{info, warn};

pub const ADMIN_USERNAME: &str = "admin";
const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub display_name: String,
    pub student_number: Option<String>,
    pub nationality: Option<String>,
    pub home_university: Option<String>,
    pub exchange_period: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentRegistration {
    pub email: String,
    pub password: String,
    pub student_number: String,
    pub name: String,
    pub nationality: String,
    pub home_university: String,
    pub exchange_period: String,
}

impl StudentRegistration {
    pub fn violations(&self) -> Vec<FieldViolation> {
        let mut out = Vec::new();
        let email = self.email.trim();
        if email.is_empty() {
            out.push(FieldViolation::new("email", "must not be empty"));
        } else if !email.contains('@') {
            out.push(FieldViolation::new("email", "must be an email address"));
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            out.push(FieldViolation::new(
                "password",
                "must be at least 6 characters",
            ));
        }
        for (field, value) in [
            ("studentNumber", &self.student_number),
            ("name", &self.name),
            ("nationality", &self.nationality),
            ("homeUniversity", &self.home_university),
            ("exchangePeriod", &self.exchange_period),
        ] {
            if value.trim().is_empty() {
                out.push(FieldViolation::new(field, "must not be empty"));
            }
        }
        out
    }
}

pub struct Session {
    pub account: Account,
    pub token: String,
    pub assertion: Assertion,
}

fn normalize_key(role: Role, external_key: &str) -> String {
    match role {
        Role::Student => external_key.trim().to_lowercase(),
        Role::Admin => external_key.trim().to_string(),
    }
}

fn key_field(role: Role) -> &'static str {
    match role {
        Role::Student => "email",
        Role::Admin => "username",
    }
}

/// Names the registration field behind a uniqueness failure on `accounts`.
fn duplicate_field(role: Role, e: &rusqlite::Error) -> Option<&'static str> {
    match e {
        rusqlite::Error::SqliteFailure(f, msg) if f.code == ErrorCode::ConstraintViolation => {
            if msg.as_deref().is_some_and(|m| m.contains("student_number")) {
                Some("studentNumber")
            } else {
                Some(key_field(role))
            }
        }
        _ => None,
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, role, external_key, display_name, student_number, created_at, password_hash";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<(Account, String)> {
    let role: String = row.get(1)?;
    let role = Role::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown role {role}").into(),
        )
    })?;
    Ok((
        Account {
            id: row.get(0)?,
            role,
            external_key: row.get(2)?,
            display_name: row.get(3)?,
            student_number: row.get(4)?,
            created_at: row.get(5)?,
        },
        row.get(6)?,
    ))
}

fn load_by_key(conn: &Connection, role: Role, key: &str) -> AppResult<Option<(Account, String)>> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE role = ? AND external_key = ?"
    );
    Ok(conn
        .query_row(&sql, (role.as_str(), key), account_from_row)
        .optional()?)
}

pub fn find_account(conn: &Connection, account_id: i64) -> AppResult<Option<Account>> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
    Ok(conn
        .query_row(&sql, [account_id], account_from_row)
        .optional()?
        .map(|(account, _)| account))
}

/// Creates an account holding only a hash of `credential`.
pub fn register(
    conn: &Connection,
    hasher: &dyn CredentialHasher,
    role: Role,
    external_key: &str,
    credential: &str,
    profile: &Profile,
) -> AppResult<Account> {
    let key = normalize_key(role, external_key);
    if load_by_key(conn, role, &key)?.is_some() {
        return Err(AppError::DuplicateKey(key_field(role)));
    }
    if let Some(number) = profile.student_number.as_deref() {
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM accounts WHERE student_number = ?",
                [number],
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(AppError::DuplicateKey("studentNumber"));
        }
    }

    let digest = hasher.hash(credential)?;
    let created_at = now_ts();
    let inserted = conn.execute(
        "INSERT INTO accounts(
            role, external_key, password_hash, display_name, student_number,
            nationality, home_university, exchange_period, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            role.as_str(),
            &key,
            &digest,
            profile.display_name.trim(),
            profile.student_number.as_deref(),
            profile.nationality.as_deref(),
            profile.home_university.as_deref(),
            profile.exchange_period.as_deref(),
            &created_at,
        ),
    );
    if let Err(e) = inserted {
        // Lost a race with a concurrent registration of the same key or number.
        return Err(match duplicate_field(role, &e) {
            Some(field) => AppError::DuplicateKey(field),
            None => e.into(),
        });
    }

    let account = Account {
        id: conn.last_insert_rowid(),
        role,
        external_key: key,
        display_name: profile.display_name.trim().to_string(),
        student_number: profile.student_number.clone(),
        created_at,
    };
    info!(account_id = account.id, role = role.as_str(), "account registered");
    Ok(account)
}

pub fn register_student(
    conn: &Connection,
    hasher: &dyn CredentialHasher,
    reg: &StudentRegistration,
) -> AppResult<Account> {
    let violations = reg.violations();
    if !violations.is_empty() {
        return Err(AppError::Validation(violations));
    }
    let profile = Profile {
        display_name: reg.name.trim().to_string(),
        student_number: Some(reg.student_number.trim().to_string()),
        nationality: Some(reg.nationality.trim().to_string()),
        home_university: Some(reg.home_university.trim().to_string()),
        exchange_period: Some(reg.exchange_period.trim().to_string()),
    };
    register(conn, hasher, Role::Student, &reg.email, &reg.password, &profile)
}

/// Checks a credential against the account with `external_key` in `role`'s
/// namespace. Unknown keys still pay for one hash verification.
pub fn authenticate(
    conn: &Connection,
    hasher: &dyn CredentialHasher,
    tokens: &TokenService,
    workspace_id: &str,
    role: Role,
    external_key: &str,
    credential: &str,
) -> AppResult<Session> {
    let key = normalize_key(role, external_key);
    let (account, digest) = match load_by_key(conn, role, &key)? {
        Some(found) => found,
        None => {
            let _ = hasher.verify(credential, hasher.decoy_digest());
            warn!(role = role.as_str(), "login rejected");
            return Err(AppError::InvalidCredentials);
        }
    };
    if !hasher.verify(credential, &digest) {
        warn!(role = role.as_str(), "login rejected");
        return Err(AppError::InvalidCredentials);
    }
    start_session(tokens, workspace_id, account)
}

pub fn start_session(
    tokens: &TokenService,
    workspace_id: &str,
    account: Account,
) -> AppResult<Session> {
    let issued = tokens.issue(&account, workspace_id)?;
    Ok(Session {
        account,
        token: issued.token,
        assertion: issued.assertion,
    })
}

/// Makes sure the bootstrap admin exists. Re-running against an existing
/// workspace leaves the stored account untouched.
pub fn ensure_seed_admin(
    conn: &Connection,
    hasher: &dyn CredentialHasher,
    password: &str,
    display_name: &str,
) -> AppResult<i64> {
    if let Some((account, _)) = load_by_key(conn, Role::Admin, ADMIN_USERNAME)? {
        return Ok(account.id);
    }
    let profile = Profile {
        display_name: display_name.to_string(),
        ..Profile::default()
    };
    match register(conn, hasher, Role::Admin, ADMIN_USERNAME, password, &profile) {
        Ok(account) => Ok(account.id),
        // Another process seeded it between our check and insert.
        Err(AppError::DuplicateKey(_)) => load_by_key(conn, Role::Admin, ADMIN_USERNAME)?
            .map(|(a, _)| a.id)
            .ok_or(AppError::NotFound("admin account")),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Argon2Hasher;
    use crate::db;
    use std::time::Duration;

    const WS: &str = "identity-ws";

    fn setup() -> (tempfile::TempDir, Connection, Argon2Hasher, TokenService) {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("open db");
        let hasher = Argon2Hasher::new().expect("hasher");
        let tokens = TokenService::new(b"identity-tests-secret-0123456789", Duration::from_secs(600));
        (dir, conn, hasher, tokens)
    }

    fn registration(email: &str, number: &str) -> StudentRegistration {
        StudentRegistration {
            email: email.to_string(),
            password: "s3cret-pass".to_string(),
            student_number: number.to_string(),
            name: "Aiko Tanaka".to_string(),
            nationality: "Japan".to_string(),
            home_university: "Kyoto University".to_string(),
            exchange_period: "1 year".to_string(),
        }
    }

    #[test]
    fn register_then_authenticate_round_trip() {
        let (_dir, conn, hasher, tokens) = setup();
        let account = register_student(&conn, &hasher, &registration("Aiko@Example.edu ", "S100"))
            .expect("register");
        assert_eq!(account.external_key, "aiko@example.edu");

        let stored: String = conn
            .query_row(
                "SELECT password_hash FROM accounts WHERE id = ?",
                [account.id],
                |r| r.get(0),
            )
            .expect("hash row");
        assert!(!stored.contains("s3cret-pass"));

        let session = authenticate(
            &conn,
            &hasher,
            &tokens,
            WS,
            Role::Student,
            "aiko@example.edu",
            "s3cret-pass",
        )
        .expect("login");
        assert_eq!(session.assertion.account_id, account.id);
        assert_eq!(tokens.verify(&session.token, Some(WS)).expect("verify").role, Role::Student);

        for (key, pw) in [("aiko@example.edu", "wrong-pass"), ("nobody@example.edu", "s3cret-pass")] {
            assert!(matches!(
                authenticate(&conn, &hasher, &tokens, WS, Role::Student, key, pw),
                Err(AppError::InvalidCredentials)
            ));
        }
    }

    #[test]
    fn duplicate_keys_are_rejected_per_namespace() {
        let (_dir, conn, hasher, _tokens) = setup();
        register_student(&conn, &hasher, &registration("a@example.edu", "S1")).expect("first");
        assert!(matches!(
            register_student(&conn, &hasher, &registration("A@example.edu", "S2")),
            Err(AppError::DuplicateKey("email"))
        ));
        assert!(matches!(
            register_student(&conn, &hasher, &registration("b@example.edu", "S1")),
            Err(AppError::DuplicateKey("studentNumber"))
        ));
        // Same key in the admin namespace is a different account.
        register(
            &conn,
            &hasher,
            Role::Admin,
            "a@example.edu",
            "pw",
            &Profile {
                display_name: "Ops".into(),
                ..Profile::default()
            },
        )
        .expect("admin with same key");
    }

    #[test]
    fn constraint_failures_name_the_colliding_field() {
        let (_dir, conn, hasher, _tokens) = setup();
        register_student(&conn, &hasher, &registration("c@example.edu", "S7")).expect("first");
        let insert = |key: &str, number: &str| {
            conn.execute(
                "INSERT INTO accounts(role, external_key, password_hash, display_name,
                    student_number, created_at)
                 VALUES('student', ?, 'x', 'X', ?, '2026-01-01T00:00:00Z')",
                (key, number),
            )
        };

        let by_number = insert("d@example.edu", "S7").expect_err("number taken");
        assert_eq!(duplicate_field(Role::Student, &by_number), Some("studentNumber"));
        let by_key = insert("c@example.edu", "S8").expect_err("email taken");
        assert_eq!(duplicate_field(Role::Student, &by_key), Some("email"));
        assert_eq!(
            duplicate_field(Role::Student, &rusqlite::Error::QueryReturnedNoRows),
            None
        );
    }

    #[test]
    fn registration_reports_every_bad_field() {
        let (_dir, conn, hasher, _tokens) = setup();
        let reg = StudentRegistration {
            email: "not-an-email".into(),
            password: "123".into(),
            ..StudentRegistration::default()
        };
        let Err(AppError::Validation(fields)) = register_student(&conn, &hasher, &reg) else {
            panic!("expected validation error");
        };
        let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "email",
                "password",
                "studentNumber",
                "name",
                "nationality",
                "homeUniversity",
                "exchangePeriod"
            ]
        );
    }

    #[test]
    fn seed_admin_is_idempotent() {
        let (_dir, conn, hasher, tokens) = setup();
        let first = ensure_seed_admin(&conn, &hasher, "first-pw", "Admin").expect("seed");
        let second = ensure_seed_admin(&conn, &hasher, "other-pw", "Admin").expect("reseed");
        assert_eq!(first, second);
        let admins: i64 = conn
            .query_row("SELECT COUNT(*) FROM accounts WHERE role = 'admin'", [], |r| r.get(0))
            .expect("count");
        assert_eq!(admins, 1);
        let session = authenticate(&conn, &hasher, &tokens, WS, Role::Admin, "admin", "first-pw")
            .expect("admin login");
        assert_eq!(session.account.role, Role::Admin);
        assert!(
            authenticate(&conn, &hasher, &tokens, WS, Role::Student, "admin", "first-pw").is_err()
        );
    }
}
