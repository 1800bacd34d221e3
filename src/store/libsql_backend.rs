//! libSQL backend: async `LetterStore` implementation.
//!
//! Supports local file and in-memory databases. Evidence and approval
//! records are stored as JSON columns; `version` is the compare-and-set
//! token for every update.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::letters::model::{Letter, Role};
use crate::store::migrations;
use crate::store::traits::{LetterStore, User};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and throwaway runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<i64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

/// Decode a snake_case enum stored as plain text.
fn parse_enum<T: DeserializeOwned>(column: &str, s: String) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(s))
        .map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
}

fn enum_text<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(DatabaseError::Serialization(format!(
            "expected a string enum, got {other}"
        ))),
        Err(e) => Err(DatabaseError::Serialization(e.to_string())),
    }
}

fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
}

fn row_err(context: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Query(format!("{context} row parse: {e}"))
}

/// Flatten a letter into its column values, in `LETTER_COLUMNS` order.
fn letter_params(letter: &Letter) -> Result<Vec<libsql::Value>, DatabaseError> {
    Ok(vec![
        letter.id.clone().into(),
        letter.subject.clone().into(),
        letter.department.clone().into(),
        enum_text(&letter.classification)?.into(),
        letter.amount.to_string().into(),
        letter.submitted_date.format("%Y-%m-%d").to_string().into(),
        enum_text(&letter.status)?.into(),
        enum_text(&letter.stage)?.into(),
        letter.remarks.clone().into(),
        opt_int(letter.priority_score.map(i64::from)),
        opt_text(letter.estimated_turnaround.as_deref()),
        opt_text(letter.approval_deadline.map(|d| d.to_rfc3339()).as_deref()),
        to_json("evidence_files", &letter.evidence_files)?.into(),
        to_json("approval_records", &letter.approval_records)?.into(),
        libsql::Value::Integer(letter.version as i64),
        letter.created_at.to_rfc3339().into(),
        letter.updated_at.to_rfc3339().into(),
    ])
}

/// Map a libsql Row to a Letter.
///
/// Column order matches LETTER_COLUMNS.
fn row_to_letter(row: &libsql::Row) -> Result<Letter, DatabaseError> {
    let err = row_err("letter");
    let amount: String = row.get(4).map_err(&err)?;
    let submitted: String = row.get(5).map_err(&err)?;
    let priority: Option<i64> = row.get::<i64>(9).ok();
    let deadline: Option<String> = row.get(11).ok();
    let evidence: String = row.get(12).map_err(&err)?;
    let records: String = row.get(13).map_err(&err)?;
    let version: i64 = row.get(14).map_err(&err)?;
    let created: String = row.get(15).map_err(&err)?;
    let updated: String = row.get(16).map_err(&err)?;

    Ok(Letter {
        id: row.get(0).map_err(&err)?,
        subject: row.get(1).map_err(&err)?,
        department: row.get(2).map_err(&err)?,
        classification: parse_enum("classification", row.get(3).map_err(&err)?)?,
        amount: Decimal::from_str(&amount)
            .map_err(|e| DatabaseError::Serialization(format!("amount: {e}")))?,
        submitted_date: NaiveDate::parse_from_str(&submitted, "%Y-%m-%d")
            .map_err(|e| DatabaseError::Serialization(format!("submitted_date: {e}")))?,
        status: parse_enum("status", row.get(6).map_err(&err)?)?,
        stage: parse_enum("stage", row.get(7).map_err(&err)?)?,
        remarks: row.get(8).map_err(&err)?,
        priority_score: priority.and_then(|p| u8::try_from(p).ok()),
        estimated_turnaround: row.get::<String>(10).ok(),
        approval_deadline: deadline.as_deref().map(parse_datetime),
        evidence_files: serde_json::from_str(&evidence)
            .map_err(|e| DatabaseError::Serialization(format!("evidence_files: {e}")))?,
        approval_records: serde_json::from_str(&records)
            .map_err(|e| DatabaseError::Serialization(format!("approval_records: {e}")))?,
        version: u64::try_from(version).unwrap_or_default(),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let err = row_err("user");
    let id: String = row.get(0).map_err(&err)?;
    let role: String = row.get(3).map_err(&err)?;
    let created: String = row.get(5).map_err(&err)?;
    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| DatabaseError::Serialization(format!("id: {e}")))?,
        email: row.get(1).map_err(&err)?,
        password_hash: row.get(2).map_err(&err)?,
        role: Role::from_str(&role).map_err(DatabaseError::Serialization)?,
        department: row.get::<String>(4).ok(),
        created_at: parse_datetime(&created),
    })
}

fn is_unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

async fn collect_letters(mut rows: libsql::Rows, context: &str) -> Result<Vec<Letter>, DatabaseError> {
    let mut letters = Vec::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => {
                let letter = row_to_letter(&row).map_err(|e| {
                    let id = row.get::<String>(0).unwrap_or_default();
                    tracing::warn!(letter_id = %id, error = %e, "Undecodable letter row");
                    DatabaseError::Serialization(format!("{context}: letter {id}: {e}"))
                })?;
                letters.push(letter);
            }
            Ok(None) => break,
            Err(e) => return Err(DatabaseError::Query(format!("{context}: {e}"))),
        }
    }
    Ok(letters)
}

// ── Trait implementation ────────────────────────────────────────────

const LETTER_COLUMNS: &str = "id, subject, department, classification, amount, submitted_date, \
    status, stage, remarks, priority_score, estimated_turnaround, approval_deadline, \
    evidence_files, approval_records, version, created_at, updated_at";

const USER_COLUMNS: &str = "id, email, password_hash, role, department, created_at";

#[async_trait]
impl LetterStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Letters ─────────────────────────────────────────────────────

    async fn insert_letter(&self, letter: &Letter) -> Result<(), DatabaseError> {
        let values = letter_params(letter)?;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO letters ({LETTER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                values,
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DatabaseError::Constraint(format!("letter {} already exists", letter.id))
                } else {
                    DatabaseError::Query(format!("insert_letter: {e}"))
                }
            })?;

        debug!(letter_id = %letter.id, "Letter inserted into DB");
        Ok(())
    }

    async fn get_letter(&self, id: &str) -> Result<Option<Letter>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LETTER_COLUMNS} FROM letters WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_letter: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_letter(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_letter: {e}"))),
        }
    }

    async fn update_letter(
        &self,
        letter: &Letter,
        expected_version: u64,
    ) -> Result<bool, DatabaseError> {
        let mut values = letter_params(letter)?;
        values.push(libsql::Value::Integer(expected_version as i64));
        let changed = self
            .conn()
            .execute(
                "UPDATE letters SET subject = ?2, department = ?3, classification = ?4,
                    amount = ?5, submitted_date = ?6, status = ?7, stage = ?8, remarks = ?9,
                    priority_score = ?10, estimated_turnaround = ?11, approval_deadline = ?12,
                    evidence_files = ?13, approval_records = ?14, version = ?15,
                    created_at = ?16, updated_at = ?17
                 WHERE id = ?1 AND version = ?18",
                values,
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_letter: {e}")))?;

        debug!(
            letter_id = %letter.id,
            version = letter.version,
            applied = changed == 1,
            "Letter update attempted"
        );
        Ok(changed == 1)
    }

    async fn list_letters(&self) -> Result<Vec<Letter>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {LETTER_COLUMNS} FROM letters ORDER BY created_at ASC, id ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_letters: {e}")))?;
        collect_letters(rows, "list_letters").await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    user.id.to_string(),
                    user.email.clone(),
                    user.password_hash.clone(),
                    user.role.as_str(),
                    opt_text(user.department.as_deref()),
                    user.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DatabaseError::Constraint(format!("user {} already exists", user.email))
                } else {
                    DatabaseError::Query(format!("insert_user: {e}"))
                }
            })?;

        debug!(email = %user.email, role = %user.role, "User inserted into DB");
        Ok(())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_email: {e}"))),
        }
    }

    async fn find_users(
        &self,
        role: Role,
        department: Option<&str>,
    ) -> Result<Vec<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users
                     WHERE role = ?1 AND (?2 IS NULL OR department = ?2)
                     ORDER BY email ASC"
                ),
                params![role.as_str(), opt_text(department)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_users: {e}")))?;

        let mut users = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => users.push(row_to_user(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("find_users: {e}"))),
            }
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letters::model::{
        ApprovalDecision, ApprovalRecord, Classification, EvidencePurpose, LetterStatus,
    };
    use rust_decimal_macros::dec;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_letter(id: &str, department: &str) -> Letter {
        let now = Utc::now();
        let mut letter = Letter {
            id: id.into(),
            subject: "Conference travel".into(),
            department: department.into(),
            classification: Classification::Payment,
            amount: dec!(75000.50),
            submitted_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            status: LetterStatus::Pending,
            stage: Role::Dean,
            remarks: "Forwarded by Clerk".into(),
            priority_score: Some(70),
            estimated_turnaround: Some("7-9 business days".into()),
            approval_deadline: Some(now + chrono::Duration::days(2)),
            evidence_files: Default::default(),
            approval_records: Default::default(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        letter
            .evidence_files
            .attach(EvidencePurpose::Original, "uploads/orig.pdf");
        letter
    }

    // ── Letter tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_get_by_id() {
        let db = test_db().await;
        let letter = make_letter("CSE-1", "CSE");
        db.insert_letter(&letter).await.unwrap();

        let fetched = db.get_letter("CSE-1").await.unwrap().unwrap();
        assert_eq!(fetched.subject, "Conference travel");
        assert_eq!(fetched.amount, dec!(75000.50));
        assert_eq!(fetched.classification, Classification::Payment);
        assert_eq!(fetched.stage, Role::Dean);
        assert_eq!(fetched.priority_score, Some(70));
        assert_eq!(
            fetched.evidence_files.latest(EvidencePurpose::Original),
            Some("uploads/orig.pdf")
        );
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn get_by_id_not_found() {
        let db = test_db().await;
        assert!(db.get_letter("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_a_constraint_error() {
        let db = test_db().await;
        let letter = make_letter("CSE-1", "CSE");
        db.insert_letter(&letter).await.unwrap();
        let err = db.insert_letter(&letter).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn update_applies_only_at_expected_version() {
        let db = test_db().await;
        let letter = make_letter("CSE-1", "CSE");
        db.insert_letter(&letter).await.unwrap();

        let mut next = letter.next_revision(Utc::now());
        next.stage = Role::Registrar;
        next.approval_records.insert(
            Role::Dean,
            ApprovalRecord {
                remarks: "ok".into(),
                decided_at: Utc::now(),
                signed_file_ref: None,
                decision: ApprovalDecision::Forwarded,
            },
        );
        assert!(db.update_letter(&next, 1).await.unwrap());

        // A second writer still holding version 1 loses.
        let mut rival = letter.next_revision(Utc::now());
        rival.status = LetterStatus::Rejected;
        assert!(!db.update_letter(&rival, 1).await.unwrap());

        let stored = db.get_letter("CSE-1").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.stage, Role::Registrar);
        assert_eq!(stored.status, LetterStatus::Pending);
        assert_eq!(stored.approval_records.len(), 1);
    }

    #[tokio::test]
    async fn update_of_missing_letter_reports_no_change() {
        let db = test_db().await;
        let letter = make_letter("ghost", "CSE");
        assert!(!db.update_letter(&letter, 0).await.unwrap());
    }

    #[tokio::test]
    async fn query_filters_in_memory() {
        let db = test_db().await;
        db.insert_letter(&make_letter("CSE-1", "CSE")).await.unwrap();
        db.insert_letter(&make_letter("IT-1", "IT")).await.unwrap();
        db.insert_letter(&make_letter("CSE-2", "CSE")).await.unwrap();

        let cse = db.query_letters(&|l: &Letter| l.department == "CSE").await.unwrap();
        assert_eq!(cse.len(), 2);
        assert_eq!(db.list_letters().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn optional_columns_round_trip_as_null() {
        let db = test_db().await;
        let mut letter = make_letter("ME-1", "ME");
        letter.priority_score = None;
        letter.estimated_turnaround = None;
        letter.approval_deadline = None;
        db.insert_letter(&letter).await.unwrap();

        let fetched = db.get_letter("ME-1").await.unwrap().unwrap();
        assert_eq!(fetched.priority_score, None);
        assert_eq!(fetched.estimated_turnaround, None);
        assert_eq!(fetched.approval_deadline, None);
    }

    #[tokio::test]
    async fn local_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("letters.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_letter(&make_letter("CSE-9", "CSE")).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.get_letter("CSE-9").await.unwrap().is_some());
    }

    // ── User tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn users_by_email_and_role() {
        let db = test_db().await;
        db.insert_user(&User::new("dean@uni.test", "h1", Role::Dean, None))
            .await
            .unwrap();
        db.insert_user(&User::new("clerk.cse@uni.test", "h2", Role::Clerk, Some("CSE".into())))
            .await
            .unwrap();
        db.insert_user(&User::new("clerk.it@uni.test", "h3", Role::Clerk, Some("IT".into())))
            .await
            .unwrap();

        let dean = db.get_user_by_email("DEAN@uni.test").await.unwrap().unwrap();
        assert_eq!(dean.role, Role::Dean);
        assert_eq!(dean.department, None);

        assert_eq!(db.find_users(Role::Clerk, None).await.unwrap().len(), 2);
        let cse = db.find_users(Role::Clerk, Some("CSE")).await.unwrap();
        assert_eq!(cse.len(), 1);
        assert_eq!(cse[0].email, "clerk.cse@uni.test");

        let err = db
            .insert_user(&User::new("dean@uni.test", "h4", Role::Dean, None))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn email_case_variants_are_the_same_user() {
        let db = test_db().await;
        db.insert_user(&User::new("Dean@uni.test", "h1", Role::Dean, None))
            .await
            .unwrap();
        let err = db
            .insert_user(&User::new("dean@uni.test", "h2", Role::Registrar, None))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));

        let found = db.get_user_by_email("dean@UNI.test").await.unwrap().unwrap();
        assert_eq!(found.role, Role::Dean);
        assert_eq!(db.find_users(Role::Registrar, None).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn corrupt_letter_row_fails_the_listing() {
        let db = test_db().await;
        db.insert_letter(&make_letter("CSE-good", "CSE")).await.unwrap();
        db.insert_letter(&make_letter("CSE-bad", "CSE")).await.unwrap();
        db.conn()
            .execute(
                "UPDATE letters SET evidence_files = 'not json' WHERE id = 'CSE-bad'",
                (),
            )
            .await
            .unwrap();

        let err = db.list_letters().await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(ref m) if m.contains("CSE-bad")), "{err}");
        let err = db.query_letters(&|_: &Letter| true).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }
}
