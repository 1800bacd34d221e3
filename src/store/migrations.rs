//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "letters",
        sql: r#"
            CREATE TABLE IF NOT EXISTS letters (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                department TEXT NOT NULL,
                classification TEXT NOT NULL,
                amount TEXT NOT NULL DEFAULT '0',
                submitted_date TEXT NOT NULL,
                status TEXT NOT NULL,
                stage TEXT NOT NULL,
                remarks TEXT NOT NULL DEFAULT '',
                priority_score INTEGER,
                estimated_turnaround TEXT,
                approval_deadline TEXT,
                evidence_files TEXT NOT NULL DEFAULT '{}',
                approval_records TEXT NOT NULL DEFAULT '{}',
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_letters_department ON letters(department);
            CREATE INDEX IF NOT EXISTS idx_letters_stage_status ON letters(stage, status);
        "#,
    },
    Migration {
        version: 2,
        name: "users",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                department TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        "#,
    },
    Migration {
        version: 3,
        name: "letters_deadline_index",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_letters_deadline
                ON letters(status, approval_deadline);
        "#,
    },
    Migration {
        version: 4,
        name: "users_email_nocase",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users_v4 (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                department TEXT,
                created_at TEXT NOT NULL
            );
            INSERT OR IGNORE INTO users_v4 (id, email, password_hash, role, department, created_at)
                SELECT id, email, password_hash, role, department, created_at
                FROM users ORDER BY created_at;
            DROP TABLE users;
            ALTER TABLE users_v4 RENAME TO users;
            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        "#,
    },
];

/// Apply every migration newer than the recorded version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
