//! `LetterStore` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::letters::model::{Letter, Role};

/// A registered account. Identity is asserted upstream; the table exists so
/// notices can be addressed to the people holding a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Opaque credential produced by the identity collaborator.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
        department: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            role,
            department,
            created_at: Utc::now(),
        }
    }
}

/// Predicate used by [`LetterStore::query_letters`].
pub type LetterFilter<'a> = &'a (dyn Fn(&Letter) -> bool + Send + Sync);

/// Backend-agnostic persistence for letters and users.
#[async_trait]
pub trait LetterStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Letters ─────────────────────────────────────────────────────

    /// Insert a new letter. Fails with `Constraint` if the id is taken.
    async fn insert_letter(&self, letter: &Letter) -> Result<(), DatabaseError>;

    async fn get_letter(&self, id: &str) -> Result<Option<Letter>, DatabaseError>;

    /// Replace the stored letter with `letter` only if the stored version is
    /// still `expected_version`. Returns `false` when another writer got
    /// there first, in which case nothing is written.
    async fn update_letter(
        &self,
        letter: &Letter,
        expected_version: u64,
    ) -> Result<bool, DatabaseError>;

    /// Every letter, oldest first.
    async fn list_letters(&self) -> Result<Vec<Letter>, DatabaseError>;

    /// Letters matching `filter`, oldest first.
    async fn query_letters(&self, filter: LetterFilter<'_>) -> Result<Vec<Letter>, DatabaseError> {
        let letters = self.list_letters().await?;
        Ok(letters.into_iter().filter(|l| filter(l)).collect())
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    /// Users holding `role`, restricted to `department` when given.
    async fn find_users(
        &self,
        role: Role,
        department: Option<&str>,
    ) -> Result<Vec<User>, DatabaseError>;
}
