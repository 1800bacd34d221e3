//! Error types for letterflow.

use crate::letters::model::{Action, LetterStatus, Role};

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Letter lifecycle errors surfaced to callers of the workflow.
///
/// Every variant except `DependencyFailure` is a domain decision. The caller
/// can correct input or re-read and retry; nothing here is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Letter {id} not found")]
    NotFound { id: String },

    #[error("Role {role} may not perform {action}")]
    Unauthorized { role: Role, action: Action },

    #[error("Role {role} may not perform {action} here: {reason}")]
    Forbidden {
        role: Role,
        action: Action,
        reason: String,
    },

    #[error("Letter {id} is {status}, cannot {action}")]
    InvalidTransition {
        id: String,
        status: LetterStatus,
        action: Action,
    },

    #[error("Letter {id} changed concurrently: expected {expected}, found {found}")]
    StaleState {
        id: String,
        expected: String,
        found: String,
    },

    #[error("Letter {id} has no resolved classification")]
    UnresolvedClassification { id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dependency failure: {0}")]
    DependencyFailure(#[from] DatabaseError),
}

impl WorkflowError {
    /// Short machine-readable kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::StaleState { .. } => "stale_state",
            Self::UnresolvedClassification { .. } => "unresolved_classification",
            Self::InvalidInput(_) => "invalid_input",
            Self::DependencyFailure(_) => "dependency_failure",
        }
    }
}

/// Notification delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notifier {name} failed to send: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_error_becomes_dependency_failure() {
        let err: WorkflowError = DatabaseError::Query("disk full".into()).into();
        assert_eq!(err.kind(), "dependency_failure");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn layer_errors_convert_into_top_level() {
        fn open() -> Result<()> {
            Ok(Err::<(), _>(DatabaseError::Pool("no file".into()))?)
        }
        fn refuse() -> Result<()> {
            Ok(Err::<(), _>(WorkflowError::NotFound { id: "CSE-1".into() })?)
        }
        assert!(matches!(open(), Err(Error::Database(DatabaseError::Pool(_)))));
        assert!(matches!(refuse(), Err(Error::Workflow(WorkflowError::NotFound { .. }))));

        let err: Error = ConfigError::InvalidValue {
            key: "LETTERFLOW_PORT".into(),
            message: "not a number".into(),
        }
        .into();
        assert!(err.to_string().starts_with("Configuration error"));
        let err: Error = NotifyError::SendFailed {
            name: "log".into(),
            reason: "closed".into(),
        }
        .into();
        assert!(matches!(err, Error::Notify(_)));
    }

    #[test]
    fn forbidden_message_names_role_and_action() {
        let err = WorkflowError::Forbidden {
            role: Role::Registrar,
            action: Action::Forward,
            reason: "letter is at dean".into(),
        };
        assert_eq!(
            err.to_string(),
            "Role registrar may not perform forward here: letter is at dean"
        );
    }
}
