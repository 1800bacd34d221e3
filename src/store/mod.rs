//! Persistence layer: libSQL-backed storage for letters and users.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{LetterFilter, LetterStore, User};
