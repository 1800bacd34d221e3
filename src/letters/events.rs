//! Lifecycle events broadcast after every committed transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Classification, Letter, LetterState, LetterStatus, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LetterEventKind {
    Created,
    IntakeReceived,
    Classified,
    Submitted,
    Routed,
    Forwarded,
    Approved,
    Rejected,
    Validated,
    EvidenceAttached,
    Resubmitted,
    Overdue,
}

impl LetterEventKind {
    /// Events after which someone new holds the letter.
    pub fn assigns_stage(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Routed | Self::Forwarded | Self::Resubmitted
        )
    }
}

/// A snapshot of the letter right after the transition committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterEvent {
    pub kind: LetterEventKind,
    pub letter_id: String,
    pub subject: String,
    pub department: String,
    pub classification: Classification,
    pub stage: Role,
    pub status: LetterStatus,
    pub remarks: String,
    pub version: u64,
    pub at: DateTime<Utc>,
}

impl LetterEvent {
    pub fn from_letter(kind: LetterEventKind, letter: &Letter) -> Self {
        Self {
            kind,
            letter_id: letter.id.clone(),
            subject: letter.subject.clone(),
            department: letter.department.clone(),
            classification: letter.classification,
            stage: letter.stage,
            status: letter.status,
            remarks: letter.remarks.clone(),
            version: letter.version,
            at: letter.updated_at,
        }
    }

    pub fn state(&self) -> LetterState {
        LetterState {
            stage: self.stage,
            status: self.status,
        }
    }
}
