//! Fixtures shared by the unit tests in this module.

use chrono::Utc;
use rust_decimal::Decimal;

use super::model::{Classification, Letter, LetterStatus, Role};

/// A CSE letter parked at `(stage, status)`.
pub fn letter_at(classification: Classification, stage: Role, status: LetterStatus) -> Letter {
    let now = Utc::now();
    Letter {
        id: "CSE-test".into(),
        subject: "Workshop permission".into(),
        department: "CSE".into(),
        classification,
        amount: Decimal::ZERO,
        submitted_date: now.date_naive(),
        status,
        stage,
        remarks: String::new(),
        priority_score: None,
        estimated_turnaround: None,
        approval_deadline: None,
        evidence_files: Default::default(),
        approval_records: Default::default(),
        version: 1,
        created_at: now,
        updated_at: now,
    }
}
