//! Approval record tracker.
//!
//! Records are keyed by role, so any role a pipeline adds gets a slot
//! without schema changes. A role holds at most one record per pass.

use chrono::{DateTime, Utc};

use super::model::{ApprovalDecision, ApprovalRecord, Letter, Role};

/// Store `role`'s decision on the letter, replacing any earlier record for
/// that role.
pub fn record_approval(
    letter: &mut Letter,
    role: Role,
    remarks: impl Into<String>,
    signed_file_ref: Option<String>,
    decision: ApprovalDecision,
    decided_at: DateTime<Utc>,
) {
    letter.approval_records.insert(
        role,
        ApprovalRecord {
            remarks: remarks.into(),
            decided_at,
            signed_file_ref,
            decision,
        },
    );
}

/// Drop the records of roles that will act again on the next pass.
pub fn clear_for_roles(letter: &mut Letter, roles: &[Role]) {
    letter.approval_records.retain(|role, _| !roles.contains(role));
}
