//! Who hears about an event, and what they are told.

use crate::letters::events::{LetterEvent, LetterEventKind};
use crate::letters::model::Role;

/// The role (and department, for clerks) to notify about `event`, if any.
pub fn audience(event: &LetterEvent) -> Option<(Role, Option<&str>)> {
    match event.kind {
        kind if kind.assigns_stage() && event.stage != Role::Clerk => Some((event.stage, None)),
        LetterEventKind::Overdue => Some((event.stage, None)),
        LetterEventKind::Rejected | LetterEventKind::Approved => {
            Some((Role::Clerk, Some(event.department.as_str())))
        }
        _ => None,
    }
}

/// The notice for `recipient`. `None` for events nobody is told about.
pub fn compose(event: &LetterEvent, recipient: &str) -> Option<super::Notice> {
    let id = &event.letter_id;
    let subject_line = if event.subject.is_empty() {
        id.clone()
    } else {
        format!("{} ({id})", event.subject)
    };

    let (subject, body) = match event.kind {
        kind if kind.assigns_stage() => (
            format!("Action needed: {subject_line}"),
            format!(
                "Letter {subject_line} from {} is awaiting your decision as {}.\n\nRemarks: {}",
                event.department, event.stage, event.remarks
            ),
        ),
        LetterEventKind::Overdue => (
            format!("Overdue: {subject_line}"),
            format!(
                "Letter {subject_line} has passed its approval deadline at the {} stage.\n\
                 Please act on it as soon as possible.",
                event.stage
            ),
        ),
        LetterEventKind::Rejected => (
            format!("Rejected: {subject_line}"),
            format!(
                "Letter {subject_line} was rejected at the {} stage.\n\nRemarks: {}\n\n\
                 Correct it and resubmit to restart approval.",
                event.stage, event.remarks
            ),
        ),
        LetterEventKind::Approved => (
            format!("Approved: {subject_line}"),
            format!(
                "Letter {subject_line} received final approval from {}.\n\nRemarks: {}",
                event.stage, event.remarks
            ),
        ),
        _ => return None,
    };

    Some(super::Notice {
        to: recipient.to_string(),
        subject,
        body,
    })
}
