//! Role query filter: which letters each role sees on its dashboard, and in
//! what order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::model::{Classification, Letter, LetterState, LetterStatus, Role};

/// Listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Newest submission first.
    #[default]
    Date,
    /// Highest priority score first, oldest first among equals.
    Priority,
}

/// Whether `role` (from `department`, for clerks) may see `letter`.
pub fn is_visible(role: Role, department: Option<&str>, letter: &Letter) -> bool {
    visible_at(
        role,
        department,
        &letter.department,
        letter.classification,
        letter.state(),
    )
}

/// The visibility rule over the fields it depends on, so it can be applied
/// to event snapshots as well as stored letters.
pub fn visible_at(
    role: Role,
    department: Option<&str>,
    letter_department: &str,
    classification: Classification,
    state: LetterState,
) -> bool {
    let classified = state.status != LetterStatus::AwaitingClassification;
    match role {
        Role::Clerk => department.is_some_and(|d| d == letter_department),
        Role::Dean => state.stage != Role::Clerk && classified,
        Role::Registrar => !matches!(state.stage, Role::Clerk | Role::Dean) && classified,
        Role::ExecutiveApprover => {
            !matches!(state.stage, Role::Clerk | Role::Dean | Role::Registrar) && classified
        }
        Role::Accounts => state.stage == Role::Accounts && classification == Classification::Payment,
    }
}

/// Filter and order the letters visible to `role`.
pub fn visible_letters(
    role: Role,
    department: Option<&str>,
    letters: impl IntoIterator<Item = Letter>,
    sort: SortMode,
) -> Vec<Letter> {
    let mut visible: Vec<Letter> = letters
        .into_iter()
        .filter(|l| is_visible(role, department, l))
        .collect();
    sort_letters(&mut visible, sort);
    visible
}

pub fn sort_letters(letters: &mut [Letter], sort: SortMode) {
    match sort {
        SortMode::Date => letters.sort_by(|a, b| {
            b.submitted_date
                .cmp(&a.submitted_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        }),
        SortMode::Priority => letters.sort_by(|a, b| {
            compare_priority(a.priority_score, b.priority_score)
                .then_with(|| a.submitted_date.cmp(&b.submitted_date))
                .then_with(|| a.created_at.cmp(&b.created_at))
        }),
    }
}

/// Descending score; unscored letters sort after every scored one.
fn compare_priority(a: Option<u8>, b: Option<u8>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letters::test_support::letter_at;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn clerk_sees_own_department_at_any_stage() {
        let mut awaiting = letter_at(
            Classification::Unknown,
            Role::Clerk,
            LetterStatus::AwaitingClassification,
        );
        awaiting.department = "IT".into();
        assert!(is_visible(Role::Clerk, Some("IT"), &awaiting));
        assert!(!is_visible(Role::Clerk, Some("CSE"), &awaiting));
        assert!(!is_visible(Role::Clerk, None, &awaiting));
    }

    #[test]
    fn approvers_see_letters_at_or_past_their_stage() {
        let at_registrar =
            letter_at(Classification::Permission, Role::Registrar, LetterStatus::Pending);
        assert!(is_visible(Role::Dean, None, &at_registrar));
        assert!(is_visible(Role::Registrar, None, &at_registrar));
        assert!(!is_visible(Role::ExecutiveApprover, None, &at_registrar));
        assert!(!is_visible(Role::Accounts, None, &at_registrar));
    }

    #[test]
    fn awaiting_classification_hidden_from_approvers() {
        let awaiting = letter_at(
            Classification::Unknown,
            Role::Clerk,
            LetterStatus::AwaitingClassification,
        );
        for role in [Role::Dean, Role::Registrar, Role::ExecutiveApprover, Role::Accounts] {
            assert!(!is_visible(role, None, &awaiting), "{role}");
        }
    }

    #[test]
    fn accounts_sees_only_payments_at_accounts() {
        let payment = letter_at(Classification::Payment, Role::Accounts, LetterStatus::Pending);
        let approved_permission = letter_at(
            Classification::Permission,
            Role::ExecutiveApprover,
            LetterStatus::Approved,
        );
        assert!(is_visible(Role::Accounts, None, &payment));
        assert!(!is_visible(Role::Accounts, None, &approved_permission));
        assert!(is_visible(Role::ExecutiveApprover, None, &approved_permission));
    }

    #[test]
    fn default_order_is_newest_first() {
        let mut a = letter_at(Classification::Permission, Role::Dean, LetterStatus::Pending);
        a.id = "a".into();
        a.submitted_date = date(1);
        let mut b = a.clone();
        b.id = "b".into();
        b.submitted_date = date(5);

        let listed = visible_letters(Role::Dean, None, vec![a, b], SortMode::Date);
        let ids: Vec<&str> = listed.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn priority_order_breaks_ties_oldest_first() {
        let base = letter_at(Classification::Payment, Role::Dean, LetterStatus::Pending);
        let make = |id: &str, score: Option<u8>, day: u32| {
            let mut l = base.clone();
            l.id = id.into();
            l.priority_score = score;
            l.submitted_date = date(day);
            l
        };
        let letters = vec![
            make("low", Some(40), 1),
            make("unscored", None, 1),
            make("high-new", Some(90), 9),
            make("high-old", Some(90), 2),
        ];

        let listed = visible_letters(Role::Dean, None, letters, SortMode::Priority);
        let ids: Vec<&str> = listed.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["high-old", "high-new", "low", "unscored"]);
    }
}
