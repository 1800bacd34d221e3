//! Aggregate counts over the persisted letters for dashboards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::{Classification, Letter, LetterStatus, Role};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub total: usize,
    pub by_classification: BTreeMap<Classification, usize>,
    pub by_status: BTreeMap<LetterStatus, usize>,
    pub by_stage: BTreeMap<Role, usize>,
    /// Submissions per `YYYY-MM`.
    pub monthly_trend: BTreeMap<String, usize>,
    /// Pending or overdue letters per stage.
    pub bottlenecks: BTreeMap<Role, usize>,
}

/// Summarise `letters`, restricted to `department` when given.
pub fn summarize<'a>(
    department: Option<&str>,
    letters: impl IntoIterator<Item = &'a Letter>,
) -> AnalyticsReport {
    let mut report = AnalyticsReport {
        department: department.map(str::to_string),
        ..AnalyticsReport::default()
    };

    for letter in letters {
        if department.is_some_and(|d| d != letter.department) {
            continue;
        }
        report.total += 1;
        *report
            .by_classification
            .entry(letter.classification)
            .or_default() += 1;
        *report.by_status.entry(letter.status).or_default() += 1;
        *report.by_stage.entry(letter.stage).or_default() += 1;
        *report
            .monthly_trend
            .entry(letter.submitted_date.format("%Y-%m").to_string())
            .or_default() += 1;
        if matches!(letter.status, LetterStatus::Pending | LetterStatus::Overdue) {
            *report.bottlenecks.entry(letter.stage).or_default() += 1;
        }
    }

    report
}
