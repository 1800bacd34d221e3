//! Turnaround estimator.
//!
//! A deterministic heuristic over `(classification, amount, department)`.
//! The department lists are configuration, not a fixed enumeration.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::model::Classification;

/// Knobs for the estimate, in business days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub base_days: i64,
    pub payment_days: i64,
    pub large_amount_threshold: Decimal,
    pub large_amount_days: i64,
    /// Departments that usually clear a day faster.
    pub fast_track: Vec<String>,
    /// Departments that usually take a day longer.
    pub slow_track: Vec<String>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            base_days: 4,
            payment_days: 3,
            large_amount_threshold: Decimal::from(50_000),
            large_amount_days: 2,
            fast_track: vec!["CSE".into(), "IT".into()],
            slow_track: vec!["Civil".into(), "ME".into()],
        }
    }
}

/// A central estimate with a one-day band either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnaroundEstimate {
    pub days: u32,
}

impl TurnaroundEstimate {
    pub fn low(&self) -> u32 {
        self.days.saturating_sub(1)
    }

    pub fn high(&self) -> u32 {
        self.days + 1
    }
}

impl fmt::Display for TurnaroundEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} business days", self.low(), self.high())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Estimator {
    config: EstimatorConfig,
}

impl Estimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn estimate(
        &self,
        classification: Classification,
        amount: Decimal,
        department: &str,
    ) -> TurnaroundEstimate {
        let cfg = &self.config;
        let mut days = cfg.base_days;
        if classification == Classification::Payment {
            days += cfg.payment_days;
        }
        if amount > cfg.large_amount_threshold {
            days += cfg.large_amount_days;
        }
        if in_list(&cfg.fast_track, department) {
            days -= 1;
        }
        if in_list(&cfg.slow_track, department) {
            days += 1;
        }
        TurnaroundEstimate {
            days: u32::try_from(days.max(1)).unwrap_or(1),
        }
    }
}

fn in_list(list: &[String], department: &str) -> bool {
    list.iter().any(|d| d.eq_ignore_ascii_case(department))
}
