//! Configuration types.
//!
//! Everything is read from `LETTERFLOW_*` environment variables; unset
//! variables fall back to the defaults below, malformed ones are errors.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::ConfigError;
use crate::letters::estimator::EstimatorConfig;
use crate::letters::model::{Classification, Role};
use crate::letters::pipeline::PipelineTable;

/// Server process configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub port: u16,
    /// How often the routing/overdue sweep runs.
    pub sweep_interval: Duration,
    /// Optional log file directory; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/letterflow.db"),
            port: 3000,
            sweep_interval: Duration::from_secs(60),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            db_path: lookup("LETTERFLOW_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            port: parse_var(&lookup, "LETTERFLOW_PORT")?.unwrap_or(defaults.port),
            sweep_interval: parse_var::<u64>(&lookup, "LETTERFLOW_SWEEP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            log_dir: lookup("LETTERFLOW_LOG_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Workflow rules: pipelines, deadlines and the turnaround heuristic.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub pipelines: PipelineTable,
    /// How long a stage has before the letter is flagged overdue.
    pub approval_window: chrono::Duration,
    pub estimator: EstimatorConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            pipelines: PipelineTable::default(),
            approval_window: chrono::Duration::hours(48),
            estimator: EstimatorConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut pipelines = defaults.pipelines;
        for (key, classification) in [
            ("LETTERFLOW_PERMISSION_PIPELINE", Classification::Permission),
            ("LETTERFLOW_PAYMENT_PIPELINE", Classification::Payment),
        ] {
            if let Some(raw) = lookup(key) {
                let roles = split_list(&raw)
                    .iter()
                    .map(|r| Role::from_str(r))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|message| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message,
                    })?;
                pipelines = pipelines.with_pipeline(classification, roles)?;
            }
        }

        let approval_window = match parse_var::<i64>(&lookup, "LETTERFLOW_APPROVAL_WINDOW_HOURS")? {
            Some(hours) if hours > 0 => chrono::Duration::hours(hours),
            Some(hours) => {
                return Err(ConfigError::InvalidValue {
                    key: "LETTERFLOW_APPROVAL_WINDOW_HOURS".into(),
                    message: format!("must be positive, got {hours}"),
                });
            }
            None => defaults.approval_window,
        };

        let base = defaults.estimator;
        let estimator = EstimatorConfig {
            base_days: parse_var(&lookup, "LETTERFLOW_BASE_DAYS")?.unwrap_or(base.base_days),
            payment_days: parse_var(&lookup, "LETTERFLOW_PAYMENT_DAYS")?
                .unwrap_or(base.payment_days),
            large_amount_threshold: parse_var::<Decimal>(&lookup, "LETTERFLOW_LARGE_AMOUNT")?
                .unwrap_or(base.large_amount_threshold),
            large_amount_days: parse_var(&lookup, "LETTERFLOW_LARGE_AMOUNT_DAYS")?
                .unwrap_or(base.large_amount_days),
            fast_track: lookup("LETTERFLOW_FAST_TRACK")
                .map(|s| split_list(&s))
                .unwrap_or(base.fast_track),
            slow_track: lookup("LETTERFLOW_SLOW_TRACK")
                .map(|s| split_list(&s))
                .unwrap_or(base.slow_track),
        };

        Ok(Self {
            pipelines,
            approval_window,
            estimator,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
