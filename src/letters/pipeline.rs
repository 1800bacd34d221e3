//! Pipeline resolver: maps a classification to its ordered stage sequence.
//!
//! Pipelines live in a table so new categories or inserted roles only touch
//! configuration, never the transition engine.

use std::collections::HashMap;

use super::model::{Classification, Role};
use crate::error::ConfigError;

/// An unresolved letter stays with whoever submitted it.
static SUBMITTER_ONLY: [Role; 1] = [Role::Clerk];

/// Classification → ordered roles. The first entry is always the clerk.
#[derive(Debug, Clone)]
pub struct PipelineTable {
    pipelines: HashMap<Classification, Vec<Role>>,
}

impl Default for PipelineTable {
    fn default() -> Self {
        let mut pipelines = HashMap::new();
        pipelines.insert(
            Classification::Permission,
            vec![
                Role::Clerk,
                Role::Dean,
                Role::Registrar,
                Role::ExecutiveApprover,
            ],
        );
        pipelines.insert(
            Classification::Payment,
            vec![
                Role::Clerk,
                Role::Dean,
                Role::Registrar,
                Role::ExecutiveApprover,
                Role::Accounts,
            ],
        );
        Self { pipelines }
    }
}

impl PipelineTable {
    /// Replace the pipeline for one classification.
    ///
    /// The sequence must start with the clerk and contain no duplicates.
    /// Payment pipelines must end with accounts; permission pipelines must
    /// never contain it.
    pub fn with_pipeline(
        mut self,
        classification: Classification,
        roles: Vec<Role>,
    ) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key: format!("pipeline.{classification}"),
            message: message.to_string(),
        };

        if !classification.is_resolved() {
            return Err(invalid("unknown letters cannot have a pipeline"));
        }
        if roles.first() != Some(&Role::Clerk) {
            return Err(invalid("pipeline must start with the clerk"));
        }
        if roles.len() < 2 {
            return Err(invalid("pipeline needs at least one approving role"));
        }
        for (i, role) in roles.iter().enumerate() {
            if roles[..i].contains(role) {
                return Err(invalid("pipeline lists a role twice"));
            }
        }
        match classification {
            Classification::Payment if roles.last() != Some(&Role::Accounts) => {
                return Err(invalid("payment pipeline must end with accounts"));
            }
            Classification::Permission if roles.contains(&Role::Accounts) => {
                return Err(invalid("permission pipeline must not include accounts"));
            }
            _ => {}
        }

        self.pipelines.insert(classification, roles);
        Ok(self)
    }

    /// The ordered stages for a classification.
    pub fn resolve(&self, classification: Classification) -> &[Role] {
        self.pipelines
            .get(&classification)
            .map(Vec::as_slice)
            .unwrap_or(&SUBMITTER_ONLY)
    }

    pub fn contains(&self, classification: Classification, role: Role) -> bool {
        self.resolve(classification).contains(&role)
    }

    /// The first approving stage, i.e. the entry after the clerk.
    pub fn first_approver(&self, classification: Classification) -> Option<Role> {
        self.resolve(classification).get(1).copied()
    }

    /// The stage after `current`, or `None` when `current` is terminal or absent.
    pub fn next_stage(&self, classification: Classification, current: Role) -> Option<Role> {
        let pipeline = self.resolve(classification);
        let index = pipeline.iter().position(|r| *r == current)?;
        pipeline.get(index + 1).copied()
    }

    pub fn is_terminal(&self, classification: Classification, role: Role) -> bool {
        self.resolve(classification).last() == Some(&role)
    }
}
