//! Letter lifecycle: pipelines, the role gate, the transition engine, and
//! the workflow service built on top of them.

pub mod amount;
pub mod analytics;
pub mod approvals;
pub mod engine;
pub mod estimator;
pub mod events;
pub mod gate;
pub mod model;
pub mod pipeline;
pub mod service;
pub mod sweep;
pub mod visibility;

#[cfg(test)]
pub(crate) mod test_support;

pub use analytics::AnalyticsReport;
pub use engine::StageEngine;
pub use estimator::{Estimator, EstimatorConfig, TurnaroundEstimate};
pub use events::{LetterEvent, LetterEventKind};
pub use model::{
    Action, ActRequest, Actor, ApprovalDecision, ApprovalRecord, Classification,
    ClassificationResult, EvidenceFiles, EvidencePurpose, IntakeLetter, Letter, LetterRevision,
    LetterState, LetterStatus, NewLetter, Role,
};
pub use pipeline::PipelineTable;
pub use service::{LetterWorkflow, SweepReport};
pub use sweep::spawn_sweep_task;
pub use visibility::SortMode;
