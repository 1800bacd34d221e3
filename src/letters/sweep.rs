//! Periodic routing and deadline sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::service::LetterWorkflow;

/// Run [`LetterWorkflow::sweep`] every `every`. Errors are logged and the
/// next tick tries again.
pub fn spawn_sweep_task(
    workflow: Arc<LetterWorkflow>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = workflow.sweep(Utc::now()).await {
                tracing::warn!(error = %e, kind = e.kind(), "Letter sweep failed");
            }
        }
    })
}
