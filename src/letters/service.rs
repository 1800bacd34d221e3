//! Letter workflow service: the operation surface.
//!
//! Reads a letter, asks the engine for the next revision, and commits it with
//! compare-and-set against the version that was read. Every committed
//! transition is logged and broadcast as a [`LetterEvent`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::analytics::{AnalyticsReport, summarize};
use super::engine::StageEngine;
use super::events::{LetterEvent, LetterEventKind};
use super::model::{
    Action, ActRequest, Actor, ClassificationResult, IntakeLetter, Letter, LetterRevision,
    LetterStatus, NewLetter,
};
use super::visibility::{SortMode, is_visible, visible_letters};
use crate::config::WorkflowConfig;
use crate::error::{DatabaseError, WorkflowError};
use crate::store::LetterStore;

/// Capacity of the event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

/// How many fresh ids to try when a generated one collides.
const ID_ATTEMPTS: usize = 3;

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub routed: usize,
    pub overdue: usize,
    pub conflicts: usize,
}

pub struct LetterWorkflow {
    store: Arc<dyn LetterStore>,
    engine: StageEngine,
    events: broadcast::Sender<LetterEvent>,
}

impl LetterWorkflow {
    pub fn new(store: Arc<dyn LetterStore>, config: WorkflowConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            engine: StageEngine::new(config),
            events,
        }
    }

    pub fn engine(&self) -> &StageEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn LetterStore> {
        &self.store
    }

    /// Subscribe to committed transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<LetterEvent> {
        self.events.subscribe()
    }

    // ── Creation ────────────────────────────────────────────────────

    /// A clerk submits a letter whose type is known.
    pub async fn create_letter(
        &self,
        actor: &Actor,
        input: NewLetter,
    ) -> Result<Letter, WorkflowError> {
        let now = Utc::now();
        self.insert_new(LetterEventKind::Created, actor, |id| {
            self.engine.create(actor, id, input.clone(), now)
        })
        .await
    }

    /// A clerk hands in a scanned letter for classification.
    pub async fn intake_for_classification(
        &self,
        actor: &Actor,
        input: IntakeLetter,
    ) -> Result<Letter, WorkflowError> {
        let now = Utc::now();
        self.insert_new(LetterEventKind::IntakeReceived, actor, |id| {
            self.engine.intake(actor, id, input.clone(), now)
        })
        .await
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Apply the classification collaborator's result.
    pub async fn apply_classification(
        &self,
        id: &str,
        result: ClassificationResult,
    ) -> Result<Letter, WorkflowError> {
        let current = self.load(id).await?;
        let next = self
            .engine
            .apply_classification(&current, result, Utc::now())?;
        self.commit(&current, next, LetterEventKind::Classified).await
    }

    /// The clerk confirms a classified draft. The letter is routed to its
    /// first approver straight away.
    pub async fn final_submit(
        &self,
        actor: &Actor,
        id: &str,
        revision: LetterRevision,
    ) -> Result<Letter, WorkflowError> {
        let current = self.load(id).await?;
        let next = self
            .engine
            .final_submit(actor, &current, revision, Utc::now())
            .inspect_err(|e| self.refused(actor, Action::FinalSubmit, id, e))?;
        let submitted = self
            .commit(&current, next, LetterEventKind::Submitted)
            .await?;

        let routed = self.engine.route_submitted(&submitted, Utc::now())?;
        match self.commit(&submitted, routed, LetterEventKind::Routed).await {
            // The sweep got there first.
            Err(WorkflowError::StaleState { .. }) => {
                let latest = self.load(id).await?;
                if latest.status == LetterStatus::Submitted {
                    return Err(WorkflowError::StaleState {
                        id: id.to_string(),
                        expected: format!("{} at version {}", submitted.state(), submitted.version),
                        found: format!("{} at version {}", latest.state(), latest.version),
                    });
                }
                debug!(letter_id = %id, state = %latest.state(), "Submitted letter already routed");
                Ok(latest)
            }
            other => other,
        }
    }

    /// Route a letter left in `Submitted`.
    pub async fn route_submitted(&self, id: &str) -> Result<Letter, WorkflowError> {
        let current = self.load(id).await?;
        let next = self.engine.route_submitted(&current, Utc::now())?;
        self.commit(&current, next, LetterEventKind::Routed).await
    }

    /// A stage role acts on a letter.
    pub async fn act(
        &self,
        actor: &Actor,
        id: &str,
        request: ActRequest,
    ) -> Result<Letter, WorkflowError> {
        let current = self.load(id).await?;
        let next = self
            .engine
            .act(actor, &current, &request, Utc::now())
            .inspect_err(|e| self.refused(actor, request.action, id, e))?;
        let kind = match request.action {
            Action::Forward | Action::ApproveFinal if next.status == LetterStatus::Approved => {
                LetterEventKind::Approved
            }
            Action::Reject => LetterEventKind::Rejected,
            Action::Validate => LetterEventKind::Validated,
            Action::Attach => LetterEventKind::EvidenceAttached,
            _ => LetterEventKind::Forwarded,
        };
        self.commit(&current, next, kind).await
    }

    /// A clerk sends a rejected letter round again.
    pub async fn resubmit(
        &self,
        actor: &Actor,
        id: &str,
        revision: LetterRevision,
    ) -> Result<Letter, WorkflowError> {
        let current = self.load(id).await?;
        let next = self
            .engine
            .resubmit(actor, &current, revision, Utc::now())
            .inspect_err(|e| self.refused(actor, Action::Resubmit, id, e))?;
        self.commit(&current, next, LetterEventKind::Resubmitted)
            .await
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// A single letter, if `actor` may see it.
    pub async fn get_letter_for(&self, actor: &Actor, id: &str) -> Result<Letter, WorkflowError> {
        let letter = self.load(id).await?;
        if !is_visible(actor.role, actor.department.as_deref(), &letter) {
            return Err(WorkflowError::Forbidden {
                role: actor.role,
                action: Action::View,
                reason: format!("letter {id} is not visible to this role"),
            });
        }
        Ok(letter)
    }

    /// The dashboard listing for `actor`.
    pub async fn list_for(&self, actor: &Actor, sort: SortMode) -> Result<Vec<Letter>, WorkflowError> {
        let role = actor.role;
        let department = actor.department.clone();
        let filter = move |l: &Letter| is_visible(role, department.as_deref(), l);
        let letters = self.store.query_letters(&filter).await?;
        Ok(visible_letters(
            role,
            actor.department.as_deref(),
            letters,
            sort,
        ))
    }

    pub async fn analytics_for(
        &self,
        department: Option<&str>,
    ) -> Result<AnalyticsReport, WorkflowError> {
        let letters = self.store.list_letters().await?;
        Ok(summarize(department, &letters))
    }

    // ── Background sweep ────────────────────────────────────────────

    /// Route stragglers left in `Submitted` and flag pending letters past
    /// their deadline. Conflicts are skipped; the next pass sees fresh state.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, WorkflowError> {
        let candidates = self
            .store
            .query_letters(&|l: &Letter| {
                matches!(l.status, LetterStatus::Submitted | LetterStatus::Pending)
            })
            .await?;

        let mut report = SweepReport::default();
        for letter in candidates {
            let (next, kind) = match letter.status {
                LetterStatus::Submitted => match self.engine.route_submitted(&letter, now) {
                    Ok(next) => (next, LetterEventKind::Routed),
                    Err(e) => {
                        warn!(letter_id = %letter.id, error = %e, "Cannot route submitted letter");
                        continue;
                    }
                },
                _ => match self.engine.mark_overdue(&letter, now) {
                    Some(next) => (next, LetterEventKind::Overdue),
                    None => continue,
                },
            };
            match self.commit(&letter, next, kind).await {
                Ok(_) if kind == LetterEventKind::Routed => report.routed += 1,
                Ok(_) => report.overdue += 1,
                Err(WorkflowError::StaleState { .. }) => report.conflicts += 1,
                Err(e) => return Err(e),
            }
        }

        if report != SweepReport::default() {
            info!(
                routed = report.routed,
                overdue = report.overdue,
                conflicts = report.conflicts,
                "Sweep finished"
            );
        }
        Ok(report)
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn load(&self, id: &str) -> Result<Letter, WorkflowError> {
        self.store
            .get_letter(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound { id: id.to_string() })
    }

    /// Build a letter under a fresh id and insert it, retrying on the rare id
    /// collision.
    async fn insert_new(
        &self,
        kind: LetterEventKind,
        actor: &Actor,
        build: impl Fn(String) -> Result<Letter, WorkflowError>,
    ) -> Result<Letter, WorkflowError> {
        let department = actor.department.as_deref().unwrap_or_default();
        let mut last_err = None;
        for _ in 0..ID_ATTEMPTS {
            let letter = build(new_letter_id(department))?;
            match self.store.insert_letter(&letter).await {
                Ok(()) => {
                    info!(
                        letter_id = %letter.id,
                        department = %letter.department,
                        stage = %letter.stage,
                        status = %letter.status,
                        "Letter created"
                    );
                    self.publish(kind, &letter);
                    return Ok(letter);
                }
                Err(DatabaseError::Constraint(msg)) => {
                    debug!(error = %msg, "Letter id collision, retrying");
                    last_err = Some(DatabaseError::Constraint(msg));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(last_err
            .unwrap_or_else(|| DatabaseError::Constraint("no letter id available".into()))
            .into())
    }

    /// Compare-and-set `next` over `current`.
    async fn commit(
        &self,
        current: &Letter,
        next: Letter,
        kind: LetterEventKind,
    ) -> Result<Letter, WorkflowError> {
        if !self.store.update_letter(&next, current.version).await? {
            let found = match self.store.get_letter(&current.id).await? {
                Some(latest) => format!("{} at version {}", latest.state(), latest.version),
                None => "no letter".to_string(),
            };
            warn!(
                letter_id = %current.id,
                expected_version = current.version,
                found = %found,
                "Stale write rejected"
            );
            return Err(WorkflowError::StaleState {
                id: current.id.clone(),
                expected: format!("{} at version {}", current.state(), current.version),
                found,
            });
        }

        info!(
            letter_id = %next.id,
            event = ?kind,
            from = %current.state(),
            to = %next.state(),
            version = next.version,
            "Letter transition committed"
        );
        self.publish(kind, &next);
        Ok(next)
    }

    fn publish(&self, kind: LetterEventKind, letter: &Letter) {
        // No subscribers is fine.
        let _ = self.events.send(LetterEvent::from_letter(kind, letter));
    }

    fn refused(&self, actor: &Actor, action: Action, id: &str, err: &WorkflowError) {
        warn!(
            letter_id = %id,
            role = %actor.role,
            action = %action,
            kind = err.kind(),
            "Action refused"
        );
    }
}

/// `{DEPT}-{8 hex chars}`.
fn new_letter_id(department: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let prefix: String = department
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_uppercase();
    let prefix = if prefix.is_empty() { "LTR".to_string() } else { prefix };
    format!("{prefix}-{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::letters::model::{Classification, EvidencePurpose, LetterState, Role};
    use crate::store::{LetterFilter, LibSqlBackend, User};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    async fn workflow() -> LetterWorkflow {
        let store = LibSqlBackend::new_memory().await.unwrap();
        LetterWorkflow::new(Arc::new(store), WorkflowConfig::default())
    }

    fn payment(amount: rust_decimal::Decimal) -> NewLetter {
        NewLetter {
            subject: "Lab equipment".into(),
            classification: Classification::Payment,
            amount,
            submitted_date: None,
            file_ref: Some("uploads/orig.pdf".into()),
        }
    }

    fn state(stage: Role, status: LetterStatus) -> LetterState {
        LetterState { stage, status }
    }

    #[tokio::test]
    async fn payment_scenario_end_to_end() {
        let wf = workflow().await;
        let clerk = Actor::clerk("CSE");
        let letter = wf.create_letter(&clerk, payment(dec!(75000))).await.unwrap();
        assert!(letter.id.starts_with("CSE-"));
        assert_eq!(letter.state(), state(Role::Dean, LetterStatus::Pending));

        let letter = wf
            .act(&Actor::new(Role::Dean), &letter.id, ActRequest::new(Action::Forward))
            .await
            .unwrap();
        assert_eq!(letter.state(), state(Role::Registrar, LetterStatus::Pending));

        let letter = wf
            .act(&Actor::new(Role::Registrar), &letter.id, ActRequest::new(Action::Reject))
            .await
            .unwrap();
        assert_eq!(letter.state(), state(Role::Registrar, LetterStatus::Rejected));

        let letter = wf
            .resubmit(&clerk, &letter.id, LetterRevision::default())
            .await
            .unwrap();
        assert_eq!(letter.state(), state(Role::Dean, LetterStatus::Pending));

        let stored = wf.get_letter_for(&clerk, &letter.id).await.unwrap();
        assert_eq!(stored.version, 4);
        assert!(stored.approval_records.is_empty());
    }

    #[tokio::test]
    async fn permission_never_reaches_accounts() {
        let wf = workflow().await;
        let mut input = payment(dec!(0));
        input.classification = Classification::Permission;
        let mut letter = wf.create_letter(&Actor::clerk("IT"), input).await.unwrap();
        for role in [Role::Dean, Role::Registrar, Role::ExecutiveApprover] {
            letter = wf
                .act(&Actor::new(role), &letter.id, ActRequest::new(Action::Forward))
                .await
                .unwrap();
        }
        assert_eq!(letter.state(), state(Role::ExecutiveApprover, LetterStatus::Approved));

        let accounts = wf
            .list_for(&Actor::new(Role::Accounts), SortMode::Date)
            .await
            .unwrap();
        assert!(accounts.is_empty());
        let err = wf
            .get_letter_for(&Actor::new(Role::Accounts), &letter.id)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn concurrent_forwards_exactly_one_wins() {
        let wf = Arc::new(workflow().await);
        let letter = wf
            .create_letter(&Actor::clerk("CSE"), payment(dec!(100)))
            .await
            .unwrap();

        // Both callers read the same state before either commits.
        let read = wf.load(&letter.id).await.unwrap();
        let dean = Actor::new(Role::Dean);
        let first = wf
            .engine
            .act(&dean, &read, &ActRequest::new(Action::Forward), Utc::now())
            .unwrap();
        let second = wf
            .engine
            .act(&dean, &read, &ActRequest::new(Action::Forward), Utc::now())
            .unwrap();

        let a = wf.commit(&read, first, LetterEventKind::Forwarded).await;
        let b = wf.commit(&read, second, LetterEventKind::Forwarded).await;
        assert!(a.is_ok());
        assert!(matches!(b, Err(WorkflowError::StaleState { .. })));

        let stored = wf.load(&letter.id).await.unwrap();
        assert_eq!(stored.state(), state(Role::Registrar, LetterStatus::Pending));
        assert_eq!(stored.version, read.version + 1);
    }

    #[tokio::test]
    async fn second_stale_forward_is_a_conflict() {
        let wf = workflow().await;
        let letter = wf
            .create_letter(&Actor::clerk("CSE"), payment(dec!(100)))
            .await
            .unwrap();
        let dean = Actor::new(Role::Dean);
        let seen = state(Role::Dean, LetterStatus::Pending);

        wf.act(&dean, &letter.id, ActRequest::new(Action::Forward).expecting(seen))
            .await
            .unwrap();
        let err = wf
            .act(&dean, &letter.id, ActRequest::new(Action::Forward).expecting(seen))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "stale_state");
    }

    #[tokio::test]
    async fn racing_tasks_never_both_commit() {
        let wf = Arc::new(workflow().await);
        let letter = wf
            .create_letter(&Actor::clerk("CSE"), payment(dec!(100)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let wf = Arc::clone(&wf);
            let id = letter.id.clone();
            handles.push(tokio::spawn(async move {
                let seen = state(Role::Dean, LetterStatus::Pending);
                wf.act(
                    &Actor::new(Role::Dean),
                    &id,
                    ActRequest::new(Action::Forward).expecting(seen),
                )
                .await
            }));
        }
        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(WorkflowError::StaleState { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
        let stored = wf.load(&letter.id).await.unwrap();
        assert_eq!(stored.stage, Role::Registrar);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn intake_classify_submit_routes_to_dean() {
        let wf = workflow().await;
        let clerk = Actor::clerk("ECE");
        let mut events = wf.subscribe();

        let letter = wf
            .intake_for_classification(
                &clerk,
                IntakeLetter {
                    file_ref: Some("uploads/scan.png".into()),
                    subject: None,
                    submitted_date: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(letter.state(), state(Role::Clerk, LetterStatus::AwaitingClassification));

        // Approvers don't see unclassified intake.
        let dean_view = wf.list_for(&Actor::new(Role::Dean), SortMode::Date).await.unwrap();
        assert!(dean_view.is_empty());

        wf.apply_classification(
            &letter.id,
            ClassificationResult {
                classification: Classification::Permission,
                subject: Some("Seminar hall booking".into()),
                amount: None,
                priority_score: Some(80),
                estimated_turnaround: Some("2-4 business days".into()),
            },
        )
        .await
        .unwrap();

        let routed = wf
            .final_submit(&clerk, &letter.id, LetterRevision::default())
            .await
            .unwrap();
        assert_eq!(routed.state(), state(Role::Dean, LetterStatus::Pending));
        assert_eq!(routed.remarks, "Pending approval at dean");

        let kinds: Vec<LetterEventKind> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            [
                LetterEventKind::IntakeReceived,
                LetterEventKind::Classified,
                LetterEventKind::Submitted,
                LetterEventKind::Routed,
            ]
        );
    }

    #[tokio::test]
    async fn missing_letter_is_not_found() {
        let wf = workflow().await;
        let err = wf
            .act(&Actor::new(Role::Dean), "CSE-nope", ActRequest::new(Action::Forward))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[tokio::test]
    async fn evidence_from_every_stage_accumulates() {
        let wf = workflow().await;
        let letter = wf
            .create_letter(&Actor::clerk("CSE"), payment(dec!(60000)))
            .await
            .unwrap();
        let mut id = letter.id.clone();
        for role in [Role::Dean, Role::Registrar, Role::ExecutiveApprover] {
            let request = ActRequest::new(Action::Forward)
                .with_evidence(EvidencePurpose::Signed, format!("uploads/{role}.pdf"));
            id = wf.act(&Actor::new(role), &id, request).await.unwrap().id;
        }
        let letter = wf
            .act(
                &Actor::new(Role::Accounts),
                &id,
                ActRequest::new(Action::ApproveFinal)
                    .with_evidence(EvidencePurpose::Cheque, "uploads/cheque.png"),
            )
            .await
            .unwrap();
        assert_eq!(letter.status, LetterStatus::Approved);
        assert_eq!(letter.evidence_files.all(EvidencePurpose::Signed).len(), 3);
        assert_eq!(letter.approval_records.len(), 4);
    }

    #[tokio::test]
    async fn sweep_marks_overdue_and_routes_stragglers() {
        let wf = workflow().await;
        let letter = wf
            .create_letter(&Actor::clerk("CSE"), payment(dec!(10)))
            .await
            .unwrap();

        let early = wf.sweep(Utc::now()).await.unwrap();
        assert_eq!(early, SweepReport::default());

        let later = Utc::now() + chrono::Duration::days(3);
        let report = wf.sweep(later).await.unwrap();
        assert_eq!(report.overdue, 1);
        let stored = wf.load(&letter.id).await.unwrap();
        assert_eq!(stored.status, LetterStatus::Overdue);
        assert_eq!(stored.remarks, "Deadline breached at dean!");

        // Overdue letters can still be acted on.
        let forwarded = wf
            .act(&Actor::new(Role::Dean), &letter.id, ActRequest::new(Action::Forward))
            .await
            .unwrap();
        assert_eq!(forwarded.state(), state(Role::Registrar, LetterStatus::Pending));

        // A straggler stuck in Submitted gets routed.
        let mut straggler = forwarded.next_revision(Utc::now());
        straggler.id = "CSE-straggler".into();
        straggler.stage = Role::Clerk;
        straggler.status = LetterStatus::Submitted;
        straggler.version = 1;
        wf.store.insert_letter(&straggler).await.unwrap();
        let report = wf.sweep(Utc::now()).await.unwrap();
        assert_eq!(report.routed, 1);
        let routed = wf.load("CSE-straggler").await.unwrap();
        assert_eq!(routed.state(), state(Role::Dean, LetterStatus::Pending));
    }

    #[tokio::test]
    async fn analytics_scoped_by_department() {
        let wf = workflow().await;
        wf.create_letter(&Actor::clerk("CSE"), payment(dec!(1))).await.unwrap();
        wf.create_letter(&Actor::clerk("CSE"), payment(dec!(2))).await.unwrap();
        wf.create_letter(&Actor::clerk("IT"), payment(dec!(3))).await.unwrap();

        assert_eq!(wf.analytics_for(None).await.unwrap().total, 3);
        let cse = wf.analytics_for(Some("CSE")).await.unwrap();
        assert_eq!(cse.total, 2);
        assert_eq!(cse.bottlenecks[&Role::Dean], 2);
    }

    #[test]
    fn letter_ids_carry_department_prefix() {
        let id = new_letter_id("cse");
        assert!(id.starts_with("CSE-"));
        assert_eq!(id.len(), "CSE-".len() + 8);
        assert!(new_letter_id("").starts_with("LTR-"));
    }

    /// A store whose every call fails, for dependency-failure paths.
    struct BrokenStore;

    #[async_trait]
    impl LetterStore for BrokenStore {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn insert_letter(&self, _: &Letter) -> Result<(), DatabaseError> {
            Err(DatabaseError::Pool("offline".into()))
        }
        async fn get_letter(&self, _: &str) -> Result<Option<Letter>, DatabaseError> {
            Err(DatabaseError::Pool("offline".into()))
        }
        async fn update_letter(&self, _: &Letter, _: u64) -> Result<bool, DatabaseError> {
            Err(DatabaseError::Pool("offline".into()))
        }
        async fn list_letters(&self) -> Result<Vec<Letter>, DatabaseError> {
            Err(DatabaseError::Pool("offline".into()))
        }
        async fn query_letters(&self, _: LetterFilter<'_>) -> Result<Vec<Letter>, DatabaseError> {
            Err(DatabaseError::Pool("offline".into()))
        }
        async fn insert_user(&self, _: &User) -> Result<(), DatabaseError> {
            Err(DatabaseError::Pool("offline".into()))
        }
        async fn get_user_by_email(&self, _: &str) -> Result<Option<User>, DatabaseError> {
            Err(DatabaseError::Pool("offline".into()))
        }
        async fn find_users(&self, _: Role, _: Option<&str>) -> Result<Vec<User>, DatabaseError> {
            Err(DatabaseError::Pool("offline".into()))
        }
    }

    /// Routes a letter the moment it is committed as `Submitted`, the way a
    /// sweep pass landing between the two commits of a final submit would.
    struct SweepsFirst {
        inner: LibSqlBackend,
        engine: StageEngine,
    }

    #[async_trait]
    impl LetterStore for SweepsFirst {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            self.inner.run_migrations().await
        }
        async fn insert_letter(&self, letter: &Letter) -> Result<(), DatabaseError> {
            self.inner.insert_letter(letter).await
        }
        async fn get_letter(&self, id: &str) -> Result<Option<Letter>, DatabaseError> {
            self.inner.get_letter(id).await
        }
        async fn update_letter(&self, letter: &Letter, expected: u64) -> Result<bool, DatabaseError> {
            let changed = self.inner.update_letter(letter, expected).await?;
            if changed && letter.status == LetterStatus::Submitted {
                let routed = self
                    .engine
                    .route_submitted(letter, Utc::now())
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
                self.inner.update_letter(&routed, letter.version).await?;
            }
            Ok(changed)
        }
        async fn list_letters(&self) -> Result<Vec<Letter>, DatabaseError> {
            self.inner.list_letters().await
        }
        async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
            self.inner.insert_user(user).await
        }
        async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
            self.inner.get_user_by_email(email).await
        }
        async fn find_users(&self, role: Role, dept: Option<&str>) -> Result<Vec<User>, DatabaseError> {
            self.inner.find_users(role, dept).await
        }
    }

    #[tokio::test]
    async fn final_submit_accepts_a_sweep_that_routed_first() {
        let store = SweepsFirst {
            inner: LibSqlBackend::new_memory().await.unwrap(),
            engine: StageEngine::new(WorkflowConfig::default()),
        };
        let wf = LetterWorkflow::new(Arc::new(store), WorkflowConfig::default());
        let clerk = Actor::clerk("CSE");
        let letter = wf
            .intake_for_classification(
                &clerk,
                IntakeLetter {
                    file_ref: Some("uploads/scan.png".into()),
                    subject: Some("Guest lecture honorarium".into()),
                    submitted_date: None,
                },
            )
            .await
            .unwrap();
        wf.apply_classification(
            &letter.id,
            ClassificationResult {
                classification: Classification::Payment,
                subject: None,
                amount: Some(dec!(5000)),
                priority_score: None,
                estimated_turnaround: None,
            },
        )
        .await
        .unwrap();

        let submitted = wf
            .final_submit(&clerk, &letter.id, LetterRevision::default())
            .await
            .unwrap();
        assert_eq!(submitted.state(), state(Role::Dean, LetterStatus::Pending));
        assert_eq!(submitted.remarks, "Pending approval at dean");
    }

    #[tokio::test]
    async fn store_failures_surface_as_dependency_failures() {
        let wf = LetterWorkflow::new(Arc::new(BrokenStore), WorkflowConfig::default());
        let err = wf
            .create_letter(&Actor::clerk("CSE"), payment(dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "dependency_failure");

        let err = wf
            .list_for(&Actor::new(Role::Dean), SortMode::Priority)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "dependency_failure");
    }
}
