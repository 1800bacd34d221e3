//! Stage transition engine: the letter state machine.
//!
//! Every method is pure: it takes the letter as read, the acting role and
//! the request, and returns the next revision or the reason it is refused.
//! Committing the revision (with compare-and-set) is the caller's job.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use super::approvals::{clear_for_roles, record_approval};
use super::estimator::Estimator;
use super::gate::authorize;
use super::model::{
    Action, ActRequest, Actor, ApprovalDecision, Classification, ClassificationResult,
    EvidenceFiles, EvidencePurpose, IntakeLetter, Letter, LetterRevision, LetterStatus, NewLetter,
    Role,
};
use super::pipeline::PipelineTable;
use crate::config::WorkflowConfig;
use crate::error::WorkflowError;

#[derive(Debug, Clone)]
pub struct StageEngine {
    pipelines: PipelineTable,
    estimator: Estimator,
    approval_window: Duration,
}

impl StageEngine {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            pipelines: config.pipelines,
            estimator: Estimator::new(config.estimator),
            approval_window: config.approval_window,
        }
    }

    pub fn pipelines(&self) -> &PipelineTable {
        &self.pipelines
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// A clerk submits a letter whose type is already known. It goes
    /// straight to the first approving stage.
    pub fn create(
        &self,
        actor: &Actor,
        id: String,
        input: NewLetter,
        now: DateTime<Utc>,
    ) -> Result<Letter, WorkflowError> {
        authorize(&self.pipelines, actor, Action::Create, None)?;
        let department = clerk_department(actor)?;
        if input.subject.trim().is_empty() {
            return Err(WorkflowError::InvalidInput("subject is required".into()));
        }
        if !input.classification.is_resolved() {
            return Err(WorkflowError::UnresolvedClassification { id });
        }
        let stage = self.first_approver(&id, input.classification)?;
        let amount = normalize_amount(input.classification, input.amount);
        let estimate = self
            .estimator
            .estimate(input.classification, amount, &department);

        let mut evidence_files = EvidenceFiles::default();
        if let Some(file_ref) = input.file_ref {
            evidence_files.attach(EvidencePurpose::Original, file_ref);
        }

        Ok(Letter {
            id,
            subject: input.subject.trim().to_string(),
            department,
            classification: input.classification,
            amount,
            submitted_date: input.submitted_date.unwrap_or_else(|| now.date_naive()),
            status: LetterStatus::Pending,
            stage,
            remarks: "Forwarded by Clerk".into(),
            priority_score: None,
            estimated_turnaround: Some(estimate.to_string()),
            approval_deadline: Some(now + self.approval_window),
            evidence_files,
            approval_records: Default::default(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// A clerk hands in a scanned letter for the classifier to read.
    pub fn intake(
        &self,
        actor: &Actor,
        id: String,
        input: IntakeLetter,
        now: DateTime<Utc>,
    ) -> Result<Letter, WorkflowError> {
        authorize(&self.pipelines, actor, Action::ClassifyIntake, None)?;
        let department = clerk_department(actor)?;
        let Some(file_ref) = input.file_ref.filter(|f| !f.trim().is_empty()) else {
            return Err(WorkflowError::InvalidInput(
                "intake requires an attached file".into(),
            ));
        };

        let mut evidence_files = EvidenceFiles::default();
        evidence_files.attach(EvidencePurpose::Original, file_ref);

        Ok(Letter {
            id,
            subject: input.subject.unwrap_or_default().trim().to_string(),
            department,
            classification: Classification::Unknown,
            amount: Decimal::ZERO,
            submitted_date: input.submitted_date.unwrap_or_else(|| now.date_naive()),
            status: LetterStatus::AwaitingClassification,
            stage: Role::Clerk,
            remarks: "Awaiting classification".into(),
            priority_score: None,
            estimated_turnaround: None,
            approval_deadline: None,
            evidence_files,
            approval_records: Default::default(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply the classifier's draft. Refused once the letter has left
    /// `AwaitingClassification`.
    pub fn apply_classification(
        &self,
        letter: &Letter,
        result: ClassificationResult,
        now: DateTime<Utc>,
    ) -> Result<Letter, WorkflowError> {
        if letter.status != LetterStatus::AwaitingClassification {
            return Err(WorkflowError::InvalidTransition {
                id: letter.id.clone(),
                status: letter.status,
                action: Action::Classify,
            });
        }
        if !result.classification.is_resolved() {
            return Err(WorkflowError::InvalidInput(
                "classifier returned no classification".into(),
            ));
        }

        let mut next = letter.next_revision(now);
        next.classification = result.classification;
        if let Some(subject) = result.subject.filter(|s| !s.trim().is_empty()) {
            next.subject = subject.trim().to_string();
        }
        next.amount = normalize_amount(
            result.classification,
            result.amount.unwrap_or(letter.amount),
        );
        next.priority_score = result.priority_score.map(|s| s.min(100));
        next.estimated_turnaround = Some(result.estimated_turnaround.unwrap_or_else(|| {
            self.estimator
                .estimate(next.classification, next.amount, &next.department)
                .to_string()
        }));
        next.remarks = format!(
            "Classified as {}. Needs Clerk review.",
            result.classification
        );
        Ok(next)
    }

    /// The clerk confirms the (possibly corrected) draft.
    pub fn final_submit(
        &self,
        actor: &Actor,
        letter: &Letter,
        revision: LetterRevision,
        now: DateTime<Utc>,
    ) -> Result<Letter, WorkflowError> {
        authorize(&self.pipelines, actor, Action::FinalSubmit, Some(letter))?;
        if letter.status != LetterStatus::AwaitingClassification {
            return Err(WorkflowError::InvalidTransition {
                id: letter.id.clone(),
                status: letter.status,
                action: Action::FinalSubmit,
            });
        }

        let mut next = letter.next_revision(now);
        apply_revision(&mut next, revision);
        if !next.classification.is_resolved() {
            return Err(WorkflowError::UnresolvedClassification { id: letter.id.clone() });
        }
        if next.subject.is_empty() {
            return Err(WorkflowError::InvalidInput("subject is required".into()));
        }
        next.amount = normalize_amount(next.classification, next.amount);
        if next.estimated_turnaround.is_none() {
            next.estimated_turnaround = Some(
                self.estimator
                    .estimate(next.classification, next.amount, &next.department)
                    .to_string(),
            );
        }
        next.status = LetterStatus::Submitted;
        next.remarks = "Submitted by Clerk".into();
        Ok(next)
    }

    /// Move a submitted letter to its first approving stage.
    pub fn route_submitted(&self, letter: &Letter, now: DateTime<Utc>) -> Result<Letter, WorkflowError> {
        if letter.status != LetterStatus::Submitted {
            return Err(WorkflowError::InvalidTransition {
                id: letter.id.clone(),
                status: letter.status,
                action: Action::Route,
            });
        }
        let stage = self.first_approver(&letter.id, letter.classification)?;

        let mut next = letter.next_revision(now);
        next.stage = stage;
        next.status = LetterStatus::Pending;
        next.remarks = format!("Pending approval at {stage}");
        next.approval_deadline = Some(now + self.approval_window);
        Ok(next)
    }

    /// A stage role forwards, rejects, validates, approves, or attaches
    /// evidence.
    pub fn act(
        &self,
        actor: &Actor,
        letter: &Letter,
        request: &ActRequest,
        now: DateTime<Utc>,
    ) -> Result<Letter, WorkflowError> {
        let action = request.action;
        if !action.is_stage_action() {
            return Err(WorkflowError::InvalidInput(format!(
                "{action} is not a stage action"
            )));
        }
        // Before the gate, so a stale reader sees a conflict and not a role refusal.
        if let Some(expected) = request.expected {
            if expected != letter.state() {
                return Err(WorkflowError::StaleState {
                    id: letter.id.clone(),
                    expected: expected.to_string(),
                    found: letter.state().to_string(),
                });
            }
        }
        authorize(&self.pipelines, actor, action, Some(letter))?;

        if !letter.status.is_actionable() {
            return Err(WorkflowError::InvalidTransition {
                id: letter.id.clone(),
                status: letter.status,
                action,
            });
        }

        let role = actor.role;
        let terminal = self.pipelines.is_terminal(letter.classification, role);
        let mut next = letter.next_revision(now);

        let (decision, default_remarks) = match action {
            Action::Forward | Action::ApproveFinal if terminal => {
                next.status = LetterStatus::Approved;
                next.approval_deadline = None;
                (ApprovalDecision::Approved, "Final approval reached.".to_string())
            }
            Action::Forward => {
                let Some(stage) = self.pipelines.next_stage(letter.classification, role) else {
                    return Err(WorkflowError::InvalidTransition {
                        id: letter.id.clone(),
                        status: letter.status,
                        action,
                    });
                };
                next.stage = stage;
                next.status = LetterStatus::Pending;
                next.approval_deadline = Some(now + self.approval_window);
                (
                    ApprovalDecision::Forwarded,
                    format!("Forwarded by {role}. Pending at {stage}"),
                )
            }
            Action::Reject => {
                next.status = LetterStatus::Rejected;
                next.approval_deadline = None;
                (ApprovalDecision::Rejected, format!("Rejected by {role}"))
            }
            Action::Validate => {
                if letter.status == LetterStatus::Validated {
                    return Err(WorkflowError::InvalidTransition {
                        id: letter.id.clone(),
                        status: letter.status,
                        action,
                    });
                }
                next.status = LetterStatus::Validated;
                (ApprovalDecision::Validated, format!("Validated by {role}"))
            }
            Action::Attach => {
                if request.evidence.is_empty() && request.remarks.is_none() {
                    return Err(WorkflowError::InvalidInput(
                        "attach needs a file or remarks".into(),
                    ));
                }
                if letter.status != LetterStatus::Validated {
                    next.status = LetterStatus::ActionTaken;
                }
                (ApprovalDecision::Noted, format!("Processed by {role}"))
            }
            // ApproveFinal away from the terminal stage.
            _ => {
                return Err(WorkflowError::InvalidTransition {
                    id: letter.id.clone(),
                    status: letter.status,
                    action,
                });
            }
        };

        for (purpose, reference) in &request.evidence {
            next.evidence_files.attach(*purpose, reference.clone());
        }

        let remarks = request
            .remarks
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or(default_remarks);
        record_approval(
            &mut next,
            role,
            remarks.clone(),
            decision_file(request),
            decision,
            now,
        );
        next.remarks = remarks;
        Ok(next)
    }

    /// A clerk sends a rejected letter round again from the first approving
    /// stage.
    pub fn resubmit(
        &self,
        actor: &Actor,
        letter: &Letter,
        revision: LetterRevision,
        now: DateTime<Utc>,
    ) -> Result<Letter, WorkflowError> {
        authorize(&self.pipelines, actor, Action::Resubmit, Some(letter))?;

        let mut next = letter.next_revision(now);
        apply_revision(&mut next, revision);
        if !next.classification.is_resolved() {
            return Err(WorkflowError::UnresolvedClassification { id: letter.id.clone() });
        }
        next.amount = normalize_amount(next.classification, next.amount);
        next.stage = self.first_approver(&letter.id, next.classification)?;
        next.status = LetterStatus::Pending;
        next.remarks = format!(
            "Resubmitted by Clerk on {}",
            now.format("%Y-%m-%d %H:%M UTC")
        );
        next.approval_deadline = Some(now + self.approval_window);
        next.estimated_turnaround = Some(
            self.estimator
                .estimate(next.classification, next.amount, &next.department)
                .to_string(),
        );

        let acting_again: Vec<Role> = self
            .pipelines
            .resolve(next.classification)
            .iter()
            .copied()
            .filter(|r| *r != Role::Clerk)
            .collect();
        clear_for_roles(&mut next, &acting_again);
        Ok(next)
    }

    /// Flag a pending letter whose deadline has passed. `None` if nothing
    /// changes.
    pub fn mark_overdue(&self, letter: &Letter, now: DateTime<Utc>) -> Option<Letter> {
        let deadline = letter.approval_deadline?;
        if letter.status != LetterStatus::Pending || deadline >= now {
            return None;
        }
        let mut next = letter.next_revision(now);
        next.status = LetterStatus::Overdue;
        next.remarks = format!("Deadline breached at {}!", letter.stage);
        Some(next)
    }

    fn first_approver(&self, id: &str, classification: Classification) -> Result<Role, WorkflowError> {
        self.pipelines
            .first_approver(classification)
            .ok_or_else(|| WorkflowError::UnresolvedClassification { id: id.to_string() })
    }
}

fn clerk_department(actor: &Actor) -> Result<String, WorkflowError> {
    actor
        .department
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .ok_or_else(|| WorkflowError::InvalidInput("clerk identity carries no department".into()))
}

fn normalize_amount(classification: Classification, amount: Decimal) -> Decimal {
    if classification == Classification::Payment && amount.is_sign_positive() {
        amount
    } else {
        Decimal::ZERO
    }
}

fn apply_revision(letter: &mut Letter, revision: LetterRevision) {
    if let Some(subject) = revision.subject.filter(|s| !s.trim().is_empty()) {
        letter.subject = subject.trim().to_string();
    }
    if let Some(classification) = revision.classification {
        letter.classification = classification;
    }
    if let Some(amount) = revision.amount {
        letter.amount = amount;
    }
    if let Some(file_ref) = revision.file_ref.filter(|f| !f.trim().is_empty()) {
        letter.evidence_files.attach(EvidencePurpose::Original, file_ref);
    }
}

/// The file a decision is signed with: the signed copy if one came with the
/// request, otherwise any other file it carried.
fn decision_file(request: &ActRequest) -> Option<String> {
    request
        .evidence
        .iter()
        .find(|(purpose, _)| *purpose == EvidencePurpose::Signed)
        .or_else(|| request.evidence.first())
        .map(|(_, reference)| reference.clone())
}
