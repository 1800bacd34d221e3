//! Letter data model: roles, statuses, evidence, approval records, and inputs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An actor role. Pipelines are ordered sequences of these.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Clerk,
    Dean,
    Registrar,
    #[serde(alias = "vc")]
    ExecutiveApprover,
    Accounts,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Clerk,
        Role::Dean,
        Role::Registrar,
        Role::ExecutiveApprover,
        Role::Accounts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clerk => "clerk",
            Self::Dean => "dean",
            Self::Registrar => "registrar",
            Self::ExecutiveApprover => "executive_approver",
            Self::Accounts => "accounts",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clerk" => Ok(Self::Clerk),
            "dean" => Ok(Self::Dean),
            "registrar" => Ok(Self::Registrar),
            "executive_approver" | "executiveapprover" | "vc" => Ok(Self::ExecutiveApprover),
            "accounts" => Ok(Self::Accounts),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// What kind of letter this is. Decides the pipeline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Permission,
    Payment,
    #[default]
    Unknown,
}

impl Classification {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Payment => "payment",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase, orthogonal to the stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LetterStatus {
    AwaitingClassification,
    Pending,
    Submitted,
    ActionTaken,
    Validated,
    Approved,
    Rejected,
    Overdue,
}

impl LetterStatus {
    /// Statuses in which the role holding the stage may act.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::ActionTaken | Self::Validated | Self::Overdue
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingClassification => "awaiting_classification",
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::ActionTaken => "action_taken",
            Self::Validated => "validated",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Overdue => "overdue",
        }
    }
}

impl fmt::Display for LetterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can be asked of the workflow.
///
/// `Classify` and `Route` are driven by collaborators rather than roles and
/// only appear in transition errors. `View` only appears in visibility
/// refusals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    ClassifyIntake,
    FinalSubmit,
    Resubmit,
    Forward,
    Reject,
    Validate,
    ApproveFinal,
    Attach,
    Classify,
    Route,
    View,
}

impl Action {
    /// Actions reserved for the clerk who owns the letter.
    pub fn is_clerk_action(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::ClassifyIntake | Self::FinalSubmit | Self::Resubmit
        )
    }

    /// Actions performed by the role currently holding the stage.
    pub fn is_stage_action(&self) -> bool {
        matches!(
            self,
            Self::Forward | Self::Reject | Self::Validate | Self::ApproveFinal | Self::Attach
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::ClassifyIntake => "classify_intake",
            Self::FinalSubmit => "final_submit",
            Self::Resubmit => "resubmit",
            Self::Forward => "forward",
            Self::Reject => "reject",
            Self::Validate => "validate",
            Self::ApproveFinal => "approve_final",
            Self::Attach => "attach",
            Self::Classify => "classify",
            Self::Route => "route",
            Self::View => "view",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(stage, status)` pair callers observe and compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterState {
    pub stage: Role,
    pub status: LetterStatus,
}

impl fmt::Display for LetterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.stage, self.status)
    }
}

/// Why a file was attached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EvidencePurpose {
    Original,
    Signed,
    Cheque,
}

/// Opaque storage references grouped by purpose. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceFiles(BTreeMap<EvidencePurpose, Vec<String>>);

impl EvidenceFiles {
    /// Append a reference. Returns `false` if it was already stored under
    /// this purpose, in which case nothing changes.
    pub fn attach(&mut self, purpose: EvidencePurpose, reference: impl Into<String>) -> bool {
        let reference = reference.into();
        let refs = self.0.entry(purpose).or_default();
        if refs.contains(&reference) {
            return false;
        }
        refs.push(reference);
        true
    }

    /// Most recently attached reference for a purpose.
    pub fn latest(&self, purpose: EvidencePurpose) -> Option<&str> {
        self.0
            .get(&purpose)
            .and_then(|refs| refs.last())
            .map(String::as_str)
    }

    pub fn all(&self, purpose: EvidencePurpose) -> &[String] {
        self.0.get(&purpose).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a role decided when it acted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Forwarded,
    Approved,
    Rejected,
    Validated,
    Noted,
}

/// One role's decision evidence for a single pass through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub remarks: String,
    pub decided_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_file_ref: Option<String>,
    pub decision: ApprovalDecision,
}

/// A unit of work flowing through the approval pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Letter {
    pub id: String,
    pub subject: String,
    pub department: String,
    pub classification: Classification,
    /// Zero unless the letter is a payment.
    pub amount: Decimal,
    pub submitted_date: NaiveDate,
    pub status: LetterStatus,
    /// The role currently responsible.
    pub stage: Role,
    pub remarks: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_turnaround: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evidence_files: EvidenceFiles,
    #[serde(default)]
    pub approval_records: BTreeMap<Role, ApprovalRecord>,
    /// Bumped on every committed mutation; the compare-and-set token.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Letter {
    pub fn state(&self) -> LetterState {
        LetterState {
            stage: self.stage,
            status: self.status,
        }
    }

    /// Prepare the next revision of this letter.
    pub(crate) fn next_revision(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = now;
        next
    }
}

/// Who is acting, as supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

impl Actor {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            department: None,
        }
    }

    pub fn clerk(department: impl Into<String>) -> Self {
        Self {
            role: Role::Clerk,
            department: Some(department.into()),
        }
    }
}

/// A clerk's direct submission with a known type.
#[derive(Debug, Clone)]
pub struct NewLetter {
    pub subject: String,
    pub classification: Classification,
    pub amount: Decimal,
    pub submitted_date: Option<NaiveDate>,
    pub file_ref: Option<String>,
}

/// A scanned letter handed in for classification.
#[derive(Debug, Clone)]
pub struct IntakeLetter {
    pub file_ref: Option<String>,
    pub subject: Option<String>,
    pub submitted_date: Option<NaiveDate>,
}

/// What the classification collaborator reports for an intake letter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub classification: Classification,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub priority_score: Option<u8>,
    #[serde(default)]
    pub estimated_turnaround: Option<String>,
}

/// Field corrections a clerk may make while reviewing a classified draft,
/// or while resubmitting a rejected letter. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct LetterRevision {
    pub subject: Option<String>,
    pub classification: Option<Classification>,
    pub amount: Option<Decimal>,
    pub file_ref: Option<String>,
}

/// A stage role's request against a letter.
#[derive(Debug, Clone)]
pub struct ActRequest {
    pub action: Action,
    pub remarks: Option<String>,
    pub evidence: Vec<(EvidencePurpose, String)>,
    /// The state the caller saw; a mismatch fails with `StaleState`.
    pub expected: Option<LetterState>,
}

impl ActRequest {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            remarks: None,
            evidence: Vec::new(),
            expected: None,
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub fn with_evidence(mut self, purpose: EvidencePurpose, reference: impl Into<String>) -> Self {
        self.evidence.push((purpose, reference.into()));
        self
    }

    pub fn expecting(mut self, state: LetterState) -> Self {
        self.expected = Some(state);
        self
    }
}
