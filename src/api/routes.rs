//! REST handlers for letters and analytics.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::ApiState;
use super::error::ApiError;
use super::identity::Identity;
use crate::letters::amount::parse_amount;
use crate::letters::model::{
    Action, ActRequest, Classification, ClassificationResult, EvidencePurpose, IntakeLetter,
    LetterRevision, LetterState, LetterStatus, NewLetter, Role,
};
use crate::letters::visibility::SortMode;

// ── Health ──────────────────────────────────────────────────────────────

pub(super) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "letterflow"
    }))
}

// ── Listing ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListQuery {
    #[serde(default)]
    sort: SortMode,
}

pub(super) async fn list_letters(
    State(state): State<ApiState>,
    Identity(actor): Identity,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let letters = state.workflow.list_for(&actor, query.sort).await?;
    Ok(Json(letters))
}

pub(super) async fn get_letter(
    State(state): State<ApiState>,
    Identity(actor): Identity,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let letter = state.workflow.get_letter_for(&actor, &id).await?;
    Ok(Json(letter))
}

// ── Creation ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct CreateLetterBody {
    subject: String,
    #[serde(alias = "type")]
    classification: Classification,
    /// Number or free text; anything unparseable counts as zero.
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default)]
    submitted_date: Option<NaiveDate>,
    #[serde(default)]
    file_ref: Option<String>,
}

pub(super) async fn create_letter(
    State(state): State<ApiState>,
    Identity(actor): Identity,
    Json(body): Json<CreateLetterBody>,
) -> Result<impl IntoResponse, ApiError> {
    let input = NewLetter {
        subject: body.subject,
        classification: body.classification,
        amount: body.amount.as_ref().map(parse_amount).unwrap_or_default(),
        submitted_date: body.submitted_date,
        file_ref: body.file_ref,
    };
    let letter = state.workflow.create_letter(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(letter)))
}

#[derive(Debug, Deserialize)]
pub(super) struct IntakeBody {
    #[serde(default)]
    file_ref: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    submitted_date: Option<NaiveDate>,
}

pub(super) async fn intake_letter(
    State(state): State<ApiState>,
    Identity(actor): Identity,
    Json(body): Json<IntakeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let input = IntakeLetter {
        file_ref: body.file_ref,
        subject: body.subject,
        submitted_date: body.submitted_date,
    };
    let letter = state
        .workflow
        .intake_for_classification(&actor, input)
        .await?;
    Ok((StatusCode::CREATED, Json(letter)))
}

// ── Classification collaborator ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct ClassificationBody {
    #[serde(alias = "type")]
    classification: Classification,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default)]
    priority_score: Option<u8>,
    #[serde(default)]
    estimated_turnaround: Option<String>,
}

pub(super) async fn apply_classification(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ClassificationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let result = ClassificationResult {
        classification: body.classification,
        subject: body.subject,
        amount: body.amount.as_ref().map(parse_amount),
        priority_score: body.priority_score,
        estimated_turnaround: body.estimated_turnaround,
    };
    let letter = state.workflow.apply_classification(&id, result).await?;
    Ok(Json(letter))
}

// ── Clerk submissions ───────────────────────────────────────────────────

/// Corrections a clerk sends with a final submit or a resubmission.
#[derive(Debug, Default, Deserialize)]
pub(super) struct RevisionBody {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default, alias = "type")]
    classification: Option<Classification>,
    #[serde(default)]
    amount: Option<serde_json::Value>,
    #[serde(default)]
    file_ref: Option<String>,
}

impl From<RevisionBody> for LetterRevision {
    fn from(body: RevisionBody) -> Self {
        Self {
            subject: body.subject,
            classification: body.classification,
            amount: body.amount.as_ref().map(parse_amount),
            file_ref: body.file_ref,
        }
    }
}

pub(super) async fn final_submit(
    State(state): State<ApiState>,
    Identity(actor): Identity,
    Path(id): Path<String>,
    body: Option<Json<RevisionBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let revision = body.map(|Json(b)| b).unwrap_or_default();
    let letter = state
        .workflow
        .final_submit(&actor, &id, revision.into())
        .await?;
    Ok(Json(letter))
}

pub(super) async fn resubmit(
    State(state): State<ApiState>,
    Identity(actor): Identity,
    Path(id): Path<String>,
    body: Option<Json<RevisionBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let revision = body.map(|Json(b)| b).unwrap_or_default();
    let letter = state.workflow.resubmit(&actor, &id, revision.into()).await?;
    Ok(Json(letter))
}

// ── Stage actions ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct EvidenceBody {
    purpose: EvidencePurpose,
    file_ref: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ActBody {
    action: Action,
    #[serde(default)]
    remarks: Option<String>,
    #[serde(default)]
    evidence: Vec<EvidenceBody>,
    /// The state the caller last saw. Both or neither.
    #[serde(default)]
    expected_stage: Option<Role>,
    #[serde(default)]
    expected_status: Option<LetterStatus>,
}

impl TryFrom<ActBody> for ActRequest {
    type Error = ApiError;

    fn try_from(body: ActBody) -> Result<Self, Self::Error> {
        let expected = match (body.expected_stage, body.expected_status) {
            (Some(stage), Some(status)) => Some(LetterState { stage, status }),
            (None, None) => None,
            _ => {
                return Err(ApiError::BadRequest(
                    "expected_stage and expected_status go together".into(),
                ));
            }
        };
        Ok(ActRequest {
            action: body.action,
            remarks: body.remarks,
            evidence: body
                .evidence
                .into_iter()
                .filter(|e| !e.file_ref.trim().is_empty())
                .map(|e| (e.purpose, e.file_ref))
                .collect(),
            expected,
        })
    }
}

pub(super) async fn act(
    State(state): State<ApiState>,
    Identity(actor): Identity,
    Path(id): Path<String>,
    Json(body): Json<ActBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = ActRequest::try_from(body)?;
    let letter = state.workflow.act(&actor, &id, request).await?;
    Ok(Json(letter))
}

// ── Analytics ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub(super) struct AnalyticsQuery {
    #[serde(default)]
    department: Option<String>,
}

/// Clerks only ever see their own department.
pub(super) async fn analytics(
    State(state): State<ApiState>,
    Identity(actor): Identity,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let department = match actor.role {
        Role::Clerk => actor.department,
        _ => query.department.filter(|d| !d.trim().is_empty()),
    };
    let report = state.workflow.analytics_for(department.as_deref()).await?;
    Ok(Json(report))
}
