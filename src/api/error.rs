//! HTTP mapping for workflow errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::WorkflowError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Missing or invalid identity: {0}")]
    Identity(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Workflow(e) => match e {
                WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
                WorkflowError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
                WorkflowError::Forbidden { .. } => StatusCode::FORBIDDEN,
                WorkflowError::InvalidTransition { .. } | WorkflowError::StaleState { .. } => {
                    StatusCode::CONFLICT
                }
                WorkflowError::UnresolvedClassification { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                WorkflowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                WorkflowError::DependencyFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::Identity(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Workflow(e) => e.kind(),
            Self::Identity(_) => "unauthorized",
            Self::BadRequest(_) => "invalid_input",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (
            status,
            Json(serde_json::json!({
                "error": self.kind(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatabaseError;
    use crate::letters::model::{Action, LetterStatus, Role};

    #[test]
    fn workflow_kinds_map_to_statuses() {
        let cases = [
            (WorkflowError::NotFound { id: "x".into() }, StatusCode::NOT_FOUND),
            (
                WorkflowError::Unauthorized {
                    role: Role::Clerk,
                    action: Action::Reject,
                },
                StatusCode::UNAUTHORIZED,
            ),
            (
                WorkflowError::InvalidTransition {
                    id: "x".into(),
                    status: LetterStatus::Approved,
                    action: Action::Forward,
                },
                StatusCode::CONFLICT,
            ),
            (
                WorkflowError::StaleState {
                    id: "x".into(),
                    expected: "a".into(),
                    found: "b".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                WorkflowError::UnresolvedClassification { id: "x".into() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                WorkflowError::DependencyFailure(DatabaseError::Pool("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn identity_errors_are_401() {
        let err = ApiError::Identity("x-role header missing".into());
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.kind(), "unauthorized");
    }
}
