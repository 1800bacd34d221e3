//! Caller identity from the `x-role` / `x-department` headers set by the
//! authentication front end.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::ApiError;
use crate::letters::model::{Actor, Role};

pub const ROLE_HEADER: &str = "x-role";
pub const DEPARTMENT_HEADER: &str = "x-department";

/// The authenticated actor. Rejects with 401 when the role is missing or
/// unknown, or a clerk carries no department.
#[derive(Debug, Clone)]
pub struct Identity(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let role: Role = header(ROLE_HEADER)
            .ok_or_else(|| ApiError::Identity(format!("{ROLE_HEADER} header missing")))?
            .parse()
            .map_err(ApiError::Identity)?;
        let department = header(DEPARTMENT_HEADER).map(str::to_string);

        if role == Role::Clerk && department.is_none() {
            return Err(ApiError::Identity(format!(
                "clerks must send {DEPARTMENT_HEADER}"
            )));
        }

        Ok(Self(Actor { role, department }))
    }
}
