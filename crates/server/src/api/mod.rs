//! HTTP endpoints.
//!
//! Handlers are thin: they parse input, call the rule service or scheduler
//! and map [`RuleError`] onto a status code plus a JSON error body.

mod health;
mod rules;
mod scheduler;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use herald_core::RuleId;
use herald_rules::{Diagnostic, RuleError, Stage};

pub use health::{config, health};
pub use rules::{create_rule, deactivate_rule, delete_rule, get_rule, list_rules};
pub use scheduler::run_tick;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// A [`RuleError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub RuleError);

impl From<RuleError> for ApiError {
    fn from(e: RuleError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RuleError::NotFound(_) => StatusCode::NOT_FOUND,
            RuleError::Generation(_) => StatusCode::BAD_GATEWAY,
            RuleError::EntryPointNotFound
            | RuleError::Compile { .. }
            | RuleError::InvalidSchedule { .. }
            | RuleError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RuleError::ContractViolation(_)
            | RuleError::Instantiation(_)
            | RuleError::Load(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(stage = %self.0.stage(), error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            stage: self.0.stage(),
            diagnostics: self.0.diagnostics().to_vec(),
        };
        (status, Json(body)).into_response()
    }
}

/// Parse a path segment as a rule id; malformed ids are a 400.
pub(crate) fn parse_id(raw: &str) -> Result<RuleId, ApiError> {
    raw.parse()
        .map_err(|e: herald_core::HeraldError| ApiError(RuleError::InvalidRequest(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (RuleError::NotFound(RuleId::new()), StatusCode::NOT_FOUND),
            (RuleError::Generation("down".into()), StatusCode::BAD_GATEWAY),
            (RuleError::EntryPointNotFound, StatusCode::BAD_REQUEST),
            (
                RuleError::Compile {
                    entry_point: "A".into(),
                    diagnostics: vec![],
                },
                StatusCode::BAD_REQUEST,
            ),
            (RuleError::ContractViolation("abi".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (RuleError::Instantiation("panic".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (RuleError::Store("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                RuleError::ToolchainUnavailable("rustc".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }

    #[test]
    fn malformed_id_is_bad_request() {
        let err = parse_id("not-a-uuid").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
