//! Gateway-level error envelope, matching the OpenAI-style error JSON shape
//! clients already expect from `/v1/chat/completions`.

use crate::adapter::AdapterError;
use crate::budget::RejectionDetails;
use crate::ledger::LedgerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("missing upstream credentials")]
    Unauthorized,
    #[error("budget exceeded")]
    BudgetExceeded(RejectionDetails),
    #[error("not found")]
    NotFound,
    #[error("upstream error: {0}")]
    UpstreamError(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AdapterError> for GatewayError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::MissingCredentials => GatewayError::Unauthorized,
            AdapterError::InvalidResponse(msg) => GatewayError::UpstreamError(msg),
            AdapterError::Network(msg) => GatewayError::UpstreamError(msg),
            AdapterError::Upstream { status, body } => {
                GatewayError::UpstreamError(format!("status {status}: {body}"))
            }
        }
    }
}

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BudgetExceededDetails>,
}

#[derive(Debug, Serialize)]
pub struct BudgetExceededDetails {
    pub current_spend_usd: f64,
    pub limit_usd: f64,
    pub estimated_cost_usd: f64,
    pub remaining_budget_usd: f64,
}

impl GatewayError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            GatewayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            GatewayError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            GatewayError::BudgetExceeded(_) => (StatusCode::PAYMENT_REQUIRED, "budget_exceeded"),
            GatewayError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            GatewayError::UpstreamError(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        let details = match &self {
            GatewayError::BudgetExceeded(rejection) => Some(BudgetExceededDetails {
                current_spend_usd: rejection.current_spend_usd,
                limit_usd: rejection.limit_usd,
                estimated_cost_usd: rejection.estimated_cost_usd,
                remaining_budget_usd: rejection.remaining_after_request_usd,
            }),
            _ => None,
        };

        let body = ApiErrorBody {
            error: ApiErrorDetail {
                error_type: error_type.to_string(),
                message: self.to_string(),
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exceeded_maps_to_402() {
        let err = GatewayError::BudgetExceeded(RejectionDetails {
            current_spend_usd: 1.0,
            limit_usd: 1.0,
            estimated_cost_usd: 0.5,
            remaining_after_request_usd: -0.5,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = GatewayError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
