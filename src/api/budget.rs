//! Budget CRUD: `POST/GET/DELETE /v1/budget`, `POST /v1/budget/reset`.

use crate::api::error::GatewayError;
use crate::api::AppState;
use crate::ledger::Budget;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const PROJECT_HEADER: &str = "x-tokencap-project-id";

fn project_id_from(state: &AppState, headers: &HeaderMap, query: &HashMap<String, String>) -> String {
    state.resolve_project_id(
        headers.get(PROJECT_HEADER).and_then(|v| v.to_str().ok()),
        query.get("project_id").map(String::as_str),
    )
}

#[derive(Debug, Deserialize)]
pub struct SetBudgetRequest {
    pub project_id: String,
    pub limit_usd: f64,
    #[serde(default)]
    pub period_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BudgetResponse {
    #[serde(flatten)]
    pub budget: Budget,
}

pub async fn set(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetBudgetRequest>,
) -> Result<Json<BudgetResponse>, GatewayError> {
    if request.limit_usd <= 0.0 {
        return Err(GatewayError::InvalidRequest("limit_usd must be positive".to_string()));
    }
    let budget = state
        .budget
        .set_budget(&request.project_id, request.limit_usd, request.period_days, Utc::now())?;
    Ok(Json(BudgetResponse { budget }))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<BudgetResponse>, GatewayError> {
    let project_id = project_id_from(&state, &headers, &query);
    let budget = state.budget.get_budget(&project_id)?.ok_or(GatewayError::NotFound)?;
    Ok(Json(BudgetResponse { budget }))
}

pub async fn reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<BudgetResponse>, GatewayError> {
    let project_id = project_id_from(&state, &headers, &query);
    state.budget.reset_budget(&project_id, Utc::now())?;
    let budget = state.budget.get_budget(&project_id)?.ok_or(GatewayError::NotFound)?;
    Ok(Json(BudgetResponse { budget }))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<StatusCode, GatewayError> {
    let project_id = project_id_from(&state, &headers, &query);
    let deleted = state.budget.delete_budget(&project_id)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::NotFound)
    }
}
