//! `GET /v1/usage` and `GET /v1/usage/history`.

use crate::api::error::GatewayError;
use crate::api::AppState;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;

const PROJECT_HEADER: &str = "x-tokencap-project-id";
const DEFAULT_HISTORY_LIMIT: u32 = 50;

pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<crate::ledger::UsageSummary>, GatewayError> {
    let project_id = state.resolve_project_id(
        headers.get(PROJECT_HEADER).and_then(|v| v.to_str().ok()),
        query.get("project_id").map(String::as_str),
    );
    let summary = state.ledger.get_usage_summary(&project_id)?;
    Ok(Json(summary))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Vec<crate::ledger::UsageRecord>>, GatewayError> {
    let project_id = state.resolve_project_id(
        headers.get(PROJECT_HEADER).and_then(|v| v.to_str().ok()),
        query.get("project_id").map(String::as_str),
    );
    let limit = query
        .get("limit")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);
    let records = state.ledger.get_recent_usage(&project_id, limit)?;
    Ok(Json(records))
}
