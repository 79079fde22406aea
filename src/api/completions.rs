//! `POST /v1/chat/completions` — the OpenAI-shaped request pipeline.
//!
//! Estimate, admit, forward unchanged, charge on the way out. Non-streaming
//! and streaming requests share every step up through admission; they
//! diverge only in how the upstream response is consumed and charged.

use crate::adapter::openai::{self, OpenAiAdapter};
use crate::adapter::{Credentials, ObservedUsage, SseLineBuffer};
use crate::api::error::GatewayError;
use crate::api::headers::{ActualHeaders, EstimateHeaders};
use crate::api::types::ChatCompletionRequest;
use crate::api::AppState;
use crate::budget::Admission;
use crate::ledger::ChargeInput;
use crate::logging::generate_request_id;
use crate::pricing::{cost_components, round_usd, Provider};
use crate::{estimator, tokenizer};
use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

const PROJECT_HEADER: &str = "x-tokencap-project-id";
const CREDENTIALS_HEADER: &str = "x-tokencap-openai-key";

pub async fn handle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request_id = generate_request_id();
    let project_id = state.resolve_project_id(
        headers.get(PROJECT_HEADER).and_then(|v| v.to_str().ok()),
        query.get("project_id").map(String::as_str),
    );

    let request = OpenAiAdapter::parse_request(&body)
        .map_err(|_| GatewayError::InvalidRequest("malformed chat completion body".to_string()))?;

    let estimate = build_estimate(&state, &request);
    crate::metrics::record_estimate("openai", estimate.input_tokens, estimate.total_estimated_cost_usd);

    let now = Utc::now();
    let admission = state.budget.check_admission(&project_id, &estimate, now)?;
    if let Admission::Rejected { details } = admission {
        crate::metrics::record_budget_rejection(&project_id);
        let mut response = GatewayError::BudgetExceeded(details).into_response();
        EstimateHeaders {
            request_id: &request_id,
            estimate: &estimate,
        }
        .inject_into_response(&mut response);
        return Ok(response);
    }

    let credentials = resolve_credentials(&headers, state.config.credentials.openai_api_key.as_deref())?;

    if request.stream {
        return handle_streaming(state, project_id, request_id, request, estimate, credentials).await;
    }

    let started = Instant::now();
    let buffered = state.openai_adapter.forward(&request, &credentials).await?;
    let duration = started.elapsed().as_secs_f64();
    crate::metrics::record_request("openai", &buffered.status.to_string(), duration);

    let mut response = Response::builder()
        .status(buffered.status)
        .header(
            axum::http::header::CONTENT_TYPE,
            buffered.content_type.as_deref().unwrap_or("application/json"),
        )
        .body(Body::from(buffered.body.clone()))
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    EstimateHeaders {
        request_id: &request_id,
        estimate: &estimate,
    }
    .inject_into_response(&mut response);

    if buffered.status >= 400 {
        return Ok(response);
    }

    let observed = OpenAiAdapter::extract_usage(&buffered.body).unwrap_or_default();
    let (input_tokens, output_tokens) = resolve_actual_tokens(&observed, &estimate, &request_id);
    let (cost_usd, budget_remaining) = charge(
        &state,
        &project_id,
        &request.model,
        input_tokens,
        output_tokens,
        &request_id,
        now,
    )?;

    ActualHeaders {
        output_tokens,
        cost_usd,
        budget_remaining_usd: budget_remaining,
    }
    .inject_into_response(&mut response);

    Ok(response)
}

fn build_estimate(state: &AppState, request: &ChatCompletionRequest) -> estimator::CostEstimate {
    let input_tokens = tokenizer::count_openai_input(request);
    let resolution = state.pricing.resolve(Some(Provider::OpenAi), &request.model);
    let output_estimate = tokenizer::estimate_output_tokens(
        request.max_tokens,
        Some(resolution.pricing.default_max_output as u64),
        state.config.default_max_output_tokens,
    );
    estimator::estimate(
        &state.pricing,
        Some(Provider::OpenAi),
        &request.model,
        input_tokens,
        output_estimate.tokens,
        output_estimate.confidence,
    )
}

fn resolve_credentials(headers: &HeaderMap, configured: Option<&str>) -> Result<Credentials, GatewayError> {
    headers
        .get(CREDENTIALS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| configured.map(str::to_string))
        .map(Credentials)
        .ok_or(GatewayError::Unauthorized)
}

/// Open Question #1: when the upstream never reported usage, charge the
/// estimate's input tokens and zero output tokens, and flag the record.
fn resolve_actual_tokens(observed: &ObservedUsage, estimate: &estimator::CostEstimate, request_id: &str) -> (u64, u64) {
    if observed.usage_reported {
        // The final `usage` block is authoritative for both fields; when only
        // delta content was counted (no final block arrived), input tokens
        // were never observed, so fall back to the pre-flight estimate.
        let input_tokens = if observed.input_tokens > 0 {
            observed.input_tokens
        } else {
            estimate.input_tokens
        };
        (input_tokens, observed.output_tokens)
    } else {
        tracing::warn!(request_id, "upstream response carried no usage field; charging estimated input tokens only");
        (estimate.input_tokens, 0)
    }
}

fn charge(
    state: &AppState,
    project_id: &str,
    model: &str,
    input_tokens: u64,
    output_tokens: u64,
    request_id: &str,
    now: chrono::DateTime<Utc>,
) -> Result<(f64, Option<f64>), GatewayError> {
    let resolution = state.pricing.resolve(Some(Provider::OpenAi), model);
    let (input_cost, output_cost) = cost_components(&resolution.pricing, input_tokens, output_tokens);
    let cost_usd = round_usd(input_cost + output_cost);

    state.ledger.record_usage(
        ChargeInput {
            project_id,
            provider: Provider::OpenAi.as_str(),
            model_id: &resolution.pricing.model_id,
            input_tokens: input_tokens as i64,
            output_tokens: output_tokens as i64,
            cost_usd,
            request_id,
        },
        now,
    )?;

    let remaining = state
        .budget
        .get_budget(project_id)?
        .map(|budget| budget.limit_usd - budget.spent_usd);

    Ok((cost_usd, remaining))
}

async fn handle_streaming(
    state: Arc<AppState>,
    project_id: String,
    request_id: String,
    request: ChatCompletionRequest,
    estimate: estimator::CostEstimate,
    credentials: Credentials,
) -> Result<Response, GatewayError> {
    let model = request.model.clone();
    let started = Instant::now();
    let (status, mut upstream) = state.openai_adapter.forward_stream(&request, &credentials).await?;

    let (tx, mut rx) = mpsc::channel::<Bytes>(32);
    let ledger = Arc::clone(&state.ledger);
    let pricing = Arc::clone(&state.pricing);
    let task_request_id = request_id.clone();
    let task_project_id = project_id.clone();
    let task_estimate = estimate.clone();

    tokio::spawn(async move {
        let mut buffer = SseLineBuffer::new();
        let mut accumulator = ObservedUsage::default();
        let mut client_gone = false;

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    openai::accumulate_stream_chunk(&model, &mut buffer, &bytes, &mut accumulator);
                    if !client_gone && tx.send(bytes).await.is_err() {
                        client_gone = true;
                    }
                }
                Err(e) => {
                    tracing::warn!(request_id = %task_request_id, error = %e, "upstream stream interrupted");
                    break;
                }
            }
        }

        crate::metrics::record_request("openai", status.to_string().as_str(), started.elapsed().as_secs_f64());

        let (input_tokens, output_tokens) = resolve_actual_tokens(&accumulator, &task_estimate, &task_request_id);
        let resolution = pricing.resolve(Some(Provider::OpenAi), &model);
        let (input_cost, output_cost) = cost_components(&resolution.pricing, input_tokens, output_tokens);
        let cost_usd = round_usd(input_cost + output_cost);

        if let Err(e) = ledger.record_usage(
            ChargeInput {
                project_id: &task_project_id,
                provider: Provider::OpenAi.as_str(),
                model_id: &resolution.pricing.model_id,
                input_tokens: input_tokens as i64,
                output_tokens: output_tokens as i64,
                cost_usd,
                request_id: &task_request_id,
            },
            Utc::now(),
        ) {
            tracing::error!(request_id = %task_request_id, error = %e, "failed to charge streamed usage");
            crate::metrics::record_ledger_error();
        }
    });

    let body = Body::from_stream(stream! {
        while let Some(item) = rx.recv().await {
            yield Ok::<Bytes, std::io::Error>(item);
        }
    });

    let mut response = Response::builder()
        .status(status)
        .header(axum::http::header::CONTENT_TYPE, "text/event-stream")
        .body(body)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    EstimateHeaders {
        request_id: &request_id,
        estimate: &estimate,
    }
    .inject_into_response(&mut response);

    Ok(response.into_response())
}
