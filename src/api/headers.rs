//! Response headers attached to every forwarded request.

use crate::estimator::CostEstimate;
use crate::tokenizer::Confidence;
use axum::http::{HeaderName, HeaderValue, Response};

const HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-tokencap-request-id");
const HEADER_INPUT_TOKENS: HeaderName = HeaderName::from_static("x-tokencap-input-tokens");
const HEADER_ESTIMATED_OUTPUT_TOKENS: HeaderName =
    HeaderName::from_static("x-tokencap-estimated-output-tokens");
const HEADER_ESTIMATED_COST_USD: HeaderName = HeaderName::from_static("x-tokencap-estimated-cost-usd");
const HEADER_CONFIDENCE: HeaderName = HeaderName::from_static("x-tokencap-confidence");
const HEADER_OUTPUT_TOKENS: HeaderName = HeaderName::from_static("x-tokencap-output-tokens");
const HEADER_COST_USD: HeaderName = HeaderName::from_static("x-tokencap-cost-usd");
const HEADER_BUDGET_REMAINING: HeaderName = HeaderName::from_static("x-tokencap-budget-remaining");

fn confidence_str(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::Low => "low",
        Confidence::Medium => "medium",
        Confidence::High => "high",
    }
}

/// Headers attached before the upstream call: present on every forwarded
/// request, including 402 rejections.
pub struct EstimateHeaders<'a> {
    pub request_id: &'a str,
    pub estimate: &'a CostEstimate,
}

impl EstimateHeaders<'_> {
    pub fn inject_into_response<B>(&self, response: &mut Response<B>) {
        let headers = response.headers_mut();
        headers.insert(HEADER_REQUEST_ID, header_value(self.request_id));
        headers.insert(
            HEADER_INPUT_TOKENS,
            header_value(&self.estimate.input_tokens.to_string()),
        );
        headers.insert(
            HEADER_ESTIMATED_OUTPUT_TOKENS,
            header_value(&self.estimate.estimated_output_tokens.to_string()),
        );
        headers.insert(
            HEADER_ESTIMATED_COST_USD,
            header_value(&format!("{:.6}", self.estimate.total_estimated_cost_usd)),
        );
        headers.insert(
            HEADER_CONFIDENCE,
            HeaderValue::from_static(confidence_str(self.estimate.confidence)),
        );
    }
}

/// Additional headers attached only to non-streaming responses, once
/// actual usage and the post-charge budget remainder are known.
pub struct ActualHeaders {
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub budget_remaining_usd: Option<f64>,
}

impl ActualHeaders {
    pub fn inject_into_response<B>(&self, response: &mut Response<B>) {
        let headers = response.headers_mut();
        headers.insert(
            HEADER_OUTPUT_TOKENS,
            header_value(&self.output_tokens.to_string()),
        );
        headers.insert(HEADER_COST_USD, header_value(&format!("{:.6}", self.cost_usd)));
        if let Some(remaining) = self.budget_remaining_usd {
            headers.insert(
                HEADER_BUDGET_REMAINING,
                header_value(&format!("{:.6}", remaining)),
            );
        }
    }
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::Provider;
    use axum::body::Body;
    use axum::http::Response as HttpResponse;

    #[test]
    fn estimate_headers_are_injected() {
        let estimate = CostEstimate {
            provider: Provider::OpenAi,
            model_id: "gpt-4o-mini".to_string(),
            input_tokens: 100,
            estimated_output_tokens: 50,
            input_cost_usd: 0.000015,
            estimated_output_cost_usd: 0.00003,
            total_estimated_cost_usd: 0.000045,
            confidence: Confidence::High,
        };
        let mut response = HttpResponse::new(Body::empty());
        EstimateHeaders {
            request_id: "req-1",
            estimate: &estimate,
        }
        .inject_into_response(&mut response);

        assert_eq!(response.headers().get(HEADER_REQUEST_ID).unwrap(), "req-1");
        assert_eq!(response.headers().get(HEADER_CONFIDENCE).unwrap(), "high");
        assert_eq!(
            response.headers().get(HEADER_ESTIMATED_COST_USD).unwrap(),
            "0.000045"
        );
    }

    #[test]
    fn actual_headers_omit_budget_when_ungated() {
        let mut response = HttpResponse::new(Body::empty());
        ActualHeaders {
            output_tokens: 50,
            cost_usd: 0.000045,
            budget_remaining_usd: None,
        }
        .inject_into_response(&mut response);
        assert!(response.headers().get(HEADER_BUDGET_REMAINING).is_none());
        assert_eq!(response.headers().get(HEADER_COST_USD).unwrap(), "0.000045");
    }
}
