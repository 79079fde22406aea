//! Anthropic-shaped upstream adapter for `POST /v1/messages`.
//!
//! Unlike a multi-backend router that normalizes every provider to one
//! wire shape, this adapter never translates: the client's native
//! Anthropic Messages body is forwarded byte-for-byte.

use super::{AdapterError, BufferedResponse, Credentials, ObservedUsage, SseLineBuffer, UpstreamAdapter};
use crate::api::messages::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: Arc<reqwest::Client>,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(client: Arc<reqwest::Client>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// `max_tokens` is required by the Anthropic family; serde enforces its
    /// presence since [`AnthropicRequest::max_tokens`] is not an `Option`.
    pub fn parse_request(body: &[u8]) -> Result<AnthropicRequest, AdapterError> {
        serde_json::from_slice(body).map_err(|e| AdapterError::InvalidResponse(e.to_string()))
    }

    pub async fn forward(
        &self,
        request: &AnthropicRequest,
        credentials: &Credentials,
    ) -> Result<BufferedResponse, AdapterError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &credentials.0)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response
            .bytes()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        Ok(BufferedResponse {
            status,
            body,
            content_type,
        })
    }

    pub async fn forward_stream(
        &self,
        request: &AnthropicRequest,
        credentials: &Credentials,
    ) -> Result<(u16, impl Stream<Item = Result<Bytes, reqwest::Error>>), AdapterError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &credentials.0)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response
                .text()
                .await
                .map_err(|e| AdapterError::Network(e.to_string()))?;
            return Err(AdapterError::Upstream { status, body });
        }

        Ok((status, response.bytes_stream()))
    }

    pub fn extract_usage(body: &[u8]) -> Result<ObservedUsage, AdapterError> {
        let response: AnthropicResponse =
            serde_json::from_slice(body).map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;
        Ok(ObservedUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            usage_reported: true,
        })
    }
}

#[async_trait]
impl UpstreamAdapter for AnthropicAdapter {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

/// `message_start.message.usage.input_tokens` supplies input tokens;
/// `message_delta.usage.output_tokens` supplies a running output total
/// where the last observed value wins.
pub fn accumulate_stream_chunk(
    buffer: &mut SseLineBuffer,
    chunk: &[u8],
    accumulator: &mut ObservedUsage,
) {
    for payload in buffer.push(chunk) {
        let Ok(event) = serde_json::from_str::<AnthropicStreamEvent>(&payload) else {
            continue;
        };
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                accumulator.input_tokens = message.usage.input_tokens;
                accumulator.usage_reported = true;
            }
            AnthropicStreamEvent::MessageDelta { usage } => {
                accumulator.output_tokens = usage.output_tokens;
                accumulator.usage_reported = true;
            }
            AnthropicStreamEvent::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_usage_reads_canonical_fields() {
        let body = br#"{"id":"msg_1","type":"message","role":"assistant","content":[],
            "model":"claude-3-5-sonnet-latest","usage":{"input_tokens":200,"output_tokens":150}}"#;
        let usage = AnthropicAdapter::extract_usage(body).unwrap();
        assert_eq!(usage.input_tokens, 200);
        assert_eq!(usage.output_tokens, 150);
    }

    #[test]
    fn stream_accumulates_message_start_then_delta() {
        let mut buffer = SseLineBuffer::new();
        let mut accumulator = ObservedUsage::default();
        let chunk = b"data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":200,\"output_tokens\":0}}}\n\n\
                      data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":150}}\n\n";
        accumulate_stream_chunk(&mut buffer, chunk, &mut accumulator);
        assert_eq!(accumulator.input_tokens, 200);
        assert_eq!(accumulator.output_tokens, 150);
        assert!(accumulator.usage_reported);
    }

    #[test]
    fn last_delta_wins_over_earlier_ones() {
        let mut buffer = SseLineBuffer::new();
        let mut accumulator = ObservedUsage::default();
        let chunk = b"data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":50}}\n\n\
                      data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":150}}\n\n";
        accumulate_stream_chunk(&mut buffer, chunk, &mut accumulator);
        assert_eq!(accumulator.output_tokens, 150);
    }
}
