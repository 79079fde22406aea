//! OpenAI-shaped upstream adapter for `POST /v1/chat/completions`.

use super::{AdapterError, BufferedResponse, Credentials, ObservedUsage, SseLineBuffer, UpstreamAdapter};
use crate::api::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use crate::tokenizer::count_openai_delta_tokens;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiAdapter {
    client: Arc<reqwest::Client>,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(client: Arc<reqwest::Client>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn parse_request(body: &[u8]) -> Result<ChatCompletionRequest, AdapterError> {
        serde_json::from_slice(body).map_err(|e| AdapterError::InvalidResponse(e.to_string()))
    }

    /// Non-streaming forward: await the full upstream body, then hand it
    /// back verbatim for the pipeline to proxy.
    pub async fn forward(
        &self,
        request: &ChatCompletionRequest,
        credentials: &Credentials,
    ) -> Result<BufferedResponse, AdapterError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&credentials.0)
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

    /// Begin a streaming forward; returns the raw upstream byte stream so
    /// the pipeline can mirror it to the client while this module's
    /// [`accumulate_stream_chunk`] extracts usage on the side.
    pub async fn forward_stream(
        &self,
        request: &ChatCompletionRequest,
        credentials: &Credentials,
    ) -> Result<(u16, impl Stream<Item = Result<Bytes, reqwest::Error>>), AdapterError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&credentials.0)
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

    /// Pull `(inputTokens, outputTokens)` from the canonical usage field of
    /// a buffered response.
    pub fn extract_usage(body: &[u8]) -> Result<ObservedUsage, AdapterError> {
        let response: ChatCompletionResponse =
            serde_json::from_slice(body).map_err(|e| AdapterError::InvalidResponse(e.to_string()))?;
        match response.usage {
            Some(usage) => Ok(ObservedUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                usage_reported: true,
            }),
            None => Ok(ObservedUsage {
                input_tokens: 0,
                output_tokens: 0,
                usage_reported: false,
            }),
        }
    }
}

#[async_trait]
impl UpstreamAdapter for OpenAiAdapter {
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Feed one upstream chunk's bytes through the SSE buffer, updating the
/// running accumulator. OpenAI streams a `usage` block only in the final
/// chunk when the client opted into `stream_options.include_usage`; when
/// absent, output tokens are summed from delta content using the same
/// encoder as the request's model. The `[DONE]` sentinel is ignored.
pub fn accumulate_stream_chunk(
    model: &str,
    buffer: &mut SseLineBuffer,
    chunk: &[u8],
    accumulator: &mut ObservedUsage,
) {
    for payload in buffer.push(chunk) {
        if payload == "[DONE]" {
            continue;
        }
        let Ok(parsed) = serde_json::from_str::<ChatCompletionChunk>(&payload) else {
            continue;
        };
        if let Some(usage) = parsed.usage {
            accumulator.input_tokens = usage.prompt_tokens;
            accumulator.output_tokens = usage.completion_tokens;
            accumulator.usage_reported = true;
            continue;
        }
        for choice in &parsed.choices {
            if let Some(content) = &choice.delta.content {
                accumulator.output_tokens += count_openai_delta_tokens(model, content);
                accumulator.usage_reported = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_usage_reads_canonical_field() {
        let body = br#"{"id":"x","object":"chat.completion","created":0,"model":"gpt-4o",
            "choices":[],"usage":{"prompt_tokens":100,"completion_tokens":50,"total_tokens":150}}"#;
        let usage = OpenAiAdapter::extract_usage(body).unwrap();
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 50);
        assert!(usage.usage_reported);
    }

    #[test]
    fn extract_usage_missing_field_flags_unreported() {
        let body = br#"{"id":"x","object":"chat.completion","created":0,"model":"gpt-4o","choices":[]}"#;
        let usage = OpenAiAdapter::extract_usage(body).unwrap();
        assert!(!usage.usage_reported);
        assert_eq!(usage.output_tokens, 0);
    }

    #[test]
    fn accumulate_stream_chunk_sums_deltas_and_ignores_done() {
        let mut buffer = SseLineBuffer::new();
        let mut accumulator = ObservedUsage::default();
        let chunk = b"data: {\"id\":\"1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
        accumulate_stream_chunk("gpt-4o-mini", &mut buffer, chunk, &mut accumulator);
        assert!(accumulator.output_tokens > 0);
        assert!(accumulator.usage_reported);
    }

    #[test]
    fn accumulate_stream_chunk_prefers_final_usage_block() {
        let mut buffer = SseLineBuffer::new();
        let mut accumulator = ObservedUsage::default();
        let chunk = b"data: {\"id\":\"1\",\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":20,\"total_tokens\":30}}\n\n";
        accumulate_stream_chunk("gpt-4o-mini", &mut buffer, chunk, &mut accumulator);
        assert_eq!(accumulator.input_tokens, 10);
        assert_eq!(accumulator.output_tokens, 20);
        assert!(accumulator.usage_reported);
    }
}
