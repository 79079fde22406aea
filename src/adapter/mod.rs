//! # Upstream Adapter
//!
//! One adapter per upstream wire-protocol family. Each adapter authenticates,
//! forwards a request unchanged, and extracts usage from either a buffered
//! response or an event stream. Adapters never translate between provider
//! shapes — an Anthropic-shaped request stays Anthropic-shaped all the way
//! to the upstream.

pub mod anthropic;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("network error contacting upstream: {0}")]
    Network(String),
    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("malformed upstream response: {0}")]
    InvalidResponse(String),
    #[error("missing credentials for upstream")]
    MissingCredentials,
}

/// Credentials sourced from the incoming request's provider-native auth
/// header, falling back to a server-configured default. Adapters never
/// contact the upstream without one.
#[derive(Debug, Clone)]
pub struct Credentials(pub String);

/// Tokens observed so far for a request, whether from a buffered response
/// or accumulated while intercepting a stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// False when the upstream never reported usage at all (some providers
    /// omit it on partial errors); the pipeline still charges, with zero
    /// output tokens and the estimate's input tokens, and flags the record.
    pub usage_reported: bool,
}

/// Result of a non-streaming forward: the upstream's status and body are
/// proxied verbatim; usage is parsed out of the body separately via
/// [`openai::extract_usage`] / [`anthropic::extract_usage`].
pub struct BufferedResponse {
    pub status: u16,
    pub body: bytes::Bytes,
    pub content_type: Option<String>,
}

/// Object-safe interface implemented by each provider family's concrete
/// adapter. `Req` varies per family (OpenAI vs. Anthropic shapes do not
/// share a request type), so the trait lives per-module rather than as one
/// generic interface; both adapters still follow the same four-operation
/// shape described in the module doc.
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    fn provider_name(&self) -> &'static str;
}

pub(crate) fn auth_error_if_missing(credentials: Option<Credentials>) -> Result<Credentials, AdapterError> {
    credentials.ok_or(AdapterError::MissingCredentials)
}

/// Incremental SSE line parser. Upstream bytes are forwarded to the client
/// verbatim and, in parallel, fed through this buffer to recover complete
/// `data: ...` payloads for usage accounting. Never buffers more than the
/// trailing partial line.
#[derive(Default)]
pub struct SseLineBuffer {
    partial: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning any complete `data: ` payloads they
    /// completed (without the prefix or trailing newline).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.push_str(&String::from_utf8_lossy(chunk));
        let mut payloads = Vec::new();

        while let Some(newline_pos) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=newline_pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
                let payload = payload.trim();
                if !payload.is_empty() {
                    payloads.push(payload.to_string());
                }
            }
        }

        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_buffer_splits_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"a\":").is_empty());
        let payloads = buffer.push(b"1}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn sse_buffer_ignores_done_sentinel_as_plain_payload() {
        let mut buffer = SseLineBuffer::new();
        let payloads = buffer.push(b"data: [DONE]\n\n");
        assert_eq!(payloads, vec!["[DONE]".to_string()]);
    }

    #[test]
    fn sse_buffer_handles_multiple_events_in_one_chunk() {
        let mut buffer = SseLineBuffer::new();
        let payloads = buffer.push(b"data: {\"a\":1}\n\ndata: {\"a\":2}\n\n");
        assert_eq!(payloads.len(), 2);
    }
}
