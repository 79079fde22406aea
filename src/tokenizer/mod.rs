//! # Tokenizer
//!
//! Counts input tokens for a provider-specific request and estimates output
//! tokens. Encoders are BPE models selected by model family, lazily built
//! once and shared as process-level singletons.

use crate::api::messages::{AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicTool};
use crate::api::types::{ChatCompletionRequest, MessageContent};
use globset::{Glob, GlobMatcher};
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

/// Three-valued trust label for an estimate, derived from whether the
/// encoder is exact for the family and whether the model was catalog-known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

fn o200k() -> &'static CoreBPE {
    static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
    ENCODER.get_or_init(|| tiktoken_rs::o200k_base().expect("embedded o200k_base ranks"))
}

fn cl100k() -> &'static CoreBPE {
    static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
    ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().expect("embedded cl100k_base ranks"))
}

/// Picks the BPE encoder for an OpenAI-shaped model name. The 200k-vocab
/// encoder covers gpt-4o and the o1/o3/o4 reasoning family; everything else
/// (including gpt-3.5/gpt-4 classic) uses the 100k-vocab encoder.
fn encoder_for_openai_model(model: &str) -> &'static CoreBPE {
    static RULES: OnceLock<Vec<(GlobMatcher, bool)>> = OnceLock::new();
    let rules = RULES.get_or_init(|| {
        vec![
            (Glob::new("gpt-4o*").unwrap().compile_matcher(), true),
            (Glob::new("o1*").unwrap().compile_matcher(), true),
            (Glob::new("o3*").unwrap().compile_matcher(), true),
            (Glob::new("o4*").unwrap().compile_matcher(), true),
        ]
    });
    if rules.iter().any(|(m, _)| m.is_match(model)) {
        o200k()
    } else {
        cl100k()
    }
}

fn count(encoder: &CoreBPE, text: &str) -> u64 {
    encoder.encode_with_special_tokens(text).len() as u64
}

/// Per-message overhead for the OpenAI chat format. The legacy
/// gpt-3.5-turbo-0301 snapshot used a different overhead than every model
/// since.
const OPENAI_MESSAGE_OVERHEAD: u64 = 3;
const OPENAI_MESSAGE_OVERHEAD_LEGACY_0301: u64 = 4;
const OPENAI_NAME_OVERHEAD: u64 = 1;
const OPENAI_REPLY_PRIMING: u64 = 3;
const OPENAI_FUNCTION_OVERHEAD: u64 = 3;
const OPENAI_FUNCTION_COLLECTION_OVERHEAD: u64 = 3;

const ANTHROPIC_MESSAGE_OVERHEAD: u64 = 4;
const ANTHROPIC_SYSTEM_OVERHEAD: u64 = 4;
const ANTHROPIC_TOOL_OVERHEAD: u64 = 10;

/// Count input tokens for an OpenAI-shaped chat completion request.
pub fn count_openai_input(request: &ChatCompletionRequest) -> u64 {
    let encoder = encoder_for_openai_model(&request.model);
    let per_message_overhead = if request.model == "gpt-3.5-turbo-0301" {
        OPENAI_MESSAGE_OVERHEAD_LEGACY_0301
    } else {
        OPENAI_MESSAGE_OVERHEAD
    };

    let mut total = 0u64;
    for message in &request.messages {
        total += per_message_overhead;
        total += count(encoder, &message.role);
        total += count(encoder, &message_content_text(&message.content));
        if let Some(name) = &message.name {
            total += count(encoder, name);
            total += OPENAI_NAME_OVERHEAD;
        }
    }

    if let Some(functions) = request.extra.get("functions").and_then(|v| v.as_array()) {
        if !functions.is_empty() {
            total += OPENAI_FUNCTION_COLLECTION_OVERHEAD;
        }
        for function in functions {
            total += OPENAI_FUNCTION_OVERHEAD;
            if let Some(name) = function.get("name").and_then(|v| v.as_str()) {
                total += count(encoder, name);
            }
            if let Some(description) = function.get("description").and_then(|v| v.as_str()) {
                total += count(encoder, description);
            }
            if let Some(parameters) = function.get("parameters") {
                total += count(encoder, &parameters.to_string());
            }
        }
    }

    total + OPENAI_REPLY_PRIMING
}

fn message_content_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(content) => content.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| part.text.clone())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Count input tokens for an Anthropic-shaped messages request, using the
/// 100k-vocab encoder as a declared approximation (Anthropic's own
/// tokenizer is not public).
pub fn count_anthropic_input(request: &AnthropicRequest) -> u64 {
    let encoder = cl100k();
    let mut total = 0u64;

    if let Some(system) = &request.system {
        total += count(encoder, system);
        total += ANTHROPIC_SYSTEM_OVERHEAD;
    }

    for message in &request.messages {
        total += ANTHROPIC_MESSAGE_OVERHEAD;
        total += count_anthropic_message_text(encoder, message);
    }

    if let Some(tools) = &request.tools {
        for tool in tools {
            total += count_anthropic_tool(encoder, tool);
        }
    }

    total
}

fn count_anthropic_message_text(encoder: &CoreBPE, message: &AnthropicMessage) -> u64 {
    match &message.content {
        crate::api::messages::AnthropicContent::Text(text) => count(encoder, text),
        crate::api::messages::AnthropicContent::Blocks(blocks) => blocks
            .iter()
            .map(|block| count_anthropic_block(encoder, block))
            .sum(),
    }
}

fn count_anthropic_block(encoder: &CoreBPE, block: &AnthropicContentBlock) -> u64 {
    match block {
        AnthropicContentBlock::Text { text } => count(encoder, text),
        AnthropicContentBlock::ToolUse { name, input, .. } => {
            count(encoder, name) + count(encoder, &input.to_string())
        }
        AnthropicContentBlock::ToolResult { content, .. } => match content {
            crate::api::messages::AnthropicContent::Text(text) => count(encoder, text),
            crate::api::messages::AnthropicContent::Blocks(blocks) => blocks
                .iter()
                .map(|block| count_anthropic_block(encoder, block))
                .sum(),
        },
        AnthropicContentBlock::Image { .. } => 0,
    }
}

fn count_anthropic_tool(encoder: &CoreBPE, tool: &AnthropicTool) -> u64 {
    let mut total = count(encoder, &tool.name) + ANTHROPIC_TOOL_OVERHEAD;
    if let Some(description) = &tool.description {
        total += count(encoder, description);
    }
    total += count(encoder, &tool.input_schema.to_string());
    total
}

/// Output token estimate paired with the confidence of that estimate.
#[derive(Debug, Clone, Copy)]
pub struct OutputEstimate {
    pub tokens: u64,
    pub confidence: Confidence,
}

/// Estimate output tokens per §4.2: 75% of an explicit cap with high
/// confidence, else 50% of the model's documented default with medium
/// confidence, else a configurable default with low confidence.
pub fn estimate_output_tokens(
    explicit_max: Option<u64>,
    model_default_max: Option<u64>,
    configured_default: u64,
) -> OutputEstimate {
    if let Some(max) = explicit_max {
        return OutputEstimate {
            tokens: (max as f64 * 0.75).round() as u64,
            confidence: Confidence::High,
        };
    }
    if let Some(default_max) = model_default_max {
        return OutputEstimate {
            tokens: (default_max as f64 * 0.5).round() as u64,
            confidence: Confidence::Medium,
        };
    }
    OutputEstimate {
        tokens: configured_default,
        confidence: Confidence::Low,
    }
}

/// Count output tokens streamed so far by summing delta content tokens with
/// the same encoder used for the request's model. Used by the OpenAI
/// streaming interceptor as a fallback when the provider omits a running
/// `usage` block until the final chunk.
pub fn count_openai_delta_tokens(model: &str, delta_text: &str) -> u64 {
    count(encoder_for_openai_model(model), delta_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::messages::{AnthropicContent, AnthropicMessage};
    use crate::api::types::{ChatCompletionRequest, ChatMessage, MessageContent};
    use std::collections::HashMap;

    fn openai_request(model: &str, messages: Vec<(&str, &str)>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages: messages
                .into_iter()
                .map(|(role, content)| ChatMessage {
                    role: role.to_string(),
                    content: MessageContent::Text(content.to_string()),
                    name: None,
                })
                .collect(),
            stream: false,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            user: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn openai_count_is_deterministic() {
        let request = openai_request("gpt-4o-mini", vec![("user", "hello world")]);
        let a = count_openai_input(&request);
        let b = count_openai_input(&request);
        assert_eq!(a, b);
        assert!(a > OPENAI_MESSAGE_OVERHEAD + OPENAI_REPLY_PRIMING);
    }

    #[test]
    fn legacy_0301_uses_four_token_overhead() {
        let modern = openai_request("gpt-3.5-turbo", vec![("user", "hi")]);
        let legacy = openai_request("gpt-3.5-turbo-0301", vec![("user", "hi")]);
        assert_eq!(count_openai_input(&legacy) - count_openai_input(&modern), 1);
    }

    #[test]
    fn named_message_adds_overhead() {
        let mut request = openai_request("gpt-4o", vec![("user", "hi")]);
        let mut named = request.clone();
        named.messages[0].name = Some("alice".to_string());
        assert!(count_openai_input(&named) > count_openai_input(&request));
        request.messages[0].name = None;
    }

    #[test]
    fn o200k_selected_for_gpt4o_and_o_series() {
        assert!(std::ptr::eq(encoder_for_openai_model("gpt-4o"), o200k()));
        assert!(std::ptr::eq(encoder_for_openai_model("o1-mini"), o200k()));
        assert!(std::ptr::eq(
            encoder_for_openai_model("gpt-3.5-turbo"),
            cl100k()
        ));
    }

    #[test]
    fn anthropic_counts_system_and_messages() {
        let request = AnthropicRequest {
            model: "claude-3-5-sonnet-latest".to_string(),
            max_tokens: 1024,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: AnthropicContent::Text("hello".to_string()),
            }],
            system: Some("you are a helpful assistant".to_string()),
            stream: false,
            temperature: None,
            tools: None,
            extra: HashMap::new(),
        };
        let tokens = count_anthropic_input(&request);
        assert!(tokens >= ANTHROPIC_MESSAGE_OVERHEAD + ANTHROPIC_SYSTEM_OVERHEAD);
    }

    #[test]
    fn output_estimate_prefers_explicit_max() {
        let estimate = estimate_output_tokens(Some(1000), Some(4096), 4096);
        assert_eq!(estimate.tokens, 750);
        assert_eq!(estimate.confidence, Confidence::High);
    }

    #[test]
    fn output_estimate_falls_back_to_model_default() {
        let estimate = estimate_output_tokens(None, Some(4096), 2048);
        assert_eq!(estimate.tokens, 2048);
        assert_eq!(estimate.confidence, Confidence::Medium);
    }

    #[test]
    fn output_estimate_falls_back_to_configured_default() {
        let estimate = estimate_output_tokens(None, None, 4096);
        assert_eq!(estimate.tokens, 4096);
        assert_eq!(estimate.confidence, Confidence::Low);
    }

    #[test]
    fn confidence_ordering_allows_min() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
        assert_eq!(Confidence::Low.min(Confidence::High), Confidence::Low);
    }
}
