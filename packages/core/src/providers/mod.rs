//! Provider-agnostic chat types and the [`LlmProvider`] trait.
//!
//! The agent loop speaks only this vocabulary; [`anthropic`] and [`openai`]
//! translate it to and from each vendor's wire format.

pub mod anthropic;
pub mod openai;

use crate::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One turn in the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// The turn's content, either plain text or a list of blocks.
    pub content: MessageContent,
}

/// A message's content: either a bare string or a list of typed blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// A sequence of content blocks (text, tool calls, tool results).
    Blocks(Vec<ContentBlock>),
}

/// A single block within a message's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// A model-issued tool invocation.
    ToolUse {
        /// Opaque id correlating this call with its result.
        id: String,
        /// The tool's name.
        name: String,
        /// The tool's arguments.
        input: serde_json::Value,
    },
    /// The result of executing a tool call.
    ToolResult {
        /// The id of the [`ContentBlock::ToolUse`] this result answers.
        tool_use_id: String,
        /// The result payload, already summarized for the model.
        content: String,
    },
}

/// A provider's response to a single `chat` call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Content blocks the model produced.
    pub content: Vec<ContentBlock>,
    /// Why the model stopped generating.
    pub stop_reason: StopReason,
}

/// Why a provider stopped generating content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model finished its turn with no further tool calls.
    EndTurn,
    /// The model wants to invoke one or more tools before continuing.
    ToolUse,
    /// The model hit its output token budget.
    MaxTokens,
}

/// A chat-completion backend: Anthropic, OpenAI, or a test double.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Sends `messages` (and the available `tools`) to the model and
    /// returns its response.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if the request fails or the response cannot
    /// be decoded. Implementations should surface rate-limit and quota
    /// errors with wording the rate controller's retry classifier can
    /// recognize (e.g. containing `"429"` or `"rate limit"`).
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[serde_json::Value],
    ) -> Result<LlmResponse, CoreError>;
}

/// Builds a provider from `AI_PROVIDER`, `ANTHROPIC_API_KEY`,
/// `OPENAI_API_KEY`, and `AI_MODEL` environment variables.
///
/// `AI_PROVIDER` selects `"anthropic"` (default) or `"openai"`.
///
/// # Errors
///
/// Returns [`CoreError::Config`] if the selected provider's API key is
/// unset.
pub fn create_provider_from_env() -> Result<Box<dyn LlmProvider>, CoreError> {
    let provider = std::env::var("AI_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());
    let model = std::env::var("AI_MODEL").ok();

    match provider.as_str() {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| CoreError::Config {
                message: "OPENAI_API_KEY environment variable not set".to_string(),
            })?;
            Ok(Box::new(openai::OpenAiProvider::new(
                api_key,
                model.unwrap_or_else(|| "gpt-4o".to_string()),
            )))
        }
        "anthropic" => {
            let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| CoreError::Config {
                message: "ANTHROPIC_API_KEY environment variable not set".to_string(),
            })?;
            Ok(Box::new(anthropic::AnthropicProvider::new(
                api_key,
                model.unwrap_or_else(|| "claude-3-5-sonnet-20241022".to_string()),
            )))
        }
        other => Err(CoreError::Config {
            message: format!("Unknown AI_PROVIDER: {other}"),
        }),
    }
}
