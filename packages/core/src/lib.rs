#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The agentic execution loop: rate-limited LLM driver, tool registry,
//! reference resolver, execution engine, and result summarizer.
//!
//! [`agent::run_agent`] is the entry point external callers use; everything
//! else in this crate is a component it wires together.

pub mod agent;
pub mod cancellation;
pub mod engine;
pub mod providers;
pub mod rate_limiter;
pub mod registry;
pub mod resolver;
pub mod summarizer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur anywhere in the agentic execution loop.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An LLM provider request failed or its response could not be
    /// decoded.
    #[error("Provider error: {message}")]
    Provider {
        /// Description of the failure.
        message: String,
    },

    /// Configuration (e.g. an environment variable) was missing or
    /// invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The model requested a tool that is not in the registry.
    #[error("Unknown tool: {name}")]
    UnknownTool {
        /// The requested tool's name.
        name: String,
    },

    /// A tool's arguments could not be parsed into its parameter type.
    #[error("Could not parse arguments for {tool}: {message}")]
    ArgParse {
        /// The tool whose arguments failed to parse.
        tool: String,
        /// The underlying parse error.
        message: String,
    },

    /// A tool's arguments did not satisfy its declared JSON schema.
    #[error("Arguments for {tool} violate its schema: {message}")]
    SchemaViolation {
        /// The tool whose arguments were rejected.
        tool: String,
        /// Description of the violation.
        message: String,
    },

    /// A tool ran but failed.
    #[error("Tool {tool} failed: {message}")]
    ToolExecution {
        /// The tool that failed.
        tool: String,
        /// Description of the failure.
        message: String,
    },

    /// The rate limiter could not admit a call within its timeout.
    #[error("Rate limiter timed out after {timeout_secs}s waiting for a call slot")]
    RateLimitTimeout {
        /// How long the caller was willing to wait.
        timeout_secs: f64,
    },

    /// The agent loop hit its iteration cap without reaching a final
    /// answer.
    #[error("Agent loop reached its iteration cap ({max_iterations}) without finishing")]
    MaxIterations {
        /// The configured cap that was hit.
        max_iterations: u32,
    },

    /// The caller cancelled the run before it completed.
    #[error("Agent run was cancelled")]
    Cancelled,
}

/// The final outcome of a completed agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// The full message transcript, including tool calls and results.
    pub messages: Vec<providers::Message>,
    /// The model's final text answer, if it produced one.
    pub result: Option<String>,
    /// Every tool call made during the run, in call order.
    pub history: Vec<engine::ExecutionRecord>,
    /// Run-level metadata: iteration count and any terminal condition.
    pub metadata: serde_json::Value,
    /// Wall-clock time the run took from first iteration to its outcome.
    pub elapsed: std::time::Duration,
    /// Whether the run reached a usable result. `false` on cancellation;
    /// `true` on a final answer or on hitting the iteration cap (which
    /// still produces a canned artifact).
    pub success: bool,
    /// Description of why the run did not succeed, if it didn't.
    pub error: Option<String>,
}

/// Progress events emitted while an agent run is in flight, e.g. for a
/// CLI to render as it happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AgentEvent {
    /// A new iteration of the loop started.
    IterationStarted {
        /// 1-based iteration number.
        iteration: u32,
    },
    /// The model requested a tool call.
    ToolCallStarted {
        /// The tool's name.
        name: String,
        /// The arguments it was called with.
        arguments: serde_json::Value,
    },
    /// A tool call finished.
    ToolCallFinished {
        /// The tool's name.
        name: String,
        /// Whether it succeeded.
        succeeded: bool,
    },
    /// The run finished with a final answer.
    Finished {
        /// The final text answer.
        result: String,
    },
    /// The run failed.
    Failed {
        /// Description of the failure.
        message: String,
    },
}
