//! Execution engine: resolves references, validates arguments, dispatches
//! to the tool registry, and records results on the blackboard.

use crate::registry::{ToolContext, ToolRegistry};
use crate::resolver::{resolve_references, Blackboard};
use crate::summarizer::{self, DEFAULT_MAX_CHARS};
use crate::CoreError;
use report_agent_jira::IssueTracker;
use serde::{Deserialize, Serialize};

/// A single resolved-and-dispatched tool call, kept in a run's Execution
/// History for metadata extraction and post-hoc inspection.
///
/// Tool-level failures (unknown tool, schema violation, tool execution
/// error, unresolved reference) never abort a run — they are recorded
/// here instead, with `success: false` and a populated `error`, and fed
/// back to the model as the call's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// The id the provider assigned this tool call.
    pub call_id: String,
    /// The tool that was invoked.
    pub tool_name: String,
    /// The arguments as the model supplied them, before `$key` resolution.
    pub args_snapshot: serde_json::Value,
    /// Whether the call completed successfully.
    pub success: bool,
    /// The projected, bounded result summary, if the call succeeded.
    pub summary: Option<String>,
    /// Description of the failure, if the call did not succeed.
    pub error: Option<String>,
    /// An unresolved-`$key`-reference warning attached to this call, if
    /// any of its arguments referenced a blackboard key with no stored
    /// value.
    pub warning: Option<String>,
    /// The raw (unsummarized) result, for downstream extraction. `None`
    /// when the call failed.
    pub result: Option<serde_json::Value>,
}

impl ExecutionRecord {
    /// The content to feed back to the model as this call's tool result:
    /// the summary on success, or a small JSON error envelope otherwise.
    #[must_use]
    pub fn tool_result_content(&self) -> String {
        self.summary.clone().unwrap_or_else(|| {
            serde_json::json!({ "error": self.error.clone().unwrap_or_default() }).to_string()
        })
    }
}

/// Runs the resolve → validate → dispatch → summarize pipeline for one
/// tool call and stores the raw result on the blackboard under `store_as`.
///
/// This function is infallible: an unknown tool, a schema violation, an
/// unresolved reference, or a failing tool are all "recovered" errors
/// per the error taxonomy — they are captured on the returned
/// [`ExecutionRecord`] rather than raised, so the caller can always
/// record the call in history and feed its outcome back to the model.
pub async fn execute_function_call(
    registry: &ToolRegistry,
    tracker: &dyn IssueTracker,
    blackboard: &mut Blackboard,
    call_id: &str,
    tool_name: &str,
    raw_arguments: &serde_json::Value,
    store_as: &str,
) -> ExecutionRecord {
    let record_with_error = |error: String, warning: Option<String>| ExecutionRecord {
        call_id: call_id.to_string(),
        tool_name: tool_name.to_string(),
        args_snapshot: raw_arguments.clone(),
        success: false,
        summary: None,
        error: Some(error),
        warning,
        result: None,
    };

    let Some(descriptor) = registry.get(tool_name) else {
        return record_with_error(
            CoreError::UnknownTool {
                name: tool_name.to_string(),
            }
            .to_string(),
            None,
        );
    };

    let mut warnings = Vec::new();
    let resolved_arguments = resolve_references(raw_arguments, blackboard, &mut warnings);
    let warning = warnings.into_iter().next();

    if let Err(err) = validate_against_schema(tool_name, &descriptor.schema, &resolved_arguments) {
        return record_with_error(err.to_string(), warning);
    }

    let dispatched = {
        let ctx = ToolContext {
            tracker,
            blackboard,
        };
        descriptor.execute(&ctx, resolved_arguments.clone()).await
    };

    match dispatched {
        Ok(result) => {
            blackboard.store(store_as, result.clone());
            let summary = summarizer::summarize(&result, DEFAULT_MAX_CHARS);
            ExecutionRecord {
                call_id: call_id.to_string(),
                tool_name: tool_name.to_string(),
                args_snapshot: raw_arguments.clone(),
                success: true,
                summary: Some(summary),
                error: None,
                warning,
                result: Some(result),
            }
        }
        Err(err) => {
            let message = match err {
                CoreError::ToolExecution { message, .. } => message,
                other => other.to_string(),
            };
            record_with_error(message, warning)
        }
    }
}

fn validate_against_schema(
    tool_name: &str,
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> Result<(), CoreError> {
    let Some(parameters) = schema.get("parameters") else {
        return Ok(());
    };

    if let Err(error) = jsonschema::validate(parameters, arguments) {
        return Err(CoreError::SchemaViolation {
            tool: tool_name.to_string(),
            message: error.to_string(),
        });
    }

    Ok(())
}
