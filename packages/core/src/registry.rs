//! Tool registry: maps tool names to callable executors and their schemas.

use crate::resolver::Blackboard;
use crate::CoreError;
use futures::future::BoxFuture;
use report_agent_jira::{Issue, IssueTracker};
use std::collections::HashMap;
use std::sync::Arc;

/// Context an executor needs to do its work: the issue tracker and a
/// read-only view of the blackboard for `get_cached_issues`, the one tool
/// that looks an issue list up by an explicit name rather than taking it
/// as a resolved `$key` argument.
pub struct ToolContext<'a> {
    /// The issue tracker backing `search_issues`.
    pub tracker: &'a dyn IssueTracker,
    /// The session's stored intermediate results.
    pub blackboard: &'a Blackboard,
}

impl ToolContext<'_> {
    /// Reads the issue list stored under `source_key`, deserializing it
    /// from the blackboard's JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ToolExecution`] if `source_key` is unset or
    /// does not hold a list of issues.
    pub fn issue_list(&self, source_key: &str) -> Result<Vec<Issue>, CoreError> {
        let value = self
            .blackboard
            .get(source_key)
            .ok_or_else(|| CoreError::ToolExecution {
                tool: "*".to_string(),
                message: format!("No stored value under sourceKey '{source_key}'"),
            })?;
        serde_json::from_value(value.clone()).map_err(|e| CoreError::ToolExecution {
            tool: "*".to_string(),
            message: format!("sourceKey '{source_key}' does not hold an issue list: {e}"),
        })
    }
}

/// A tool's schema plus the async function that executes it.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// The JSON schema block handed to the LLM provider.
    pub schema: serde_json::Value,
    executor: Arc<
        dyn for<'a> Fn(
                &'a ToolContext<'a>,
                serde_json::Value,
            ) -> BoxFuture<'a, Result<serde_json::Value, CoreError>>
            + Send
            + Sync,
    >,
}

impl ToolDescriptor {
    /// Invokes this tool's executor with `args`.
    ///
    /// # Errors
    ///
    /// Returns whatever [`CoreError`] the underlying tool function
    /// produces.
    pub async fn execute<'a>(
        &self,
        ctx: &'a ToolContext<'a>,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        (self.executor)(ctx, args).await
    }
}

/// A named collection of tools, built once per session from
/// [`report_agent_models::tool_definitions`].
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under `name`, overwriting any previous
    /// registration with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, schema: serde_json::Value, executor: F)
    where
        F: for<'a> Fn(
                &'a ToolContext<'a>,
                serde_json::Value,
            ) -> BoxFuture<'a, Result<serde_json::Value, CoreError>>
            + Send
            + Sync
            + 'static,
    {
        self.tools.insert(
            name.into(),
            ToolDescriptor {
                schema,
                executor: Arc::new(executor),
            },
        );
    }

    /// Returns the descriptor for `name`, if registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Lists all registered tool names.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Returns every registered tool's schema, in no particular order.
    #[must_use]
    pub fn schemas(&self) -> Vec<serde_json::Value> {
        self.tools.values().map(|t| t.schema.clone()).collect()
    }
}

fn tool_execution_error(tool: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::ToolExecution {
        tool: tool.to_string(),
        message: err.to_string(),
    }
}

/// Deserializes `data` into an issue list for the data-shaping tools.
///
/// The engine resolves any `$key` reference in `data` before this runs, so
/// by the time a tool executes it already holds the actual issue array
/// rather than a blackboard key to look up.
fn issues_from_data(data: &serde_json::Value, tool: &str) -> Result<Vec<Issue>, CoreError> {
    serde_json::from_value(data.clone()).map_err(|e| tool_execution_error(tool, e))
}

/// Builds the registry the agent loop uses in production: every tool in
/// [`report_agent_models::tool_definitions`] bound to its
/// `report_agent_tools` implementation.
#[must_use]
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for schema in report_agent_models::tool_definitions() {
        let name = schema["name"].as_str().unwrap_or_default().to_string();
        let key = name.clone();
        match key.as_str() {
            "search_issues" => registry.register(name, schema, |ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::SearchIssuesParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("search_issues", e))?;
                    let issues = report_agent_tools::search_issues(ctx.tracker, &params)
                        .await
                        .map_err(|e| tool_execution_error("search_issues", e))?;
                    serde_json::to_value(issues).map_err(|e| tool_execution_error("search_issues", e))
                })
            }),
            "get_cached_issues" => registry.register(name, schema, |ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::GetCachedIssuesParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("get_cached_issues", e))?;
                    let issues = ctx.issue_list(&params.source_key)?;
                    serde_json::to_value(issues)
                        .map_err(|e| tool_execution_error("get_cached_issues", e))
                })
            }),
            "find_issue_by_field" => registry.register(name, schema, |_ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::FindIssueByFieldParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("find_issue_by_field", e))?;
                    let issues = issues_from_data(&params.data, "find_issue_by_field")?;
                    let found = report_agent_tools::find_issue_by_field(&issues, &params)
                        .map_err(|e| tool_execution_error("find_issue_by_field", e))?;
                    serde_json::to_value(found)
                        .map_err(|e| tool_execution_error("find_issue_by_field", e))
                })
            }),
            "filter_issues" => registry.register(name, schema, |_ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::FilterIssuesParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("filter_issues", e))?;
                    let issues = issues_from_data(&params.data, "filter_issues")?;
                    let filtered = report_agent_tools::filter_issues(&issues, &params)
                        .map_err(|e| tool_execution_error("filter_issues", e))?;
                    serde_json::to_value(filtered)
                        .map_err(|e| tool_execution_error("filter_issues", e))
                })
            }),
            "group_by_field" => registry.register(name, schema, |_ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::GroupByFieldParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("group_by_field", e))?;
                    let issues = issues_from_data(&params.data, "group_by_field")?;
                    let groups = report_agent_tools::group_by_field(&issues, &params)
                        .map_err(|e| tool_execution_error("group_by_field", e))?;
                    serde_json::to_value(groups).map_err(|e| tool_execution_error("group_by_field", e))
                })
            }),
            "count_by_field" => registry.register(name, schema, |_ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::CountByFieldParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("count_by_field", e))?;
                    let issues = issues_from_data(&params.data, "count_by_field")?;
                    let counts = report_agent_tools::count_by_field(&issues, &params)
                        .map_err(|e| tool_execution_error("count_by_field", e))?;
                    serde_json::to_value(counts).map_err(|e| tool_execution_error("count_by_field", e))
                })
            }),
            "extract_version" => registry.register(name, schema, |_ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::ExtractVersionParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("extract_version", e))?;
                    Ok(serde_json::json!(report_agent_tools::extract_version(&params)))
                })
            }),
            "format_date" => registry.register(name, schema, |_ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::FormatDateParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("format_date", e))?;
                    let formatted = report_agent_tools::format_date(&params)
                        .map_err(|e| tool_execution_error("format_date", e))?;
                    Ok(serde_json::json!(formatted))
                })
            }),
            "format_as_table" => registry.register(name, schema, |_ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::FormatAsTableParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("format_as_table", e))?;
                    let issues = issues_from_data(&params.data, "format_as_table")?;
                    let html = report_agent_tools::format_as_table(&issues, &params)
                        .map_err(|e| tool_execution_error("format_as_table", e))?;
                    Ok(serde_json::json!(html))
                })
            }),
            "format_as_list" => registry.register(name, schema, |_ctx, args| {
                Box::pin(async move {
                    let params: report_agent_models::FormatAsListParams =
                        serde_json::from_value(args)
                            .map_err(|e| tool_execution_error("format_as_list", e))?;
                    let issues = issues_from_data(&params.data, "format_as_list")?;
                    let html = report_agent_tools::format_as_list(&issues, &params)
                        .map_err(|e| tool_execution_error("format_as_list", e))?;
                    Ok(serde_json::json!(html))
                })
            }),
            other => log::warn!("No executor bound for catalog tool '{other}'"),
        }
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_agent_jira::InMemoryIssueTracker;

    #[tokio::test]
    async fn register_then_get_then_execute_round_trips() {
        let mut registry = ToolRegistry::new();
        registry.register(
            "echo",
            serde_json::json!({ "name": "echo" }),
            |_ctx, args| Box::pin(async move { Ok(args) }),
        );

        assert_eq!(registry.list(), vec!["echo"]);

        let tracker = InMemoryIssueTracker::new(vec![]);
        let board = Blackboard::new();
        let ctx = ToolContext {
            tracker: &tracker,
            blackboard: &board,
        };
        let descriptor = registry.get("echo").unwrap();
        let result = descriptor
            .execute(&ctx, serde_json::json!({ "value": 1 }))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({ "value": 1 }));
    }

    #[test]
    fn get_returns_none_for_unregistered_tool() {
        let registry = ToolRegistry::new();
        assert!(registry.get("nonexistent").is_none());
    }
}
