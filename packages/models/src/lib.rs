#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tool parameter/result types and the JSON-schema tool catalog handed to
//! the language model at the start of a session.
//!
//! Each tool has a `*Params` struct deserialized from the model's
//! tool-call arguments and (where useful) a `*Result` struct describing
//! its output shape. [`tool_definitions`] renders the whole catalog as the
//! provider-agnostic JSON schema blocks the agent loop passes to the LLM
//! provider on every turn.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical names of the tools the agent loop knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SearchIssues,
    GetCachedIssues,
    FindIssueByField,
    FilterIssues,
    GroupByField,
    CountByField,
    ExtractVersion,
    FormatDate,
    FormatAsTable,
    FormatAsList,
}

impl ToolName {
    /// All tools the catalog exposes, in catalog order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::SearchIssues,
            Self::GetCachedIssues,
            Self::FindIssueByField,
            Self::FilterIssues,
            Self::GroupByField,
            Self::CountByField,
            Self::ExtractVersion,
            Self::FormatDate,
            Self::FormatAsTable,
            Self::FormatAsList,
        ]
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SearchIssues => "search_issues",
            Self::GetCachedIssues => "get_cached_issues",
            Self::FindIssueByField => "find_issue_by_field",
            Self::FilterIssues => "filter_issues",
            Self::GroupByField => "group_by_field",
            Self::CountByField => "count_by_field",
            Self::ExtractVersion => "extract_version",
            Self::FormatDate => "format_date",
            Self::FormatAsTable => "format_as_table",
            Self::FormatAsList => "format_as_list",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ToolName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "search_issues" => Self::SearchIssues,
            "get_cached_issues" => Self::GetCachedIssues,
            "find_issue_by_field" => Self::FindIssueByField,
            "filter_issues" => Self::FilterIssues,
            "group_by_field" => Self::GroupByField,
            "count_by_field" => Self::CountByField,
            "extract_version" => Self::ExtractVersion,
            "format_date" => Self::FormatDate,
            "format_as_table" => Self::FormatAsTable,
            "format_as_list" => Self::FormatAsList,
            _ => return Err(()),
        })
    }
}

/// Parameters for `search_issues`: runs a JQL query against the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIssuesParams {
    /// JQL query string.
    pub jql: String,
    /// Fields to request; omit for the tracker's default set.
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Maximum number of issues to return.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

const fn default_max_results() -> u32 {
    100
}

/// Parameters for `get_cached_issues`: reads issues already fetched earlier
/// in the session rather than re-querying the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCachedIssuesParams {
    /// The blackboard key previously populated by `search_issues`.
    pub source_key: String,
}

/// Parameters for `find_issue_by_field`: locates the first issue in a list
/// whose field matches a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindIssueByFieldParams {
    /// The issue list to search, normally passed as a `$ref` to an earlier
    /// call's stored result and resolved before this tool runs.
    pub data: serde_json::Value,
    /// Name of the field to match on (e.g. `"key"`, `"status"`).
    pub field: String,
    /// Value the field must equal.
    pub value: serde_json::Value,
}

/// Parameters for `filter_issues`: keeps issues whose field matches an
/// operator/value pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterIssuesParams {
    /// The issue list to filter, normally passed as a `$ref` to an earlier
    /// call's stored result and resolved before this tool runs.
    pub data: serde_json::Value,
    /// Name of the field to test.
    pub field: String,
    /// Comparison to apply: `"eq"`, `"ne"`, `"contains"`, `"gt"`, `"lt"`.
    pub operator: String,
    /// Value to compare the field against.
    pub value: serde_json::Value,
}

/// Parameters for `group_by_field`: buckets issues by a field's value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupByFieldParams {
    /// The issue list to group, normally passed as a `$ref` to an earlier
    /// call's stored result and resolved before this tool runs.
    pub data: serde_json::Value,
    /// Name of the field to group on.
    pub field: String,
}

/// Parameters for `count_by_field`: like `group_by_field` but returns only
/// per-bucket counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountByFieldParams {
    /// The issue list to count, normally passed as a `$ref` to an earlier
    /// call's stored result and resolved before this tool runs.
    pub data: serde_json::Value,
    /// Name of the field to count on.
    pub field: String,
}

/// Parameters for `extract_version`: pulls a version token out of free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractVersionParams {
    /// The text to search, e.g. an issue summary or label.
    pub text: String,
}

/// Parameters for `format_date`: reformats an ISO 8601 timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDateParams {
    /// Source timestamp, ISO 8601.
    pub value: String,
    /// `strftime`-style output pattern, e.g. `"%Y-%m-%d"`.
    pub pattern: String,
}

/// Parameters for `format_as_table`: renders a list of issues as an HTML
/// table fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatAsTableParams {
    /// The issue list to render, normally passed as a `$ref` to an earlier
    /// call's stored result and resolved before this tool runs.
    pub data: serde_json::Value,
    /// Field names to render as columns, in order.
    pub columns: Vec<String>,
}

/// Parameters for `format_as_list`: renders a list of issues as an HTML
/// unordered list fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatAsListParams {
    /// The issue list to render, normally passed as a `$ref` to an earlier
    /// call's stored result and resolved before this tool runs.
    pub data: serde_json::Value,
    /// Field to render for each list item.
    pub field: String,
}

/// Result of `group_by_field`/`count_by_field`: bucket name to member count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCounts {
    /// Ordered buckets, largest first.
    pub buckets: Vec<FieldCount>,
}

/// One bucket within a [`FieldCounts`] result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCount {
    /// The field value this bucket groups on, stringified.
    pub value: String,
    /// Number of issues sharing that value.
    pub count: usize,
}

/// Returns the JSON-schema tool catalog handed to the language model,
/// one `{name, description, parameters}` block per tool in [`ToolName::all`]
/// order.
#[must_use]
pub fn tool_definitions() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({
            "name": "search_issues",
            "description": "Run a JQL query against the issue tracker and return matching issues.",
            "parameters": {
                "type": "object",
                "properties": {
                    "jql": { "type": "string", "description": "JQL query string." },
                    "fields": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Fields to request; omit for the default set."
                    },
                    "maxResults": {
                        "type": "integer",
                        "description": "Maximum number of issues to return.",
                        "default": 100
                    }
                },
                "required": ["jql"]
            }
        }),
        serde_json::json!({
            "name": "get_cached_issues",
            "description": "Read an issue list previously stored earlier in this session instead of re-querying the tracker.",
            "parameters": {
                "type": "object",
                "properties": {
                    "sourceKey": { "type": "string", "description": "Blackboard key to read." }
                },
                "required": ["sourceKey"]
            }
        }),
        serde_json::json!({
            "name": "find_issue_by_field",
            "description": "Find the first issue in a list whose field equals a value. `data` is normally a `$ref` to an earlier call's stored result.",
            "parameters": {
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "type": "object" } },
                    "field": { "type": "string" },
                    "value": {}
                },
                "required": ["data", "field", "value"]
            }
        }),
        serde_json::json!({
            "name": "filter_issues",
            "description": "Keep issues from a list whose field matches an operator/value comparison. `data` is normally a `$ref` to an earlier call's stored result.",
            "parameters": {
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "type": "object" } },
                    "field": { "type": "string" },
                    "operator": {
                        "type": "string",
                        "enum": ["eq", "ne", "contains", "gt", "lt"]
                    },
                    "value": {}
                },
                "required": ["data", "field", "operator", "value"]
            }
        }),
        serde_json::json!({
            "name": "group_by_field",
            "description": "Group an issue list by a field's value and count members per group. `data` is normally a `$ref` to an earlier call's stored result.",
            "parameters": {
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "type": "object" } },
                    "field": { "type": "string" }
                },
                "required": ["data", "field"]
            }
        }),
        serde_json::json!({
            "name": "count_by_field",
            "description": "Count members of an issue list per distinct field value. `data` is normally a `$ref` to an earlier call's stored result.",
            "parameters": {
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "type": "object" } },
                    "field": { "type": "string" }
                },
                "required": ["data", "field"]
            }
        }),
        serde_json::json!({
            "name": "extract_version",
            "description": "Extract a semantic-version-shaped token from free text.",
            "parameters": {
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            }
        }),
        serde_json::json!({
            "name": "format_date",
            "description": "Reformat an ISO 8601 timestamp using a strftime-style pattern.",
            "parameters": {
                "type": "object",
                "properties": {
                    "value": { "type": "string" },
                    "pattern": { "type": "string" }
                },
                "required": ["value", "pattern"]
            }
        }),
        serde_json::json!({
            "name": "format_as_table",
            "description": "Render an issue list as an HTML table fragment with the given columns. `data` is normally a `$ref` to an earlier call's stored result.",
            "parameters": {
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "type": "object" } },
                    "columns": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["data", "columns"]
            }
        }),
        serde_json::json!({
            "name": "format_as_list",
            "description": "Render an issue list as an HTML unordered list fragment, one field per item. `data` is normally a `$ref` to an earlier call's stored result.",
            "parameters": {
                "type": "object",
                "properties": {
                    "data": { "type": "array", "items": { "type": "object" } },
                    "field": { "type": "string" }
                },
                "required": ["data", "field"]
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definitions_cover_every_tool_name() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), ToolName::all().len());
        for (def, name) in defs.iter().zip(ToolName::all()) {
            assert_eq!(def["name"].as_str().unwrap(), name.to_string());
        }
    }

    #[test]
    fn tool_name_round_trips_through_display_and_from_str() {
        for name in ToolName::all() {
            let s = name.to_string();
            let parsed: ToolName = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn unknown_tool_name_fails_to_parse() {
        assert!("does_not_exist".parse::<ToolName>().is_err());
    }

    #[test]
    fn search_issues_params_default_max_results() {
        let params: SearchIssuesParams =
            serde_json::from_value(serde_json::json!({ "jql": "project = X" })).unwrap();
        assert_eq!(params.max_results, 100);
        assert!(params.fields.is_none());
    }
}
