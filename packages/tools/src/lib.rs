#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tool execution functions the agent loop invokes by name.
//!
//! Each function takes a `&*Params` struct from `report_agent_models` and
//! returns a `serde_json::Value` the execution engine can summarize and
//! hand back to the model. Functions that operate on an issue list take
//! that list directly rather than reaching into a blackboard themselves —
//! resolving a params struct's `data` field from a `$key` reference is the
//! execution engine's job, not the tool's.

use chrono::{DateTime, Utc};
use report_agent_jira::{Issue, IssueTracker};
use report_agent_models::{
    CountByFieldParams, ExtractVersionParams, FilterIssuesParams, FindIssueByFieldParams,
    FormatAsListParams, FormatAsTableParams, FormatDateParams, GroupByFieldParams,
    SearchIssuesParams,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while executing a tool against issue data.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The issue tracker rejected or failed the query.
    #[error("Issue tracker error: {0}")]
    Tracker(#[from] report_agent_jira::JiraError),

    /// A named field does not exist on the issue schema.
    #[error("Unknown field: {field}")]
    UnknownField {
        /// The field name that was requested.
        field: String,
    },

    /// An operator name passed to `filter_issues` is not recognized.
    #[error("Unknown filter operator: {operator}")]
    UnknownOperator {
        /// The operator string that was requested.
        operator: String,
    },

    /// A timestamp could not be parsed as ISO 8601.
    #[error("Invalid timestamp: {value}")]
    InvalidTimestamp {
        /// The value that failed to parse.
        value: String,
    },
}

/// Runs `search_issues` against a live tracker.
///
/// # Errors
///
/// Returns [`ToolError::Tracker`] if the tracker query fails.
pub async fn search_issues(
    tracker: &dyn IssueTracker,
    params: &SearchIssuesParams,
) -> Result<Vec<Issue>, ToolError> {
    let fields = params.fields.as_deref();
    let issues = tracker
        .search(&params.jql, fields, params.max_results)
        .await?;
    Ok(issues)
}

/// Looks up an issue field by name, returning it as a `Value` for
/// comparison or display.
fn field_value(issue: &Issue, field: &str) -> Result<serde_json::Value, ToolError> {
    Ok(match field {
        "key" => serde_json::Value::String(issue.key.clone()),
        "summary" => serde_json::Value::String(issue.summary.clone()),
        "status" => serde_json::Value::String(issue.status.clone()),
        "assignee" => issue
            .assignee
            .clone()
            .map_or(serde_json::Value::Null, serde_json::Value::String),
        "created" => serde_json::Value::String(issue.created.clone()),
        "updated" => serde_json::Value::String(issue.updated.clone()),
        "priority" => serde_json::Value::String(issue.priority.clone()),
        "issuetype" => serde_json::Value::String(issue.issuetype.clone()),
        "labels" => serde_json::Value::Array(
            issue
                .labels
                .iter()
                .cloned()
                .map(serde_json::Value::String)
                .collect(),
        ),
        other => issue
            .extra
            .get(other)
            .cloned()
            .ok_or_else(|| ToolError::UnknownField {
                field: other.to_string(),
            })?,
    })
}

fn field_as_display_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "(none)".to_string(),
        other => other.to_string(),
    }
}

/// Finds the first issue in `issues` whose field equals `value`.
///
/// # Errors
///
/// Returns [`ToolError::UnknownField`] if `field` does not exist on the
/// issue schema.
pub fn find_issue_by_field(
    issues: &[Issue],
    params: &FindIssueByFieldParams,
) -> Result<Option<Issue>, ToolError> {
    for issue in issues {
        let value = field_value(issue, &params.field)?;
        if value == params.value {
            return Ok(Some(issue.clone()));
        }
    }
    Ok(None)
}

fn compare(operator: &str, actual: &serde_json::Value, expected: &serde_json::Value) -> Result<bool, ToolError> {
    Ok(match operator {
        "eq" => actual == expected,
        "ne" => actual != expected,
        "contains" => match (actual, expected) {
            (serde_json::Value::String(a), serde_json::Value::String(e)) => a.contains(e.as_str()),
            (serde_json::Value::Array(a), e) => a.contains(e),
            _ => false,
        },
        "gt" | "lt" => {
            let (a, e) = (actual.as_f64(), expected.as_f64());
            match (a, e) {
                (Some(a), Some(e)) => {
                    if operator == "gt" {
                        a > e
                    } else {
                        a < e
                    }
                }
                _ => {
                    let (a, e) = (field_as_display_string(actual), field_as_display_string(expected));
                    if operator == "gt" {
                        a > e
                    } else {
                        a < e
                    }
                }
            }
        }
        other => {
            return Err(ToolError::UnknownOperator {
                operator: other.to_string(),
            })
        }
    })
}

/// Keeps issues from `issues` whose field satisfies the operator/value
/// comparison.
///
/// # Errors
///
/// Returns [`ToolError::UnknownField`] or [`ToolError::UnknownOperator`].
pub fn filter_issues(
    issues: &[Issue],
    params: &FilterIssuesParams,
) -> Result<Vec<Issue>, ToolError> {
    let mut out = Vec::new();
    for issue in issues {
        let actual = field_value(issue, &params.field)?;
        if compare(&params.operator, &actual, &params.value)? {
            out.push(issue.clone());
        }
    }
    Ok(out)
}

/// Groups `issues` by a field's display value, preserving first-seen
/// bucket order.
///
/// # Errors
///
/// Returns [`ToolError::UnknownField`] if `field` does not exist.
pub fn group_by_field(
    issues: &[Issue],
    params: &GroupByFieldParams,
) -> Result<BTreeMap<String, Vec<Issue>>, ToolError> {
    let mut groups: BTreeMap<String, Vec<Issue>> = BTreeMap::new();
    for issue in issues {
        let value = field_value(issue, &params.field)?;
        groups
            .entry(field_as_display_string(&value))
            .or_default()
            .push(issue.clone());
    }
    Ok(groups)
}

/// Counts `issues` per distinct field value, returned largest bucket first.
///
/// # Errors
///
/// Returns [`ToolError::UnknownField`] if `field` does not exist.
pub fn count_by_field(
    issues: &[Issue],
    params: &CountByFieldParams,
) -> Result<Vec<(String, usize)>, ToolError> {
    let groups = group_by_field(
        issues,
        &GroupByFieldParams {
            data: serde_json::Value::Null,
            field: params.field.clone(),
        },
    )?;
    let mut counts: Vec<(String, usize)> =
        groups.into_iter().map(|(k, v)| (k, v.len())).collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(counts)
}

/// Extracts the first semantic-version-shaped token (`MAJOR.MINOR[.PATCH]`)
/// from `text`, if any.
#[must_use]
pub fn extract_version(params: &ExtractVersionParams) -> Option<String> {
    let bytes = params.text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            let mut j = i;
            let mut seen_dot = false;
            while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j] == b'.') {
                if bytes[j] == b'.' {
                    seen_dot = true;
                }
                j += 1;
            }
            if seen_dot {
                let candidate = &params.text[start..j];
                let trimmed = candidate.trim_end_matches('.');
                if trimmed.split('.').all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())) {
                    return Some(trimmed.to_string());
                }
            }
            i = j.max(i + 1);
        } else {
            i += 1;
        }
    }
    None
}

/// Reformats an ISO 8601 timestamp using a `strftime`-style pattern.
///
/// # Errors
///
/// Returns [`ToolError::InvalidTimestamp`] if `value` cannot be parsed.
pub fn format_date(params: &FormatDateParams) -> Result<String, ToolError> {
    let parsed: DateTime<Utc> = params
        .value
        .parse()
        .map_err(|_| ToolError::InvalidTimestamp {
            value: params.value.clone(),
        })?;
    Ok(parsed.format(&params.pattern).to_string())
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders `issues` as an HTML table fragment with the given columns.
///
/// # Errors
///
/// Returns [`ToolError::UnknownField`] if a requested column does not
/// exist.
pub fn format_as_table(issues: &[Issue], params: &FormatAsTableParams) -> Result<String, ToolError> {
    let mut html = String::from("<table>\n<thead><tr>");
    for column in &params.columns {
        html.push_str(&format!("<th>{}</th>", html_escape(column)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for issue in issues {
        html.push_str("<tr>");
        for column in &params.columns {
            let value = field_value(issue, column)?;
            html.push_str(&format!(
                "<td>{}</td>",
                html_escape(&field_as_display_string(&value))
            ));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    Ok(html)
}

/// Renders `issues` as an HTML unordered list fragment, one field per item.
///
/// # Errors
///
/// Returns [`ToolError::UnknownField`] if `field` does not exist.
pub fn format_as_list(issues: &[Issue], params: &FormatAsListParams) -> Result<String, ToolError> {
    let mut html = String::from("<ul>\n");
    for issue in issues {
        let value = field_value(issue, &params.field)?;
        html.push_str(&format!(
            "<li>{}</li>\n",
            html_escape(&field_as_display_string(&value))
        ));
    }
    html.push_str("</ul>");
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_agent_jira::InMemoryIssueTracker;

    fn sample(key: &str, status: &str, priority: &str) -> Issue {
        Issue {
            key: key.to_string(),
            summary: format!("Fix thing in {key}"),
            status: status.to_string(),
            assignee: Some("Alice".to_string()),
            created: "2025-01-01T00:00:00Z".to_string(),
            updated: "2025-02-15T12:30:00Z".to_string(),
            priority: priority.to_string(),
            issuetype: "Bug".to_string(),
            labels: vec!["v2.3.1".to_string()],
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn search_issues_delegates_to_tracker() {
        let tracker = InMemoryIssueTracker::new(vec![sample("A-1", "Open", "High")]);
        let params = SearchIssuesParams {
            jql: "project = A".to_string(),
            fields: None,
            max_results: 10,
        };
        let issues = search_issues(&tracker, &params).await.unwrap();
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn find_issue_by_field_matches_on_key() {
        let issues = vec![sample("A-1", "Open", "High"), sample("A-2", "Done", "Low")];
        let params = FindIssueByFieldParams {
            data: serde_json::Value::Null,
            field: "key".to_string(),
            value: serde_json::json!("A-2"),
        };
        let found = find_issue_by_field(&issues, &params).unwrap();
        assert_eq!(found.unwrap().key, "A-2");
    }

    #[test]
    fn filter_issues_eq_and_contains() {
        let issues = vec![sample("A-1", "Open", "High"), sample("A-2", "Done", "Low")];
        let eq = filter_issues(
            &issues,
            &FilterIssuesParams {
                data: serde_json::Value::Null,
                field: "status".to_string(),
                operator: "eq".to_string(),
                value: serde_json::json!("Open"),
            },
        )
        .unwrap();
        assert_eq!(eq.len(), 1);

        let contains = filter_issues(
            &issues,
            &FilterIssuesParams {
                data: serde_json::Value::Null,
                field: "summary".to_string(),
                operator: "contains".to_string(),
                value: serde_json::json!("A-2"),
            },
        )
        .unwrap();
        assert_eq!(contains.len(), 1);
        assert_eq!(contains[0].key, "A-2");
    }

    #[test]
    fn filter_issues_rejects_unknown_operator() {
        let issues = vec![sample("A-1", "Open", "High")];
        let err = filter_issues(
            &issues,
            &FilterIssuesParams {
                data: serde_json::Value::Null,
                field: "status".to_string(),
                operator: "fuzzy".to_string(),
                value: serde_json::json!("Open"),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::UnknownOperator { .. }));
    }

    #[test]
    fn count_by_field_sorts_largest_first() {
        let issues = vec![
            sample("A-1", "Open", "High"),
            sample("A-2", "Open", "High"),
            sample("A-3", "Done", "Low"),
        ];
        let counts = count_by_field(
            &issues,
            &CountByFieldParams {
                data: serde_json::Value::Null,
                field: "status".to_string(),
            },
        )
        .unwrap();
        assert_eq!(counts[0], ("Open".to_string(), 2));
        assert_eq!(counts[1], ("Done".to_string(), 1));
    }

    #[test]
    fn extract_version_finds_dotted_token() {
        let params = ExtractVersionParams {
            text: "Upgrade to release 2.3.1 before launch".to_string(),
        };
        assert_eq!(extract_version(&params), Some("2.3.1".to_string()));
    }

    #[test]
    fn extract_version_returns_none_without_a_match() {
        let params = ExtractVersionParams {
            text: "No version here".to_string(),
        };
        assert_eq!(extract_version(&params), None);
    }

    #[test]
    fn format_date_applies_pattern() {
        let params = FormatDateParams {
            value: "2025-02-15T12:30:00Z".to_string(),
            pattern: "%Y-%m-%d".to_string(),
        };
        assert_eq!(format_date(&params).unwrap(), "2025-02-15");
    }

    #[test]
    fn format_date_rejects_invalid_timestamp() {
        let params = FormatDateParams {
            value: "not-a-date".to_string(),
            pattern: "%Y-%m-%d".to_string(),
        };
        assert!(format_date(&params).is_err());
    }

    #[test]
    fn format_as_table_escapes_html() {
        let mut issue = sample("A-1", "Open", "High");
        issue.summary = "<script>alert(1)</script>".to_string();
        let html = format_as_table(
            &[issue],
            &FormatAsTableParams {
                data: serde_json::Value::Null,
                columns: vec!["key".to_string(), "summary".to_string()],
            },
        )
        .unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn format_as_list_renders_one_item_per_issue() {
        let issues = vec![sample("A-1", "Open", "High"), sample("A-2", "Done", "Low")];
        let html = format_as_list(
            &issues,
            &FormatAsListParams {
                data: serde_json::Value::Null,
                field: "key".to_string(),
            },
        )
        .unwrap();
        assert_eq!(html.matches("<li>").count(), 2);
    }
}
