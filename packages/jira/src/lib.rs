#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Issue-tracking client abstraction.
//!
//! The agentic core never speaks HTTP to Jira directly — it depends only on
//! the narrow [`IssueTracker`] trait, which exposes a single JQL-style query
//! operation. Authentication, pagination, and retry policy belong to the
//! concrete implementation and are invisible to the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from an issue-tracking client.
#[derive(Debug, Error)]
pub enum JiraError {
    /// The underlying HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body could not be decoded.
    #[error("Response decoding error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The tracker rejected the query itself (malformed JQL, auth failure).
    #[error("Query error: {message}")]
    Query {
        /// Description of what went wrong.
        message: String,
    },
}

/// A single issue as returned by the tracker.
///
/// Mirrors the minimum field set the core relies on; trackers may return
/// additional fields, which are preserved in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Issue key, e.g. `"PROJ-123"`.
    pub key: String,
    /// Short summary/title.
    pub summary: String,
    /// Workflow status name, e.g. `"Done"`.
    pub status: String,
    /// Assignee display name, if assigned.
    pub assignee: Option<String>,
    /// Creation timestamp (ISO 8601).
    pub created: String,
    /// Last-updated timestamp (ISO 8601).
    pub updated: String,
    /// Priority name, e.g. `"High"`.
    pub priority: String,
    /// Issue type name, e.g. `"Bug"`.
    pub issuetype: String,
    /// Labels attached to the issue.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Any additional fields requested but not modeled above.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Trait for a query surface over an issue tracker.
///
/// Implementations are responsible for their own authentication, retries,
/// and pagination; the core treats any failure here as a tool failure.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Executes a JQL-like query and returns matching issues.
    ///
    /// `fields` restricts the fields requested from the tracker; `None`
    /// means the tracker's default field set. `max_results` caps the number
    /// of issues returned.
    ///
    /// # Errors
    ///
    /// Returns [`JiraError`] if the query is rejected or the transport
    /// fails.
    async fn search(
        &self,
        jql: &str,
        fields: Option<&[String]>,
        max_results: u32,
    ) -> Result<Vec<Issue>, JiraError>;
}

/// HTTP-backed Jira client using the REST `/rest/api/2/search` endpoint.
pub struct HttpJiraClient {
    base_url: String,
    email: String,
    api_token: String,
    client: reqwest::Client,
}

impl HttpJiraClient {
    /// Creates a new client against `base_url` (e.g.
    /// `https://yourcompany.atlassian.net`) authenticating with basic auth.
    #[must_use]
    pub fn new(base_url: String, email: String, api_token: String) -> Self {
        Self {
            base_url,
            email,
            api_token,
            client: reqwest::Client::new(),
        }
    }

    /// Builds a client from the `JIRA_BASE_URL`, `JIRA_EMAIL`, and
    /// `JIRA_API_TOKEN` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`JiraError::Query`] if any required variable is unset.
    pub fn from_env() -> Result<Self, JiraError> {
        let base_url = std::env::var("JIRA_BASE_URL").map_err(|_| JiraError::Query {
            message: "JIRA_BASE_URL environment variable not set".to_string(),
        })?;
        let email = std::env::var("JIRA_EMAIL").map_err(|_| JiraError::Query {
            message: "JIRA_EMAIL environment variable not set".to_string(),
        })?;
        let api_token = std::env::var("JIRA_API_TOKEN").map_err(|_| JiraError::Query {
            message: "JIRA_API_TOKEN environment variable not set".to_string(),
        })?;
        Ok(Self::new(base_url, email, api_token))
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    jql: &'a str,
    #[serde(rename = "maxResults")]
    max_results: u32,
    fields: Vec<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    issues: Vec<RawIssue>,
}

#[derive(Deserialize)]
struct RawIssue {
    key: String,
    fields: serde_json::Value,
}

#[async_trait]
impl IssueTracker for HttpJiraClient {
    async fn search(
        &self,
        jql: &str,
        fields: Option<&[String]>,
        max_results: u32,
    ) -> Result<Vec<Issue>, JiraError> {
        let requested_fields = fields.map_or_else(
            || {
                vec![
                    "summary".to_string(),
                    "status".to_string(),
                    "assignee".to_string(),
                    "created".to_string(),
                    "updated".to_string(),
                    "priority".to_string(),
                    "issuetype".to_string(),
                    "labels".to_string(),
                ]
            },
            <[String]>::to_vec,
        );

        let request = SearchRequest {
            jql,
            max_results,
            fields: requested_fields,
        };

        log::debug!("Jira search: {jql} (max {max_results})");

        let resp = self
            .client
            .post(format!("{}/rest/api/2/search", self.base_url))
            .basic_auth(&self.email, Some(&self.api_token))
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(JiraError::Query {
                message: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: SearchResponse = serde_json::from_str(&body)?;

        Ok(parsed.issues.into_iter().map(raw_to_issue).collect())
    }
}

fn raw_to_issue(raw: RawIssue) -> Issue {
    let f = raw.fields;
    let status = f["status"]["name"].as_str().unwrap_or("Unknown").to_string();
    let assignee = f["assignee"]["displayName"].as_str().map(String::from);
    let priority = f["priority"]["name"].as_str().unwrap_or("None").to_string();
    let issuetype = f["issuetype"]["name"].as_str().unwrap_or("Unknown").to_string();
    let labels = f["labels"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Issue {
        key: raw.key,
        summary: f["summary"].as_str().unwrap_or_default().to_string(),
        status,
        assignee,
        created: f["created"].as_str().unwrap_or_default().to_string(),
        updated: f["updated"].as_str().unwrap_or_default().to_string(),
        priority,
        issuetype,
        labels,
        extra: serde_json::Map::new(),
    }
}

/// In-memory tracker backed by a fixed issue set, used in tests and for
/// offline/local development.
pub struct InMemoryIssueTracker {
    issues: Vec<Issue>,
}

impl InMemoryIssueTracker {
    /// Creates a tracker that always returns (a prefix of) `issues`,
    /// regardless of the JQL text.
    #[must_use]
    pub const fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }
}

#[async_trait]
impl IssueTracker for InMemoryIssueTracker {
    async fn search(
        &self,
        jql: &str,
        _fields: Option<&[String]>,
        max_results: u32,
    ) -> Result<Vec<Issue>, JiraError> {
        log::debug!("In-memory Jira search ignoring JQL: {jql}");
        Ok(self
            .issues
            .iter()
            .take(max_results as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_issue(key: &str) -> Issue {
        Issue {
            key: key.to_string(),
            summary: "Sample issue".to_string(),
            status: "Open".to_string(),
            assignee: Some("Alice".to_string()),
            created: "2025-10-01T00:00:00Z".to_string(),
            updated: "2025-10-02T00:00:00Z".to_string(),
            priority: "High".to_string(),
            issuetype: "Bug".to_string(),
            labels: vec!["backend".to_string()],
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_tracker_caps_at_max_results() {
        let tracker = InMemoryIssueTracker::new(vec![
            sample_issue("A-1"),
            sample_issue("A-2"),
            sample_issue("A-3"),
        ]);

        let result = tracker.search("project = A", None, 2).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].key, "A-1");
    }

    #[tokio::test]
    async fn in_memory_tracker_returns_all_when_under_cap() {
        let tracker = InMemoryIssueTracker::new(vec![sample_issue("A-1")]);
        let result = tracker.search("project = A", None, 50).await.unwrap();
        assert_eq!(result.len(), 1);
    }
}
