#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Durable execution cache and report-template placeholder parser.
//!
//! [`ExecutionCache`] persists every agent run keyed by the prompt that
//! produced it, append-only and ordered by execution time. [`parser`]
//! substitutes `{{prompt:N}}` placeholders in a template against a
//! session-local override map, falling back to the cache, and finally to
//! a visible "missing" marker.

pub mod parser;

use chrono::{DateTime, Utc};
use moosicbox_json_utils::database::ToValue as _;
use report_agent_core::engine::ExecutionRecord;
use report_agent_jira::Issue;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use switchy_database::{Database, DatabaseValue};
use thiserror::Error;

/// Errors from the execution cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The underlying database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Opening or migrating the SQLite file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be decoded back into a [`CachedRun`].
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One durably stored agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRun {
    /// Row id, assigned by the cache on insert.
    pub id: String,
    /// The prompt (template placeholder id) this run answers.
    pub prompt_id: String,
    /// The HTML fragment the agent produced.
    pub html_output: String,
    /// Issues referenced by the run, extracted from its Execution
    /// History and deduplicated by `key`.
    pub issues: Vec<Issue>,
    /// Run-level metadata (iteration count, terminal condition, etc.)
    /// as produced by the agent loop.
    pub metadata: serde_json::Value,
    /// When the run was executed.
    pub executed_at: DateTime<Utc>,
}

/// Tool names whose successful results are issue lists, scanned when
/// extracting the issues a run touched.
const ISSUE_PRODUCING_TOOLS: &[&str] = &["search_issues", "get_cached_issues"];

/// Extracts the issues a run's Execution History produced, scanning
/// `search_issues`/`get_cached_issues` results and deduplicating by
/// `issue.key`, preserving first-seen order.
fn extract_issues(history: &[ExecutionRecord]) -> Vec<Issue> {
    let mut seen = HashSet::new();
    let mut issues = Vec::new();

    for record in history {
        if !record.success || !ISSUE_PRODUCING_TOOLS.contains(&record.tool_name.as_str()) {
            continue;
        }
        let Some(result) = &record.result else {
            continue;
        };
        let Ok(found) = serde_json::from_value::<Vec<Issue>>(result.clone()) else {
            continue;
        };
        for issue in found {
            if seen.insert(issue.key.clone()) {
                issues.push(issue);
            }
        }
    }

    issues
}

/// Append-only, SQLite-backed store of agent runs.
pub struct ExecutionCache {
    db: Box<dyn Database>,
}

impl ExecutionCache {
    /// Opens (creating if necessary) the SQLite database at `path` and
    /// ensures its schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the file cannot be opened, or
    /// [`CacheError::Database`] if schema creation fails.
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = switchy_database_connection::init_sqlite_rusqlite(Some(path))
            .map_err(|e| CacheError::Database(e.to_string()))?;
        let cache = Self { db };
        cache.ensure_schema().await?;
        Ok(cache)
    }

    async fn ensure_schema(&self) -> Result<(), CacheError> {
        self.db
            .exec_raw(
                "CREATE TABLE IF NOT EXISTS execution_cache (
                    id TEXT PRIMARY KEY,
                    prompt_id TEXT NOT NULL,
                    html_output TEXT NOT NULL,
                    jira_issues TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    executed_at TEXT NOT NULL
                )",
            )
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        self.db
            .exec_raw(
                "CREATE INDEX IF NOT EXISTS execution_cache_prompt_id
                    ON execution_cache(prompt_id)",
            )
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(())
    }

    /// Stores a new run for `prompt_id`, returning its assigned id.
    ///
    /// `issues` is extracted from `history` by scanning for
    /// `search_issues`/`get_cached_issues` results and deduplicating by
    /// `issue.key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the insert fails, or
    /// [`CacheError::Json`] if `issues` or `metadata` cannot be
    /// serialized.
    pub async fn store_run(
        &self,
        prompt_id: &str,
        html_output: &str,
        history: &[ExecutionRecord],
        metadata: &serde_json::Value,
    ) -> Result<String, CacheError> {
        let id = uuid::Uuid::new_v4().to_string();
        let executed_at = Utc::now().to_rfc3339();
        let issues = extract_issues(history);
        let issues_json = serde_json::to_string(&issues)?;
        let metadata_json = serde_json::to_string(metadata)?;

        self.db
            .exec_raw_params(
                "INSERT INTO execution_cache (id, prompt_id, html_output, jira_issues, metadata, executed_at)
                    VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    DatabaseValue::String(id.clone()),
                    DatabaseValue::String(prompt_id.to_string()),
                    DatabaseValue::String(html_output.to_string()),
                    DatabaseValue::String(issues_json),
                    DatabaseValue::String(metadata_json),
                    DatabaseValue::String(executed_at),
                ],
            )
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(id)
    }

    /// Returns the most recently stored run for `prompt_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn latest_for(&self, prompt_id: &str) -> Result<Option<CachedRun>, CacheError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT id, prompt_id, html_output, jira_issues, metadata, executed_at FROM execution_cache
                    WHERE prompt_id = $1 ORDER BY executed_at DESC LIMIT 1",
                &[DatabaseValue::String(prompt_id.to_string())],
            )
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        rows.first().map(row_to_run).transpose()
    }

    /// Returns every run stored for `prompt_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn all_for(&self, prompt_id: &str) -> Result<Vec<CachedRun>, CacheError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT id, prompt_id, html_output, jira_issues, metadata, executed_at FROM execution_cache
                    WHERE prompt_id = $1 ORDER BY executed_at DESC",
                &[DatabaseValue::String(prompt_id.to_string())],
            )
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        rows.iter().map(row_to_run).collect()
    }

    /// Deletes the run with the given `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<(), CacheError> {
        self.db
            .exec_raw_params(
                "DELETE FROM execution_cache WHERE id = $1",
                &[DatabaseValue::String(id.to_string())],
            )
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(())
    }
}

fn row_to_run(row: &switchy_database::Row) -> Result<CachedRun, CacheError> {
    let id: String = row.to_value("id").unwrap_or_default();
    let prompt_id: String = row.to_value("prompt_id").unwrap_or_default();
    let html_output: String = row.to_value("html_output").unwrap_or_default();
    let issues_raw: String = row.to_value("jira_issues").unwrap_or_default();
    let metadata_raw: String = row.to_value("metadata").unwrap_or_default();
    let executed_at_raw: String = row.to_value("executed_at").unwrap_or_default();

    let issues: Vec<Issue> = serde_json::from_str(&issues_raw).unwrap_or_default();
    let metadata: serde_json::Value =
        serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null);
    let executed_at = DateTime::parse_from_rfc3339(&executed_at_raw)
        .map_err(|e| CacheError::Database(e.to_string()))?
        .with_timezone(&Utc);

    Ok(CachedRun {
        id,
        prompt_id,
        html_output,
        issues,
        metadata,
        executed_at,
    })
}

/// Shared handle callers can clone cheaply across tasks.
pub type SharedExecutionCache = Arc<ExecutionCache>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_in_temp_dir() -> (ExecutionCache, std::path::PathBuf) {
        let mut path = std::env::temp_dir();
        path.push(format!("report-agent-cache-test-{}.sqlite", uuid::Uuid::new_v4()));
        let cache = ExecutionCache::open(&path).await.unwrap();
        (cache, path)
    }

    fn no_history() -> Vec<ExecutionRecord> {
        Vec::new()
    }

    fn issue(key: &str) -> Issue {
        Issue {
            key: key.to_string(),
            summary: "summary".to_string(),
            status: "Open".to_string(),
            assignee: None,
            created: "2025-01-01T00:00:00Z".to_string(),
            updated: "2025-01-01T00:00:00Z".to_string(),
            priority: "Low".to_string(),
            issuetype: "Bug".to_string(),
            labels: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    fn search_issues_record(issues: &[Issue]) -> ExecutionRecord {
        ExecutionRecord {
            call_id: "call_1".to_string(),
            tool_name: "search_issues".to_string(),
            args_snapshot: serde_json::json!({}),
            success: true,
            summary: Some("summary".to_string()),
            error: None,
            warning: None,
            result: Some(serde_json::to_value(issues).unwrap()),
        }
    }

    #[tokio::test]
    async fn store_then_latest_for_round_trips() {
        let (cache, path) = open_in_temp_dir().await;
        cache
            .store_run("prompt-1", "<p>first</p>", &no_history(), &serde_json::json!({}))
            .await
            .unwrap();
        cache
            .store_run("prompt-1", "<p>second</p>", &no_history(), &serde_json::json!({}))
            .await
            .unwrap();

        let latest = cache.latest_for("prompt-1").await.unwrap().unwrap();
        assert_eq!(latest.html_output, "<p>second</p>");

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn all_for_returns_every_run_newest_first() {
        let (cache, path) = open_in_temp_dir().await;
        cache
            .store_run("prompt-1", "<p>first</p>", &no_history(), &serde_json::json!({}))
            .await
            .unwrap();
        cache
            .store_run("prompt-1", "<p>second</p>", &no_history(), &serde_json::json!({}))
            .await
            .unwrap();

        let all = cache.all_for("prompt-1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].html_output, "<p>second</p>");

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn latest_for_unknown_prompt_is_none() {
        let (cache, path) = open_in_temp_dir().await;
        assert!(cache.latest_for("nonexistent").await.unwrap().is_none());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn delete_removes_a_run() {
        let (cache, path) = open_in_temp_dir().await;
        let id = cache
            .store_run("prompt-1", "<p>first</p>", &no_history(), &serde_json::json!({}))
            .await
            .unwrap();
        cache.delete(&id).await.unwrap();
        assert!(cache.latest_for("prompt-1").await.unwrap().is_none());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn store_run_extracts_and_dedupes_issues_from_history() {
        let (cache, path) = open_in_temp_dir().await;
        let history = vec![
            search_issues_record(&[issue("A-1"), issue("A-2")]),
            search_issues_record(&[issue("A-2"), issue("A-3")]),
        ];
        let metadata = serde_json::json!({ "iterations": 2 });

        cache
            .store_run("prompt-1", "<p>report</p>", &history, &metadata)
            .await
            .unwrap();

        let stored = cache.latest_for("prompt-1").await.unwrap().unwrap();
        let keys: Vec<&str> = stored.issues.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["A-1", "A-2", "A-3"]);
        assert_eq!(stored.metadata, metadata);

        let _ = std::fs::remove_file(path);
    }
}
