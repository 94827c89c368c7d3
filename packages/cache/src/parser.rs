//! Report-template placeholder substitution.
//!
//! Templates reference earlier prompt executions with `{{prompt:N}}`
//! tokens. Each token resolves, in order, against a caller-supplied
//! override map (freshly computed results not yet persisted), then the
//! durable [`ExecutionCache`](crate::ExecutionCache), and finally falls
//! back to a visible placeholder noting the execution is missing.

use crate::{CacheError, ExecutionCache};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a placeholder's substitution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderSource {
    /// Resolved from the caller's override map.
    Override,
    /// Resolved from the durable cache.
    Cache,
}

/// One placeholder occurrence and how it was resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceholderResolution {
    /// The prompt id referenced, e.g. `"3"` for `{{prompt:3}}`.
    pub prompt_id: String,
    /// Whether a value was found for it.
    pub found: bool,
    /// Where the value came from, if found.
    pub source: Option<PlaceholderSource>,
}

/// The result of parsing one template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTemplate {
    /// The template with every placeholder substituted.
    pub html: String,
    /// One entry per placeholder occurrence, in order of appearance.
    pub placeholders: Vec<PlaceholderResolution>,
    /// Prompt ids that had no override and no cached execution.
    pub missing_executions: Vec<String>,
}

fn placeholder_positions(template: &str) -> Vec<(usize, usize, String)> {
    let bytes = template.as_bytes();
    let mut matches = Vec::new();
    let mut i = 0;
    while i + 2 < bytes.len() {
        if &bytes[i..i + 2] == b"{{" {
            if let Some(close) = template[i..].find("}}") {
                let inner = &template[i + 2..i + close];
                if let Some(id) = inner.strip_prefix("prompt:") {
                    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                        matches.push((i, i + close + 2, id.to_string()));
                        i += close + 2;
                        continue;
                    }
                }
            }
        }
        i += 1;
    }
    matches
}

fn missing_placeholder_html(prompt_id: &str) -> String {
    format!(
        "<div class=\"missing-execution\" data-prompt-id=\"{prompt_id}\">[No cached result for prompt {prompt_id}]</div>"
    )
}

/// Substitutes every `{{prompt:N}}` token in `template`.
///
/// `overrides` takes precedence over the durable cache for a given prompt
/// id, letting a caller splice in a result it just computed without
/// round-tripping it through storage first.
///
/// # Errors
///
/// Returns [`CacheError`] only if a cache lookup itself fails; a missing
/// entry is not an error; it produces a visible placeholder instead.
pub async fn parse_template(
    template: &str,
    cache: Option<&ExecutionCache>,
    overrides: &HashMap<String, String>,
) -> Result<ParsedTemplate, CacheError> {
    let matches = placeholder_positions(template);

    let mut html = String::with_capacity(template.len());
    let mut cursor = 0;
    let mut placeholders = Vec::with_capacity(matches.len());
    let mut missing_executions = Vec::new();

    for (start, end, prompt_id) in matches {
        html.push_str(&template[cursor..start]);

        if let Some(value) = overrides.get(&prompt_id) {
            html.push_str(value);
            placeholders.push(PlaceholderResolution {
                prompt_id: prompt_id.clone(),
                found: true,
                source: Some(PlaceholderSource::Override),
            });
        } else {
            let cached = match cache {
                Some(cache) => cache.latest_for(&prompt_id).await?,
                None => None,
            };

            if let Some(run) = cached {
                html.push_str(&run.html_output);
                placeholders.push(PlaceholderResolution {
                    prompt_id: prompt_id.clone(),
                    found: true,
                    source: Some(PlaceholderSource::Cache),
                });
            } else {
                html.push_str(&missing_placeholder_html(&prompt_id));
                placeholders.push(PlaceholderResolution {
                    prompt_id: prompt_id.clone(),
                    found: false,
                    source: None,
                });
                missing_executions.push(prompt_id);
            }
        }

        cursor = end;
    }

    html.push_str(&template[cursor..]);

    Ok(ParsedTemplate {
        html,
        placeholders,
        missing_executions,
    })
}

/// Returns the distinct prompt ids a template references, in order of
/// first appearance.
#[must_use]
pub fn extract_prompt_ids(template: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for (_, _, id) in placeholder_positions(template) {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

/// Returns `true` if `template` contains at least one well-formed
/// `{{prompt:N}}` placeholder.
#[must_use]
pub fn validate_template(template: &str) -> bool {
    !placeholder_positions(template).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn override_takes_precedence_over_cache() {
        let mut overrides = HashMap::new();
        overrides.insert("1".to_string(), "<p>fresh</p>".to_string());

        let result = parse_template("before {{prompt:1}} after", None, &overrides)
            .await
            .unwrap();

        assert_eq!(result.html, "before <p>fresh</p> after");
        assert_eq!(result.placeholders[0].source, Some(PlaceholderSource::Override));
        assert!(result.missing_executions.is_empty());
    }

    #[tokio::test]
    async fn missing_prompt_produces_a_visible_placeholder() {
        let overrides = HashMap::new();
        let result = parse_template("{{prompt:9}}", None, &overrides).await.unwrap();

        assert!(result.html.contains("missing-execution"));
        assert_eq!(result.missing_executions, vec!["9".to_string()]);
    }

    #[test]
    fn extract_prompt_ids_deduplicates_and_preserves_order() {
        let ids = extract_prompt_ids("{{prompt:3}} and {{prompt:1}} and {{prompt:3}} again");
        assert_eq!(ids, vec!["3".to_string(), "1".to_string()]);
    }

    #[test]
    fn validate_template_rejects_templates_without_placeholders() {
        assert!(!validate_template("just plain text"));
        assert!(validate_template("has a {{prompt:2}} placeholder"));
    }

    #[test]
    fn malformed_placeholder_is_ignored() {
        let ids = extract_prompt_ids("{{prompt:abc}} {{prompt:}} {{prompt:5}}");
        assert_eq!(ids, vec!["5".to_string()]);
    }
}
