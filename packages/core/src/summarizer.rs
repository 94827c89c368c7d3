//! Bounded JSON projection of tool results for the model context window.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Default character budget for a summarized result before truncation.
pub const DEFAULT_MAX_CHARS: usize = 8000;

const LIST_FULL_THRESHOLD: usize = 50;
const LIST_HEAD: usize = 30;
const LIST_TAIL: usize = 20;
const FIELD_STATS_FIELD_LIMIT: usize = 10;
const FIELD_STATS_TOP_VALUES: usize = 5;

/// Projects `result` into a bounded JSON value suitable for inclusion in
/// the model context, then truncates its serialized form to `max_chars`.
#[must_use]
pub fn summarize(result: &Value, max_chars: usize) -> String {
    let projected = project(result);
    let serialized =
        serde_json::to_string(&projected).unwrap_or_else(|_| "\"<unserializable result>\"".to_string());

    if serialized.chars().count() > max_chars {
        let mut truncated: String = serialized.chars().take(max_chars).collect();
        truncated.push_str("... [truncated]");
        truncated
    } else {
        serialized
    }
}

fn project(result: &Value) -> Value {
    match result {
        Value::Null => serde_json::json!({ "status": "no_result" }),
        Value::Array(items) => project_list(items),
        other => other.clone(),
    }
}

/// Projects a tool result list into the standard envelope:
/// `{"type":"list","count":N,"items":[...]}`, with `truncated`,
/// `sampling`, and (for object lists) `field_statistics` added when the
/// list exceeds [`LIST_FULL_THRESHOLD`].
fn project_list(items: &[Value]) -> Value {
    if items.len() <= LIST_FULL_THRESHOLD {
        return serde_json::json!({
            "type": "list",
            "count": items.len(),
            "items": items,
        });
    }

    let head: Vec<Value> = items.iter().take(LIST_HEAD).cloned().collect();
    let tail: Vec<Value> = items
        .iter()
        .skip(items.len().saturating_sub(LIST_TAIL))
        .cloned()
        .collect();
    let sampled: Vec<Value> = head.into_iter().chain(tail).collect();

    let mut envelope = serde_json::json!({
        "type": "list",
        "count": items.len(),
        "items": sampled,
        "truncated": true,
        "sampling": format!("first {LIST_HEAD} + last {LIST_TAIL}"),
    });

    if items.iter().all(Value::is_object) {
        if let Value::Object(map) = &mut envelope {
            map.insert("field_statistics".to_string(), field_statistics(items));
        }
    }

    envelope
}

fn field_statistics(items: &[Value]) -> Value {
    let Some(Value::Object(first)) = items.first() else {
        return serde_json::json!({});
    };
    let field_names: Vec<String> = first.keys().take(FIELD_STATS_FIELD_LIMIT).cloned().collect();

    let mut stats = Map::new();
    for field in &field_names {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut total = 0usize;
        for item in items {
            if let Value::Object(map) = item {
                if let Some(value) = map.get(field) {
                    total += 1;
                    *counts.entry(display(value)).or_insert(0) += 1;
                }
            }
        }

        let unique = counts.len();
        let mut top: Vec<(String, usize)> = counts.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(FIELD_STATS_TOP_VALUES);

        stats.insert(
            field.clone(),
            serde_json::json!({
                "total": total,
                "unique": unique,
                "top_values": top.into_iter().map(|(value, count)| serde_json::json!({
                    "value": value,
                    "count": count,
                })).collect::<Vec<_>>(),
            }),
        );
    }

    Value::Object(stats)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_result_becomes_no_result_status() {
        let summarized = summarize(&Value::Null, DEFAULT_MAX_CHARS);
        assert_eq!(summarized, r#"{"status":"no_result"}"#);
    }

    #[test]
    fn short_lists_use_the_list_envelope() {
        let items: Vec<Value> = (0..5).map(|i| serde_json::json!(i)).collect();
        let summarized = summarize(&Value::Array(items.clone()), DEFAULT_MAX_CHARS);
        let roundtrip: Value = serde_json::from_str(&summarized).unwrap();
        assert_eq!(roundtrip["type"], serde_json::json!("list"));
        assert_eq!(roundtrip["count"], serde_json::json!(5));
        assert_eq!(roundtrip["items"], Value::Array(items));
        assert!(roundtrip.get("truncated").is_none());
    }

    #[test]
    fn long_scalar_lists_sample_head_and_tail() {
        let items: Vec<Value> = (0..200).map(|i| serde_json::json!(i)).collect();
        let summarized = summarize(&Value::Array(items), DEFAULT_MAX_CHARS * 10);
        let roundtrip: Value = serde_json::from_str(&summarized).unwrap();
        assert_eq!(roundtrip["count"], serde_json::json!(200));
        assert_eq!(roundtrip["truncated"], serde_json::json!(true));
        assert_eq!(roundtrip["items"].as_array().unwrap().len(), LIST_HEAD + LIST_TAIL);
    }

    #[test]
    fn long_object_lists_include_both_sampled_items_and_field_statistics() {
        let items: Vec<Value> = (0..100)
            .map(|i| serde_json::json!({ "status": if i % 2 == 0 { "Open" } else { "Done" } }))
            .collect();
        let summarized = summarize(&Value::Array(items), DEFAULT_MAX_CHARS * 10);
        let roundtrip: Value = serde_json::from_str(&summarized).unwrap();

        assert_eq!(roundtrip["count"], serde_json::json!(100));
        assert_eq!(roundtrip["items"].as_array().unwrap().len(), LIST_HEAD + LIST_TAIL);

        let status_stats = &roundtrip["field_statistics"]["status"];
        assert_eq!(status_stats["total"], serde_json::json!(100));
        assert_eq!(status_stats["unique"], serde_json::json!(2));
        assert!(status_stats["top_values"].as_array().unwrap().len() <= FIELD_STATS_TOP_VALUES);
    }

    #[test]
    fn oversized_serialization_is_truncated_with_suffix() {
        let big = Value::String("x".repeat(1000));
        let summarized = summarize(&big, 50);
        assert!(summarized.ends_with("... [truncated]"));
        assert!(summarized.len() < 1000);
    }
}
