//! Blackboard-backed `$key` reference resolution.

use std::collections::HashMap;

/// Per-session store of named intermediate results, keyed by the name
/// each tool call's result was stored under (e.g.
/// `"result_1_search_issues"`).
#[derive(Debug, Clone, Default)]
pub struct Blackboard {
    values: HashMap<String, serde_json::Value>,
}

impl Blackboard {
    /// Creates an empty blackboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, overwriting any previous value.
    pub fn store(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    /// Reads the value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Removes every stored value.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Resolves `$key` placeholders in `value` against `blackboard`.
///
/// A string of the exact form `"$key"` is replaced by the blackboard
/// value stored under `key`; any other string is left untouched. Objects
/// and arrays are walked recursively. A missing key resolves to `null`,
/// logs a warning, and appends a matching message to `warnings` rather
/// than failing the whole resolution, matching the engine's best-effort
/// dispatch policy. The caller attaches `warnings` to the call's
/// execution record.
#[must_use]
pub fn resolve_references(
    value: &serde_json::Value,
    blackboard: &Blackboard,
    warnings: &mut Vec<String>,
) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => s.strip_prefix('$').map_or_else(
            || value.clone(),
            |key| {
                blackboard.get(key).cloned().unwrap_or_else(|| {
                    let message = format!("Reference ${key} not found on blackboard; resolving to null");
                    log::warn!("{message}");
                    warnings.push(message);
                    serde_json::Value::Null
                })
            },
        ),
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| resolve_references(item, blackboard, warnings))
                .collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_references(v, blackboard, warnings)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_top_level_reference() {
        let mut board = Blackboard::new();
        board.store("issues", serde_json::json!([{ "key": "A-1" }]));

        let mut warnings = Vec::new();
        let resolved = resolve_references(&serde_json::json!("$issues"), &board, &mut warnings);
        assert_eq!(resolved, serde_json::json!([{ "key": "A-1" }]));
        assert!(warnings.is_empty());
    }

    #[test]
    fn resolves_nested_references_inside_objects_and_arrays() {
        let mut board = Blackboard::new();
        board.store("a", serde_json::json!(1));
        board.store("b", serde_json::json!(2));

        let input = serde_json::json!({ "list": ["$a", "$b", "literal"] });
        let mut warnings = Vec::new();
        let resolved = resolve_references(&input, &board, &mut warnings);
        assert_eq!(resolved, serde_json::json!({ "list": [1, 2, "literal"] }));
        assert!(warnings.is_empty());
    }

    #[test]
    fn missing_key_resolves_to_null_and_records_a_warning() {
        let board = Blackboard::new();
        let mut warnings = Vec::new();
        let resolved = resolve_references(&serde_json::json!("$missing"), &board, &mut warnings);
        assert_eq!(resolved, serde_json::Value::Null);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("$missing"));
    }

    #[test]
    fn resolution_is_idempotent_on_already_resolved_values() {
        let board = Blackboard::new();
        let mut warnings = Vec::new();
        let resolved_once = resolve_references(&serde_json::json!({"n": 1}), &board, &mut warnings);
        let resolved_twice = resolve_references(&resolved_once, &board, &mut warnings);
        assert_eq!(resolved_once, resolved_twice);
    }

    #[test]
    fn plain_strings_without_dollar_prefix_pass_through() {
        let board = Blackboard::new();
        let mut warnings = Vec::new();
        let resolved = resolve_references(&serde_json::json!("plain"), &board, &mut warnings);
        assert_eq!(resolved, serde_json::json!("plain"));
        assert!(warnings.is_empty());
    }
}
