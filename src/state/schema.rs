//! Session schemas: the fixed set of top-level sections a session holds.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Query string -> list of results.
pub const SEARCH_RESULTS: &str = "search_results";
/// Item identifier -> detail map.
pub const ITEM_DETAILS: &str = "item_details";

/// Section names and their default values.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    sections: BTreeMap<String, Value>,
}

impl Schema {
    /// Creates a schema with no sections.
    pub fn empty() -> Self {
        Self {
            sections: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) a section.
    pub fn with_section(mut self, name: impl Into<String>, default: Value) -> Self {
        self.sections.insert(name.into(), default);
        self
    }

    pub fn contains(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// The full default state: one key per section.
    pub fn defaults(&self) -> Value {
        let map: Map<String, Value> = self
            .sections
            .iter()
            .map(|(name, default)| (name.clone(), default.clone()))
            .collect();
        Value::Object(map)
    }
}

impl Default for Schema {
    /// Search results plus item details, both empty.
    fn default() -> Self {
        Self::empty()
            .with_section(SEARCH_RESULTS, Value::Object(Map::new()))
            .with_section(ITEM_DETAILS, Value::Object(Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_schema() {
        let schema = Schema::default();
        assert!(schema.contains(SEARCH_RESULTS));
        assert!(schema.contains(ITEM_DETAILS));
        assert!(!schema.contains("photo_details"));
        assert_eq!(
            schema.defaults(),
            json!({"search_results": {}, "item_details": {}})
        );
    }

    #[test]
    fn test_custom_sections() {
        let schema = Schema::empty()
            .with_section("counters", json!({"total": 0}))
            .with_section("tags", json!([]));

        let names: Vec<&str> = schema.sections().collect();
        assert_eq!(names, vec!["counters", "tags"]);
        assert_eq!(
            schema.defaults(),
            json!({"counters": {"total": 0}, "tags": []})
        );
    }
}
