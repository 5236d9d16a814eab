use std::collections::{HashMap, HashSet};

use crate::value::Value;

/// Writes made during speculative lookahead. Reads consult the patch before
/// the shared base maps; the owning state either applies or drops it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    globals: HashMap<String, Value>,
    changed_variables: HashSet<String>,
    visit_counts: HashMap<String, i32>,
    turn_indices: HashMap<String, i32>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    pub fn changed_variables(&self) -> &HashSet<String> {
        &self.changed_variables
    }

    pub fn visit_counts(&self) -> &HashMap<String, i32> {
        &self.visit_counts
    }

    pub fn turn_indices(&self) -> &HashMap<String, i32> {
        &self.turn_indices
    }

    pub fn try_get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn add_changed_variable(&mut self, name: &str) {
        self.changed_variables.insert(name.to_string());
    }

    pub fn try_get_visit_count(&self, container_path: &str) -> Option<i32> {
        self.visit_counts.get(container_path).copied()
    }

    pub fn set_visit_count(&mut self, container_path: &str, count: i32) {
        self.visit_counts.insert(container_path.to_string(), count);
    }

    pub fn try_get_turn_index(&self, container_path: &str) -> Option<i32> {
        self.turn_indices.get(container_path).copied()
    }

    pub fn set_turn_index(&mut self, container_path: &str, index: i32) {
        self.turn_indices.insert(container_path.to_string(), index);
    }
}

#[cfg(test)]
mod patch_tests {
    use super::*;

    #[test]
    fn patch_records_overrides_by_key() {
        let mut patch = StatePatch::new();
        assert_eq!(patch.try_get_global("x"), None);
        patch.set_global("x", Value::Int(4));
        patch.add_changed_variable("x");
        patch.set_visit_count("knot", 2);
        patch.set_turn_index("knot", 5);

        assert_eq!(patch.try_get_global("x"), Some(&Value::Int(4)));
        assert!(patch.changed_variables().contains("x"));
        assert_eq!(patch.try_get_visit_count("knot"), Some(2));
        assert_eq!(patch.try_get_turn_index("knot"), Some(5));
        assert_eq!(patch.try_get_turn_index("other"), None);
    }
}
