use std::collections::BTreeMap;

use crate::object::NodeId;

const VISITS_FLAG: i64 = 0x1;
const TURNS_FLAG: i64 = 0x2;
const COUNT_START_ONLY_FLAG: i64 = 0x4;

/// The only composite node: ordered children plus a name index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Container {
    pub name: Option<String>,
    pub content: Vec<NodeId>,
    /// Named children; a child may also appear in `content`.
    pub named_content: BTreeMap<String, NodeId>,
    pub visits_should_be_counted: bool,
    pub turn_index_should_be_counted: bool,
    pub counting_at_start_only: bool,
}

impl Container {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn has_valid_name(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.is_empty())
    }

    pub fn count_flags(&self) -> i64 {
        let mut flags = 0;
        if self.visits_should_be_counted {
            flags |= VISITS_FLAG;
        }
        if self.turn_index_should_be_counted {
            flags |= TURNS_FLAG;
        }
        if self.counting_at_start_only {
            flags |= COUNT_START_ONLY_FLAG;
        }
        // Start-only counting is meaningless without visit counting.
        if flags == COUNT_START_ONLY_FLAG {
            flags = 0;
        }
        flags
    }

    pub fn set_count_flags(&mut self, flags: i64) {
        self.visits_should_be_counted = flags & VISITS_FLAG != 0;
        self.turn_index_should_be_counted = flags & TURNS_FLAG != 0;
        self.counting_at_start_only = flags & COUNT_START_ONLY_FLAG != 0;
    }
}
