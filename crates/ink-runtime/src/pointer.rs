use crate::object::NodeId;
use crate::path::{Component, Path};
use crate::tree::Tree;

/// A lazily resolved location: a container plus an index within it.
/// An index of `-1` addresses the container itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointer {
    pub container: Option<NodeId>,
    pub index: i32,
}

impl Default for Pointer {
    fn default() -> Self {
        Self::NULL
    }
}

impl Pointer {
    pub const NULL: Pointer = Pointer {
        container: None,
        index: -1,
    };

    pub fn new(container: NodeId, index: i32) -> Self {
        Self {
            container: Some(container),
            index,
        }
    }

    pub fn start_of(container: NodeId) -> Self {
        Self::new(container, 0)
    }

    pub fn is_null(&self) -> bool {
        self.container.is_none()
    }

    /// Resolves against the current tree; never cached.
    pub fn resolve(&self, tree: &Tree) -> Option<NodeId> {
        let container_id = self.container?;
        if self.index < 0 {
            return Some(container_id);
        }
        let container = tree.container(container_id)?;
        if container.content.is_empty() {
            return Some(container_id);
        }
        container.content.get(self.index as usize).copied()
    }

    pub fn path(&self, tree: &Tree) -> Option<Path> {
        let container_id = self.container?;
        let container_path = tree.path_of(container_id);
        if self.index >= 0 {
            Some(container_path.with_appended_component(Component::Index(self.index as usize)))
        } else {
            Some(container_path)
        }
    }
}
