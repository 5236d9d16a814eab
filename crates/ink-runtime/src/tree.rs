use std::cell::RefCell;
use std::collections::HashMap;

use ink_core::InkError;

use crate::container::Container;
use crate::object::{DebugMetadata, Node, NodeId, NodeKind};
use crate::path::{Component, Path};
use crate::pointer::Pointer;

/// Outcome of walking a path. `approximate` is set when some component could
/// not be resolved, in which case `obj` is the deepest node that was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    pub obj: Option<NodeId>,
    pub approximate: bool,
}

impl SearchResult {
    pub fn correct_obj(&self) -> Option<NodeId> {
        if self.approximate {
            None
        } else {
            self.obj
        }
    }

    pub fn container(&self, tree: &Tree) -> Option<NodeId> {
        self.obj.filter(|id| tree.container(*id).is_some())
    }
}

/// Arena owning every node of a compiled story. Children are owned by handle;
/// each node keeps a non-owning handle to its parent.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    path_cache: RefCell<HashMap<NodeId, Path>>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        let root = Node {
            parent: None,
            kind: NodeKind::Container(Container::default()),
            debug: None,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            path_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Adds a detached node; attach it with [`Tree::add_content`].
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent: None,
            kind,
            debug: None,
        });
        id
    }

    pub fn set_debug_metadata(&mut self, id: NodeId, metadata: DebugMetadata) {
        self.nodes[id.index()].debug = Some(metadata);
    }

    pub fn add_content(&mut self, container: NodeId, child: NodeId) -> Result<(), InkError> {
        self.adopt(container, child)?;
        let child_name = self
            .container(child)
            .filter(|child_container| child_container.has_valid_name())
            .and_then(|child_container| child_container.name.clone());
        let parent = self.container_mut(container)?;
        parent.content.push(child);
        if let Some(name) = child_name {
            parent.named_content.insert(name, child);
        }
        Ok(())
    }

    /// Adds a named container that is reachable by name but not by index.
    pub fn add_named_only(&mut self, container: NodeId, child: NodeId) -> Result<(), InkError> {
        let name = self
            .container(child)
            .and_then(|child_container| child_container.name.clone())
            .ok_or_else(|| {
                InkError::new(
                    "TREE_NAMED_CONTENT",
                    "Can only add named containers to named content.",
                )
            })?;
        self.adopt(container, child)?;
        self.container_mut(container)?
            .named_content
            .insert(name, child);
        Ok(())
    }

    fn adopt(&mut self, container: NodeId, child: NodeId) -> Result<(), InkError> {
        if self.container(container).is_none() {
            return Err(InkError::new(
                "TREE_NOT_CONTAINER",
                "Content can only be added to a container.",
            ));
        }
        let node = &mut self.nodes[child.index()];
        if node.parent.is_some() || child == self.root {
            return Err(InkError::new(
                "TREE_REPARENT",
                "Content is already in a container.",
            ));
        }
        node.parent = Some(container);
        self.path_cache.borrow_mut().clear();
        Ok(())
    }

    pub(crate) fn container_mut(&mut self, id: NodeId) -> Result<&mut Container, InkError> {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Container(container) => Ok(container),
            _ => Err(InkError::new(
                "TREE_NOT_CONTAINER",
                "Content can only be added to a container.",
            )),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn container(&self, id: NodeId) -> Option<&Container> {
        self.nodes[id.index()].kind.as_container()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index as u32), node))
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.container(self.parent(id)?)?;
        parent.content.iter().position(|child| *child == id)
    }

    /// Nearest debug metadata walking up from `id`.
    pub fn debug_metadata_of(&self, id: NodeId) -> Option<&DebugMetadata> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if let Some(metadata) = &node.debug {
                return Some(metadata);
            }
            current = node.parent;
        }
        None
    }

    /// Absolute path from the root, built from names where valid, else indices.
    pub fn path_of(&self, id: NodeId) -> Path {
        if let Some(path) = self.path_cache.borrow().get(&id) {
            return path.clone();
        }

        let mut components = Vec::new();
        let mut child = id;
        while let Some(parent_id) = self.parent(child) {
            let named = self
                .container(child)
                .filter(|container| container.has_valid_name())
                .and_then(|container| container.name.clone());
            match named {
                Some(name) => components.push(Component::Name(name)),
                None => {
                    let index = self
                        .container(parent_id)
                        .and_then(|parent| parent.content.iter().position(|c| *c == child))
                        .unwrap_or(0);
                    components.push(Component::Index(index));
                }
            }
            child = parent_id;
        }
        components.reverse();

        let path = Path::new(components, false);
        self.path_cache.borrow_mut().insert(id, path.clone());
        path
    }

    pub fn path_string(&self, id: NodeId) -> String {
        self.path_of(id).to_string()
    }

    fn content_with_path_component(
        &self,
        container_id: NodeId,
        component: &Component,
    ) -> Option<NodeId> {
        let container = self.container(container_id)?;
        match component {
            Component::Index(index) => container.content.get(*index).copied(),
            Component::Name(_) if component.is_parent() => self.parent(container_id),
            Component::Name(name) => container.named_content.get(name).copied(),
        }
    }

    /// Walks `path[start..end]` from `container`. Never fails: unresolved
    /// components stop the walk and mark the result approximate.
    pub fn content_at_path(
        &self,
        container: NodeId,
        path: &Path,
        start: usize,
        end: Option<usize>,
    ) -> SearchResult {
        let end = end.unwrap_or(path.len());
        let mut current_container = Some(container);
        let mut current_obj = container;
        let mut approximate = false;

        for index in start..end {
            let Some(container_id) = current_container else {
                approximate = true;
                break;
            };
            let Some(component) = path.component(index) else {
                approximate = true;
                break;
            };
            let Some(found) = self.content_with_path_component(container_id, component) else {
                approximate = true;
                break;
            };
            let next_container = self.container(found).map(|_| found);
            if index + 1 < end && next_container.is_none() {
                approximate = true;
                break;
            }
            current_obj = found;
            current_container = next_container;
        }

        SearchResult {
            obj: Some(current_obj),
            approximate,
        }
    }

    /// Resolves relative paths from the nearest container of `from`,
    /// absolute ones from the root. For a non-container the first relative
    /// component names its parent, which is already the starting point.
    pub fn resolve_path(&self, from: NodeId, path: &Path) -> SearchResult {
        if !path.is_relative() {
            return self.content_at_path(self.root, path, 0, None);
        }
        if self.container(from).is_some() {
            return self.content_at_path(from, path, 0, None);
        }
        match self.parent(from) {
            Some(container) => self.content_at_path(container, path, 1, None),
            None => SearchResult {
                obj: None,
                approximate: true,
            },
        }
    }

    /// Converts an absolute path into a pointer; an index as last component
    /// addresses a slot of the containing container.
    pub fn pointer_at_path(&self, path: &Path) -> (Pointer, SearchResult) {
        if path.is_empty() {
            return (
                Pointer::NULL,
                SearchResult {
                    obj: None,
                    approximate: false,
                },
            );
        }

        match path.last_component() {
            Some(Component::Index(index)) => {
                let result = self.content_at_path(self.root, path, 0, Some(path.len() - 1));
                let pointer = Pointer {
                    container: result.container(self),
                    index: *index as i32,
                };
                (pointer, result)
            }
            _ => {
                let result = self.content_at_path(self.root, path, 0, None);
                let pointer = Pointer {
                    container: result.container(self),
                    index: -1,
                };
                (pointer, result)
            }
        }
    }

    /// Target of a divert node, resolved against the current tree.
    pub fn divert_target_pointer(&self, divert_id: NodeId) -> Pointer {
        let NodeKind::Divert(divert) = self.kind(divert_id) else {
            return Pointer::NULL;
        };
        let Some(target) = &divert.target_path else {
            return Pointer::NULL;
        };

        match target.last_component() {
            Some(Component::Index(index)) => {
                let owner = if target.len() > 1 {
                    let owner_path = Path::new(
                        target.components()[..target.len() - 1].to_vec(),
                        target.is_relative(),
                    );
                    self.resolve_path(divert_id, &owner_path).container(self)
                } else if target.is_relative() {
                    self.parent(divert_id)
                } else {
                    Some(self.root)
                };
                match owner {
                    Some(container) => Pointer::new(container, *index as i32),
                    None => Pointer::NULL,
                }
            }
            _ => match self
                .resolve_path(divert_id, target)
                .correct_obj()
                .filter(|id| self.container(*id).is_some())
            {
                Some(container) => Pointer::start_of(container),
                None => Pointer::NULL,
            },
        }
    }

    /// Absolute form of a divert's target path.
    pub fn divert_target_path(&self, divert_id: NodeId) -> Option<Path> {
        let NodeKind::Divert(divert) = self.kind(divert_id) else {
            return None;
        };
        let target = divert.target_path.as_ref()?;
        if !target.is_relative() {
            return Some(target.clone());
        }
        self.divert_target_pointer(divert_id).path(self)
    }

    /// Container a choice point leads to when chosen.
    pub fn choice_target(&self, choice_point_id: NodeId) -> Option<NodeId> {
        let NodeKind::ChoicePoint(choice_point) = self.kind(choice_point_id) else {
            return None;
        };
        self.resolve_path(choice_point_id, &choice_point.path_on_choice)
            .container(self)
    }

    /// Container whose read count a `CNT?` reference reads.
    pub fn count_target(&self, reference_id: NodeId) -> Option<NodeId> {
        let NodeKind::VariableReference(reference) = self.kind(reference_id) else {
            return None;
        };
        let path = reference.path_for_count.as_ref()?;
        self.resolve_path(reference_id, path)
            .correct_obj()
            .filter(|id| self.container(*id).is_some())
    }

    /// Shortest relative form of `global` as seen from `from`.
    pub fn convert_path_to_relative(&self, from: NodeId, global: &Path) -> Path {
        let own = self.path_of(from);
        let shared = own
            .components()
            .iter()
            .zip(global.components())
            .take_while(|(a, b)| a == b)
            .count();
        if shared == 0 {
            return global.clone();
        }

        let upward_moves = own.len() - shared;
        let mut components = vec![Component::parent(); upward_moves];
        components.extend(global.components()[shared..].iter().cloned());
        Path::new(components, true)
    }

    /// Whichever of the relative and absolute spellings is shorter.
    pub fn compact_path_string(&self, from: NodeId, other: &Path) -> String {
        let (relative, global) = if other.is_relative() {
            (
                other.to_string(),
                self.path_of(from).with_appended(other).to_string(),
            )
        } else {
            (
                self.convert_path_to_relative(from, other).to_string(),
                other.to_string(),
            )
        };
        if relative.len() < global.len() {
            relative
        } else {
            global
        }
    }

    /// Top-level named container such as a knot or function.
    pub fn knot_container_with_name(&self, name: &str) -> Option<NodeId> {
        self.container(self.root)?
            .named_content
            .get(name)
            .copied()
            .filter(|id| self.container(*id).is_some())
    }
}
