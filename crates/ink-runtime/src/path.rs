use std::fmt;

/// Name of the component that addresses a node's parent.
pub const PARENT_ID: &str = "^";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Component {
    Index(usize),
    Name(String),
}

impl Component {
    pub fn parent() -> Self {
        Self::Name(PARENT_ID.to_string())
    }

    pub fn is_parent(&self) -> bool {
        matches!(self, Self::Name(name) if name == PARENT_ID)
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Name(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Index(_) => None,
            Self::Name(name) => Some(name),
        }
    }

    fn parse(part: &str) -> Self {
        match part.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(part.to_string()),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Structural address of a node in the content tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    components: Vec<Component>,
    is_relative: bool,
}

impl Path {
    pub fn new(components: Vec<Component>, is_relative: bool) -> Self {
        Self {
            components,
            is_relative,
        }
    }

    /// The relative path that addresses the node it is resolved from.
    pub fn self_path() -> Self {
        Self {
            components: Vec::new(),
            is_relative: true,
        }
    }

    /// Parses the dotted form, where a leading `.` marks a relative path.
    pub fn parse(text: &str) -> Self {
        let (is_relative, body) = match text.strip_prefix('.') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let components = if body.is_empty() {
            Vec::new()
        } else {
            body.split('.').map(Component::parse).collect()
        };
        Self {
            components,
            is_relative,
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    pub fn is_relative(&self) -> bool {
        self.is_relative
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn head(&self) -> Option<&Component> {
        self.components.first()
    }

    pub fn last_component(&self) -> Option<&Component> {
        self.components.last()
    }

    /// Everything after the head, as an absolute path.
    pub fn tail(&self) -> Path {
        Path {
            components: self.components.iter().skip(1).cloned().collect(),
            is_relative: false,
        }
    }

    pub fn contains_named_component(&self) -> bool {
        self.components.iter().any(|component| !component.is_index())
    }

    /// Appends `other`, first consuming its leading parent markers by
    /// trimming as many trailing components from this path.
    pub fn with_appended(&self, other: &Path) -> Path {
        let upward_moves = other
            .components
            .iter()
            .take_while(|component| component.is_parent())
            .count();
        let keep = self.components.len().saturating_sub(upward_moves);

        let mut components = self.components[..keep].to_vec();
        components.extend(other.components[upward_moves..].iter().cloned());
        Path {
            components,
            is_relative: false,
        }
    }

    pub fn with_appended_component(&self, component: Component) -> Path {
        let mut components = self.components.clone();
        components.push(component);
        Path {
            components,
            is_relative: self.is_relative,
        }
    }

    /// Dotted form without the relative marker.
    pub fn components_string(&self) -> String {
        self.components
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_relative {
            write!(f, ".")?;
        }
        write!(f, "{}", self.components_string())
    }
}
