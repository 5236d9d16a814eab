use std::fmt;

use ink_core::InkError;

use crate::list::InkList;
use crate::path::Path;

/// Type ranks used to pick a common type for binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    List,
    String,
    DivertTarget,
    VariablePointer,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
    DivertTarget(Path),
    /// `context_index`: -1 unresolved, 0 global, otherwise a call stack depth + 1.
    VariablePointer { name: String, context_index: i32 },
    List(InkList),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::String(_) => ValueType::String,
            Self::DivertTarget(_) => ValueType::DivertTarget,
            Self::VariablePointer { .. } => ValueType::VariablePointer,
            Self::List(_) => ValueType::List,
        }
    }

    pub fn variable_pointer(name: impl Into<String>, context_index: i32) -> Self {
        Self::VariablePointer {
            name: name.into(),
            context_index,
        }
    }

    pub fn is_truthy(&self) -> Result<bool, InkError> {
        match self {
            Self::Bool(value) => Ok(*value),
            Self::Int(value) => Ok(*value != 0),
            Self::Float(value) => Ok(*value != 0.0),
            Self::String(value) => Ok(!value.is_empty()),
            Self::List(list) => Ok(!list.is_empty()),
            Self::DivertTarget(_) => Err(InkError::new(
                "STORY_TRUTHINESS",
                "Shouldn't be checking the truthiness of a divert target",
            )),
            Self::VariablePointer { .. } => Err(InkError::new(
                "STORY_TRUTHINESS",
                "Shouldn't be checking the truthiness of a variable pointer",
            )),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&InkList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Converts to `target`, failing where no conversion is defined.
    pub fn cast(&self, target: ValueType) -> Result<Value, InkError> {
        if self.value_type() == target {
            return Ok(self.clone());
        }
        let converted = match (self, target) {
            (Self::Bool(value), ValueType::Int) => Some(Self::Int(i32::from(*value))),
            (Self::Bool(value), ValueType::Float) => Some(Self::Float(if *value { 1.0 } else { 0.0 })),
            (Self::Bool(value), ValueType::String) => {
                Some(Self::String(if *value { "true" } else { "false" }.to_string()))
            }
            (Self::Int(value), ValueType::Bool) => Some(Self::Bool(*value != 0)),
            (Self::Int(value), ValueType::Float) => Some(Self::Float(*value as f32)),
            (Self::Int(value), ValueType::String) => Some(Self::String(value.to_string())),
            (Self::Float(value), ValueType::Bool) => Some(Self::Bool(*value != 0.0)),
            (Self::Float(value), ValueType::Int) => Some(Self::Int(*value as i32)),
            (Self::Float(value), ValueType::String) => Some(Self::String(value.to_string())),
            (Self::String(text), ValueType::Int) => text.trim().parse::<i32>().ok().map(Self::Int),
            (Self::String(text), ValueType::Float) => {
                text.trim().parse::<f32>().ok().map(Self::Float)
            }
            (Self::List(list), ValueType::Int) => Some(Self::Int(
                list.max_item().map(|(_, value)| value).unwrap_or(0),
            )),
            (Self::List(list), ValueType::Float) => Some(Self::Float(
                list.max_item().map(|(_, value)| value as f32).unwrap_or(0.0),
            )),
            (Self::List(list), ValueType::String) => Some(Self::String(
                list.max_item()
                    .map(|(item, _)| item.full_name())
                    .unwrap_or_default(),
            )),
            _ => None,
        };
        converted.ok_or_else(|| {
            InkError::new(
                "STORY_BAD_CAST",
                format!(
                    "Can't cast {} from {} to {}",
                    self,
                    self.value_type(),
                    target
                ),
            )
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", if *value { "true" } else { "false" }),
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::String(text) => write!(f, "{}", text),
            Self::DivertTarget(path) => write!(f, "DivertTargetValue({})", path),
            Self::VariablePointer { name, .. } => write!(f, "VariablePointerValue({})", name),
            Self::List(list) => write!(f, "{}", list),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<InkList> for Value {
    fn from(value: InkList) -> Self {
        Self::List(value)
    }
}
