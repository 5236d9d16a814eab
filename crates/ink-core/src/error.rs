use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fatal to the current run.
    Error,
    /// Logged, execution continues.
    Warning,
    /// Emitted by author `TODO` annotations.
    Author,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Warning => write!(f, "WARNING"),
            Self::Author => write!(f, "TODO"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct InkError {
    pub code: String,
    pub message: String,
    pub kind: ErrorKind,
}

impl InkError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind: ErrorKind::Error,
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind: ErrorKind::Warning,
        }
    }

    pub fn is_warning(&self) -> bool {
        self.kind == ErrorKind::Warning
    }
}
