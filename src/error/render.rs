//! Errors generated when rendering templates.
use crate::error::IoError;
use std::fmt;
use thiserror::Error;

#[derive(Error)]
pub enum RenderError {
    /// Generic runtime failure.
    #[error("{0}")]
    Message(String),
    /// Strict mode lookup failure; carries the variable name.
    #[error("Variable '{0}' not found, check the variable path and verify the template data")]
    VariableNotFound(String),
    /// Access on the undefined sentinel where a value is required.
    #[error("'{0}' is undefined")]
    Undefined(String),
    #[error("Filter '{0}' not found")]
    FilterNotFound(String),
    #[error("Test '{0}' not found")]
    TestNotFound(String),
    #[error("'{0}' is not callable")]
    NotCallable(String),
    #[error("'{0}' object is not iterable")]
    NotIterable(&'static str),
    #[error("not enough values to unpack (expected {expected}, got {got})")]
    UnpackTooFew { expected: usize, got: usize },
    #[error("too many values to unpack (expected {expected})")]
    UnpackTooMany { expected: usize },
    #[error("Required block '{0}' has not been overridden")]
    RequiredBlock(String),
    #[error("Cycle detected whilst rendering template '{0}'")]
    TemplateCycle(String),
    #[error("Maximum recursion depth exceeded in recursive loop")]
    RecursionLimit,
    #[error("unsupported operand type(s) for {0}: '{1}' and '{2}'")]
    InvalidOperands(String, String, String),
    #[error(
        "Filter '{name}' got invalid arity, expects {expected} argument(s)"
    )]
    Arity { name: String, expected: String },
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl fmt::Debug for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Io(err))
    }
}

impl PartialEq for RenderError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for RenderError {}
