//! Error types.
use std::fmt;

pub mod render;
pub mod syntax;

pub use render::RenderError;
pub use syntax::{AssertionError, SyntaxError};

/// Generic error type that wraps more specific types and is
/// returned when using the `Environment`.
pub enum Error {
    /// Lexer or parser failure.
    Syntax(SyntaxError),
    /// Compile-time semantic failure.
    Assertion(AssertionError),
    /// Failure while rendering a template.
    Render(RenderError),
    /// A loader could not resolve a template name.
    TemplateNotFound(String),
    /// None of the candidate template names could be resolved.
    TemplatesNotFound(Vec<String>),
    /// Proxy for I/O errors.
    Io(IoError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Syntax(ref e) => fmt::Display::fmt(e, f),
            Self::Assertion(ref e) => fmt::Display::fmt(e, f),
            Self::Render(ref e) => fmt::Display::fmt(e, f),
            Self::TemplateNotFound(ref name) => {
                write!(f, "Template not found '{}'", name)
            }
            Self::TemplatesNotFound(ref names) => {
                let names = names
                    .iter()
                    .map(|n| format!("'{}'", n))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "Templates not found {}", names)
            }
            Self::Io(ref e) => fmt::Display::fmt(e, f),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Syntax(ref e) => fmt::Debug::fmt(e, f),
            Self::Assertion(ref e) => fmt::Debug::fmt(e, f),
            Self::Render(ref e) => fmt::Debug::fmt(e, f),
            Self::TemplateNotFound(_) | Self::TemplatesNotFound(_) => {
                fmt::Display::fmt(self, f)
            }
            Self::Io(ref e) => fmt::Debug::fmt(e, f),
        }
    }
}

impl std::error::Error for Error {}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Syntax(s), Self::Syntax(o)) => s == o,
            (Self::Assertion(s), Self::Assertion(o)) => s == o,
            (Self::Render(s), Self::Render(o)) => s == o,
            (Self::TemplateNotFound(s), Self::TemplateNotFound(o)) => s == o,
            (Self::TemplatesNotFound(s), Self::TemplatesNotFound(o)) => {
                s == o
            }
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Io(err))
    }
}

impl From<SyntaxError> for Error {
    fn from(err: SyntaxError) -> Self {
        Self::Syntax(err)
    }
}

impl From<AssertionError> for Error {
    fn from(err: AssertionError) -> Self {
        Self::Assertion(err)
    }
}

impl From<RenderError> for Error {
    fn from(err: RenderError) -> Self {
        Self::Render(err)
    }
}

/// Wrapper for IO errors that implements `PartialEq` to
/// facilitate easier testing using `assert_eq!()`.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Io(ref s), Self::Io(ref o)) => s.kind() == o.kind(),
        }
    }
}

impl Eq for IoError {}
