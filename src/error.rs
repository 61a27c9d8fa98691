//! Error types.
//!
//! Validation failures are never errors: they are statuses. The types here
//! cover malformed input (paths, locale tags) and async test rejections.

use thiserror::Error;

/// Why a path string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A character that is not allowed in the current scanner state.
    #[error("unexpected character {found:?} at position {position}")]
    UnexpectedChar { position: usize, found: char },

    /// A bare segment that is not a valid identifier (e.g. `a.1` or `.b`).
    #[error("invalid identifier {segment:?} before position {position}")]
    InvalidIdentifier { position: usize, segment: String },

    /// Empty `[]` brackets.
    #[error("empty brackets at position {position}")]
    EmptyBrackets { position: usize },

    /// A bracketed index that does not fit in `usize`.
    #[error("index {digits} is out of range")]
    IndexOverflow { digits: String },

    /// Input ended inside a bracket or a quoted key.
    #[error("unterminated bracket or quote")]
    Unterminated,
}

/// Locale configuration failures. The previous locale stays active.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocaleError {
    #[error("invalid locale tag {0:?}")]
    InvalidTag(String),

    #[error("no message provider for locale {0:?}")]
    NoProvider(String),
}

/// Rejection of an async test. Rendered as an `unavailable` status whose
/// message is the error's display form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TestError {
    message: String,
}

impl TestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for TestError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TestError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}
