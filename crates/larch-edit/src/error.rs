//! Errors returned by the edit engine.

use thiserror::Error;

/// Failure to turn a value into literal expression tokens.
///
/// Every failing setter leaves the tree untouched, so callers can recover by
/// fixing the value and retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The value has no literal form in the language.
    #[error("value cannot be rendered as a literal expression: {reason}")]
    CannotRender {
        /// What made the value unrenderable.
        reason: String,
    },
}

impl RenderError {
    pub(crate) fn cannot_render(reason: impl Into<String>) -> Self {
        RenderError::CannotRender {
            reason: reason.into(),
        }
    }
}
