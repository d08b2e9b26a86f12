//! Error type shared by the catalog, sales and settings layers.
//!
//! IPC-style command handlers flatten these into plain strings, so every
//! `Display` message here is what the operator ends up reading.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PosError {
    /// A user-facing validation failure. The operation was aborted and
    /// nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A destructive operation was requested without explicit confirmation.
    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PosError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type PosResult<T> = Result<T, PosError>;

/// Destructive operations proceed only when the caller confirmed them.
pub(crate) fn require_confirmation(confirmed: bool, prompt: &str) -> PosResult<()> {
    if confirmed {
        Ok(())
    } else {
        Err(PosError::ConfirmationRequired(prompt.to_string()))
    }
}
