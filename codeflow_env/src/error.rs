//! Error types for the Codeflow generation pipeline.

use thiserror::Error;

/// Errors that can occur while loading a seed, generating a corpus or
/// exporting a dataset.
///
/// Every variant names the offending seed entity or pipeline stage, since the
/// main consumer is a person iterating on a seed document.
#[derive(Debug, Error)]
pub enum SimError {
    /// Malformed or incomplete seed document (fatal, before generation)
    #[error("Configuration error at {entity}.{field}: {message}")]
    Config {
        entity: String,
        field: String,
        message: String,
    },

    /// Generation cannot continue without fabricating invalid data
    #[error("Invariant violated during {stage} for {entity}: {message}")]
    Invariant {
        stage: String,
        entity: String,
        message: String,
    },

    /// Requested work exceeds the configured ceiling
    #[error("Resource ceiling exceeded: {requested} developer-days requested, ceiling is {ceiling}")]
    ResourceExhausted { requested: u64, ceiling: u64 },

    /// Cancellation token fired or deadline passed
    #[error("Generation cancelled during {stage}")]
    Cancelled { stage: String },

    /// An operation needing a seed was called before `load`
    #[error("No seed loaded")]
    NotLoaded,

    /// Writer or file failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding failure (seed parse, export encode)
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SimError {
    /// Creates a configuration error.
    pub fn config(
        entity: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Config {
            entity: entity.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invariant-violation error.
    pub fn invariant(
        stage: impl Into<String>,
        entity: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Invariant {
            stage: stage.into(),
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a cancellation error for the given stage.
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled { stage: stage.into() }
    }

    /// Creates a serialization error.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Returns true for errors raised before any data was generated.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::ResourceExhausted { .. })
    }
}

/// Result alias used across the workspace.
pub type SimResult<T> = Result<T, SimError>;
