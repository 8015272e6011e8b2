//! Error types for the scripting scope, the roller and trigger configuration.

use std::path::PathBuf;

/// Errors raised while resolving or mutating names in a [`crate::scope::ScopeTree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The name is not bound anywhere on the chain, including the root.
    #[error("name not found: {0}")]
    NameNotFound(String),

    /// The frame id does not belong to this tree.
    #[error("unknown frame: {0}")]
    UnknownFrame(usize),
}

/// Errors raised when building roll inputs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RollError {
    /// A chance outside its representation's range, or not a finite number.
    #[error("invalid chance: {0}")]
    InvalidChance(String),
}

/// Errors raised while loading or validating a trigger configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ScopeResult<T> = Result<T, ScopeError>;
pub type RollResult<T> = Result<T, RollError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
