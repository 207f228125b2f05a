//! Error types.
//!
//! Most failures in this crate are diagnostics rather than hard errors: a
//! write to a read-only wrapper is logged and dropped. The fallible `try_*`
//! methods surface the same conditions as values for callers that want them.

use thiserror::Error;

use crate::reactive::TargetKind;

/// A rejected operation on an observed structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    #[error("property `{key}` is read-only")]
    ReadOnly { key: String },

    #[error("`{op}` is not supported on a {kind}")]
    Unsupported { op: &'static str, kind: TargetKind },

    #[error("invalid key `{key}`")]
    InvalidKey { key: String },

    #[error("invalid array length `{length}`")]
    InvalidLength { length: String },
}

/// Failure reported by an async component loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("component failed to load: {0}")]
    Failed(String),
}

impl LoadError {
    pub fn message(&self) -> &str {
        match self {
            Self::Failed(message) => message,
        }
    }
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
