//! Error types for the configuration tree and its backends.

use std::path::PathBuf;

use thiserror::Error;

use crate::value::TypeTag;

/// Errors surfaced by tree accessors, backends and flushes.
#[derive(Debug, Error)]
pub enum Error {
    /// A stored value was read back as a different type.
    #[error("type mismatch for value '{name}': expected {expected}, stored {found}")]
    TypeMismatch {
        /// Name of the value inside its node.
        name: String,
        /// Tag of the requested type.
        expected: TypeTag,
        /// Tag of the value actually stored.
        found: TypeTag,
    },

    /// Reading or writing a backing file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The key store refused an operation.
    #[error("backend failure: {0}")]
    Backend(String),

    /// A JSON document could not be parsed or produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A document or value does not match the expected shape.
    #[error("format violation: {0}")]
    Format(String),

    /// A key-store value has a native type with no tagged counterpart.
    #[error("unsupported native type {native} for value '{name}'")]
    UnsupportedType {
        /// Full key path and value name.
        name: String,
        /// Native type name as reported by the store.
        native: String,
    },

    /// A persisted enum symbol (or ordinal) is missing from the caller's table.
    #[error("value '{name}' holds '{symbol}', which is not in the enum name table")]
    UnknownEnumName {
        /// Name of the value inside its node.
        name: String,
        /// The stored symbol or ordinal.
        symbol: String,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub(crate) fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
