//! Error types shared by the plugin registry and the cache manifest.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// An I/O error annotated with what was being attempted.
#[derive(Debug, Error)]
#[error("{context}: {source}")]
pub struct IoFailure {
    pub context: String,
    #[source]
    pub source: io::Error,
}

/// Extension trait to attach a human-readable context to `io::Result`.
pub trait IoContext<T> {
    fn io_context<F>(self, context: F) -> Result<T, IoFailure>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F>(self, context: F) -> Result<T, IoFailure>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| IoFailure {
            context: context(),
            source,
        })
    }
}

/// Failures of the durable stores (registry, cache manifest, configuration).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Corrupt plugin registry at {path:?}: {source}")]
    CorruptRegistry {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Corrupt cache manifest at {path:?}: {source}")]
    CorruptManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Corrupt configuration at {path:?}: {source}")]
    CorruptConfig {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize {what}: {message}")]
    Serialize { what: &'static str, message: String },

    #[error(transparent)]
    Io(#[from] IoFailure),
}

impl StoreError {
    /// Corrupt stores abort the whole invocation.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            StoreError::CorruptRegistry { .. }
                | StoreError::CorruptManifest { .. }
                | StoreError::CorruptConfig { .. }
        )
    }
}

/// Outcome of a failed plugin lifecycle operation.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Cannot update plugin '{0}': it was not installed from a repository")]
    NotUpdatable(String),

    #[error("Plugin '{0}' is built in and cannot be replaced")]
    BuiltinProtected(String),

    #[error("Invalid plugin: {0}")]
    ValidationFailure(String),

    #[error("Installing from URL is not yet implemented: {0}")]
    UnsupportedSource(String),

    #[error("Unrecognized plugin source: {0:?}")]
    UnrecognizedSource(String),

    #[error("Path not found: {0:?}")]
    SourceMissing(PathBuf),

    #[error("Failed to fetch '{reference}': {message}")]
    FetchFailed { reference: String, message: String },

    #[error("Fetching '{reference}' timed out after {seconds}s")]
    FetchTimedOut { reference: String, seconds: u64 },

    #[error(transparent)]
    Io(#[from] IoFailure),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PluginError {
    /// True when the failure must abort the invocation rather than be
    /// reported as an ordinary unsuccessful operation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PluginError::Store(e) if e.is_corrupt())
    }
}

pub type PluginResult<T> = Result<T, PluginError>;
pub type StoreResult<T> = Result<T, StoreError>;
