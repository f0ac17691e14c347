//! VFS error types.
//!
//! Every adapter and the [`FileSystem`](super::FileSystem) facade raise only
//! these variants. Backend-native failures are normalized at the adapter
//! boundary into `Connection` or `AdapterRuntime`.

use std::error::Error as StdError;
use thiserror::Error;

/// Boxed cause carried by `Connection` and `AdapterRuntime`.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// VFS error type.
#[derive(Debug, Error)]
pub enum FsError {
    /// Backend transport, authentication or session failure.
    #[error("A connection error occurred in adapter with prefix '{prefix}': {source}")]
    Connection {
        prefix: String,
        #[source]
        source: BoxError,
    },

    /// File does not exist (or the path is a directory).
    #[error("File '{path}' not found in adapter with prefix '{prefix}'.")]
    FileNotFound { path: String, prefix: String },

    /// Directory does not exist (or the path is a file).
    #[error("Directory '{path}' not found in adapter with prefix '{prefix}'.")]
    DirectoryNotFound { path: String, prefix: String },

    /// File already exists.
    #[error("File '{path}' already exists in adapter with prefix '{prefix}'.")]
    FileExists { path: String, prefix: String },

    /// Directory already exists.
    #[error("Directory '{path}' already exists in adapter with prefix '{prefix}'.")]
    DirectoryExists { path: String, prefix: String },

    /// Virtual path has no `prefix://` delimiter.
    #[error("No prefix found in path '{path}'.")]
    PrefixNotFoundInPath { path: String },

    /// The registry is empty.
    #[error("No adapters registered with the file system.")]
    NoAdaptersRegistered,

    /// No adapter is registered under the prefix.
    #[error("Adapter with prefix '{prefix}' not found.")]
    AdapterNotFound { prefix: String },

    /// More than one adapter is registered under the prefix.
    #[error("Multiple adapters registered with prefix '{prefix}'.")]
    DuplicateAdapterPrefix { prefix: String },

    /// Any backend failure without a more specific kind.
    #[error("Adapter with prefix '{prefix}' failed: {source}")]
    AdapterRuntime {
        prefix: String,
        #[source]
        source: BoxError,
    },
}

/// Discriminant of [`FsError`], for branching without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    FileNotFound,
    DirectoryNotFound,
    FileExists,
    DirectoryExists,
    PrefixNotFoundInPath,
    NoAdaptersRegistered,
    AdapterNotFound,
    DuplicateAdapterPrefix,
    AdapterRuntime,
}

/// Cause attached to `AdapterRuntime` when a cancellation token fired.
#[derive(Debug, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Cause attached to `Connection` when an operation runs on a closed session.
#[derive(Debug, Error)]
#[error("adapter is not connected")]
pub struct NotConnected;

/// Cause attached to `AdapterRuntime` when an adapter is registered without
/// a prefix.
#[derive(Debug, Error)]
#[error("adapter prefix must not be empty")]
pub struct EmptyPrefix;

impl FsError {
    pub fn connection(prefix: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            prefix: prefix.into(),
            source: source.into(),
        }
    }

    pub fn file_not_found(path: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::FileNotFound {
            path: path.into(),
            prefix: prefix.into(),
        }
    }

    pub fn directory_not_found(path: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::DirectoryNotFound {
            path: path.into(),
            prefix: prefix.into(),
        }
    }

    pub fn file_exists(path: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::FileExists {
            path: path.into(),
            prefix: prefix.into(),
        }
    }

    pub fn directory_exists(path: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::DirectoryExists {
            path: path.into(),
            prefix: prefix.into(),
        }
    }

    pub fn prefix_not_found_in_path(path: impl Into<String>) -> Self {
        Self::PrefixNotFoundInPath { path: path.into() }
    }

    pub fn adapter_not_found(prefix: impl Into<String>) -> Self {
        Self::AdapterNotFound {
            prefix: prefix.into(),
        }
    }

    pub fn duplicate_adapter_prefix(prefix: impl Into<String>) -> Self {
        Self::DuplicateAdapterPrefix {
            prefix: prefix.into(),
        }
    }

    pub fn runtime(prefix: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::AdapterRuntime {
            prefix: prefix.into(),
            source: source.into(),
        }
    }

    /// A cancelled operation, reported as `AdapterRuntime`.
    pub fn cancelled(prefix: impl Into<String>) -> Self {
        Self::runtime(prefix, Cancelled)
    }

    /// An operation attempted on a disconnected adapter.
    pub fn not_connected(prefix: impl Into<String>) -> Self {
        Self::connection(prefix, NotConnected)
    }

    /// Registration of an adapter whose prefix is empty.
    pub fn empty_prefix() -> Self {
        Self::runtime("", EmptyPrefix)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::DirectoryNotFound { .. } => ErrorKind::DirectoryNotFound,
            Self::FileExists { .. } => ErrorKind::FileExists,
            Self::DirectoryExists { .. } => ErrorKind::DirectoryExists,
            Self::PrefixNotFoundInPath { .. } => ErrorKind::PrefixNotFoundInPath,
            Self::NoAdaptersRegistered => ErrorKind::NoAdaptersRegistered,
            Self::AdapterNotFound { .. } => ErrorKind::AdapterNotFound,
            Self::DuplicateAdapterPrefix { .. } => ErrorKind::DuplicateAdapterPrefix,
            Self::AdapterRuntime { .. } => ErrorKind::AdapterRuntime,
        }
    }

    /// Returns true if this error came from a fired cancellation token.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::AdapterRuntime { source, .. } => source.is::<Cancelled>(),
            _ => false,
        }
    }
}

/// VFS result type.
pub type FsResult<T> = Result<T, FsError>;
