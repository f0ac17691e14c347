//! Prefix-routed virtual filesystem.
//!
//! Callers address files as `<prefix>://<relative-path>`. Key components:
//!
//! - [`Adapter`] - The cancellable async contract every backend implements
//! - [`FileSystem`] - Registry and router; also composes cross-adapter copy/move
//! - [`MemoryAdapter`] - In-process storage (scratch space, testing)
//! - [`LocalAdapter`] - Local disk, confined to a root directory
//! - [`FtpAdapter`] / [`SftpAdapter`] - Network storage over caller-supplied clients
//! - [`BlockingFileSystem`] - Synchronous front-end for non-async callers
//!
//! ## Design Decisions
//!
//! - **Whole-file buffers**: reads and writes move complete contents; there
//!   are no handles or offsets.
//! - **Check-then-act**: existence-gated operations look before they act and
//!   do not serialize concurrent callers on the same path.
//! - **Closed error taxonomy**: adapters normalize every backend failure into
//!   [`FsError`] at their boundary; the facade propagates adapter errors
//!   verbatim.

pub mod adapter;
pub mod backends;
pub mod blocking;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod logging;
pub mod path;
pub mod types;

pub use adapter::{check_cancelled, Adapter, AdapterInfo, BackendKind};
pub use backends::{
    ClientError, FtpAdapter, FtpClient, LocalAdapter, MemoryAdapter, RemoteEntry, RetryPolicy,
    SftpAdapter, SftpClient,
};
pub use blocking::BlockingFileSystem;
pub use config::{AdapterConfig, AdapterKind, ConfigError, FileSystemConfig};
pub use error::{BoxError, Cancelled, EmptyPrefix, ErrorKind, FsError, FsResult, NotConnected};
pub use filesystem::FileSystem;
pub use logging::LogSink;
pub use path::{PathError, VirtualPath, PREFIX_SEPARATOR};
pub use types::{DirectoryDescriptor, EntryKind, FileDescriptor};
