//! # polyfs-kernel
//!
//! One virtual-path scheme over heterogeneous storage.
//!
//! A [`FileSystem`] holds adapters registered under string prefixes and
//! routes `prefix://relative/path` to the matching one:
//! - Local disk, confined to a root directory
//! - In-memory storage for scratch space and tests
//! - FTP and SFTP sessions over caller-supplied protocol clients
//!
//! Every adapter honours the same contract: existence-gated mutations,
//! whole-file reads and writes, and a closed error taxonomy. The facade adds
//! cross-adapter copy and move on top.

pub mod vfs;

pub use vfs::{
    Adapter, AdapterConfig, AdapterInfo, AdapterKind, BackendKind, BlockingFileSystem,
    ClientError, ConfigError, DirectoryDescriptor, EntryKind, ErrorKind, FileDescriptor,
    FileSystem, FileSystemConfig, FsError, FsResult, FtpAdapter, FtpClient, LocalAdapter,
    LogSink, MemoryAdapter, RemoteEntry, RetryPolicy, SftpAdapter, SftpClient, VirtualPath,
};
