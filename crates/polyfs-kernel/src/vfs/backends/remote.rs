//! Shared plumbing for network adapters.
//!
//! FTP and SFTP protocol clients are external collaborators. The adapters
//! talk to them through [`FtpClient`] and [`SftpClient`], which expose only
//! the capabilities an adapter needs. Client failures are reported as
//! [`ClientError`] and normalized here into the adapter error taxonomy.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{error, warn};

use crate::vfs::error::FsError;
use crate::vfs::logging::LogSink;
use crate::vfs::path;
use crate::vfs::types::{DirectoryDescriptor, EntryKind, FileDescriptor};

/// A listing or lookup entry as reported by a protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub full_name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub created: Option<SystemTime>,
}

impl RemoteEntry {
    pub fn file(full_name: impl Into<String>, size: u64) -> Self {
        let full_name = full_name.into();
        Self {
            name: crate::vfs::path::file_name(&full_name).to_string(),
            full_name,
            kind: EntryKind::File,
            size,
            modified: None,
            created: None,
        }
    }

    pub fn directory(full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        Self {
            name: crate::vfs::path::file_name(&full_name).to_string(),
            full_name,
            kind: EntryKind::Directory,
            size: 0,
            modified: None,
            created: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    pub(crate) fn to_file(&self) -> FileDescriptor {
        FileDescriptor::new(&self.name, &self.full_name, self.size)
            .with_modified(self.modified)
            .with_created(self.created)
    }

    pub(crate) fn to_directory(&self) -> DirectoryDescriptor {
        DirectoryDescriptor::new(&self.name, &self.full_name)
            .with_modified(self.modified)
            .with_created(self.created)
    }
}

/// Failure reported by a protocol client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Session dropped or never established.
    #[error("session error: {0}")]
    Session(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Anything else the server or client library rejected.
    #[error("{0}")]
    Protocol(String),
}

impl ClientError {
    /// Transport, auth and session failures surface as `Connection`.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ClientError::Socket(_)
                | ClientError::Authentication(_)
                | ClientError::Session(_)
                | ClientError::Proxy(_)
        )
    }
}

/// Map a client failure into the adapter taxonomy.
pub(crate) fn normalize(prefix: &str, log: &LogSink, err: ClientError) -> FsError {
    log.emit(|| error!(adapter = %prefix, error = %err, "remote operation failed"));
    if err.is_connection() {
        FsError::connection(prefix, err)
    } else {
        FsError::runtime(prefix, err)
    }
}

/// FTP capabilities consumed by [`FtpAdapter`](super::FtpAdapter).
///
/// Paths are absolute server paths.
#[async_trait]
pub trait FtpClient: Send {
    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<(), ClientError>;

    async fn disconnect(&mut self) -> Result<(), ClientError>;

    /// Release the client for good.
    async fn close(&mut self);

    /// `Ok(None)` when the server has nothing at `path`.
    async fn object_info(&mut self, path: &str) -> Result<Option<RemoteEntry>, ClientError>;

    async fn listing(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ClientError>;

    async fn create_directory(&mut self, path: &str, recursive: bool) -> Result<(), ClientError>;

    /// Removes the directory and its contents.
    async fn delete_directory(&mut self, path: &str) -> Result<(), ClientError>;

    async fn delete_file(&mut self, path: &str) -> Result<(), ClientError>;

    async fn download(&mut self, path: &str) -> Result<Vec<u8>, ClientError>;

    /// Create or replace `path`, creating missing parent directories.
    async fn upload(&mut self, path: &str, data: &[u8]) -> Result<(), ClientError>;

    async fn append(&mut self, path: &str, data: &[u8]) -> Result<(), ClientError>;
}

/// SFTP capabilities consumed by [`SftpAdapter`](super::SftpAdapter).
///
/// Paths are relative to the session's starting directory. Directory
/// creation and removal are single-level, as in the SFTP protocol.
#[async_trait]
pub trait SftpClient: Send {
    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<(), ClientError>;

    async fn disconnect(&mut self) -> Result<(), ClientError>;

    async fn close(&mut self);

    /// `Err(PathNotFound)` when nothing exists at `path`.
    async fn stat(&mut self, path: &str) -> Result<RemoteEntry, ClientError>;

    /// Raw listing; may include `.` and `..`.
    async fn read_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ClientError>;

    /// Parent must exist.
    async fn create_dir(&mut self, path: &str) -> Result<(), ClientError>;

    /// Directory must be empty.
    async fn remove_dir(&mut self, path: &str) -> Result<(), ClientError>;

    async fn remove_file(&mut self, path: &str) -> Result<(), ClientError>;

    async fn read(&mut self, path: &str) -> Result<Vec<u8>, ClientError>;

    /// Create or truncate `path`. Parent must exist.
    async fn write(&mut self, path: &str, data: &[u8]) -> Result<(), ClientError>;

    async fn append(&mut self, path: &str, data: &[u8]) -> Result<(), ClientError>;
}

/// Bounded retry around object lookups.
///
/// Some servers are not read-consistent right after a write and report
/// nothing for a path that was just uploaded. Lookups of such paths that
/// come back empty are retried up to `attempts` times with a fixed `delay`.
/// Adapters only apply it to paths they wrote themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Run `lookup` until it yields an entry or attempts run out.
    ///
    /// Errors are not retried.
    pub(crate) async fn lookup<T, F, Fut>(
        &self,
        log: &LogSink,
        prefix: &str,
        path: &str,
        mut lookup: F,
    ) -> Result<Option<T>, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, ClientError>>,
    {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(found) = lookup().await? {
                return Ok(Some(found));
            }
            if attempt < attempts {
                log.emit(|| {
                    warn!(adapter = %prefix, path = %path, attempt, "lookup came back empty, retrying")
                });
                tokio::time::sleep(self.delay).await;
            }
        }
        Ok(None)
    }
}

/// Paths an adapter wrote that no lookup has seen since.
///
/// Only lookups of these paths are retried. A path nobody wrote is answered
/// on the first attempt, so probing for a missing file stays cheap.
#[derive(Debug, Default)]
pub(crate) struct UnconfirmedWrites {
    paths: Mutex<HashSet<String>>,
}

impl UnconfirmedWrites {
    /// Written paths that are never looked up again would otherwise pile up.
    const LIMIT: usize = 1024;

    pub(crate) fn record(&self, path: &str) {
        let mut paths = self.paths.lock();
        if paths.len() >= Self::LIMIT {
            paths.clear();
        }
        paths.insert(path.to_string());
    }

    /// The server has shown `path`, or it was deleted.
    pub(crate) fn confirm(&self, path: &str) {
        self.paths.lock().remove(path);
    }

    /// Drop `dir` and everything recorded below it.
    pub(crate) fn confirm_tree(&self, dir: &str) {
        self.paths.lock().retain(|p| !path::is_within(p, dir));
    }

    /// Policy for a lookup of `path`: `retry` if it is unconfirmed, else a
    /// single attempt.
    pub(crate) fn policy(&self, path: &str, retry: RetryPolicy) -> RetryPolicy {
        if self.paths.lock().contains(path) {
            retry
        } else {
            RetryPolicy::none()
        }
    }
}

mod duration_ms {
    use super::*;

    pub fn serialize<S: Serializer>(delay: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(delay.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
