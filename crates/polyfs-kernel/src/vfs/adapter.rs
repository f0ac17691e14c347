//! The adapter contract.
//!
//! Every storage backend implements [`Adapter`]. Operations are async and take
//! a [`CancellationToken`]; blocking forms live in [`super::blocking`] and are
//! not part of the contract.
//!
//! Paths passed to an adapter are relative to its root path. The adapter
//! prepends the root before touching the backend and refuses paths whose
//! `..` segments would leave it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::error::{FsError, FsResult};
use super::types::{DirectoryDescriptor, FileDescriptor};

/// Storage medium behind an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Local,
    Memory,
    Ftp,
    Sftp,
}

/// Introspection record for a registered adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub prefix: String,
    pub root_path: String,
    pub backend: BackendKind,
}

/// Storage backend contract.
///
/// Existence-gated operations are check-then-act: `create_directory` looks
/// for the directory before creating it, `delete_file` looks for the file
/// before deleting it, and so on. Concurrent callers on the same path can
/// both pass the check; the backend decides the outcome.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Registry key. Immutable after construction.
    fn prefix(&self) -> &str;

    /// Base path prepended to every operation.
    fn root_path(&self) -> &str;

    fn backend(&self) -> BackendKind;

    fn info(&self) -> AdapterInfo {
        AdapterInfo {
            prefix: self.prefix().to_string(),
            root_path: self.root_path().to_string(),
            backend: self.backend(),
        }
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Establish the backend session. No-op when already connected.
    async fn connect(&self) -> FsResult<()>;

    /// Close the backend session. Never fails.
    async fn disconnect(&self);

    /// Release the underlying client unconditionally.
    async fn dispose(&self);

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Fails with `FileNotFound` if absent or a directory.
    async fn get_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<FileDescriptor>;

    /// Fails with `DirectoryNotFound` if absent or a file.
    async fn get_directory(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<DirectoryDescriptor>;

    /// Files directly inside `path`. Fails with `DirectoryNotFound` first.
    async fn list_files(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<FileDescriptor>>;

    /// Sub-directories directly inside `path`, without `.`/`..`.
    async fn list_directories(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<DirectoryDescriptor>>;

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Create `path` and any missing parents. `DirectoryExists` if present.
    async fn create_directory(&self, path: &str, cancel: &CancellationToken) -> FsResult<()>;

    /// Delete `path` and everything below it.
    async fn delete_directory(&self, path: &str, cancel: &CancellationToken) -> FsResult<()>;

    async fn delete_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<()>;

    /// Whole-file read.
    async fn read_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<Vec<u8>>;

    /// Create or replace `path`. `FileExists` if present and `overwrite` is false.
    async fn write_file(
        &self,
        path: &str,
        contents: &[u8],
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> FsResult<()>;

    /// Append to an existing file. `FileNotFound` if absent.
    async fn append_file(
        &self,
        path: &str,
        contents: &[u8],
        cancel: &CancellationToken,
    ) -> FsResult<()>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// `false` only on `FileNotFound`; every other error propagates.
    async fn file_exists(&self, path: &str, cancel: &CancellationToken) -> FsResult<bool> {
        match self.get_file(path, cancel).await {
            Ok(_) => Ok(true),
            Err(FsError::FileNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// `false` only on `DirectoryNotFound`; every other error propagates.
    async fn directory_exists(&self, path: &str, cancel: &CancellationToken) -> FsResult<bool> {
        match self.get_directory(path, cancel).await {
            Ok(_) => Ok(true),
            Err(FsError::DirectoryNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whole-file read decoded as UTF-8.
    async fn read_text_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<String> {
        let bytes = self.read_file(path, cancel).await?;
        String::from_utf8(bytes).map_err(|e| FsError::runtime(self.prefix(), e))
    }

    async fn write_text_file(
        &self,
        path: &str,
        contents: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        self.write_file(path, contents.as_bytes(), overwrite, cancel)
            .await
    }

    async fn append_text_file(
        &self,
        path: &str,
        contents: &str,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        self.append_file(path, contents.as_bytes(), cancel).await
    }

    /// Descriptor with `content` populated.
    async fn load_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<FileDescriptor> {
        let file = self.get_file(path, cancel).await?;
        let content = self.read_file(path, cancel).await?;
        Ok(file.with_content(content))
    }
}

/// Cooperative cancellation check, placed before each backend call.
pub fn check_cancelled(prefix: &str, cancel: &CancellationToken) -> FsResult<()> {
    if cancel.is_cancelled() {
        Err(FsError::cancelled(prefix))
    } else {
        Ok(())
    }
}
