//! Prefix-routed filesystem facade.
//!
//! Owns the adapter registry and routes virtual paths such as
//! `memory-1://home/file.txt` to the adapter registered under `memory-1`.

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::adapter::{Adapter, AdapterInfo};
use super::backends::RetryPolicy;
use super::error::{FsError, FsResult};
use super::logging::LogSink;
use super::path::{self, VirtualPath};
use super::types::{DirectoryDescriptor, FileDescriptor};

/// Routes operations to registered adapters by prefix.
///
/// Prefixes are not deduplicated on registration. Registering two adapters
/// under the same prefix is allowed, but resolving that prefix fails with
/// `DuplicateAdapterPrefix`. Empty prefixes are refused.
pub struct FileSystem {
    adapters: RwLock<Vec<Arc<dyn Adapter>>>,
    retry: RetryPolicy,
    log: LogSink,
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("adapters", &"<locked>")
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(Vec::new()),
            retry: RetryPolicy::default(),
            log: LogSink::ambient(),
        }
    }

    /// Create a registry pre-populated with `adapters`.
    ///
    /// Callers must have checked the prefixes already; configuration does
    /// this in `FileSystemConfig::validate`.
    pub(crate) fn with_adapters(adapters: impl IntoIterator<Item = Arc<dyn Adapter>>) -> Self {
        Self {
            adapters: RwLock::new(adapters.into_iter().collect()),
            retry: RetryPolicy::default(),
            log: LogSink::ambient(),
        }
    }

    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Lookup retry policy for remote adapters registered on this facade.
    ///
    /// Comes from the `retry` section of the configuration. Remote adapters
    /// are built in code, so pass this to `FtpAdapter::with_retry` or
    /// `SftpAdapter::with_retry` before registering them.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    // ========================================================================
    // Registry
    // ========================================================================

    pub async fn add_adapter(&self, adapter: impl Adapter + 'static) -> FsResult<()> {
        self.add_adapter_arc(Arc::new(adapter)).await
    }

    /// Register `adapter`. Fails if its prefix is empty.
    pub async fn add_adapter_arc(&self, adapter: Arc<dyn Adapter>) -> FsResult<()> {
        if adapter.prefix().is_empty() {
            return Err(FsError::empty_prefix());
        }
        self.log
            .emit(|| info!(adapter = %adapter.prefix(), root = %adapter.root_path(), "adapter registered"));
        self.adapters.write().await.push(adapter);
        Ok(())
    }

    /// Remove every adapter registered under `prefix`.
    ///
    /// Returns `true` if anything was removed.
    pub async fn remove_adapter(&self, prefix: &str) -> bool {
        let mut adapters = self.adapters.write().await;
        let before = adapters.len();
        adapters.retain(|a| a.prefix() != prefix);
        before != adapters.len()
    }

    /// Snapshot of the registered adapters, in registration order.
    pub async fn adapters(&self) -> Vec<Arc<dyn Adapter>> {
        self.adapters.read().await.clone()
    }

    pub async fn adapter_infos(&self) -> Vec<AdapterInfo> {
        self.adapters
            .read()
            .await
            .iter()
            .map(|a| a.info())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.adapters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.adapters.read().await.is_empty()
    }

    /// Look up the single adapter registered under `prefix`.
    pub async fn get_adapter(&self, prefix: &str) -> FsResult<Arc<dyn Adapter>> {
        let adapters = self.adapters.read().await;
        if adapters.is_empty() {
            return Err(FsError::NoAdaptersRegistered);
        }

        let mut matches = adapters.iter().filter(|a| a.prefix() == prefix);
        match (matches.next(), matches.next()) {
            (Some(adapter), None) => Ok(Arc::clone(adapter)),
            (Some(_), Some(_)) => Err(FsError::duplicate_adapter_prefix(prefix)),
            (None, _) => Err(FsError::adapter_not_found(prefix)),
        }
    }

    /// Parse a virtual path and find its adapter.
    ///
    /// Returns the adapter and the path relative to its root.
    pub async fn resolve(&self, virtual_path: &str) -> FsResult<(Arc<dyn Adapter>, String)> {
        let VirtualPath { prefix, path } = VirtualPath::parse(virtual_path)?;
        let adapter = self.get_adapter(&prefix).await?;
        Ok((adapter, path))
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Connect every adapter, stopping at the first failure.
    pub async fn connect_all(&self) -> FsResult<()> {
        for adapter in self.adapters().await {
            adapter.connect().await?;
        }
        Ok(())
    }

    pub async fn disconnect_all(&self) {
        for adapter in self.adapters().await {
            adapter.disconnect().await;
        }
    }

    pub async fn dispose_all(&self) {
        for adapter in self.adapters().await {
            adapter.dispose().await;
        }
    }

    // ========================================================================
    // Routed operations
    // ========================================================================

    pub async fn get_file(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<FileDescriptor> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.get_file(&path, cancel).await
    }

    pub async fn get_directory(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<DirectoryDescriptor> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.get_directory(&path, cancel).await
    }

    pub async fn file_exists(&self, virtual_path: &str, cancel: &CancellationToken) -> FsResult<bool> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.file_exists(&path, cancel).await
    }

    pub async fn directory_exists(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<bool> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.directory_exists(&path, cancel).await
    }

    pub async fn list_files(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<FileDescriptor>> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.list_files(&path, cancel).await
    }

    pub async fn list_directories(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<DirectoryDescriptor>> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.list_directories(&path, cancel).await
    }

    pub async fn create_directory(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.create_directory(&path, cancel).await
    }

    pub async fn delete_directory(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.delete_directory(&path, cancel).await
    }

    pub async fn delete_file(&self, virtual_path: &str, cancel: &CancellationToken) -> FsResult<()> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.delete_file(&path, cancel).await
    }

    pub async fn read_file(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<u8>> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.read_file(&path, cancel).await
    }

    pub async fn read_text_file(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<String> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.read_text_file(&path, cancel).await
    }

    pub async fn load_file(
        &self,
        virtual_path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<FileDescriptor> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.load_file(&path, cancel).await
    }

    pub async fn write_file(
        &self,
        virtual_path: &str,
        contents: &[u8],
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.write_file(&path, contents, overwrite, cancel).await
    }

    pub async fn write_text_file(
        &self,
        virtual_path: &str,
        contents: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter
            .write_text_file(&path, contents, overwrite, cancel)
            .await
    }

    pub async fn append_file(
        &self,
        virtual_path: &str,
        contents: &[u8],
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.append_file(&path, contents, cancel).await
    }

    pub async fn append_text_file(
        &self,
        virtual_path: &str,
        contents: &str,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (adapter, path) = self.resolve(virtual_path).await?;
        adapter.append_text_file(&path, contents, cancel).await
    }

    // ========================================================================
    // Cross-adapter operations
    // ========================================================================

    /// Read `source` in full and write it to `destination`.
    ///
    /// The two paths may live on different adapters. Not atomic: a failed
    /// write propagates the destination adapter's error and leaves the
    /// source untouched.
    pub async fn copy_file(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (src_adapter, src_path) = self.resolve(source).await?;
        let (dst_adapter, dst_path) = self.resolve(destination).await?;

        self.log.emit(|| {
            debug!(
                from = %src_adapter.prefix(),
                to = %dst_adapter.prefix(),
                source = %src_path,
                destination = %dst_path,
                "copy_file"
            )
        });

        let contents = src_adapter.read_file(&src_path, cancel).await?;
        dst_adapter
            .write_file(&dst_path, &contents, overwrite, cancel)
            .await
    }

    /// Copy, then delete the source once the write has succeeded.
    ///
    /// Moving a file onto itself (same adapter, same normalized path) leaves
    /// it in place.
    pub async fn move_file(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let (src_adapter, src_path) = self.resolve(source).await?;
        let (dst_adapter, dst_path) = self.resolve(destination).await?;

        self.copy_file(source, destination, overwrite, cancel)
            .await?;

        let onto_itself = Arc::ptr_eq(&src_adapter, &dst_adapter)
            && same_file(src_adapter.as_ref(), &src_path, &dst_path);
        if onto_itself {
            self.log.emit(|| {
                debug!(adapter = %src_adapter.prefix(), path = %src_path, "move onto itself, source kept")
            });
            return Ok(());
        }
        src_adapter.delete_file(&src_path, cancel).await
    }
}

fn same_file(adapter: &dyn Adapter, a: &str, b: &str) -> bool {
    match (
        path::join_root(adapter.root_path(), a),
        path::join_root(adapter.root_path(), b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
