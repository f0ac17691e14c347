//! FTP adapter.
//!
//! Wraps any [`FtpClient`]. Paths are absolute server paths: the adapter's
//! root path (usually `/`) is prepended to every caller path.

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::remote::{
    normalize, ClientError, FtpClient, RemoteEntry, RetryPolicy, UnconfirmedWrites,
};
use crate::vfs::adapter::{check_cancelled, Adapter, BackendKind};
use crate::vfs::error::{FsError, FsResult};
use crate::vfs::logging::LogSink;
use crate::vfs::path;
use crate::vfs::types::{DirectoryDescriptor, FileDescriptor};

pub struct FtpAdapter<C> {
    prefix: String,
    root_path: String,
    client: Mutex<C>,
    retry: RetryPolicy,
    unconfirmed: UnconfirmedWrites,
    log: LogSink,
}

impl<C: FtpClient> FtpAdapter<C> {
    pub fn new(prefix: impl Into<String>, root_path: impl Into<String>, client: C) -> Self {
        Self {
            prefix: prefix.into(),
            root_path: root_path.into(),
            client: Mutex::new(client),
            retry: RetryPolicy::default(),
            unconfirmed: UnconfirmedWrites::default(),
            log: LogSink::ambient(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    fn resolve(&self, path: &str) -> FsResult<String> {
        path::join_root(&self.root_path, path).map_err(|e| FsError::runtime(&self.prefix, e))
    }

    fn fail(&self, err: ClientError) -> FsError {
        normalize(&self.prefix, &self.log, err)
    }

    /// Lock the client, refusing to hand it out when the session is down.
    async fn session(&self) -> FsResult<MutexGuard<'_, C>> {
        let client = self.client.lock().await;
        if client.is_connected() {
            Ok(client)
        } else {
            Err(FsError::not_connected(&self.prefix))
        }
    }

    async fn lookup(&self, full: &str, cancel: &CancellationToken) -> FsResult<Option<RemoteEntry>> {
        check_cancelled(&self.prefix, cancel)?;
        drop(self.session().await?);
        let found = self
            .unconfirmed
            .policy(full, self.retry)
            .lookup(&self.log, &self.prefix, full, move || async move {
                self.client.lock().await.object_info(full).await
            })
            .await
            .map_err(|e| self.fail(e))?;
        if found.is_some() {
            self.unconfirmed.confirm(full);
        }
        Ok(found)
    }

    async fn listing(
        &self,
        full: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<RemoteEntry>> {
        check_cancelled(&self.prefix, cancel)?;
        let mut entries = self
            .session()
            .await?
            .listing(full)
            .await
            .map_err(|e| self.fail(e))?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[async_trait]
impl<C: FtpClient + 'static> Adapter for FtpAdapter<C> {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn root_path(&self) -> &str {
        &self.root_path
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Ftp
    }

    async fn connect(&self) -> FsResult<()> {
        let mut client = self.client.lock().await;
        if !client.is_connected() {
            client.connect().await.map_err(|e| self.fail(e))?;
        }
        self.log
            .emit(|| info!(adapter = %self.prefix, "ftp adapter connected"));
        Ok(())
    }

    async fn disconnect(&self) {
        if let Err(e) = self.client.lock().await.disconnect().await {
            self.log
                .emit(|| warn!(adapter = %self.prefix, error = %e, "ftp disconnect failed"));
        }
        self.log
            .emit(|| info!(adapter = %self.prefix, "ftp adapter disconnected"));
    }

    async fn dispose(&self) {
        self.client.lock().await.close().await;
    }

    async fn get_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<FileDescriptor> {
        let full = self.resolve(path)?;
        match self.lookup(&full, cancel).await? {
            Some(entry) if entry.kind.is_file() => Ok(entry.to_file()),
            _ => Err(FsError::file_not_found(full, &self.prefix)),
        }
    }

    async fn get_directory(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<DirectoryDescriptor> {
        let full = self.resolve(path)?;
        match self.lookup(&full, cancel).await? {
            Some(entry) if entry.kind.is_dir() => Ok(entry.to_directory()),
            _ => Err(FsError::directory_not_found(full, &self.prefix)),
        }
    }

    async fn list_files(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<FileDescriptor>> {
        let dir = self.get_directory(path, cancel).await?;
        let entries = self.listing(&dir.path, cancel).await?;
        Ok(entries
            .iter()
            .filter(|e| e.kind.is_file())
            .map(RemoteEntry::to_file)
            .collect())
    }

    async fn list_directories(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<DirectoryDescriptor>> {
        let dir = self.get_directory(path, cancel).await?;
        let entries = self.listing(&dir.path, cancel).await?;
        Ok(entries
            .iter()
            .filter(|e| e.kind.is_dir() && e.name != "." && e.name != "..")
            .map(RemoteEntry::to_directory)
            .collect())
    }

    async fn create_directory(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        if self.directory_exists(path, cancel).await? {
            return Err(FsError::directory_exists(self.resolve(path)?, &self.prefix));
        }
        check_cancelled(&self.prefix, cancel)?;

        let full = self.resolve(path)?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %full, "create_directory"));
        self.session()
            .await?
            .create_directory(&full, true)
            .await
            .map_err(|e| self.fail(e))?;
        self.unconfirmed.record(&full);
        Ok(())
    }

    async fn delete_directory(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        let dir = self.get_directory(path, cancel).await?;
        check_cancelled(&self.prefix, cancel)?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %dir.path, "delete_directory"));
        self.session()
            .await?
            .delete_directory(&dir.path)
            .await
            .map_err(|e| self.fail(e))?;
        self.unconfirmed.confirm_tree(&dir.path);
        Ok(())
    }

    async fn delete_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        let file = self.get_file(path, cancel).await?;
        check_cancelled(&self.prefix, cancel)?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %file.path, "delete_file"));
        self.session()
            .await?
            .delete_file(&file.path)
            .await
            .map_err(|e| self.fail(e))?;
        self.unconfirmed.confirm(&file.path);
        Ok(())
    }

    async fn read_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<Vec<u8>> {
        let file = self.get_file(path, cancel).await?;
        check_cancelled(&self.prefix, cancel)?;
        self.session()
            .await?
            .download(&file.path)
            .await
            .map_err(|e| self.fail(e))
    }

    async fn write_file(
        &self,
        path: &str,
        contents: &[u8],
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        if !overwrite && self.file_exists(path, cancel).await? {
            return Err(FsError::file_exists(self.resolve(path)?, &self.prefix));
        }
        check_cancelled(&self.prefix, cancel)?;

        let full = self.resolve(path)?;
        self.log.emit(|| {
            debug!(adapter = %self.prefix, path = %full, bytes = contents.len(), "write_file")
        });
        self.session()
            .await?
            .upload(&full, contents)
            .await
            .map_err(|e| self.fail(e))?;
        self.unconfirmed.record(&full);
        Ok(())
    }

    async fn append_file(
        &self,
        path: &str,
        contents: &[u8],
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let file = self.get_file(path, cancel).await?;
        check_cancelled(&self.prefix, cancel)?;
        self.log.emit(|| {
            debug!(adapter = %self.prefix, path = %file.path, bytes = contents.len(), "append_file")
        });
        self.session()
            .await?
            .append(&file.path, contents)
            .await
            .map_err(|e| self.fail(e))
    }
}
