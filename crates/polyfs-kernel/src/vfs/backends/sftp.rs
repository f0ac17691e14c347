//! SFTP adapter.
//!
//! Wraps any [`SftpClient`]. SFTP paths are relative to the session's
//! starting directory, so the leading `/` of a resolved path is dropped
//! before it reaches the client. The protocol only creates and removes one
//! directory level at a time; the recursive forms the adapter contract
//! promises are built here on top of it.

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::remote::{
    normalize, ClientError, RemoteEntry, RetryPolicy, SftpClient, UnconfirmedWrites,
};
use crate::vfs::adapter::{check_cancelled, Adapter, BackendKind};
use crate::vfs::error::{FsError, FsResult};
use crate::vfs::logging::LogSink;
use crate::vfs::path;
use crate::vfs::types::{DirectoryDescriptor, FileDescriptor};

fn is_dot(name: &str) -> bool {
    name == "." || name == ".."
}

/// Create every directory in `dirs` that does not exist yet, outermost first.
async fn ensure_dirs<C: SftpClient>(client: &mut C, dirs: &[&str]) -> Result<(), ClientError> {
    for dir in dirs.iter().filter(|d| !d.is_empty()) {
        match client.stat(dir).await {
            Ok(_) => {}
            Err(ClientError::PathNotFound(_)) => client.create_dir(dir).await?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Remove `dir` and everything below it.
///
/// Walks the tree top-down deleting files, then removes the directories
/// deepest first.
async fn remove_tree<C: SftpClient>(client: &mut C, dir: &str) -> Result<(), ClientError> {
    let mut pending = vec![dir.to_string()];
    let mut visited = Vec::new();
    while let Some(current) = pending.pop() {
        for entry in client.read_dir(&current).await? {
            if is_dot(&entry.name) {
                continue;
            }
            if entry.kind.is_dir() {
                pending.push(entry.full_name);
            } else {
                client.remove_file(&entry.full_name).await?;
            }
        }
        visited.push(current);
    }
    // The session root itself is never removed.
    for dir in visited.iter().rev().filter(|d| !d.is_empty()) {
        client.remove_dir(dir).await?;
    }
    Ok(())
}

pub struct SftpAdapter<C> {
    prefix: String,
    root_path: String,
    client: Mutex<C>,
    retry: RetryPolicy,
    unconfirmed: UnconfirmedWrites,
    log: LogSink,
}

impl<C: SftpClient> SftpAdapter<C> {
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
        let full =
            path::join_root(&self.root_path, path).map_err(|e| FsError::runtime(&self.prefix, e))?;
        Ok(match full.strip_prefix('/') {
            Some(rest) => rest.to_string(),
            None => full,
        })
    }

    fn fail(&self, err: ClientError) -> FsError {
        normalize(&self.prefix, &self.log, err)
    }

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
                match self.client.lock().await.stat(full).await {
                    Ok(entry) => Ok(Some(entry)),
                    Err(ClientError::PathNotFound(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(|e| self.fail(e))?;
        if found.is_some() {
            self.unconfirmed.confirm(full);
        }
        Ok(found)
    }

    async fn read_dir(&self, full: &str, cancel: &CancellationToken) -> FsResult<Vec<RemoteEntry>> {
        check_cancelled(&self.prefix, cancel)?;
        let mut entries = self
            .session()
            .await?
            .read_dir(full)
            .await
            .map_err(|e| self.fail(e))?;
        entries.retain(|e| !is_dot(&e.name));
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[async_trait]
impl<C: SftpClient + 'static> Adapter for SftpAdapter<C> {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn root_path(&self) -> &str {
        &self.root_path
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Sftp
    }

    async fn connect(&self) -> FsResult<()> {
        let mut client = self.client.lock().await;
        if !client.is_connected() {
            client.connect().await.map_err(|e| self.fail(e))?;
        }
        self.log
            .emit(|| info!(adapter = %self.prefix, "sftp adapter connected"));
        Ok(())
    }

    async fn disconnect(&self) {
        if let Err(e) = self.client.lock().await.disconnect().await {
            self.log
                .emit(|| warn!(adapter = %self.prefix, error = %e, "sftp disconnect failed"));
        }
        self.log
            .emit(|| info!(adapter = %self.prefix, "sftp adapter disconnected"));
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
        self.get_directory(path, cancel).await?;
        let entries = self.read_dir(&self.resolve(path)?, cancel).await?;
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
        self.get_directory(path, cancel).await?;
        let entries = self.read_dir(&self.resolve(path)?, cancel).await?;
        Ok(entries
            .iter()
            .filter(|e| e.kind.is_dir())
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

        let mut dirs = path::ancestors(&full);
        dirs.push(&full);
        let mut client = self.session().await?;
        ensure_dirs(&mut *client, &dirs)
            .await
            .map_err(|e| self.fail(e))?;
        self.unconfirmed.record(&full);
        Ok(())
    }

    async fn delete_directory(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        self.get_directory(path, cancel).await?;
        check_cancelled(&self.prefix, cancel)?;

        let full = self.resolve(path)?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %full, "delete_directory"));
        let mut client = self.session().await?;
        remove_tree(&mut *client, &full)
            .await
            .map_err(|e| self.fail(e))?;
        self.unconfirmed.confirm_tree(&full);
        Ok(())
    }

    async fn delete_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        self.get_file(path, cancel).await?;
        check_cancelled(&self.prefix, cancel)?;

        let full = self.resolve(path)?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %full, "delete_file"));
        self.session()
            .await?
            .remove_file(&full)
            .await
            .map_err(|e| self.fail(e))?;
        self.unconfirmed.confirm(&full);
        Ok(())
    }

    async fn read_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<Vec<u8>> {
        self.get_file(path, cancel).await?;
        check_cancelled(&self.prefix, cancel)?;
        self.session()
            .await?
            .read(&self.resolve(path)?)
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

        let parents = path::ancestors(&full);
        let mut client = self.session().await?;
        ensure_dirs(&mut *client, &parents)
            .await
            .map_err(|e| self.fail(e))?;
        client.write(&full, contents).await.map_err(|e| self.fail(e))?;
        self.unconfirmed.record(&full);
        Ok(())
    }

    async fn append_file(
        &self,
        path: &str,
        contents: &[u8],
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        self.get_file(path, cancel).await?;
        check_cancelled(&self.prefix, cancel)?;

        let full = self.resolve(path)?;
        self.log.emit(|| {
            debug!(adapter = %self.prefix, path = %full, bytes = contents.len(), "append_file")
        });
        self.session()
            .await?
            .append(&full, contents)
            .await
            .map_err(|e| self.fail(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::mock::{MockFailure, MockServer, MockSftpClient};
    use crate::vfs::error::ErrorKind;
    use std::time::Duration;

    async fn setup() -> (SftpAdapter<MockSftpClient>, MockServer, CancellationToken) {
        let server = MockServer::new();
        let adapter = SftpAdapter::new("sftp", "/", server.sftp_client())
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));
        adapter.connect().await.unwrap();
        (adapter, server, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_paths_are_session_relative() {
        let (adapter, server, ct) = setup().await;
        adapter
            .write_file("/home/a.txt", b"hello", false, &ct)
            .await
            .unwrap();
        assert!(server.has_file("home/a.txt"));

        let file = adapter.get_file("home/a.txt", &ct).await.unwrap();
        assert_eq!(file.path, "home/a.txt");
        assert_eq!(file.name, "a.txt");
        assert_eq!(file.length, 5);
    }

    #[tokio::test]
    async fn test_write_creates_parents_one_level_at_a_time() {
        let (adapter, server, ct) = setup().await;
        adapter
            .write_file("a/b/c/file.txt", b"x", false, &ct)
            .await
            .unwrap();
        assert!(server.has_directory("a"));
        assert!(server.has_directory("a/b"));
        assert!(server.has_directory("a/b/c"));
        assert_eq!(
            adapter.read_text_file("a/b/c/file.txt", &ct).await.unwrap(),
            "x"
        );
    }

    #[tokio::test]
    async fn test_create_directory_is_recursive() {
        let (adapter, _server, ct) = setup().await;
        adapter.create_directory("x/y/z", &ct).await.unwrap();
        assert!(adapter.directory_exists("x", &ct).await.unwrap());
        assert!(adapter.directory_exists("x/y/z", &ct).await.unwrap());

        let err = adapter.create_directory("x/y", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryExists);
    }

    #[tokio::test]
    async fn test_delete_directory_removes_tree() {
        let (adapter, server, ct) = setup().await;
        adapter.write_file("d/a.txt", b"a", false, &ct).await.unwrap();
        adapter.write_file("d/s/b.txt", b"b", false, &ct).await.unwrap();
        adapter.create_directory("d/s/t", &ct).await.unwrap();
        adapter.write_file("keep.txt", b"k", false, &ct).await.unwrap();

        adapter.delete_directory("d", &ct).await.unwrap();
        assert!(!server.has_directory("d"));
        assert!(!server.has_directory("d/s/t"));
        assert!(!server.has_file("d/s/b.txt"));
        assert!(server.has_file("keep.txt"));
    }

    #[tokio::test]
    async fn test_listings_skip_dot_entries() {
        let (adapter, _server, ct) = setup().await;
        adapter.create_directory("d/b", &ct).await.unwrap();
        adapter.create_directory("d/a", &ct).await.unwrap();
        adapter.write_file("d/f.txt", b"f", false, &ct).await.unwrap();

        let dirs = adapter.list_directories("d", &ct).await.unwrap();
        let names: Vec<_> = dirs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let files = adapter.list_files("d", &ct).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["f.txt"]);
    }

    #[tokio::test]
    async fn test_missing_paths() {
        let (adapter, _server, ct) = setup().await;
        let err = adapter.get_file("nope.txt", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        let err = adapter.list_files("nope", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotFound);
        let err = adapter.delete_file("nope.txt", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        let err = adapter.append_file("nope.txt", b"x", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[tokio::test]
    async fn test_append() {
        let (adapter, _server, ct) = setup().await;
        adapter
            .write_text_file("a.txt", "HelloWorld", false, &ct)
            .await
            .unwrap();
        adapter
            .append_text_file("a.txt", "AppendTextFile", &ct)
            .await
            .unwrap();
        assert_eq!(
            adapter.read_text_file("a.txt", &ct).await.unwrap(),
            "HelloWorldAppendTextFile"
        );
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let (adapter, _server, ct) = setup().await;
        adapter.write_file("a.txt", b"one", false, &ct).await.unwrap();
        let err = adapter
            .write_file("a.txt", b"two", false, &ct)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileExists);
        adapter.write_file("a.txt", b"two", true, &ct).await.unwrap();
        assert_eq!(adapter.read_file("a.txt", &ct).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_lookup_retries_stale_server() {
        let (adapter, server, ct) = setup().await;
        server.stale_after_write(1);
        adapter.write_file("a.txt", b"x", false, &ct).await.unwrap();
        assert!(adapter.file_exists("a.txt", &ct).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_path_is_not_retried() {
        let (adapter, server, ct) = setup().await;
        let before = server.lookups();
        assert!(!adapter.directory_exists("never", &ct).await.unwrap());
        assert_eq!(server.lookups() - before, 1);

        server.stale_after_write(2);
        adapter.write_file("a.txt", b"x", false, &ct).await.unwrap();
        // Another path is not retried even while the server is stale.
        let before = server.lookups();
        assert!(!adapter.file_exists("b.txt", &ct).await.unwrap());
        assert_eq!(server.lookups() - before, 1);
    }

    #[tokio::test]
    async fn test_not_connected() {
        let server = MockServer::new();
        let adapter = SftpAdapter::new("sftp", "/", server.sftp_client());
        let ct = CancellationToken::new();
        let err = adapter.directory_exists("", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_client_failure_is_runtime_error() {
        let (adapter, server, ct) = setup().await;
        server.fail_with(Some(MockFailure::Protocol));
        let err = adapter.read_file("a.txt", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn test_escape_blocked() {
        let (adapter, _server, ct) = setup().await;
        let err = adapter.get_file("../../etc/passwd", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
    }
}
