//! Disk-backed adapter.
//!
//! Maps caller paths onto a directory tree under a fixed root. Nothing
//! outside that tree is reachable, whether through `..` or a symlink.

use async_trait::async_trait;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::vfs::adapter::{check_cancelled, Adapter, BackendKind};
use crate::vfs::error::{FsError, FsResult};
use crate::vfs::logging::LogSink;
use crate::vfs::path::{self, PathError};
use crate::vfs::types::{DirectoryDescriptor, FileDescriptor};

/// Local filesystem adapter.
///
/// All operations are relative to `root_path`. For example, if the root is
/// `/home/amy/project`, then `read_file("src/main.rs")` reads
/// `/home/amy/project/src/main.rs`.
///
/// `..` cannot climb above the root. The deepest existing part of every
/// target is canonicalized, so a symlink cannot lead outside the root either,
/// including for files and directories a call is about to create.
#[derive(Debug)]
pub struct LocalAdapter {
    prefix: String,
    root_path: String,
    root: PathBuf,
    log: LogSink,
}

impl LocalAdapter {
    pub fn new(prefix: impl Into<String>, root_path: impl Into<String>) -> Self {
        let root_path = root_path.into();
        Self {
            prefix: prefix.into(),
            root: PathBuf::from(&root_path),
            root_path,
            log: LogSink::ambient(),
        }
    }

    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    /// Resolve a relative path to an absolute path within the root.
    fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        let segments =
            path::normalize_segments(path).map_err(|e| FsError::runtime(&self.prefix, e))?;

        let mut full = self.root.clone();
        full.extend(segments);

        // Writes create missing parents, so check the deepest component that
        // is already on disk. Everything below it will be created fresh.
        let existing = full
            .ancestors()
            .take_while(|p| p.starts_with(&self.root))
            .find(|p| p.symlink_metadata().is_ok());
        if let Some(existing) = existing {
            let canonical = dunce::canonicalize(existing).map_err(|e| self.normalize(e))?;
            let canonical_root =
                dunce::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
            if !canonical.starts_with(&canonical_root) {
                return Err(FsError::runtime(
                    &self.prefix,
                    PathError::EscapesRoot(path.to_string()),
                ));
            }
        }

        Ok(full)
    }

    /// Map an I/O failure that has no more specific kind.
    fn normalize(&self, e: io::Error) -> FsError {
        self.log
            .emit(|| error!(adapter = %self.prefix, error = %e, "local I/O failure"));
        FsError::runtime(&self.prefix, e)
    }

    fn display(full: &Path) -> String {
        full.to_string_lossy().into_owned()
    }

    fn entry_name(full: &Path) -> String {
        full.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn file_descriptor(full: &Path, meta: &Metadata) -> FileDescriptor {
        FileDescriptor::new(Self::entry_name(full), Self::display(full), meta.len())
            .with_modified(meta.modified().ok())
            .with_created(meta.created().ok())
    }

    fn directory_descriptor(full: &Path, meta: &Metadata) -> DirectoryDescriptor {
        DirectoryDescriptor::new(Self::entry_name(full), Self::display(full))
            .with_modified(meta.modified().ok())
            .with_created(meta.created().ok())
    }

    /// Metadata of every direct child of `dir`.
    async fn read_children(&self, dir: &Path) -> FsResult<Vec<(PathBuf, Metadata)>> {
        let mut children = Vec::new();
        let mut entries = fs::read_dir(dir).await.map_err(|e| self.normalize(e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.normalize(e))? {
            let meta = entry.metadata().await.map_err(|e| self.normalize(e))?;
            children.push((entry.path(), meta));
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children)
    }
}

#[async_trait]
impl Adapter for LocalAdapter {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn root_path(&self) -> &str {
        &self.root_path
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn connect(&self) -> FsResult<()> {
        self.log.emit(|| {
            info!(adapter = %self.prefix, root = %self.root_path, "local adapter connected")
        });
        Ok(())
    }

    async fn disconnect(&self) {
        self.log
            .emit(|| info!(adapter = %self.prefix, "local adapter disconnected"));
    }

    async fn dispose(&self) {}

    async fn get_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<FileDescriptor> {
        check_cancelled(&self.prefix, cancel)?;
        let full = self.resolve(path)?;
        match fs::metadata(&full).await {
            Ok(meta) if !meta.is_dir() => Ok(Self::file_descriptor(&full, &meta)),
            Ok(_) => Err(FsError::file_not_found(Self::display(&full), &self.prefix)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FsError::file_not_found(Self::display(&full), &self.prefix))
            }
            Err(e) => Err(self.normalize(e)),
        }
    }

    async fn get_directory(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<DirectoryDescriptor> {
        check_cancelled(&self.prefix, cancel)?;
        let full = self.resolve(path)?;
        match fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => Ok(Self::directory_descriptor(&full, &meta)),
            Ok(_) => Err(FsError::directory_not_found(
                Self::display(&full),
                &self.prefix,
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FsError::directory_not_found(
                Self::display(&full),
                &self.prefix,
            )),
            Err(e) => Err(self.normalize(e)),
        }
    }

    async fn list_files(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<FileDescriptor>> {
        self.get_directory(path, cancel).await?;
        let full = self.resolve(path)?;
        Ok(self
            .read_children(&full)
            .await?
            .iter()
            .filter(|(_, meta)| !meta.is_dir())
            .map(|(child, meta)| Self::file_descriptor(child, meta))
            .collect())
    }

    async fn list_directories(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<DirectoryDescriptor>> {
        self.get_directory(path, cancel).await?;
        let full = self.resolve(path)?;
        Ok(self
            .read_children(&full)
            .await?
            .iter()
            .filter(|(_, meta)| meta.is_dir())
            .map(|(child, meta)| Self::directory_descriptor(child, meta))
            .collect())
    }

    async fn create_directory(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        let full = self.resolve(path)?;
        if self.directory_exists(path, cancel).await? {
            return Err(FsError::directory_exists(
                Self::display(&full),
                &self.prefix,
            ));
        }
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %full.display(), "create_directory"));
        fs::create_dir_all(&full)
            .await
            .map_err(|e| self.normalize(e))
    }

    async fn delete_directory(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        self.get_directory(path, cancel).await?;
        let full = self.resolve(path)?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %full.display(), "delete_directory"));
        fs::remove_dir_all(&full)
            .await
            .map_err(|e| self.normalize(e))
    }

    async fn delete_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        self.get_file(path, cancel).await?;
        let full = self.resolve(path)?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %full.display(), "delete_file"));
        fs::remove_file(&full).await.map_err(|e| self.normalize(e))
    }

    async fn read_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<Vec<u8>> {
        self.get_file(path, cancel).await?;
        let full = self.resolve(path)?;
        fs::read(&full).await.map_err(|e| self.normalize(e))
    }

    async fn write_file(
        &self,
        path: &str,
        contents: &[u8],
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let full = self.resolve(path)?;
        if !overwrite && self.file_exists(path, cancel).await? {
            return Err(FsError::file_exists(Self::display(&full), &self.prefix));
        }
        check_cancelled(&self.prefix, cancel)?;

        self.log.emit(|| {
            debug!(adapter = %self.prefix, path = %full.display(), bytes = contents.len(), "write_file")
        });

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.normalize(e))?;
        }
        fs::write(&full, contents)
            .await
            .map_err(|e| self.normalize(e))
    }

    async fn append_file(
        &self,
        path: &str,
        contents: &[u8],
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        self.get_file(path, cancel).await?;
        let full = self.resolve(path)?;
        self.log.emit(|| {
            debug!(adapter = %self.prefix, path = %full.display(), bytes = contents.len(), "append_file")
        });

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&full)
            .await
            .map_err(|e| self.normalize(e))?;
        file.write_all(contents)
            .await
            .map_err(|e| self.normalize(e))?;
        file.flush().await.map_err(|e| self.normalize(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::error::ErrorKind;
    use tempfile::TempDir;

    fn setup() -> (LocalAdapter, TempDir, CancellationToken) {
        let dir = TempDir::new().unwrap();
        let adapter = LocalAdapter::new("local", dir.path().to_string_lossy());
        (adapter, dir, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (adapter, dir, ct) = setup();
        adapter
            .write_file("test.txt", b"hello", false, &ct)
            .await
            .unwrap();

        assert_eq!(adapter.read_file("test.txt", &ct).await.unwrap(), b"hello");
        assert_eq!(std::fs::read(dir.path().join("test.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_get_file_metadata() {
        let (adapter, dir, ct) = setup();
        std::fs::write(dir.path().join("a.txt"), "12345").unwrap();

        let file = adapter.get_file("a.txt", &ct).await.unwrap();
        assert_eq!(file.name, "a.txt");
        assert_eq!(file.length, 5);
        assert!(file.last_modified.is_some());
        assert!(file.content.is_none());
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let (adapter, dir, ct) = setup();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let err = adapter.get_file("sub", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(!adapter.file_exists("sub", &ct).await.unwrap());
        assert!(adapter.directory_exists("sub", &ct).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_existing_without_overwrite_fails() {
        let (adapter, _dir, ct) = setup();
        adapter.write_file("a.txt", b"1", false, &ct).await.unwrap();

        let err = adapter.write_file("a.txt", b"2", false, &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileExists);

        adapter.write_file("a.txt", b"2", true, &ct).await.unwrap();
        assert_eq!(adapter.read_file("a.txt", &ct).await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (adapter, _dir, ct) = setup();
        adapter.create_directory("subdir/nested", &ct).await.unwrap();
        adapter
            .write_file("subdir/file.txt", b"x", false, &ct)
            .await
            .unwrap();

        let files = adapter.list_files("subdir", &ct).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "file.txt");

        let dirs = adapter.list_directories("subdir", &ct).await.unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].name, "nested");
    }

    #[tokio::test]
    async fn test_create_directory_twice_fails() {
        let (adapter, _dir, ct) = setup();
        adapter.create_directory("d", &ct).await.unwrap();
        let err = adapter.create_directory("d", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryExists);
    }

    #[tokio::test]
    async fn test_delete_directory_recursive() {
        let (adapter, dir, ct) = setup();
        adapter
            .write_file("d/e/f.txt", b"x", false, &ct)
            .await
            .unwrap();
        adapter.delete_directory("d", &ct).await.unwrap();
        assert!(!dir.path().join("d").exists());

        let err = adapter.delete_directory("d", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotFound);
    }

    #[tokio::test]
    async fn test_delete_file() {
        let (adapter, _dir, ct) = setup();
        let err = adapter.delete_file("nope.txt", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);

        adapter.write_file("a.txt", b"x", false, &ct).await.unwrap();
        adapter.delete_file("a.txt", &ct).await.unwrap();
        assert!(!adapter.file_exists("a.txt", &ct).await.unwrap());
    }

    #[tokio::test]
    async fn test_append() {
        let (adapter, _dir, ct) = setup();
        adapter
            .write_text_file("a.txt", "HelloWorld", false, &ct)
            .await
            .unwrap();
        adapter
            .append_file("a.txt", b"AppendTextFile", &ct)
            .await
            .unwrap();
        assert_eq!(
            adapter.read_text_file("a.txt", &ct).await.unwrap(),
            "HelloWorldAppendTextFile"
        );
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let (adapter, _dir, ct) = setup();
        let err = adapter.list_directories("ghost", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotFound);
    }

    #[tokio::test]
    async fn test_path_escape_blocked() {
        let (adapter, _dir, ct) = setup();
        let err = adapter.read_file("../../../etc/passwd", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_blocked() {
        let (adapter, dir, ct) = setup();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = adapter.read_file("link/secret.txt", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);

        // New paths below the link are refused too.
        let err = adapter
            .write_file("link/planted.txt", b"pwn", false, &ct)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
        let err = adapter
            .write_file("link/deep/planted.txt", b"pwn", true, &ct)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
        let err = adapter.create_directory("link/made", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);

        assert!(!outside.path().join("planted.txt").exists());
        assert!(!outside.path().join("deep").exists());
        assert!(!outside.path().join("made").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_inside_root_is_followed() {
        let (adapter, dir, ct) = setup();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();

        adapter
            .write_file("alias/new.txt", b"ok", false, &ct)
            .await
            .unwrap();
        assert_eq!(std::fs::read(dir.path().join("real/new.txt")).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_missing_root_is_created_on_write() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("not-yet");
        let adapter = LocalAdapter::new("local", root.to_string_lossy());
        let ct = CancellationToken::new();

        adapter.write_file("a/b.txt", b"x", false, &ct).await.unwrap();
        assert_eq!(std::fs::read(root.join("a/b.txt")).unwrap(), b"x");
    }
}
