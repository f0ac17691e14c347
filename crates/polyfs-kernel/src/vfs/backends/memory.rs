//! In-memory adapter.
//!
//! Used for scratch space and testing. All data is ephemeral and owned by a
//! single adapter instance.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::SystemTime;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::vfs::adapter::{check_cancelled, Adapter, BackendKind};
use crate::vfs::error::{FsError, FsResult};
use crate::vfs::logging::LogSink;
use crate::vfs::path;
use crate::vfs::types::{DirectoryDescriptor, FileDescriptor};

#[derive(Debug, Clone)]
struct MemoryDirectory {
    created: SystemTime,
    modified: SystemTime,
}

impl MemoryDirectory {
    fn new() -> Self {
        let now = SystemTime::now();
        Self {
            created: now,
            modified: now,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    content: Vec<u8>,
    created: SystemTime,
    modified: SystemTime,
}

/// A path is already taken by an entry of the other kind.
#[derive(Debug, Error)]
enum KindConflict {
    #[error("'{0}' is a directory")]
    IsDirectory(String),
    #[error("'{0}' is a file")]
    IsFile(String),
}

/// Both maps are keyed by full backend path and always change together.
/// A key is never present in both.
#[derive(Debug, Default)]
struct MemoryStore {
    directories: BTreeMap<String, MemoryDirectory>,
    files: BTreeMap<String, MemoryFile>,
}

impl MemoryStore {
    /// Insert directory entries for every ancestor of `full` below `root`.
    fn ensure_parents(&mut self, root: &str, full: &str) {
        for ancestor in path::ancestors(full) {
            if path::is_within(ancestor, root) {
                self.directories
                    .entry(ancestor.to_string())
                    .or_insert_with(MemoryDirectory::new);
            }
        }
    }

    /// Fails if some ancestor of `full` is a file.
    fn check_ancestors(&self, full: &str) -> Result<(), KindConflict> {
        match path::ancestors(full)
            .into_iter()
            .find(|a| self.files.contains_key(*a))
        {
            Some(file) => Err(KindConflict::IsFile(file.to_string())),
            None => Ok(()),
        }
    }

    fn check_file_slot(&self, full: &str) -> Result<(), KindConflict> {
        if self.directories.contains_key(full) {
            return Err(KindConflict::IsDirectory(full.to_string()));
        }
        self.check_ancestors(full)
    }

    fn check_directory_slot(&self, full: &str) -> Result<(), KindConflict> {
        if self.files.contains_key(full) {
            return Err(KindConflict::IsFile(full.to_string()));
        }
        self.check_ancestors(full)
    }
}

/// In-memory adapter.
///
/// Thread-safe via an internal `RwLock` around both maps.
#[derive(Debug)]
pub struct MemoryAdapter {
    prefix: String,
    root_path: String,
    root_key: String,
    store: RwLock<MemoryStore>,
    log: LogSink,
}

impl MemoryAdapter {
    /// Create an empty store whose root directory already exists.
    pub fn new(prefix: impl Into<String>, root_path: impl Into<String>) -> Self {
        let root_path = root_path.into();
        let root_key = path::join_root(&root_path, "").unwrap_or_else(|_| root_path.clone());

        let mut store = MemoryStore::default();
        store
            .directories
            .insert(root_key.clone(), MemoryDirectory::new());

        Self {
            prefix: prefix.into(),
            root_path,
            root_key,
            store: RwLock::new(store),
            log: LogSink::ambient(),
        }
    }

    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    fn resolve(&self, path: &str) -> FsResult<String> {
        path::join_root(&self.root_path, path).map_err(|e| FsError::runtime(&self.prefix, e))
    }

    fn file_descriptor(full: &str, file: &MemoryFile) -> FileDescriptor {
        FileDescriptor::new(path::file_name(full), full, file.content.len() as u64)
            .with_modified(Some(file.modified))
            .with_created(Some(file.created))
    }

    fn directory_descriptor(full: &str, dir: &MemoryDirectory) -> DirectoryDescriptor {
        DirectoryDescriptor::new(path::file_name(full), full)
            .with_modified(Some(dir.modified))
            .with_created(Some(dir.created))
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn root_path(&self) -> &str {
        &self.root_path
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn connect(&self) -> FsResult<()> {
        self.log
            .emit(|| info!(adapter = %self.prefix, "memory adapter connected"));
        Ok(())
    }

    async fn disconnect(&self) {
        self.log
            .emit(|| info!(adapter = %self.prefix, "memory adapter disconnected"));
    }

    async fn dispose(&self) {}

    async fn get_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<FileDescriptor> {
        check_cancelled(&self.prefix, cancel)?;
        let full = self.resolve(path)?;
        let store = self.store.read();
        store
            .files
            .get(&full)
            .map(|file| Self::file_descriptor(&full, file))
            .ok_or_else(|| FsError::file_not_found(&full, &self.prefix))
    }

    async fn get_directory(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<DirectoryDescriptor> {
        check_cancelled(&self.prefix, cancel)?;
        let full = self.resolve(path)?;
        let store = self.store.read();
        store
            .directories
            .get(&full)
            .map(|dir| Self::directory_descriptor(&full, dir))
            .ok_or_else(|| FsError::directory_not_found(&full, &self.prefix))
    }

    async fn list_files(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<FileDescriptor>> {
        let dir = self.get_directory(path, cancel).await?;
        let store = self.store.read();
        Ok(store
            .files
            .iter()
            .filter(|(key, _)| path::parent(key) == Some(dir.path.as_str()))
            .map(|(key, file)| Self::file_descriptor(key, file))
            .collect())
    }

    async fn list_directories(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> FsResult<Vec<DirectoryDescriptor>> {
        let dir = self.get_directory(path, cancel).await?;
        let store = self.store.read();
        Ok(store
            .directories
            .iter()
            .filter(|(key, _)| *key != &dir.path && path::parent(key) == Some(dir.path.as_str()))
            .map(|(key, entry)| Self::directory_descriptor(key, entry))
            .collect())
    }

    async fn create_directory(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        if self.directory_exists(path, cancel).await? {
            return Err(FsError::directory_exists(self.resolve(path)?, &self.prefix));
        }

        let full = self.resolve(path)?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %full, "create_directory"));

        let mut store = self.store.write();
        store
            .check_directory_slot(&full)
            .map_err(|e| FsError::runtime(&self.prefix, e))?;
        store.ensure_parents(&self.root_key, &full);
        store.directories.insert(full, MemoryDirectory::new());
        Ok(())
    }

    async fn delete_directory(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        let dir = self.get_directory(path, cancel).await?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %dir.path, "delete_directory"));

        let mut store = self.store.write();
        store
            .directories
            .retain(|key, _| !path::is_within(key, &dir.path));
        store.files.retain(|key, _| !path::is_within(key, &dir.path));

        // Deleting the root empties it; the root itself stays addressable.
        store
            .directories
            .entry(self.root_key.clone())
            .or_insert_with(MemoryDirectory::new);
        Ok(())
    }

    async fn delete_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<()> {
        let file = self.get_file(path, cancel).await?;
        self.log
            .emit(|| debug!(adapter = %self.prefix, path = %file.path, "delete_file"));
        self.store.write().files.remove(&file.path);
        Ok(())
    }

    async fn read_file(&self, path: &str, cancel: &CancellationToken) -> FsResult<Vec<u8>> {
        let file = self.get_file(path, cancel).await?;
        let store = self.store.read();
        store
            .files
            .get(&file.path)
            .map(|f| f.content.clone())
            .ok_or_else(|| FsError::file_not_found(&file.path, &self.prefix))
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

        let now = SystemTime::now();
        let mut store = self.store.write();
        store
            .check_file_slot(&full)
            .map_err(|e| FsError::runtime(&self.prefix, e))?;
        store.ensure_parents(&self.root_key, &full);
        match store.files.get_mut(&full) {
            Some(file) => {
                file.content = contents.to_vec();
                file.modified = now;
            }
            None => {
                store.files.insert(
                    full,
                    MemoryFile {
                        content: contents.to_vec(),
                        created: now,
                        modified: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn append_file(
        &self,
        path: &str,
        contents: &[u8],
        cancel: &CancellationToken,
    ) -> FsResult<()> {
        let file = self.get_file(path, cancel).await?;
        self.log.emit(|| {
            debug!(adapter = %self.prefix, path = %file.path, bytes = contents.len(), "append_file")
        });

        let mut store = self.store.write();
        match store.files.get_mut(&file.path) {
            Some(entry) => {
                entry.content.extend_from_slice(contents);
                entry.modified = SystemTime::now();
                Ok(())
            }
            None => Err(FsError::file_not_found(&file.path, &self.prefix)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::error::ErrorKind;

    fn setup() -> (MemoryAdapter, CancellationToken) {
        (MemoryAdapter::new("memory-1", "/"), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_prefix_and_root() {
        let adapter = MemoryAdapter::new("memory-1", "/data");
        assert_eq!(adapter.prefix(), "memory-1");
        assert_eq!(adapter.root_path(), "/data");
        assert_eq!(adapter.backend(), BackendKind::Memory);
    }

    #[tokio::test]
    async fn test_root_directory_exists() {
        let (adapter, ct) = setup();
        assert!(adapter.directory_exists("", &ct).await.unwrap());
        assert!(adapter.directory_exists("/", &ct).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (adapter, ct) = setup();
        adapter
            .write_file("home/a.txt", b"hello", false, &ct)
            .await
            .unwrap();
        assert_eq!(adapter.read_file("home/a.txt", &ct).await.unwrap(), b"hello");
        assert_eq!(
            adapter.read_text_file("home/a.txt", &ct).await.unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let (adapter, ct) = setup();
        adapter
            .write_file("a/b/c.txt", b"x", false, &ct)
            .await
            .unwrap();
        assert!(adapter.directory_exists("a", &ct).await.unwrap());
        assert!(adapter.directory_exists("a/b", &ct).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_existing_without_overwrite_fails() {
        let (adapter, ct) = setup();
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
    async fn test_file_is_not_a_directory() {
        let (adapter, ct) = setup();
        adapter.write_file("a.txt", b"x", false, &ct).await.unwrap();
        let err = adapter.get_directory("a.txt", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotFound);
        assert!(!adapter.directory_exists("a.txt", &ct).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_over_directory_fails() {
        let (adapter, ct) = setup();
        adapter.create_directory("d", &ct).await.unwrap();

        for overwrite in [false, true] {
            let err = adapter
                .write_file("d", b"x", overwrite, &ct)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
        }
        assert!(!adapter.file_exists("d", &ct).await.unwrap());
        assert!(adapter.directory_exists("d", &ct).await.unwrap());

        let err = adapter.write_file("", b"x", true, &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
    }

    #[tokio::test]
    async fn test_directory_over_file_fails() {
        let (adapter, ct) = setup();
        adapter.write_file("f.txt", b"x", false, &ct).await.unwrap();

        let err = adapter.create_directory("f.txt", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
        let err = adapter.create_directory("f.txt/sub", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
        let err = adapter
            .write_file("f.txt/inner.txt", b"y", false, &ct)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);

        let files = adapter.list_files("", &ct).await.unwrap();
        let dirs = adapter.list_directories("", &ct).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(dirs.is_empty());
        assert_eq!(adapter.read_file("f.txt", &ct).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_create_directory_twice_fails() {
        let (adapter, ct) = setup();
        adapter.create_directory("docs", &ct).await.unwrap();
        assert!(adapter.directory_exists("docs", &ct).await.unwrap());

        let err = adapter.create_directory("docs", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryExists);
    }

    #[tokio::test]
    async fn test_create_directory_is_recursive() {
        let (adapter, ct) = setup();
        adapter.create_directory("x/y/z", &ct).await.unwrap();
        assert!(adapter.directory_exists("x", &ct).await.unwrap());
        assert!(adapter.directory_exists("x/y", &ct).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_directory_cascades() {
        let (adapter, ct) = setup();
        adapter
            .write_file("home/sub/a.txt", b"a", false, &ct)
            .await
            .unwrap();
        adapter.write_file("home/b.txt", b"b", false, &ct).await.unwrap();
        adapter.write_file("homework.txt", b"c", false, &ct).await.unwrap();

        adapter.delete_directory("home", &ct).await.unwrap();

        assert!(!adapter.directory_exists("home", &ct).await.unwrap());
        assert!(!adapter.directory_exists("home/sub", &ct).await.unwrap());
        assert!(!adapter.file_exists("home/sub/a.txt", &ct).await.unwrap());
        assert!(!adapter.file_exists("home/b.txt", &ct).await.unwrap());
        // Sibling with a shared name prefix survives.
        assert!(adapter.file_exists("homework.txt", &ct).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_directory() {
        let (adapter, ct) = setup();
        let err = adapter.delete_directory("nope", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotFound);
    }

    #[tokio::test]
    async fn test_delete_root_keeps_root() {
        let (adapter, ct) = setup();
        adapter.write_file("a.txt", b"a", false, &ct).await.unwrap();
        adapter.delete_directory("", &ct).await.unwrap();
        assert!(adapter.directory_exists("", &ct).await.unwrap());
        assert!(adapter.list_files("", &ct).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_file() {
        let (adapter, ct) = setup();
        let err = adapter.delete_file("a.txt", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);

        adapter.write_file("a.txt", b"a", false, &ct).await.unwrap();
        adapter.delete_file("a.txt", &ct).await.unwrap();
        assert!(!adapter.file_exists("a.txt", &ct).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_files_counts_overwrites_once() {
        let (adapter, ct) = setup();
        adapter.write_file("d/1.txt", b"1", false, &ct).await.unwrap();
        adapter.write_file("d/2.txt", b"2", false, &ct).await.unwrap();
        adapter.write_file("d/3.txt", b"3", false, &ct).await.unwrap();
        adapter.write_file("d/2.txt", b"22", true, &ct).await.unwrap();
        adapter.write_file("d/sub/4.txt", b"4", false, &ct).await.unwrap();

        let files = adapter.list_files("d", &ct).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["1.txt", "2.txt", "3.txt"]);
        assert!(files.iter().all(|f| f.content.is_none()));
    }

    #[tokio::test]
    async fn test_list_directories_direct_children_only() {
        let (adapter, ct) = setup();
        adapter.create_directory("d/a/deep", &ct).await.unwrap();
        adapter.create_directory("d/b", &ct).await.unwrap();
        adapter.write_file("d/file.txt", b"", false, &ct).await.unwrap();

        let dirs = adapter.list_directories("d", &ct).await.unwrap();
        let names: Vec<_> = dirs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let (adapter, ct) = setup();
        let err = adapter.list_files("ghost", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotFound);
    }

    #[tokio::test]
    async fn test_append() {
        let (adapter, ct) = setup();
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
    async fn test_append_missing_file() {
        let (adapter, ct) = setup();
        let err = adapter.append_file("/test.txt", b"x", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[tokio::test]
    async fn test_load_file_populates_content() {
        let (adapter, ct) = setup();
        adapter.write_file("a.txt", b"abc", false, &ct).await.unwrap();
        let file = adapter.load_file("a.txt", &ct).await.unwrap();
        assert_eq!(file.content.as_deref(), Some(&b"abc"[..]));
        assert_eq!(file.length, 3);
        assert_eq!(file.path, "/a.txt");
    }

    #[tokio::test]
    async fn test_root_path_is_prepended() {
        let adapter = MemoryAdapter::new("mem", "/data");
        let ct = CancellationToken::new();
        adapter.write_file("a.txt", b"x", false, &ct).await.unwrap();
        let file = adapter.get_file("a.txt", &ct).await.unwrap();
        assert_eq!(file.path, "/data/a.txt");
        // Nothing is created above the root.
        assert!(adapter.list_directories("", &ct).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_escape_blocked() {
        let (adapter, ct) = setup();
        let err = adapter.read_file("../etc/passwd", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
    }

    #[tokio::test]
    async fn test_cancelled_token() {
        let (adapter, ct) = setup();
        ct.cancel();
        let err = adapter.get_file("a.txt", &ct).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_runtime_error() {
        let (adapter, ct) = setup();
        adapter
            .write_file("bin", &[0xff, 0xfe], false, &ct)
            .await
            .unwrap();
        let err = adapter.read_text_file("bin", &ct).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AdapterRuntime);
    }
}
