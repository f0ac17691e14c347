//! Blocking front-end for synchronous callers.
//!
//! [`BlockingFileSystem`] owns a current-thread runtime and drives each
//! facade call to completion. Errors come back exactly as the async facade
//! produced them. Do not call it from inside an async context: blocking on
//! a runtime from within another runtime panics.

use std::io;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

use super::adapter::{Adapter, AdapterInfo};
use super::error::FsResult;
use super::filesystem::FileSystem;
use super::types::{DirectoryDescriptor, FileDescriptor};

pub struct BlockingFileSystem {
    inner: Arc<FileSystem>,
    runtime: Runtime,
    cancel: CancellationToken,
}

impl BlockingFileSystem {
    pub fn new(inner: FileSystem) -> io::Result<Self> {
        Self::from_arc(Arc::new(inner))
    }

    /// Share a facade that async code also holds.
    pub fn from_arc(inner: Arc<FileSystem>) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            inner,
            runtime,
            cancel: CancellationToken::new(),
        })
    }

    pub fn inner(&self) -> &Arc<FileSystem> {
        &self.inner
    }

    /// Token handed to every call; cancel it to stop further backend calls.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn add_adapter(&self, adapter: impl Adapter + 'static) -> FsResult<()> {
        self.runtime.block_on(self.inner.add_adapter(adapter))
    }

    pub fn adapter_infos(&self) -> Vec<AdapterInfo> {
        self.runtime.block_on(self.inner.adapter_infos())
    }

    pub fn connect_all(&self) -> FsResult<()> {
        self.runtime.block_on(self.inner.connect_all())
    }

    pub fn disconnect_all(&self) {
        self.runtime.block_on(self.inner.disconnect_all());
    }

    pub fn dispose_all(&self) {
        self.runtime.block_on(self.inner.dispose_all());
    }

    pub fn get_file(&self, path: &str) -> FsResult<FileDescriptor> {
        self.runtime.block_on(self.inner.get_file(path, &self.cancel))
    }

    pub fn get_directory(&self, path: &str) -> FsResult<DirectoryDescriptor> {
        self.runtime
            .block_on(self.inner.get_directory(path, &self.cancel))
    }

    pub fn file_exists(&self, path: &str) -> FsResult<bool> {
        self.runtime.block_on(self.inner.file_exists(path, &self.cancel))
    }

    pub fn directory_exists(&self, path: &str) -> FsResult<bool> {
        self.runtime
            .block_on(self.inner.directory_exists(path, &self.cancel))
    }

    pub fn list_files(&self, path: &str) -> FsResult<Vec<FileDescriptor>> {
        self.runtime.block_on(self.inner.list_files(path, &self.cancel))
    }

    pub fn list_directories(&self, path: &str) -> FsResult<Vec<DirectoryDescriptor>> {
        self.runtime
            .block_on(self.inner.list_directories(path, &self.cancel))
    }

    pub fn create_directory(&self, path: &str) -> FsResult<()> {
        self.runtime
            .block_on(self.inner.create_directory(path, &self.cancel))
    }

    pub fn delete_directory(&self, path: &str) -> FsResult<()> {
        self.runtime
            .block_on(self.inner.delete_directory(path, &self.cancel))
    }

    pub fn delete_file(&self, path: &str) -> FsResult<()> {
        self.runtime.block_on(self.inner.delete_file(path, &self.cancel))
    }

    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        self.runtime.block_on(self.inner.read_file(path, &self.cancel))
    }

    pub fn read_text_file(&self, path: &str) -> FsResult<String> {
        self.runtime
            .block_on(self.inner.read_text_file(path, &self.cancel))
    }

    pub fn load_file(&self, path: &str) -> FsResult<FileDescriptor> {
        self.runtime.block_on(self.inner.load_file(path, &self.cancel))
    }

    pub fn write_file(&self, path: &str, contents: &[u8], overwrite: bool) -> FsResult<()> {
        self.runtime
            .block_on(self.inner.write_file(path, contents, overwrite, &self.cancel))
    }

    pub fn write_text_file(&self, path: &str, contents: &str, overwrite: bool) -> FsResult<()> {
        self.runtime.block_on(
            self.inner
                .write_text_file(path, contents, overwrite, &self.cancel),
        )
    }

    pub fn append_file(&self, path: &str, contents: &[u8]) -> FsResult<()> {
        self.runtime
            .block_on(self.inner.append_file(path, contents, &self.cancel))
    }

    pub fn append_text_file(&self, path: &str, contents: &str) -> FsResult<()> {
        self.runtime
            .block_on(self.inner.append_text_file(path, contents, &self.cancel))
    }

    pub fn copy_file(&self, source: &str, destination: &str, overwrite: bool) -> FsResult<()> {
        self.runtime.block_on(
            self.inner
                .copy_file(source, destination, overwrite, &self.cancel),
        )
    }

    pub fn move_file(&self, source: &str, destination: &str, overwrite: bool) -> FsResult<()> {
        self.runtime.block_on(
            self.inner
                .move_file(source, destination, overwrite, &self.cancel),
        )
    }
}
