//! Core VFS types.
//!
//! Descriptors are plain data produced by adapters. They serialize cleanly
//! so a hosting layer can hand them straight to a client.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Kind of backend entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl EntryKind {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// A file as seen through an adapter.
///
/// `content` is only populated by [`Adapter::load_file`](super::Adapter::load_file);
/// lookups and listings leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Last path segment.
    pub name: String,
    /// Full backend path (root path included).
    pub path: String,
    /// Size in bytes.
    pub length: u64,
    /// Raw bytes, when read.
    pub content: Option<Vec<u8>>,
    pub last_modified: Option<SystemTime>,
    pub created: Option<SystemTime>,
}

impl FileDescriptor {
    /// Create a descriptor without timestamps or content.
    pub fn new(name: impl Into<String>, path: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            length,
            content: None,
            last_modified: None,
            created: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.last_modified = modified;
        self
    }

    pub fn with_created(mut self, created: Option<SystemTime>) -> Self {
        self.created = created;
        self
    }

    /// Attach the file's bytes. `length` follows the content.
    pub fn with_content(mut self, content: Vec<u8>) -> Self {
        self.length = content.len() as u64;
        self.content = Some(content);
        self
    }
}

/// A directory as seen through an adapter. Children are not loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryDescriptor {
    /// Last path segment (empty for a root of `/`).
    pub name: String,
    /// Full backend path (root path included).
    pub path: String,
    pub last_modified: Option<SystemTime>,
    pub created: Option<SystemTime>,
}

impl DirectoryDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            last_modified: None,
            created: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.last_modified = modified;
        self
    }

    pub fn with_created(mut self, created: Option<SystemTime>) -> Self {
        self.created = created;
        self
    }
}
