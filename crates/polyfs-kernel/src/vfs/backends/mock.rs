//! In-process FTP and SFTP clients for exercising the network adapters.
//!
//! Both clients share a [`MockServer`]: a small path tree plus knobs for the
//! failure modes the adapters have to cope with (dropped sessions, refused
//! logins, servers that lag behind their own writes).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use super::remote::{ClientError, FtpClient, RemoteEntry, SftpClient};
use crate::vfs::path;

/// Failure injected into every data operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Socket,
    Session,
    Protocol,
}

impl MockFailure {
    fn to_error(self) -> ClientError {
        match self {
            MockFailure::Socket => {
                ClientError::Socket(io::Error::from(io::ErrorKind::ConnectionReset))
            }
            MockFailure::Session => ClientError::Session("connection dropped".into()),
            MockFailure::Protocol => ClientError::Protocol("451 local error".into()),
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    directories: BTreeSet<String>,
    files: BTreeMap<String, (Vec<u8>, SystemTime)>,
    connected: bool,
    closed: bool,
    reject_auth: bool,
    failure: Option<MockFailure>,
    /// Lookups to answer with "nothing" after each write.
    stale_after_write: u32,
    pending_stale: u32,
    lookups: u32,
}

impl ServerState {
    fn key(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn check(&self) -> Result<(), ClientError> {
        if !self.connected {
            return Err(ClientError::Session("not connected".into()));
        }
        match self.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn entry(&self, key: &str, display: String) -> Option<RemoteEntry> {
        if self.directories.contains(key) {
            Some(RemoteEntry::directory(display))
        } else {
            self.files.get(key).map(|(data, modified)| {
                RemoteEntry::file(display, data.len() as u64).with_modified(Some(*modified))
            })
        }
    }

    /// Answer a lookup, honouring pending staleness.
    fn lookup(&mut self, key: &str, display: String) -> Option<RemoteEntry> {
        self.lookups += 1;
        if self.pending_stale > 0 {
            self.pending_stale -= 1;
            return None;
        }
        self.entry(key, display)
    }

    fn children(&self, key: &str) -> Vec<String> {
        let dirs = self.directories.iter();
        let files = self.files.keys();
        let mut children: Vec<String> = dirs
            .chain(files)
            .filter(|k| !k.is_empty() && path::parent(k) == Some(key))
            .cloned()
            .collect();
        children.sort();
        children
    }

    fn ensure_parents(&mut self, key: &str) {
        for ancestor in path::ancestors(key) {
            self.directories.insert(ancestor.to_string());
        }
    }

    fn parent_exists(&self, key: &str) -> bool {
        path::parent(key).is_none_or(|p| self.directories.contains(p))
    }

    fn put(&mut self, key: String, data: Vec<u8>) {
        self.files.insert(key, (data, SystemTime::now()));
        self.pending_stale = self.stale_after_write;
    }

    fn remove_tree(&mut self, key: &str) {
        self.directories.retain(|k| !path::is_within(k, key));
        self.files.retain(|k, _| !path::is_within(k, key));
        self.directories.insert(String::new());
    }
}

/// Shared server state; clone it to inspect or steer a running test.
#[derive(Debug, Clone)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        let mut state = ServerState::default();
        state.directories.insert(String::new());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn ftp_client(&self) -> MockFtpClient {
        MockFtpClient {
            server: self.clone(),
        }
    }

    pub fn sftp_client(&self) -> MockSftpClient {
        MockSftpClient {
            server: self.clone(),
        }
    }

    /// Refuse logins from now on.
    pub fn reject_auth(&self, reject: bool) {
        self.state.lock().reject_auth = reject;
    }

    pub fn fail_with(&self, failure: Option<MockFailure>) {
        self.state.lock().failure = failure;
    }

    /// Answer the next `n` lookups after every write with "nothing".
    pub fn stale_after_write(&self, n: u32) {
        self.state.lock().stale_after_write = n;
    }

    /// Drop the session from the server side.
    pub fn drop_session(&self) {
        self.state.lock().connected = false;
    }

    pub fn lookups(&self) -> u32 {
        self.state.lock().lookups
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.state.lock().files.contains_key(&ServerState::key(path))
    }

    pub fn has_directory(&self, path: &str) -> bool {
        self.state
            .lock()
            .directories
            .contains(&ServerState::key(path))
    }

    /// Seed a file without going through a client.
    pub fn put_file(&self, path: &str, data: &[u8]) {
        let key = ServerState::key(path);
        let mut state = self.state.lock();
        state.ensure_parents(&key);
        state.files.insert(key, (data.to_vec(), SystemTime::now()));
    }

    fn connect(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if state.reject_auth {
            return Err(ClientError::Authentication("530 login incorrect".into()));
        }
        state.connected = true;
        state.closed = false;
        Ok(())
    }
}

/// FTP flavour: absolute paths, recursive mkdir/rmdir, `None` for missing objects.
#[derive(Debug)]
pub struct MockFtpClient {
    server: MockServer,
}

impl MockFtpClient {
    fn display(key: &str) -> String {
        format!("/{key}")
    }
}

#[async_trait]
impl FtpClient for MockFtpClient {
    fn is_connected(&self) -> bool {
        self.server.state.lock().connected
    }

    async fn connect(&mut self) -> Result<(), ClientError> {
        self.server.connect()
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        self.server.state.lock().connected = false;
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.server.state.lock();
        state.connected = false;
        state.closed = true;
    }

    async fn object_info(&mut self, path: &str) -> Result<Option<RemoteEntry>, ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        let key = ServerState::key(path);
        Ok(state.lookup(&key, Self::display(&key)))
    }

    async fn listing(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ClientError> {
        let state = self.server.state.lock();
        state.check()?;
        let key = ServerState::key(path);
        Ok(state
            .children(&key)
            .iter()
            .filter_map(|child| state.entry(child, Self::display(child)))
            .collect())
    }

    async fn create_directory(&mut self, path: &str, recursive: bool) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        let key = ServerState::key(path);
        if recursive {
            state.ensure_parents(&key);
        } else if !state.parent_exists(&key) {
            return Err(ClientError::PathNotFound(path.to_string()));
        }
        state.directories.insert(key);
        Ok(())
    }

    async fn delete_directory(&mut self, path: &str) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        state.remove_tree(&ServerState::key(path));
        Ok(())
    }

    async fn delete_file(&mut self, path: &str) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        match state.files.remove(&ServerState::key(path)) {
            Some(_) => Ok(()),
            None => Err(ClientError::PathNotFound(path.to_string())),
        }
    }

    async fn download(&mut self, path: &str) -> Result<Vec<u8>, ClientError> {
        let state = self.server.state.lock();
        state.check()?;
        state
            .files
            .get(&ServerState::key(path))
            .map(|(data, _)| data.clone())
            .ok_or_else(|| ClientError::PathNotFound(path.to_string()))
    }

    async fn upload(&mut self, path: &str, data: &[u8]) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        let key = ServerState::key(path);
        state.ensure_parents(&key);
        state.put(key, data.to_vec());
        Ok(())
    }

    async fn append(&mut self, path: &str, data: &[u8]) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        match state.files.get_mut(&ServerState::key(path)) {
            Some((content, modified)) => {
                content.extend_from_slice(data);
                *modified = SystemTime::now();
                Ok(())
            }
            None => Err(ClientError::PathNotFound(path.to_string())),
        }
    }
}

/// SFTP flavour: relative paths, single-level mkdir/rmdir, `.`/`..` in listings.
#[derive(Debug)]
pub struct MockSftpClient {
    server: MockServer,
}

#[async_trait]
impl SftpClient for MockSftpClient {
    fn is_connected(&self) -> bool {
        self.server.state.lock().connected
    }

    async fn connect(&mut self) -> Result<(), ClientError> {
        self.server.connect()
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        self.server.state.lock().connected = false;
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.server.state.lock();
        state.connected = false;
        state.closed = true;
    }

    async fn stat(&mut self, path: &str) -> Result<RemoteEntry, ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        let key = ServerState::key(path);
        state
            .lookup(&key, key.clone())
            .ok_or_else(|| ClientError::PathNotFound(path.to_string()))
    }

    async fn read_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, ClientError> {
        let state = self.server.state.lock();
        state.check()?;
        let key = ServerState::key(path);
        if !state.directories.contains(&key) {
            return Err(ClientError::PathNotFound(path.to_string()));
        }
        let dot = |name: &str| {
            let mut entry = RemoteEntry::directory(name);
            entry.name = name.to_string();
            entry
        };
        let mut entries = vec![dot("."), dot("..")];
        entries.extend(
            state
                .children(&key)
                .iter()
                .filter_map(|child| state.entry(child, child.clone())),
        );
        Ok(entries)
    }

    async fn create_dir(&mut self, path: &str) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        let key = ServerState::key(path);
        if state.directories.contains(&key) || state.files.contains_key(&key) {
            return Err(ClientError::Protocol(format!("{path}: failure")));
        }
        if !state.parent_exists(&key) {
            return Err(ClientError::PathNotFound(path.to_string()));
        }
        state.directories.insert(key);
        Ok(())
    }

    async fn remove_dir(&mut self, path: &str) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        let key = ServerState::key(path);
        if !state.directories.contains(&key) {
            return Err(ClientError::PathNotFound(path.to_string()));
        }
        if !state.children(&key).is_empty() {
            return Err(ClientError::Protocol(format!("{path}: directory not empty")));
        }
        state.directories.remove(&key);
        Ok(())
    }

    async fn remove_file(&mut self, path: &str) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        match state.files.remove(&ServerState::key(path)) {
            Some(_) => Ok(()),
            None => Err(ClientError::PathNotFound(path.to_string())),
        }
    }

    async fn read(&mut self, path: &str) -> Result<Vec<u8>, ClientError> {
        let state = self.server.state.lock();
        state.check()?;
        state
            .files
            .get(&ServerState::key(path))
            .map(|(data, _)| data.clone())
            .ok_or_else(|| ClientError::PathNotFound(path.to_string()))
    }

    async fn write(&mut self, path: &str, data: &[u8]) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        let key = ServerState::key(path);
        if !state.parent_exists(&key) {
            return Err(ClientError::PathNotFound(path.to_string()));
        }
        state.put(key, data.to_vec());
        Ok(())
    }

    async fn append(&mut self, path: &str, data: &[u8]) -> Result<(), ClientError> {
        let mut state = self.server.state.lock();
        state.check()?;
        match state.files.get_mut(&ServerState::key(path)) {
            Some((content, modified)) => {
                content.extend_from_slice(data);
                *modified = SystemTime::now();
                Ok(())
            }
            None => Err(ClientError::PathNotFound(path.to_string())),
        }
    }
}
