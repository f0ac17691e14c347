//! Adapter implementations.
//!
//! Local disk and memory adapters own their storage. FTP and SFTP adapters
//! wrap an externally supplied protocol client through the traits in
//! [`remote`].

mod ftp;
mod local;
mod memory;
pub mod remote;
mod sftp;

#[cfg(any(test, feature = "test-mock"))]
pub mod mock;

pub use ftp::FtpAdapter;
pub use local::LocalAdapter;
pub use memory::MemoryAdapter;
pub use remote::{ClientError, FtpClient, RemoteEntry, RetryPolicy, SftpClient};
pub use sftp::SftpAdapter;
