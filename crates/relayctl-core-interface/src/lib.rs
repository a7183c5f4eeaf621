//! relayctl Core Interface: Remote Session Abstraction
//!
//! This crate defines the `RemoteSession` trait, the single channel through which
//! relayctl talks to a streaming host. A session offers two kinds of operations:
//!
//! 1. **Command execution**: run one shell command and collect its output
//! 2. **File placement**: upload a local file or write content directly
//!
//! # Example
//!
//! ```rust,no_run
//! use relayctl_core_interface::RemoteSession;
//!
//! async fn host_zone<S: RemoteSession>(session: &S) -> relayctl_core_interface::Result<String> {
//!     let output = session.run("cat /etc/timezone").await?;
//!     Ok(output.stdout.trim().to_string())
//! }
//! ```
//!
//! # Ordering
//!
//! Implementations must serialize `run`: several engine operations are
//! multi-step (list the queue, then inspect each job) and depend on the host
//! seeing commands in the order they were issued.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The channel is not connected or dropped mid-call. Fatal for the session.
    #[error("Session lost: {0}")]
    Lost(String),

    /// A local file could not be read for upload
    #[error("Local file error for {path}: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote side rejected a file operation
    #[error("Transfer to {remote_path} failed: {message}")]
    Transfer {
        remote_path: String,
        message: String,
    },
}

impl SessionError {
    /// Whether this error means the whole session is unusable
    pub fn is_lost(&self) -> bool {
        matches!(self, SessionError::Lost(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Output of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status reported by the host, when the channel delivered one
    pub exit_status: Option<i32>,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status: Some(exit_status),
        }
    }

    /// True when the command reported exit status zero
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Upload progress callback: `(bytes_sent, total_bytes)`
pub type ProgressFn = Box<dyn FnMut(u64, u64) + Send>;

/// A bidirectional command-execution and file-transfer channel to one host
///
/// Implementations must be `Send + Sync + 'static` so a single session can be
/// shared by every worker task.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Run one shell command on the host and wait for it to finish
    ///
    /// A non-zero exit status is not an error; callers inspect the output.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Lost` if the channel is gone.
    async fn run(&self, command: &str) -> Result<CommandOutput>;

    /// Upload a local file to `remote_path`, reporting progress as it goes
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        on_progress: ProgressFn,
    ) -> Result<u64>;

    /// Create or truncate `remote_path` with the given content
    async fn write_file(&self, remote_path: &str, content: &str) -> Result<()>;

    /// Whether the channel still believes it is connected
    fn is_connected(&self) -> bool;
}
