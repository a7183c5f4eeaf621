//! SSH/SFTP session implementation
//!
//! Runs host commands over SSH exec channels and places files over SFTP.

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use relayctl_core_interface::{
    CommandOutput, ProgressFn, RemoteSession, Result as SessionResult, SessionError,
};
use secrecy::{ExposeSecret, SecretString};
use ssh2::{Channel, ErrorCode, Session, Sftp};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
const READ_CHUNK_SIZE: usize = 16 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// libssh2 socket failures: send, disconnect, recv
const SOCKET_ERROR_CODES: [i32; 3] = [-7, -13, -43];

/// SSH authentication method
#[derive(Debug, Clone)]
pub enum SshAuth {
    /// Password authentication
    Password(SecretString),

    /// Public key authentication with private key file
    KeyFile {
        /// Path to private key file
        key_path: PathBuf,
        /// Optional passphrase for the key
        passphrase: Option<SecretString>,
    },

    /// SSH agent authentication
    Agent,
}

/// SSH session configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Hostname or IP address
    pub host: String,

    /// Port (default: 22)
    pub port: u16,

    /// Username
    pub username: String,

    /// Authentication method
    pub auth: SshAuth,

    /// Connect and I/O timeout in seconds
    pub timeout_secs: u64,
}

impl SshConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, auth: SshAuth) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth,
            timeout_secs: 10,
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connection timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct SshInner {
    session: Session,
    sftp: Sftp,
}

/// SSH-backed `RemoteSession`
///
/// The ssh2 session and its SFTP handle sit behind one mutex, and every call
/// runs inside `spawn_blocking` while holding it, so commands from concurrent
/// workers reach the host strictly one at a time.
///
/// Once any channel operation fails the session latches into the lost state;
/// every later call fails with `SessionError::Lost` without touching the socket.
pub struct SshSession {
    endpoint: String,
    inner: Arc<Mutex<SshInner>>,
    lost: Arc<AtomicBool>,
}

impl SshSession {
    /// Connect and authenticate
    pub async fn connect(config: SshConfig) -> Result<Self> {
        // SSH operations are blocking, so run in blocking task
        tokio::task::spawn_blocking(move || Self::connect_blocking(config))
            .await
            .map_err(|e| RelayError::Other(format!("Task join error: {}", e)))?
    }

    fn connect_blocking(config: SshConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        let connection_error = |message: String| RelayError::Connection {
            endpoint: endpoint.clone(),
            message,
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        let addr = endpoint
            .to_socket_addrs()
            .map_err(|e| connection_error(e.to_string()))?
            .next()
            .ok_or_else(|| connection_error("host did not resolve".to_string()))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| connection_error(e.to_string()))?;

        let mut session = Session::new()
            .map_err(|e| connection_error(format!("Failed to create SSH session: {}", e)))?;

        session.set_tcp_stream(tcp);
        session.set_timeout(config.timeout_secs as u32 * 1000); // milliseconds

        session
            .handshake()
            .map_err(|e| connection_error(format!("Handshake failed: {}", e)))?;

        authenticate(&session, &config)?;

        if !session.authenticated() {
            return Err(RelayError::Authentication(
                "Authentication failed".to_string(),
            ));
        }

        // Handshake is done; long-running host commands must not trip the timeout
        session.set_timeout(0);

        let sftp = session
            .sftp()
            .map_err(|e| connection_error(format!("Failed to open SFTP channel: {}", e)))?;

        tracing::info!(endpoint = %endpoint, user = %config.username, "SSH session established");

        Ok(Self {
            endpoint,
            inner: Arc::new(Mutex::new(SshInner { session, sftp })),
            lost: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run `op` on the blocking pool while holding the session lock
    async fn with_session<T, F>(&self, op: F) -> SessionResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SshInner) -> SessionResult<T> + Send + 'static,
    {
        if self.lost.load(Ordering::SeqCst) {
            return Err(SessionError::Lost("connection dropped earlier".to_string()));
        }

        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || {
            let guard = inner
                .lock()
                .map_err(|_| SessionError::Lost("session lock poisoned".to_string()))?;
            op(&*guard)
        })
        .await
        .map_err(|e| SessionError::Lost(format!("Task join error: {}", e)))?;

        if matches!(result, Err(SessionError::Lost(_))) {
            self.lost.store(true, Ordering::SeqCst);
        }
        result
    }
}

fn authenticate(session: &Session, config: &SshConfig) -> Result<()> {
    match &config.auth {
        SshAuth::Password(password) => {
            session
                .userauth_password(&config.username, password.expose_secret())
                .map_err(|e| {
                    RelayError::Authentication(format!("Password authentication failed: {}", e))
                })?;
        }
        SshAuth::KeyFile {
            key_path,
            passphrase,
        } => {
            let pass: Option<&str> = passphrase.as_ref().map(|p| p.expose_secret());
            session
                .userauth_pubkey_file(&config.username, None, key_path, pass)
                .map_err(|e| {
                    RelayError::Authentication(format!("Key file authentication failed: {}", e))
                })?;
        }
        SshAuth::Agent => {
            let mut agent = session.agent().map_err(|e| {
                RelayError::Authentication(format!("Failed to connect to SSH agent: {}", e))
            })?;

            agent.connect().map_err(|e| {
                RelayError::Authentication(format!("Failed to connect to SSH agent: {}", e))
            })?;

            agent.list_identities().map_err(|e| {
                RelayError::Authentication(format!("Failed to list SSH agent identities: {}", e))
            })?;

            let identities = agent.identities().map_err(|e| {
                RelayError::Authentication(format!("Failed to get SSH agent identities: {}", e))
            })?;

            let authenticated = identities
                .iter()
                .any(|identity| agent.userauth(&config.username, identity).is_ok());

            if !authenticated {
                return Err(RelayError::Authentication(
                    "No valid identity found in SSH agent".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn lost(err: impl std::fmt::Display) -> SessionError {
    SessionError::Lost(err.to_string())
}

/// Whether an ssh2 error means the transport itself is gone
fn is_disconnect(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::Session(code) if SOCKET_ERROR_CODES.contains(&code))
}

/// Whether an I/O error from a channel or SFTP file means the transport is gone
fn is_io_disconnect(err: &io::Error) -> bool {
    if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<ssh2::Error>()) {
        return is_disconnect(inner);
    }
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

fn sftp_error(remote_path: &str, err: ssh2::Error) -> SessionError {
    if is_disconnect(&err) {
        return lost(err);
    }
    SessionError::Transfer {
        remote_path: remote_path.to_string(),
        message: err.to_string(),
    }
}

fn write_error(remote_path: &str, err: io::Error) -> SessionError {
    if is_io_disconnect(&err) {
        return lost(err);
    }
    SessionError::Transfer {
        remote_path: remote_path.to_string(),
        message: err.to_string(),
    }
}

fn run_blocking(inner: &SshInner, command: &str) -> SessionResult<CommandOutput> {
    let mut channel = inner.session.channel_session().map_err(lost)?;
    channel.exec(command).map_err(lost)?;

    // Both streams share the channel window, so read them together
    inner.session.set_blocking(false);
    let drained = drain_channel(&mut channel);
    inner.session.set_blocking(true);
    let (stdout, stderr) = drained?;

    channel.wait_close().map_err(lost)?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_status: channel.exit_status().ok(),
    })
}

/// Read stdout and stderr until the remote side closes both
fn drain_channel(channel: &mut Channel) -> SessionResult<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let got_out = read_available(channel, &mut buffer, &mut stdout)?;
        let got_err = read_available(&mut channel.stderr(), &mut buffer, &mut stderr)?;

        if !got_out && !got_err {
            if channel.eof() {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    Ok((stdout, stderr))
}

/// Append whatever `reader` has ready; false when nothing was read
fn read_available<R: Read>(
    reader: &mut R,
    buffer: &mut [u8],
    sink: &mut Vec<u8>,
) -> SessionResult<bool> {
    match reader.read(buffer) {
        Ok(0) => Ok(false),
        Ok(n) => {
            sink.extend_from_slice(&buffer[..n]);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(lost(e)),
    }
}

fn upload_blocking(
    sftp: &Sftp,
    local_path: &Path,
    remote_path: &str,
    mut on_progress: ProgressFn,
) -> SessionResult<u64> {
    let local_error = |source: std::io::Error| SessionError::LocalFile {
        path: local_path.to_path_buf(),
        source,
    };
    let mut source = std::fs::File::open(local_path).map_err(local_error)?;
    let total = source.metadata().map_err(local_error)?.len();

    let mut dest = sftp
        .create(Path::new(remote_path))
        .map_err(|e| sftp_error(remote_path, e))?;

    let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
    let mut sent = 0u64;
    on_progress(0, total);

    loop {
        let n = source.read(&mut buffer).map_err(local_error)?;
        if n == 0 {
            break;
        }
        dest.write_all(&buffer[..n])
            .map_err(|e| write_error(remote_path, e))?;
        sent += n as u64;
        on_progress(sent, total);
    }

    Ok(sent)
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&self, command: &str) -> SessionResult<CommandOutput> {
        tracing::debug!(endpoint = %self.endpoint, command = %command, "Running remote command");

        let command_owned = command.to_string();
        let output = self
            .with_session(move |inner| run_blocking(inner, &command_owned))
            .await?;

        let stderr = output.stderr.trim();
        if !stderr.is_empty() && !stderr.to_lowercase().contains("not found") {
            tracing::debug!(command = %command, stderr = %stderr, "Remote command wrote to stderr");
        }

        Ok(output)
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        on_progress: ProgressFn,
    ) -> SessionResult<u64> {
        tracing::debug!(local = %local_path.display(), remote = %remote_path, "Uploading file");

        let local_path = local_path.to_path_buf();
        let remote_path = remote_path.to_string();
        self.with_session(move |inner| {
            upload_blocking(&inner.sftp, &local_path, &remote_path, on_progress)
        })
        .await
    }

    async fn write_file(&self, remote_path: &str, content: &str) -> SessionResult<()> {
        tracing::debug!(remote = %remote_path, bytes = content.len(), "Writing remote file");

        let remote_path = remote_path.to_string();
        let content = content.to_string();
        self.with_session(move |inner| {
            let mut file = inner
                .sftp
                .create(Path::new(&remote_path))
                .map_err(|e| sftp_error(&remote_path, e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| write_error(&remote_path, e))
        })
        .await
    }

    fn is_connected(&self) -> bool {
        !self.lost.load(Ordering::SeqCst)
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.lock() {
            let _ = inner.session.disconnect(None, "Closing connection", None);
        }
    }
}
