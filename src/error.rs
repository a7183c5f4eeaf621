/*!
 * Error types for relayctl
 */

use relayctl_core_interface::SessionError;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, RelayError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum RelayError {
    /// Zone identifier could not be resolved
    ZoneResolution { zone: String },

    /// Local wall-clock time does not exist in the zone (DST gap)
    InvalidLocalTime { time: String, zone: String },

    /// Operator-supplied date or time could not be parsed
    InvalidInput(String),

    /// Transport went away; the session must be re-established
    SessionLost(String),

    /// Could not reach the host
    Connection { endpoint: String, message: String },

    /// Host rejected the credentials
    Authentication(String),

    /// The deferred-execution facility did not acknowledge a job
    SubmissionRejected { output: String },

    /// Job id is not a facility id
    InvalidJobId(String),

    /// A file transfer to the host failed
    Transfer(String),

    /// Configuration error
    Config(String),

    /// I/O error
    Io(io::Error),

    /// Generic error with message
    Other(String),
}

impl RelayError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::SessionLost(_)
            | RelayError::Connection { .. }
            | RelayError::Authentication(_)
            | RelayError::Config(_) => EXIT_FATAL,
            _ => EXIT_PARTIAL,
        }
    }

    /// Check if this error ends the session (no further operations in the batch)
    pub fn is_fatal(&self) -> bool {
        match self {
            RelayError::SessionLost(_) => true,
            RelayError::Connection { .. } => true,
            RelayError::Authentication(_) => true,
            RelayError::Config(_) => true,

            // Abort only the current operation
            RelayError::ZoneResolution { .. } => false,
            RelayError::InvalidLocalTime { .. } => false,
            RelayError::InvalidInput(_) => false,
            RelayError::SubmissionRejected { .. } => false,
            RelayError::InvalidJobId(_) => false,
            RelayError::Transfer(_) => false,
            RelayError::Io(_) => false,
            RelayError::Other(_) => false,
        }
    }

    /// Check if this error means the operator must reconnect
    pub fn is_session_lost(&self) -> bool {
        matches!(self, RelayError::SessionLost(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::ZoneResolution { .. }
            | RelayError::InvalidLocalTime { .. }
            | RelayError::InvalidInput(_) => ErrorCategory::Time,
            RelayError::SessionLost(_) | RelayError::Connection { .. } => ErrorCategory::Network,
            RelayError::Authentication(_) => ErrorCategory::Security,
            RelayError::SubmissionRejected { .. } | RelayError::InvalidJobId(_) => {
                ErrorCategory::Scheduling
            }
            RelayError::Transfer(_) | RelayError::Io(_) => ErrorCategory::IoError,
            RelayError::Config(_) => ErrorCategory::Configuration,
            RelayError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Zone resolution and wall-clock conversion
    Time,
    /// Transport errors
    Network,
    /// Authentication errors
    Security,
    /// Facility submission and job ids
    Scheduling,
    /// Local or remote file I/O
    IoError,
    /// Configuration errors
    Configuration,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Time => write!(f, "time"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Security => write!(f, "security"),
            ErrorCategory::Scheduling => write!(f, "scheduling"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::ZoneResolution { zone } => {
                write!(f, "Unknown time zone: '{}'", zone)
            }
            RelayError::InvalidLocalTime { time, zone } => {
                write!(f, "{} does not exist in time zone {}", time, zone)
            }
            RelayError::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            RelayError::SessionLost(msg) => {
                write!(f, "SSH connection lost: {}. Please log in again.", msg)
            }
            RelayError::Connection { endpoint, message } => {
                write!(f, "Failed to connect to {}: {}", endpoint, message)
            }
            RelayError::Authentication(msg) => {
                write!(f, "Authentication error: {}", msg)
            }
            RelayError::SubmissionRejected { output } => {
                write!(f, "Scheduler did not accept the job: {}", output)
            }
            RelayError::InvalidJobId(id) => {
                write!(f, "Invalid job id: '{}'", id)
            }
            RelayError::Transfer(msg) => {
                write!(f, "Transfer error: {}", msg)
            }
            RelayError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            RelayError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            RelayError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RelayError {
    fn from(err: io::Error) -> Self {
        RelayError::Io(err)
    }
}

impl From<SessionError> for RelayError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Lost(msg) => RelayError::SessionLost(msg),
            SessionError::LocalFile { source, .. } => RelayError::Io(source),
            other @ SessionError::Transfer { .. } => RelayError::Transfer(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::Config(format!("TOML parse error: {}", err))
    }
}
