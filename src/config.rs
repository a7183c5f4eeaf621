/*!
 * Configuration types for relayctl
 */

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// How to reach the streaming host
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Fixed paths and commands agreed with the host
    #[serde(default)]
    pub host: HostLayout,

    /// Operator-side scheduling settings
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// SSH connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Hostname or IP address
    #[serde(default)]
    pub host: String,

    /// Port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username
    #[serde(default = "default_username")]
    pub username: String,

    /// Authentication method
    #[serde(default)]
    pub auth: AuthMethod,

    /// Private key for `auth = "key"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    /// Connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: default_username(),
            auth: AuthMethod::default(),
            key_path: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Authentication method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Password from RELAYCTL_PASSWORD or an interactive prompt
    #[default]
    Password,

    /// Private key file
    Key,

    /// SSH agent
    Agent,
}

/// Host-side paths and commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostLayout {
    /// Directory uploads land in
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Public page swapped between live and idle content
    #[serde(default = "default_public_page_path")]
    pub public_page_path: String,

    /// Custom live page, used when present on the host
    #[serde(default = "default_player_template_path")]
    pub player_template_path: String,

    /// Custom idle page, used when present on the host
    #[serde(default = "default_idle_template_path")]
    pub idle_template_path: String,

    /// Relay/encoder binary
    #[serde(default = "default_relay_binary")]
    pub relay_binary: String,

    /// Where the relay publishes
    #[serde(default = "default_relay_target_url")]
    pub relay_target_url: String,

    /// Control script location
    #[serde(default = "default_script_path")]
    pub script_path: String,

    /// Control script log
    #[serde(default = "default_log_path")]
    pub log_path: String,

    /// Single-line file holding the host's IANA zone
    #[serde(default = "default_zone_file")]
    pub zone_file: String,
}

impl Default for HostLayout {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            public_page_path: default_public_page_path(),
            player_template_path: default_player_template_path(),
            idle_template_path: default_idle_template_path(),
            relay_binary: default_relay_binary(),
            relay_target_url: default_relay_target_url(),
            script_path: default_script_path(),
            log_path: default_log_path(),
            zone_file: default_zone_file(),
        }
    }
}

/// Operator-side scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Operator's IANA zone
    #[serde(default = "default_local_zone")]
    pub local_zone: String,

    /// Console queue refresh interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            local_zone: default_local_zone(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    #[default]
    Warn,

    /// Info, warnings, and errors
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_port() -> u16 {
    22
}

fn default_username() -> String {
    "root".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_upload_dir() -> String {
    "/var/videos".to_string()
}

fn default_public_page_path() -> String {
    "/var/www/player/index.html".to_string()
}

fn default_player_template_path() -> String {
    "/var/www/player_template.html".to_string()
}

fn default_idle_template_path() -> String {
    "/var/www/idle_template.html".to_string()
}

fn default_relay_binary() -> String {
    "/usr/bin/ffmpeg".to_string()
}

fn default_relay_target_url() -> String {
    "rtmp://localhost/live/stream".to_string()
}

fn default_script_path() -> String {
    "/root/stream_starter.sh".to_string()
}

fn default_log_path() -> String {
    "/tmp/ffmpeg.log".to_string()
}

fn default_zone_file() -> String {
    "/etc/timezone".to_string()
}

fn default_local_zone() -> String {
    "Asia/Tehran".to_string()
}

fn default_refresh_interval() -> u64 {
    30
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RelayError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Default location: ~/.relayctl/relayctl.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".relayctl").join("relayctl.toml"))
    }

    /// Load the given file, or the default file if it exists, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Effective tracing level
    pub fn effective_log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else {
            self.log_level.to_tracing_level()
        }
    }
}
