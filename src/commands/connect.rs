//! Building an SSH session from configuration

use anyhow::Context;
use dialoguer::{theme::ColorfulTheme, Password};
use secrecy::SecretString;

use crate::config::{AuthMethod, ConnectionConfig};
use crate::error::{RelayError, Result};
use crate::session::{SshAuth, SshConfig, SshSession};

/// Password for `auth = "password"`; prompted for when unset
pub const PASSWORD_ENV: &str = "RELAYCTL_PASSWORD";

/// Passphrase for an encrypted private key
pub const KEY_PASSPHRASE_ENV: &str = "RELAYCTL_KEY_PASSPHRASE";

fn prompt_password(config: &ConnectionConfig) -> anyhow::Result<SecretString> {
    let password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Password for {}@{}", config.username, config.host))
        .interact()
        .context("Failed to read password")?;
    Ok(SecretString::from(password))
}

/// Resolve the configured login method into SSH credentials
///
/// `env_password` stands in for `RELAYCTL_PASSWORD`; when it is `None` and
/// password login is configured, the operator is prompted.
pub fn resolve_auth(
    config: &ConnectionConfig,
    env_password: Option<String>,
    env_passphrase: Option<String>,
) -> anyhow::Result<SshAuth> {
    match config.auth {
        AuthMethod::Password => {
            let password = match env_password {
                Some(password) => SecretString::from(password),
                None => prompt_password(config)?,
            };
            Ok(SshAuth::Password(password))
        }
        AuthMethod::Key => {
            let key_path = config
                .key_path
                .clone()
                .context("auth = \"key\" needs connection.key_path")?;
            Ok(SshAuth::KeyFile {
                key_path,
                passphrase: env_passphrase.map(SecretString::from),
            })
        }
        AuthMethod::Agent => Ok(SshAuth::Agent),
    }
}

/// SSH settings for the configured host
pub fn ssh_config(config: &ConnectionConfig) -> Result<SshConfig> {
    if config.host.trim().is_empty() {
        return Err(RelayError::Config(
            "No host configured; run 'relayctl init-config' or pass --host".to_string(),
        ));
    }

    let auth = resolve_auth(
        config,
        std::env::var(PASSWORD_ENV).ok(),
        std::env::var(KEY_PASSPHRASE_ENV).ok(),
    )
    .map_err(|e| RelayError::Authentication(format!("{:#}", e)))?;

    Ok(SshConfig::new(config.host.trim(), config.username.clone(), auth)
        .with_port(config.port)
        .with_timeout(config.timeout_secs))
}

/// Connect to the configured host
pub async fn connect(config: &ConnectionConfig) -> Result<SshSession> {
    let ssh = ssh_config(config)?;
    tracing::debug!(endpoint = %ssh.endpoint(), "Connecting");
    SshSession::connect(ssh).await
}
