/*!
 * relayctl Init Command - First-Run Setup Wizard
 *
 * Asks for the streaming host, login method and the operator's time zone, then
 * writes ~/.relayctl/relayctl.toml (or the path given with --config).
 */

use crate::config::{AuthMethod, RelayConfig};
use crate::time;
use anyhow::Result;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::path::{Path, PathBuf};

/// Answers collected by the wizard
#[derive(Debug, Clone)]
pub struct WizardAnswers {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    pub key_path: Option<PathBuf>,
    pub local_zone: String,
}

/// Run the interactive initialization wizard
pub fn run_init_wizard(config_path: Option<&Path>) -> Result<()> {
    print_welcome();

    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => RelayConfig::default_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?,
    };

    if config_path.exists()
        && !Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Existing configuration found. Overwrite?")
            .default(false)
            .interact()?
    {
        println!("\n{}", style("Configuration unchanged.").cyan());
        return Ok(());
    }

    let theme = ColorfulTheme::default();

    println!("\n{}", style("Streaming Host").cyan().bold());
    let host: String = Input::with_theme(&theme)
        .with_prompt("Host name or IP address")
        .interact_text()?;
    let port: u16 = Input::with_theme(&theme)
        .with_prompt("SSH port")
        .default(22)
        .interact_text()?;
    let username: String = Input::with_theme(&theme)
        .with_prompt("Username")
        .default("root".to_string())
        .interact_text()?;

    let methods = &[
        "Password (prompted, or RELAYCTL_PASSWORD)",
        "Private key file",
        "SSH agent",
    ];
    let auth = match Select::with_theme(&theme)
        .with_prompt("How do you log in?")
        .default(0)
        .items(methods)
        .interact()?
    {
        1 => AuthMethod::Key,
        2 => AuthMethod::Agent,
        _ => AuthMethod::Password,
    };

    let key_path = if auth == AuthMethod::Key {
        let default_key = dirs::home_dir()
            .map(|home| home.join(".ssh").join("id_ed25519"))
            .unwrap_or_default();
        let path: String = Input::with_theme(&theme)
            .with_prompt("Private key path")
            .default(default_key.display().to_string())
            .interact_text()?;
        Some(PathBuf::from(path))
    } else {
        None
    };

    println!("\n{}", style("Scheduling").cyan().bold());
    let local_zone: String = Input::with_theme(&theme)
        .with_prompt("Your time zone (IANA name)")
        .default(RelayConfig::default().schedule.local_zone)
        .validate_with(|zone: &String| -> std::result::Result<(), String> {
            time::resolve_zone(zone)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()?;

    let config = config_from_answers(WizardAnswers {
        host,
        port,
        username,
        auth,
        key_path,
        local_zone,
    });

    config
        .to_file(&config_path)
        .map_err(|e| anyhow::anyhow!("Failed to save configuration: {}", e))?;

    print_summary(&config_path, &config);

    Ok(())
}

/// Build a configuration from wizard answers, defaults elsewhere
pub fn config_from_answers(answers: WizardAnswers) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.connection.host = answers.host.trim().to_string();
    config.connection.port = answers.port;
    config.connection.username = answers.username.trim().to_string();
    config.connection.auth = answers.auth;
    config.connection.key_path = answers.key_path;
    config.schedule.local_zone = answers.local_zone.trim().to_string();
    config
}

/// Print welcome banner
fn print_welcome() {
    println!();
    println!(
        "{}",
        style("╔════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║    Welcome to relayctl Setup           ║").cyan()
    );
    println!(
        "{}",
        style("╚════════════════════════════════════════╝").cyan()
    );
    println!();
    println!("This wizard records how to reach your streaming host.");
}

/// Print configuration summary
fn print_summary(config_path: &Path, config: &RelayConfig) {
    println!();
    println!("  {} Configuration saved", style("✓").green().bold());
    println!("  Location: {}", style(config_path.display()).cyan());
    println!();
    println!(
        "  Host:        {}",
        style(format!(
            "{}@{}:{}",
            config.connection.username, config.connection.host, config.connection.port
        ))
        .yellow()
    );
    println!(
        "  Login:       {}",
        style(format!("{:?}", config.connection.auth)).yellow()
    );
    println!(
        "  Time zone:   {}",
        style(&config.schedule.local_zone).yellow()
    );
    println!();
    println!("  {}", style("Next Steps:").bold());
    println!("  1. Check the host: relayctl status");
    println!("  2. Open the console: relayctl console");
    println!();
}
