/*!
 * relayctl CLI - Command Line Interface
 *
 * One-shot subcommands for each engine operation, plus `console` for the
 * long-running interactive front end.
 */

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use dialoguer::{theme::ColorfulTheme, Confirm};
use indicatif::{ProgressBar, ProgressStyle};
use relayctl::{
    cli_style::{self, format_bytes, print_info, print_success, Theme},
    commands::{self, connect},
    config::{LogLevel, RelayConfig},
    console::Console,
    dispatch::Dispatcher,
    error::{RelayError, Result, EXIT_SUCCESS},
    logging,
    orchestrator::{MediaAsset, PageKind, StreamOrchestrator},
    queue::JobId,
    session::{ProgressFn, SshSession},
    time,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "relayctl")]
#[command(version, about = "Upload, start and schedule live streams on a remote relay host", long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.relayctl/relayctl.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Streaming host (overrides connection.host)
    #[arg(long, global = true)]
    host: Option<String>,

    /// SSH port (overrides connection.port)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// SSH user (overrides connection.username)
    #[arg(short = 'u', long = "user", global = true)]
    username: Option<String>,

    /// Your IANA time zone (overrides schedule.local_zone)
    #[arg(long = "local-zone", value_name = "ZONE", global = true)]
    local_zone: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether the relay is live
    Status,

    /// Kill the relay and restore the idle page
    Stop {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Upload a media file, optionally starting or scheduling it
    Upload {
        /// Local media file
        file: PathBuf,

        /// Start streaming right after the upload
        #[arg(long, conflicts_with = "at")]
        start: bool,

        /// Schedule for this local time (HH:MM)
        #[arg(long, value_name = "HH:MM")]
        at: Option<String>,

        /// Date for --at (YYYY-MM-DD, default: today)
        #[arg(long, value_name = "YYYY-MM-DD", requires = "at")]
        date: Option<String>,
    },

    /// Start streaming a file already on the host
    Start {
        /// Path on the host
        remote_path: String,
    },

    /// Schedule a file already on the host
    Schedule {
        /// Path on the host
        remote_path: String,

        /// Local time (HH:MM)
        #[arg(long, value_name = "HH:MM")]
        at: String,

        /// Date (YYYY-MM-DD, default: today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<String>,

        /// Zone the time is given in (default: your configured zone)
        #[arg(long, value_name = "ZONE")]
        zone: Option<String>,
    },

    /// List scheduled streams
    Jobs,

    /// Cancel a scheduled stream
    Cancel {
        /// Job id as shown by `jobs`
        id: String,
    },

    /// List media in the host's upload directory
    Media,

    /// Upload a custom page template
    Page {
        #[arg(value_enum)]
        kind: PageKindArg,

        /// Local HTML file
        file: PathBuf,
    },

    /// Interactive console with background refresh
    Console,

    /// Create a configuration file interactively
    InitConfig,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PageKindArg {
    /// Page shown while nothing is streaming
    Idle,
    /// Page shown while a stream is live
    Player,
}

impl From<PageKindArg> for PageKind {
    fn from(arg: PageKindArg) -> Self {
        match arg {
            PageKindArg::Idle => PageKind::Idle,
            PageKindArg::Player => PageKind::Player,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let hint = if e.is_session_lost() {
                Some("Reconnect and try again")
            } else {
                None
            };
            cli_style::print_error(&e.to_string(), hint);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Commands that never touch the host
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "relayctl", &mut std::io::stdout());
            return Ok(());
        }
        Commands::InitConfig => {
            return commands::init::run_init_wizard(cli.config.as_deref())
                .map_err(|e| RelayError::Other(format!("{:#}", e)));
        }
        _ => {}
    }

    let mut config = RelayConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| RelayError::Other(format!("Failed to start async runtime: {}", e)))?;

    let session = runtime.block_on(connect::connect(&config.connection))?;
    let orchestrator = StreamOrchestrator::new(Arc::new(session), config.host.clone());

    if let Commands::Console = cli.command {
        cli_style::print_banner();
        let (dispatcher, outcomes) = Dispatcher::new(
            orchestrator,
            runtime.handle().clone(),
            config.schedule.local_zone.clone(),
        );
        let refresh = Duration::from_secs(config.schedule.refresh_interval_secs.max(1));
        return Console::new(dispatcher, outcomes, refresh).run();
    }

    runtime.block_on(execute(cli.command, &orchestrator, &config))
}

/// CLI flags win over the config file
fn apply_overrides(config: &mut RelayConfig, cli: &Cli) {
    if let Some(ref host) = cli.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    if let Some(ref username) = cli.username {
        config.connection.username = username.clone();
    }
    if let Some(ref zone) = cli.local_zone {
        config.schedule.local_zone = zone.clone();
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;
}

async fn execute(
    command: Commands,
    orchestrator: &StreamOrchestrator<SshSession>,
    config: &RelayConfig,
) -> Result<()> {
    let local_zone = config.schedule.local_zone.as_str();

    match command {
        Commands::Status => {
            let live = orchestrator.check_live_status().await?;
            cli_style::print_live_status(live);
            Ok(())
        }
        Commands::Stop { yes } => {
            if !yes && !confirm_stop()? {
                print_info("Stop cancelled");
                return Ok(());
            }
            if orchestrator.hard_stop().await? {
                Err(RelayError::Other(
                    "Relay is still running after stop".to_string(),
                ))
            } else {
                print_success("Stream stopped and idle page restored");
                Ok(())
            }
        }
        Commands::Upload {
            file,
            start,
            at,
            date,
        } => {
            // Check the time before spending minutes on the upload
            let scheduled = match at {
                Some(ref at) => Some(parse_local(at, date.as_deref(), local_zone)?),
                None => None,
            };

            let asset = upload_with_progress(orchestrator, &file).await?;
            print_success(&format!("Uploaded {}", asset.remote_path()));

            if start {
                start_asset(orchestrator, asset).await
            } else if let Some(local) = scheduled {
                schedule_asset(orchestrator, asset, local, local_zone).await
            } else {
                Ok(())
            }
        }
        Commands::Start { remote_path } => {
            start_asset(orchestrator, MediaAsset::new(remote_path)).await
        }
        Commands::Schedule {
            remote_path,
            at,
            date,
            zone,
        } => {
            let zone = zone.as_deref().unwrap_or(local_zone);
            let local = parse_local(&at, date.as_deref(), zone)?;
            schedule_asset(orchestrator, MediaAsset::new(remote_path), local, zone).await
        }
        Commands::Jobs => {
            let jobs = orchestrator.list_jobs(local_zone).await?;
            if jobs.is_empty() {
                println!("{}", Theme::muted("No scheduled streams"));
            } else {
                println!("{}", cli_style::jobs_table(&jobs));
            }
            Ok(())
        }
        Commands::Cancel { id } => {
            let id = JobId::new(id)?;
            orchestrator.cancel_job(&id).await?;
            print_success(&format!("Cancel request sent for job {}", id));
            Ok(())
        }
        Commands::Media => {
            let names = orchestrator.list_assets().await?;
            if names.is_empty() {
                println!("{}", Theme::muted("No uploaded media"));
            } else {
                println!("{}", cli_style::media_table(&names));
            }
            Ok(())
        }
        Commands::Page { kind, file } => {
            let update = orchestrator.set_page_template(kind.into(), &file).await?;
            if update.applied {
                print_success(&format!("{} uploaded and applied", update.template_path));
            } else {
                print_success(&format!("{} uploaded", update.template_path));
            }
            Ok(())
        }
        Commands::Console | Commands::InitConfig | Commands::Completions { .. } => Ok(()),
    }
}

fn parse_local(at: &str, date: Option<&str>, zone: &str) -> Result<chrono::NaiveDateTime> {
    let tz = time::resolve_zone(zone)?;
    time::parse_wall_clock(at, date, tz)
}

async fn start_asset(
    orchestrator: &StreamOrchestrator<SshSession>,
    asset: MediaAsset,
) -> Result<()> {
    let name = asset.file_name().to_string();
    orchestrator.start_now(asset).await?;
    print_success(&format!("Stream started: {}", name));
    Ok(())
}

async fn schedule_asset(
    orchestrator: &StreamOrchestrator<SshSession>,
    asset: MediaAsset,
    local: chrono::NaiveDateTime,
    zone: &str,
) -> Result<()> {
    let receipt = orchestrator.schedule_later(asset, local, zone).await?;
    print_success(&cli_style::receipt_line(&receipt));
    Ok(())
}

async fn upload_with_progress(
    orchestrator: &StreamOrchestrator<SshSession>,
    file: &Path,
) -> Result<MediaAsset> {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }

    let progress = bar.clone();
    let on_progress: ProgressFn = Box::new(move |sent: u64, total: u64| {
        progress.set_length(total);
        progress.set_position(sent);
    });

    match orchestrator.upload_asset(file, on_progress).await {
        Ok(asset) => {
            bar.finish_and_clear();
            tracing::debug!(bytes = bar.position(), "Upload complete");
            print_info(&format!("Sent {}", format_bytes(bar.position())));
            Ok(asset)
        }
        Err(e) => {
            bar.abandon();
            Err(e)
        }
    }
}

fn confirm_stop() -> Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Kill the live stream now?")
        .default(false)
        .interact()
        .map_err(|e| RelayError::Other(format!("Failed to read confirmation: {}", e)))
}
