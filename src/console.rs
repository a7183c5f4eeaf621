//! Interactive console
//!
//! A long-lived front end: operator commands come in on a stdin reader thread,
//! worker outcomes come back through the delivery queue, and the pending-job
//! list refreshes on a fixed interval. All three meet in one `select!` loop,
//! which is the only code that reads or writes console state.

use crossbeam_channel::{select, tick, unbounded, Receiver};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::cli_style::{self, Theme};
use crate::dispatch::{Dispatcher, Outcome, OutcomeQueue};
use crate::error::{RelayError, Result};
use crate::orchestrator::{MediaAsset, PageKind};
use crate::queue::{JobId, ScheduledJob};
use crate::session::RemoteSession;
use crate::time;

const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// One operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Upload(PathBuf),
    Start,
    Schedule { time: String, date: Option<String> },
    Jobs,
    Cancel(JobId),
    Status,
    Stop,
    Media,
    Page { kind: PageKind, path: PathBuf },
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_lowercase().as_str() {
            "help" | "?" => ConsoleCommand::Help,
            "upload" => ConsoleCommand::Upload(path_arg(rest, "upload <file>")?),
            "start" => ConsoleCommand::Start,
            "schedule" => {
                let mut parts = rest.split_whitespace();
                let time = parts
                    .next()
                    .ok_or_else(|| "usage: schedule HH:MM [YYYY-MM-DD]".to_string())?
                    .to_string();
                let date = parts.next().map(str::to_string);
                ConsoleCommand::Schedule { time, date }
            }
            "jobs" | "queue" => ConsoleCommand::Jobs,
            "cancel" => ConsoleCommand::Cancel(JobId::new(rest).map_err(|e| e.to_string())?),
            "status" => ConsoleCommand::Status,
            "stop" => ConsoleCommand::Stop,
            "media" => ConsoleCommand::Media,
            "page" => {
                let (kind, path) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: page <idle|player> <file>".to_string())?;
                let kind = match kind {
                    "idle" => PageKind::Idle,
                    "player" => PageKind::Player,
                    other => return Err(format!("unknown page '{}': use idle or player", other)),
                };
                ConsoleCommand::Page {
                    kind,
                    path: path_arg(path, "page <idle|player> <file>")?,
                }
            }
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(format!("unknown command '{}'; type 'help'", other)),
        };

        Ok(Some(command))
    }
}

fn path_arg(rest: &str, usage: &str) -> std::result::Result<PathBuf, String> {
    let rest = rest.trim();
    let unquoted = rest
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| rest.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        .unwrap_or(rest);
    if unquoted.is_empty() {
        return Err(format!("usage: {}", usage));
    }
    Ok(PathBuf::from(unquoted))
}

/// Whether the loop keeps going after an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Console state and loop
pub struct Console<S: RemoteSession> {
    dispatcher: Dispatcher<S>,
    outcomes: OutcomeQueue,
    refresh_interval: Duration,
    active: Option<MediaAsset>,
    jobs: Vec<ScheduledJob>,
    show_jobs: bool,
    upload_bar: Option<ProgressBar>,
    lost: Option<String>,
}

impl<S: RemoteSession> Console<S> {
    pub fn new(
        dispatcher: Dispatcher<S>,
        outcomes: OutcomeQueue,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            outcomes,
            refresh_interval,
            active: None,
            jobs: Vec::new(),
            show_jobs: true,
            upload_bar: None,
            lost: None,
        }
    }

    /// The uploaded asset waiting to be started or scheduled
    pub fn active_asset(&self) -> Option<&MediaAsset> {
        self.active.as_ref()
    }

    /// Run until the operator quits, stdin closes, or the session is lost
    pub fn run(mut self) -> Result<()> {
        let input = spawn_input_reader();
        let drain = tick(DRAIN_INTERVAL);
        let refresh = tick(self.refresh_interval);

        print_help();
        self.dispatcher.check_status();
        self.dispatcher.refresh_jobs();

        loop {
            select! {
                recv(input) -> line => match line {
                    Ok(line) => {
                        if self.handle_line(&line) == Flow::Quit {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(drain) -> _ => {}
                recv(refresh) -> _ => {
                    debug!("Periodic queue refresh");
                    self.dispatcher.refresh_jobs();
                }
            }

            if self.apply_pending() == Flow::Quit {
                break;
            }
        }

        match self.lost.take() {
            Some(message) => Err(RelayError::SessionLost(message)),
            None => Ok(()),
        }
    }

    /// Parse and dispatch one input line
    pub fn handle_line(&mut self, line: &str) -> Flow {
        match ConsoleCommand::parse(line) {
            Ok(Some(command)) => self.handle_command(command),
            Ok(None) => Flow::Continue,
            Err(message) => {
                cli_style::print_warning(&message);
                Flow::Continue
            }
        }
    }

    pub fn handle_command(&mut self, command: ConsoleCommand) -> Flow {
        match command {
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Upload(path) => {
                cli_style::print_info(&format!("Uploading {}", path.display()));
                self.dispatcher.upload(path);
            }
            ConsoleCommand::Start => match self.active.take() {
                Some(asset) => {
                    cli_style::print_info(&format!("Starting {}", asset.file_name()));
                    self.dispatcher.start(asset);
                }
                None => cli_style::print_warning("Upload a file first"),
            },
            ConsoleCommand::Schedule { time, date } => self.schedule(&time, date.as_deref()),
            ConsoleCommand::Jobs => {
                self.show_jobs = true;
                self.dispatcher.refresh_jobs();
            }
            ConsoleCommand::Cancel(id) => {
                self.dispatcher.cancel(id);
            }
            ConsoleCommand::Status => {
                self.dispatcher.check_status();
            }
            ConsoleCommand::Stop => {
                cli_style::print_info("Stopping stream");
                self.dispatcher.stop();
            }
            ConsoleCommand::Media => {
                self.dispatcher.list_media();
            }
            ConsoleCommand::Page { kind, path } => {
                self.dispatcher.set_page(kind, path);
            }
            ConsoleCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn schedule(&mut self, time_text: &str, date: Option<&str>) {
        let zone = match time::resolve_zone(self.dispatcher.local_zone()) {
            Ok(zone) => zone,
            Err(e) => {
                cli_style::print_error(&e.to_string(), Some("Check schedule.local_zone"));
                return;
            }
        };
        let local = match time::parse_wall_clock(time_text, date, zone) {
            Ok(local) => local,
            Err(e) => {
                cli_style::print_warning(&e.to_string());
                return;
            }
        };

        match self.active.take() {
            Some(asset) => {
                self.dispatcher.schedule(asset, local);
            }
            None => cli_style::print_warning("Upload a file first"),
        }
    }

    /// Apply every outcome posted so far, in order
    pub fn apply_pending(&mut self) -> Flow {
        for outcome in self.outcomes.drain() {
            if self.apply(outcome) == Flow::Quit {
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    fn apply(&mut self, outcome: Outcome) -> Flow {
        match outcome {
            Outcome::UploadProgress { sent, total } => {
                let bar = self.upload_bar.get_or_insert_with(|| upload_bar(total));
                bar.set_position(sent);
            }
            Outcome::Uploaded(asset) => {
                if let Some(bar) = self.upload_bar.take() {
                    bar.finish_and_clear();
                }
                cli_style::print_success(&format!(
                    "Uploaded {}; use 'start' or 'schedule HH:MM'",
                    asset.remote_path()
                ));
                self.active = Some(asset);
            }
            Outcome::Started { media_path } => {
                cli_style::print_success(&format!("Stream started: {}", media_path));
                self.dispatcher.check_status();
            }
            Outcome::Scheduled(receipt) => {
                cli_style::print_success(&cli_style::receipt_line(&receipt));
                self.dispatcher.refresh_jobs();
            }
            Outcome::Jobs(jobs) => {
                if self.show_jobs || jobs != self.jobs {
                    cli_style::section_header("Scheduled streams");
                    if jobs.is_empty() {
                        println!("{}", Theme::muted("No scheduled streams"));
                    } else {
                        println!("{}", cli_style::jobs_table(&jobs));
                    }
                }
                self.show_jobs = false;
                self.jobs = jobs;
            }
            Outcome::Cancelled(id) => {
                cli_style::print_success(&format!("Cancel request sent for job {}", id));
                self.dispatcher.refresh_jobs();
            }
            Outcome::Status { live } => cli_style::print_live_status(live),
            Outcome::Stopped { still_live } => {
                if still_live {
                    cli_style::print_warning("Stream is still running after stop");
                } else {
                    cli_style::print_success("Stream stopped");
                }
            }
            Outcome::Media(names) => {
                if names.is_empty() {
                    println!("{}", Theme::muted("No uploaded media"));
                } else {
                    println!("{}", cli_style::media_table(&names));
                }
            }
            Outcome::PageUpdated(update) => {
                if update.applied {
                    cli_style::print_success(&format!(
                        "{} uploaded and applied",
                        update.template_path
                    ));
                } else {
                    cli_style::print_success(&format!("{} uploaded", update.template_path));
                }
            }
            Outcome::Failed {
                operation,
                error,
                returned,
            } => {
                if let Some(bar) = self.upload_bar.take() {
                    bar.abandon();
                }
                if let Some(asset) = returned {
                    if self.active.is_none() {
                        self.active = Some(asset);
                    }
                }
                if error.is_session_lost() {
                    cli_style::print_error(&error.to_string(), None);
                    self.lost = Some(error.to_string());
                    return Flow::Quit;
                }
                cli_style::print_error(&format!("{} failed: {}", operation, error), None);
            }
        }
        Flow::Continue
    }
}

fn upload_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

fn spawn_input_reader() -> Receiver<String> {
    let (sender, receiver) = unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    receiver
}

fn print_help() {
    cli_style::section_header("Commands");
    let rows = [
        ("upload <file>", "upload media to the host"),
        ("start", "stream the uploaded file now"),
        ("schedule HH:MM [YYYY-MM-DD]", "stream it later (your local time)"),
        ("jobs", "list scheduled streams"),
        ("cancel <id>", "cancel a scheduled stream"),
        ("status", "check whether the stream is live"),
        ("stop", "kill the stream and show the idle page"),
        ("media", "list uploaded media"),
        ("page <idle|player> <file>", "upload a custom page template"),
        ("quit", "leave the console"),
    ];
    for (command, description) in rows {
        println!("  {:<30} {}", Theme::primary(command), Theme::muted(description));
    }
    println!();
}
