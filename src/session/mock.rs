//! In-memory host for unit tests
//!
//! Understands the handful of commands relayctl issues (`at`, `atq`, `atrm`,
//! `ps`, `pkill`, `ls`, `cat`, `chmod`, `nohup`) and records every command so
//! tests can assert what was sent.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use relayctl_core_interface::{
    CommandOutput, ProgressFn, RemoteSession, Result as SessionResult, SessionError,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use crate::script::shell_unescape;

#[derive(Debug, Clone)]
pub struct MockJob {
    pub at: NaiveDateTime,
    pub zone: String,
    pub script: String,
}

#[derive(Debug, Default)]
struct MockState {
    host_zone: String,
    jobs: BTreeMap<u32, MockJob>,
    next_job_id: u32,
    files: HashMap<String, String>,
    commands: Vec<String>,
    relay_running: bool,
    relay_survives_kill: bool,
    extra_atq_lines: Vec<String>,
    reject_submissions: bool,
    lost: bool,
}

pub struct MockHost {
    state: Mutex<MockState>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new("UTC")
    }
}

impl MockHost {
    pub fn new(host_zone: &str) -> Self {
        Self {
            state: Mutex::new(MockState {
                host_zone: host_zone.to_string(),
                next_job_id: 1,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state().files.get(path).cloned()
    }

    pub fn put_file(&self, path: &str, content: &str) {
        self.state().files.insert(path.to_string(), content.to_string());
    }

    pub fn jobs(&self) -> BTreeMap<u32, MockJob> {
        self.state().jobs.clone()
    }

    /// Queue a job directly, bypassing `at`
    pub fn add_job(&self, at: NaiveDateTime, script: &str) -> u32 {
        let mut state = self.state();
        let id = state.next_job_id;
        state.next_job_id += 1;
        let zone = state.host_zone.clone();
        state.jobs.insert(
            id,
            MockJob {
                at,
                zone,
                script: script.to_string(),
            },
        );
        id
    }

    /// Extra raw lines appended to every `atq` reply
    pub fn push_atq_line(&self, line: &str) {
        self.state().extra_atq_lines.push(line.to_string());
    }

    pub fn set_relay_running(&self, running: bool) {
        self.state().relay_running = running;
    }

    /// Make `pkill` leave the relay running
    pub fn set_relay_survives_kill(&self, survives: bool) {
        self.state().relay_survives_kill = survives;
    }

    /// Make `at` reply without a job line
    pub fn reject_submissions(&self) {
        self.state().reject_submissions = true;
    }

    pub fn drop_connection(&self) {
        self.state().lost = true;
    }

    fn check_connected(state: &MockState) -> SessionResult<()> {
        if state.lost {
            Err(SessionError::Lost("connection reset by peer".to_string()))
        } else {
            Ok(())
        }
    }
}

fn ok(stdout: impl Into<String>) -> CommandOutput {
    CommandOutput::new(stdout, "", 0)
}

fn fail(stderr: impl Into<String>) -> CommandOutput {
    CommandOutput::new("", stderr, 1)
}

/// Strip one layer of single quotes from a word produced by `shell_quote`
fn unquote(word: &str) -> String {
    let word = word.trim();
    match word.strip_prefix('\'').and_then(|w| w.strip_suffix('\'')) {
        Some(inner) => shell_unescape(inner),
        None => word.to_string(),
    }
}

fn atq_timestamp(at: &NaiveDateTime) -> String {
    at.format("%a %b %e %H:%M:%S %Y").to_string()
}

fn handle(state: &mut MockState, command: &str) -> CommandOutput {
    let trimmed = command.trim();

    if let Some(path) = trimmed.strip_prefix("cat ") {
        let path = unquote(path);
        if path == "/etc/timezone" {
            return ok(format!("{}\n", state.host_zone));
        }
        return match state.files.get(&path) {
            Some(content) => ok(content.clone()),
            None => fail(format!("cat: {}: No such file or directory", path)),
        };
    }

    if trimmed == "atq" {
        let mut out = String::new();
        for (id, job) in &state.jobs {
            out.push_str(&format!("{}\t{} a root\n", id, atq_timestamp(&job.at)));
        }
        for line in &state.extra_atq_lines {
            out.push_str(line);
            out.push('\n');
        }
        return ok(out);
    }

    if let Some(id) = trimmed.strip_prefix("at -c ") {
        let id = id.trim();
        return match id.parse::<u32>().ok().and_then(|id| state.jobs.get(&id)) {
            Some(job) => ok(format!(
                "#!/bin/sh\n# atrun uid=0 gid=0\n# mail root 0\numask 22\nTZ={}; export TZ\ncd /root || {{\n\t echo 'Execution directory inaccessible' >&2\n\t exit 1\n}}\n{}",
                job.zone, job.script
            )),
            None => fail(format!("Cannot find jobid {}", id)),
        };
    }

    if trimmed.starts_with("TZ=") && trimmed.contains(" at -f ") {
        if state.reject_submissions {
            return fail("syntax error. Last token seen: garbled");
        }
        let (head, expr) = match trimmed.rsplitn(3, ' ').collect::<Vec<_>>().as_slice() {
            [date, time, head] => (head.to_string(), format!("{} {}", time, date)),
            _ => return fail("Garbled time"),
        };
        let at = match NaiveDateTime::parse_from_str(&expr, "%H:%M %Y-%m-%d") {
            Ok(at) => at,
            Err(_) => return fail("Garbled time"),
        };
        let zone = unquote(
            head.trim_start_matches("TZ=")
                .split(" at -f ")
                .next()
                .unwrap_or_default(),
        );
        let script_path = unquote(head.split(" at -f ").nth(1).unwrap_or_default());
        let script = state.files.get(&script_path).cloned().unwrap_or_default();

        let id = state.next_job_id;
        state.next_job_id += 1;
        state.jobs.insert(id, MockJob { at, zone, script });
        return CommandOutput::new(
            "",
            format!(
                "warning: commands will be executed using /bin/sh\njob {} at {}\n",
                id,
                atq_timestamp(&at)
            ),
            0,
        );
    }

    if let Some(id) = trimmed.strip_prefix("atrm ") {
        let id = id.trim();
        return match id.parse::<u32>().ok().and_then(|id| state.jobs.remove(&id)) {
            Some(_) => ok(""),
            None => fail(format!("Cannot find jobid {}", id)),
        };
    }

    if trimmed.starts_with("ps aux") {
        return if state.relay_running {
            ok("root  4242  3.1  0.4 /usr/bin/ffmpeg -re -i /var/videos/a.mp4 -c:v copy -c:a copy -f flv rtmp://localhost/live/stream\n")
        } else {
            CommandOutput::new("", "", 1)
        };
    }

    if trimmed.starts_with("pkill ") {
        if !state.relay_survives_kill {
            state.relay_running = false;
        }
        return ok("");
    }

    if trimmed.contains(" nohup ") {
        state.relay_running = true;
        return ok("");
    }

    if let Some(dir) = trimmed.strip_prefix("ls -1 ") {
        let dir = unquote(dir);
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut names: Vec<_> = state
            .files
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|name| !name.contains('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        return ok(names.iter().map(|n| format!("{}\n", n)).collect::<String>());
    }

    // chmod, page installs and anything else succeed silently
    ok("")
}

#[async_trait]
impl RemoteSession for MockHost {
    async fn run(&self, command: &str) -> SessionResult<CommandOutput> {
        let mut state = self.state();
        Self::check_connected(&state)?;
        state.commands.push(command.to_string());
        Ok(handle(&mut state, command))
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        mut on_progress: ProgressFn,
    ) -> SessionResult<u64> {
        Self::check_connected(&self.state())?;
        let bytes = std::fs::read(local_path).map_err(|source| SessionError::LocalFile {
            path: local_path.to_path_buf(),
            source,
        })?;
        let total = bytes.len() as u64;
        on_progress(0, total);
        on_progress(total, total);

        let mut state = self.state();
        state.files.insert(
            remote_path.to_string(),
            String::from_utf8_lossy(&bytes).into_owned(),
        );
        Ok(total)
    }

    async fn write_file(&self, remote_path: &str, content: &str) -> SessionResult<()> {
        let mut state = self.state();
        Self::check_connected(&state)?;
        state.files.insert(remote_path.to_string(), content.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.state().lost
    }
}
