//! Deferred-execution queue manager
//!
//! Treats the host's `at` facility as the repository of scheduled playback
//! jobs: `submit` adds one, `list` rebuilds the whole view from `atq` and
//! `at -c`, `cancel` removes one with `atrm`. Nothing is cached locally.

use chrono::DateTime;
use chrono_tz::Tz;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::config::HostLayout;
use crate::error::{RelayError, Result};
use crate::script::{shell_quote, shell_unescape, ControlScript};
use crate::session::RemoteSession;
use crate::time::{self, ZonePair};

/// Identifier assigned by the facility; a non-empty run of ASCII digits
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RelayError::InvalidJobId(id));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> u128 {
        self.0.parse().unwrap_or(u128::MAX)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A pending job as reconstructed from the facility
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledJob {
    pub id: JobId,
    pub host_time: DateTime<Tz>,
    pub local_time: DateTime<Tz>,
    /// File name of the media the job will play, when it could be recovered
    pub media_name: Option<String>,
}

impl ScheduledJob {
    pub fn media_display(&self) -> &str {
        self.media_name.as_deref().unwrap_or("Unknown")
    }
}

/// When to run a submitted script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Launch detached right away
    Immediate,

    /// Register with the facility
    At {
        /// `HH:MM YYYY-MM-DD` in the host zone
        expr: String,
        /// Host zone name passed as `TZ`
        host_zone: String,
    },
}

/// Result of a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Launched detached from a private copy; nothing further is tracked
    Started,

    /// Accepted by the facility under this id
    Queued(JobId),
}

/// A queue line that could not be understood
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParseError {
    pub line: String,
    pub reason: &'static str,
}

impl fmt::Display for JobParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed queue line ({}): '{}'", self.reason, self.line)
    }
}

impl std::error::Error for JobParseError {}

/// One `atq` line: `<id>\t<weekday> <month> <day> <HH:MM:SS> <year> <queue> <user>`
pub fn parse_queue_line(
    line: &str,
    host_zone: Tz,
) -> std::result::Result<(JobId, DateTime<Tz>), JobParseError> {
    let malformed = |reason| JobParseError {
        line: line.to_string(),
        reason,
    };

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 6 {
        return Err(malformed("too few fields"));
    }

    let id = JobId::new(parts[0]).map_err(|_| malformed("job id is not numeric"))?;
    let stamp = parts[1..6].join(" ");
    let naive =
        time::parse_facility_timestamp(&stamp).ok_or_else(|| malformed("unreadable timestamp"))?;
    let host_time = time::localize(naive, host_zone)
        .map_err(|_| malformed("time does not exist in host zone"))?;

    Ok((id, host_time))
}

fn media_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"-i\s+(?:'((?:[^']|'\\'')+)'|"([^"]+)")"#).expect("media pattern is valid")
    })
}

fn job_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"job (\d+) at").expect("job line pattern is valid"))
}

/// File name of the media a job script plays, from its relay invocation
pub fn extract_media_name(script_text: &str) -> Option<String> {
    let captures = media_pattern().captures(script_text)?;
    let path = match (captures.get(1), captures.get(2)) {
        (Some(single), _) => shell_unescape(single.as_str()),
        (None, Some(double)) => double.as_str().to_string(),
        (None, None) => return None,
    };

    let name = path.rsplit('/').next().unwrap_or(&path).trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Job id from the facility's `job <id> at ...` acknowledgement
pub fn extract_job_id(output: &str) -> Option<JobId> {
    job_line_pattern()
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| JobId::new(m.as_str()).ok())
}

/// Shell command running the script at `script_path` detached from the session
///
/// The job runs from a private copy that removes itself when done, so a later
/// submission rewriting `script_path` cannot change a script the shell is
/// still reading.
pub fn detached_launch_command(script_path: &str) -> String {
    format!(
        "tmp=$(mktemp) && cp {} \"$tmp\" && {{ nohup sh -c 'sh \"$1\"; rm -f \"$1\"' relayctl-job \"$tmp\" < /dev/null > /dev/null 2>&1 & }}",
        shell_quote(script_path)
    )
}

/// Submit, list and cancel jobs on the host's deferred-execution facility
pub struct ScheduleQueueManager<S: RemoteSession> {
    session: Arc<S>,
    script_path: String,
    zone_file: String,
}

impl<S: RemoteSession> Clone for ScheduleQueueManager<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            script_path: self.script_path.clone(),
            zone_file: self.zone_file.clone(),
        }
    }
}

impl<S: RemoteSession> ScheduleQueueManager<S> {
    pub fn new(session: Arc<S>, layout: &HostLayout) -> Self {
        Self {
            session,
            script_path: layout.script_path.clone(),
            zone_file: layout.zone_file.clone(),
        }
    }

    /// The host's IANA zone name; empty when the host has none configured
    pub async fn host_zone(&self) -> Result<String> {
        let output = self
            .session
            .run(&format!("cat {}", shell_quote(&self.zone_file)))
            .await?;
        let zone = output.stdout.trim().to_string();
        debug!(zone = %zone, "Read host time zone");
        Ok(zone)
    }

    /// Place the script on the host and run it now or register it
    pub async fn submit(&self, script: &ControlScript, schedule: Schedule) -> Result<Submission> {
        let script_path = shell_quote(&self.script_path);

        self.session
            .write_file(&self.script_path, script.as_str())
            .await?;
        self.session.run(&format!("chmod +x {}", script_path)).await?;

        match schedule {
            Schedule::Immediate => {
                let output = self
                    .session
                    .run(&detached_launch_command(&self.script_path))
                    .await?;
                if matches!(output.exit_status, Some(code) if code != 0) {
                    return Err(RelayError::SubmissionRejected {
                        output: output.stderr.trim().to_string(),
                    });
                }
                info!(media = %script.media_path(), "Control script launched");
                Ok(Submission::Started)
            }
            Schedule::At { expr, host_zone } => {
                let command = format!(
                    "TZ={} at -f {} {}",
                    shell_quote(&host_zone),
                    script_path,
                    expr
                );
                let output = self.session.run(&command).await?;

                let id = extract_job_id(&output.stderr)
                    .or_else(|| extract_job_id(&output.stdout))
                    .ok_or_else(|| RelayError::SubmissionRejected {
                        output: format!("{}{}", output.stdout, output.stderr).trim().to_string(),
                    })?;

                info!(job = %id, at = %expr, zone = %host_zone, media = %script.media_path(), "Job queued");
                Ok(Submission::Queued(id))
            }
        }
    }

    /// Rebuild the list of pending jobs from the facility
    ///
    /// Lines that cannot be parsed are skipped with a warning. Session
    /// failures propagate.
    pub async fn list(&self, local_zone: &str) -> Result<Vec<ScheduledJob>> {
        let host_zone = self.host_zone().await?;
        let zones = ZonePair::resolve(local_zone, &host_zone)?;

        let output = self.session.run("atq").await?;

        let mut jobs = Vec::new();
        for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
            let (id, host_time) = match parse_queue_line(line, zones.host) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Skipping queue entry: {}", e);
                    continue;
                }
            };

            let script = self.session.run(&format!("at -c {}", id)).await?;
            let media_name = extract_media_name(&script.stdout);
            if media_name.is_none() {
                debug!(job = %id, "No media path found in job script");
            }

            jobs.push(ScheduledJob {
                local_time: host_time.with_timezone(&zones.local),
                id,
                host_time,
                media_name,
            });
        }

        jobs.sort_by(|a, b| {
            a.host_time
                .cmp(&b.host_time)
                .then_with(|| a.id.numeric().cmp(&b.id.numeric()))
        });
        Ok(jobs)
    }

    /// Remove a pending job; the facility's reply is not checked
    pub async fn cancel(&self, id: &JobId) -> Result<()> {
        let output = self.session.run(&format!("atrm {}", id)).await?;
        if !output.stderr.trim().is_empty() {
            debug!(job = %id, stderr = %output.stderr.trim(), "atrm wrote to stderr");
        }
        info!(job = %id, "Job cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{PageSource, ScriptGenerator};
    use crate::session::mock::MockHost;
    use chrono::NaiveDateTime;

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").unwrap()
    }

    fn script_for(path: &str) -> ControlScript {
        let layout = HostLayout::default();
        ScriptGenerator::new(&layout).build(
            path,
            &PageSource::player(&layout),
            &PageSource::idle(&layout),
        )
    }

    fn manager(host: &Arc<MockHost>) -> ScheduleQueueManager<MockHost> {
        ScheduleQueueManager::new(Arc::clone(host), &HostLayout::default())
    }

    #[test]
    fn test_job_id_validation() {
        assert_eq!(JobId::new("42").unwrap().as_str(), "42");
        assert_eq!(JobId::new(" 7\n").unwrap().as_str(), "7");
        assert!(JobId::new("").is_err());
        assert!(JobId::new("4; rm -rf /").is_err());
        assert!("abc".parse::<JobId>().is_err());
    }

    #[test]
    fn test_parse_queue_line() {
        let (id, host_time) =
            parse_queue_line("12\tFri May 10 10:30:00 2024 a root", chrono_tz::UTC).unwrap();
        assert_eq!(id.as_str(), "12");
        assert_eq!(time::host_schedule_expr(&host_time), "10:30 2024-05-10");

        let (_, padded) =
            parse_queue_line("3\tFri May  3 09:05:00 2024 a root", chrono_tz::UTC).unwrap();
        assert_eq!(time::host_schedule_expr(&padded), "09:05 2024-05-03");
    }

    #[test]
    fn test_parse_queue_line_rejects_garbage() {
        let utc = chrono_tz::UTC;
        assert_eq!(
            parse_queue_line("garbage", utc).unwrap_err().reason,
            "too few fields"
        );
        assert_eq!(
            parse_queue_line("x1\tFri May 10 10:30:00 2024 a root", utc)
                .unwrap_err()
                .reason,
            "job id is not numeric"
        );
        assert_eq!(
            parse_queue_line("5\tFri Mai 10 10:30:00 2024 a root", utc)
                .unwrap_err()
                .reason,
            "unreadable timestamp"
        );
    }

    #[test]
    fn test_extract_media_name() {
        assert_eq!(
            extract_media_name("'/usr/bin/ffmpeg' -re -i '/var/videos/show.mp4' -c:v copy"),
            Some("show.mp4".to_string())
        );
        assert_eq!(
            extract_media_name(r#"/usr/bin/ffmpeg -re -i "/var/videos/old tool.mp4" -c:v copy"#),
            Some("old tool.mp4".to_string())
        );
        assert_eq!(
            extract_media_name(r"ffmpeg -re -i '/var/videos/it'\''s.mp4' -f flv"),
            Some("it's.mp4".to_string())
        );
        assert_eq!(extract_media_name("echo nothing to see"), None);
    }

    #[test]
    fn test_extract_job_id() {
        let out = "warning: commands will be executed using /bin/sh\njob 17 at Fri May 10 10:30:00 2024\n";
        assert_eq!(extract_job_id(out), Some(JobId::new("17").unwrap()));
        assert_eq!(extract_job_id("syntax error"), None);
    }

    #[tokio::test]
    async fn test_host_zone_empty_reads_as_empty() {
        let host = Arc::new(MockHost::new(""));
        assert_eq!(manager(&host).host_zone().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_list_empty_queue() {
        let host = Arc::new(MockHost::new("UTC"));
        let jobs = manager(&host).list("Asia/Tehran").await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn test_submit_list_cancel() {
        let host = Arc::new(MockHost::new("UTC"));
        let queue = manager(&host);

        let submission = queue
            .submit(
                &script_for("/var/videos/a.mp4"),
                Schedule::At {
                    expr: "10:30 2024-05-10".to_string(),
                    host_zone: "UTC".to_string(),
                },
            )
            .await
            .unwrap();
        let id = match submission {
            Submission::Queued(id) => id,
            other => panic!("unexpected submission: {:?}", other),
        };

        let commands = host.commands();
        assert!(commands.contains(&"chmod +x '/root/stream_starter.sh'".to_string()));
        assert!(commands.contains(&"TZ='UTC' at -f '/root/stream_starter.sh' 10:30 2024-05-10".to_string()));

        let jobs = queue.list("Asia/Tehran").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].media_display(), "a.mp4");
        assert_eq!(time::listing_display(&jobs[0].local_time), "Friday, 2024-05-10 at 14:00");

        queue.cancel(&id).await.unwrap();
        assert!(host.commands().contains(&format!("atrm {}", id)));
        assert!(queue.list("Asia/Tehran").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_submission_launches_detached() {
        let host = Arc::new(MockHost::new("UTC"));
        let submission = manager(&host)
            .submit(&script_for("/var/videos/a.mp4"), Schedule::Immediate)
            .await
            .unwrap();

        assert_eq!(submission, Submission::Started);
        assert_eq!(
            host.commands().last().unwrap(),
            &detached_launch_command("/root/stream_starter.sh")
        );
        assert!(host
            .file("/root/stream_starter.sh")
            .unwrap()
            .contains("-i '/var/videos/a.mp4'"));
    }

    #[tokio::test]
    async fn test_rejected_submission() {
        let host = Arc::new(MockHost::new("UTC"));
        host.reject_submissions();

        let err = manager(&host)
            .submit(
                &script_for("/var/videos/a.mp4"),
                Schedule::At {
                    expr: "10:30 2024-05-10".to_string(),
                    host_zone: "UTC".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::SubmissionRejected { .. }));
    }

    #[tokio::test]
    async fn test_garbled_line_is_skipped() {
        let host = Arc::new(MockHost::new("UTC"));
        host.add_job(at("2024-05-10 10:30"), "ffmpeg -re -i '/var/videos/a.mp4'\n");
        host.push_atq_line("this is not a job");

        let jobs = manager(&host).list("UTC").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].media_name.as_deref(), Some("a.mp4"));
    }

    #[tokio::test]
    async fn test_missing_media_is_unknown() {
        let host = Arc::new(MockHost::new("UTC"));
        host.add_job(at("2024-05-10 10:30"), "echo hand-written job\n");

        let jobs = manager(&host).list("UTC").await.unwrap();
        assert_eq!(jobs[0].media_name, None);
        assert_eq!(jobs[0].media_display(), "Unknown");
    }

    #[tokio::test]
    async fn test_list_orders_by_time_then_id() {
        let host = Arc::new(MockHost::new("Europe/Berlin"));
        let late = host.add_job(at("2024-05-11 08:00"), "");
        let early = host.add_job(at("2024-05-10 08:00"), "");
        let tie = host.add_job(at("2024-05-10 08:00"), "");

        let jobs = manager(&host).list("UTC").await.unwrap();
        let ids: Vec<String> = jobs.iter().map(|j| j.id.to_string()).collect();
        assert_eq!(ids, vec![early.to_string(), tie.to_string(), late.to_string()]);
        assert_eq!(time::host_schedule_expr(&jobs[0].local_time), "06:00 2024-05-10");
    }

    #[tokio::test]
    async fn test_lost_session_propagates() {
        let host = Arc::new(MockHost::new("UTC"));
        host.drop_connection();

        let err = manager(&host).list("UTC").await.unwrap_err();
        assert!(err.is_session_lost());
    }
}
