//! Stream orchestration
//!
//! `StreamOrchestrator` is the single entry point front ends use: upload media,
//! start or schedule it, check and stop the live relay, manage the queue and
//! the public page templates.

use chrono::NaiveDateTime;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::HostLayout;
use crate::error::{RelayError, Result};
use crate::queue::{JobId, Schedule, ScheduleQueueManager, ScheduledJob, Submission};
use crate::script::{shell_quote, PageSource, ScriptGenerator};
use crate::session::{ProgressFn, RemoteSession};
use crate::time::{self, ZonePair};

/// An uploaded media file on the host, waiting to be played
///
/// Not `Clone`: starting or scheduling consumes it, so one upload backs at
/// most one job.
#[derive(Debug, PartialEq, Eq)]
pub struct MediaAsset {
    remote_path: String,
}

impl MediaAsset {
    /// Refer to a file already on the host
    pub fn new(remote_path: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
        }
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn file_name(&self) -> &str {
        self.remote_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.remote_path)
    }
}

/// What a successful `schedule_later` registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleReceipt {
    pub job_id: JobId,
    pub media_path: String,
    /// Expression handed to the facility, in the host zone
    pub host_expr: String,
    pub host_zone: String,
    /// `HH:MM on YYYY-MM-DD` in the operator's zone
    pub local_display: String,
}

/// Which page template to replace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Shown while a stream is live
    Player,
    /// Shown when nothing is streaming
    Idle,
}

/// Result of installing a custom page template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUpdate {
    pub template_path: String,
    /// Whether the public page was switched to the new template right away
    pub applied: bool,
}

pub struct StreamOrchestrator<S: RemoteSession> {
    session: Arc<S>,
    layout: HostLayout,
    generator: ScriptGenerator,
    queue: ScheduleQueueManager<S>,
}

impl<S: RemoteSession> Clone for StreamOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            layout: self.layout.clone(),
            generator: self.generator.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<S: RemoteSession> StreamOrchestrator<S> {
    pub fn new(session: Arc<S>, layout: HostLayout) -> Self {
        Self {
            generator: ScriptGenerator::new(&layout),
            queue: ScheduleQueueManager::new(Arc::clone(&session), &layout),
            session,
            layout,
        }
    }

    pub fn layout(&self) -> &HostLayout {
        &self.layout
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Whether a relay process for the target URL is running
    pub async fn check_live_status(&self) -> Result<bool> {
        let command = format!(
            "ps aux | grep {}",
            shell_quote(&self.generator.status_pattern())
        );
        let output = self.session.run(&command).await?;
        Ok(!output.stdout.trim().is_empty())
    }

    /// Kill the relay, put the idle page back, and report whether anything is
    /// still live
    pub async fn hard_stop(&self) -> Result<bool> {
        let kill = format!(
            "pkill -9 -f {}",
            shell_quote(&self.generator.stop_pattern())
        );
        self.session.run(&kill).await?;

        let idle = PageSource::idle(&self.layout);
        self.session
            .run(&self.generator.page_install_command(&idle))
            .await?;

        let still_live = self.check_live_status().await?;
        if still_live {
            warn!("Relay still running after stop");
        } else {
            info!("Relay stopped and idle page restored");
        }
        Ok(still_live)
    }

    /// Upload a local media file into the host's upload directory
    pub async fn upload_asset(
        &self,
        local_path: &Path,
        on_progress: ProgressFn,
    ) -> Result<MediaAsset> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                RelayError::InvalidInput(format!("'{}' has no file name", local_path.display()))
            })?;

        let remote_path = format!("{}/{}", self.layout.upload_dir.trim_end_matches('/'), name);
        let bytes = self
            .session
            .upload_file(local_path, &remote_path, on_progress)
            .await?;

        info!(remote = %remote_path, bytes, "Media uploaded");
        Ok(MediaAsset::new(remote_path))
    }

    /// Start playing `asset` now
    pub async fn start_now(&self, asset: MediaAsset) -> Result<()> {
        let script = self.build_script(&asset);
        self.queue.submit(&script, Schedule::Immediate).await?;
        Ok(())
    }

    /// Schedule `asset` for an operator-local wall-clock time
    ///
    /// Both zones are resolved and the time converted before anything is
    /// written to the host.
    pub async fn schedule_later(
        &self,
        asset: MediaAsset,
        local: NaiveDateTime,
        local_zone: &str,
    ) -> Result<ScheduleReceipt> {
        let local_tz = time::resolve_zone(local_zone)?;
        let local_time = time::localize(local, local_tz)?;

        let host_zone = self.queue.host_zone().await?;
        let zones = ZonePair::new(local_tz, time::resolve_zone(&host_zone)?);
        let host_time = zones.to_host(local)?;
        let host_expr = time::host_schedule_expr(&host_time);
        let host_zone = zones.host.name().to_string();

        let script = self.build_script(&asset);
        let submission = self
            .queue
            .submit(
                &script,
                Schedule::At {
                    expr: host_expr.clone(),
                    host_zone: host_zone.clone(),
                },
            )
            .await?;

        match submission {
            Submission::Queued(job_id) => Ok(ScheduleReceipt {
                job_id,
                media_path: asset.remote_path,
                host_expr,
                host_zone,
                local_display: time::local_display(&local_time),
            }),
            Submission::Started => Err(RelayError::Other(
                "scheduled job was launched immediately".to_string(),
            )),
        }
    }

    /// Pending jobs, with times shown in `local_zone`
    pub async fn list_jobs(&self, local_zone: &str) -> Result<Vec<ScheduledJob>> {
        self.queue.list(local_zone).await
    }

    pub async fn cancel_job(&self, id: &JobId) -> Result<()> {
        self.queue.cancel(id).await
    }

    /// File names currently in the upload directory
    pub async fn list_assets(&self) -> Result<Vec<String>> {
        let output = self
            .session
            .run(&format!("ls -1 {}", shell_quote(&self.layout.upload_dir)))
            .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Upload a custom page template
    ///
    /// A new idle template goes live immediately when nothing is streaming.
    pub async fn set_page_template(
        &self,
        kind: PageKind,
        local_path: &Path,
    ) -> Result<PageUpdate> {
        let template_path = match kind {
            PageKind::Player => self.layout.player_template_path.clone(),
            PageKind::Idle => self.layout.idle_template_path.clone(),
        };

        self.session
            .upload_file(local_path, &template_path, Box::new(|_: u64, _: u64| {}))
            .await?;
        info!(template = %template_path, "Page template uploaded");

        let applied = match kind {
            PageKind::Player => false,
            PageKind::Idle => {
                if self.check_live_status().await? {
                    false
                } else {
                    self.session
                        .run(&format!(
                            "cp {} {}",
                            shell_quote(&template_path),
                            shell_quote(&self.layout.public_page_path)
                        ))
                        .await?;
                    true
                }
            }
        };

        Ok(PageUpdate {
            template_path,
            applied,
        })
    }

    fn build_script(&self, asset: &MediaAsset) -> crate::script::ControlScript {
        self.generator.build(
            asset.remote_path(),
            &PageSource::player(&self.layout),
            &PageSource::idle(&self.layout),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockHost;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    fn orchestrator(host: &Arc<MockHost>) -> StreamOrchestrator<MockHost> {
        StreamOrchestrator::new(Arc::clone(host), HostLayout::default())
    }

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").unwrap()
    }

    #[tokio::test]
    async fn test_live_status() {
        let host = Arc::new(MockHost::default());
        let orch = orchestrator(&host);

        assert!(!orch.check_live_status().await.unwrap());
        host.set_relay_running(true);
        assert!(orch.check_live_status().await.unwrap());
        assert_eq!(
            host.commands().last().unwrap(),
            "ps aux | grep '[f]fmpeg.*rtmp://localhost/live/stream'"
        );
    }

    #[tokio::test]
    async fn test_hard_stop_restores_idle_page() {
        let host = Arc::new(MockHost::default());
        host.set_relay_running(true);
        let orch = orchestrator(&host);

        assert!(!orch.hard_stop().await.unwrap());

        let commands = host.commands();
        assert_eq!(
            commands[0],
            "pkill -9 -f '[/]usr/bin/ffmpeg.*rtmp://localhost/live/stream'"
        );
        assert!(commands[1].starts_with("if [ -f '/var/www/idle_template.html' ]"));
        assert!(commands[2].starts_with("ps aux"));
    }

    #[tokio::test]
    async fn test_hard_stop_reports_survivor() {
        let host = Arc::new(MockHost::default());
        host.set_relay_running(true);
        host.set_relay_survives_kill(true);

        assert!(orchestrator(&host).hard_stop().await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_asset() {
        let host = Arc::new(MockHost::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.mp4");
        std::fs::write(&path, b"not really video").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let on_progress: ProgressFn = Box::new(move |sent: u64, total: u64| {
            sink.lock().unwrap().push((sent, total));
        });
        let asset = orchestrator(&host)
            .upload_asset(&path, on_progress)
            .await
            .unwrap();

        assert_eq!(asset.remote_path(), "/var/videos/show.mp4");
        assert_eq!(asset.file_name(), "show.mp4");
        assert_eq!(host.file("/var/videos/show.mp4").unwrap(), "not really video");
        assert_eq!(seen.lock().unwrap().last(), Some(&(16, 16)));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let host = Arc::new(MockHost::default());
        let err = orchestrator(&host)
            .upload_asset(Path::new("/nonexistent/show.mp4"), Box::new(|_: u64, _: u64| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Io(_)));
    }

    #[tokio::test]
    async fn test_start_now() {
        let host = Arc::new(MockHost::default());
        let orch = orchestrator(&host);
        orch.start_now(MediaAsset::new("/var/videos/a.mp4"))
            .await
            .unwrap();

        assert!(host
            .commands()
            .iter()
            .any(|c| c == &crate::queue::detached_launch_command("/root/stream_starter.sh")));
        assert!(orch.check_live_status().await.unwrap());
    }

    #[tokio::test]
    async fn test_schedule_later_converts_to_host_zone() {
        let host = Arc::new(MockHost::new("UTC"));
        let receipt = orchestrator(&host)
            .schedule_later(
                MediaAsset::new("/var/videos/a.mp4"),
                at("2024-05-10 14:00"),
                "Asia/Tehran",
            )
            .await
            .unwrap();

        assert_eq!(receipt.host_expr, "10:30 2024-05-10");
        assert_eq!(receipt.host_zone, "UTC");
        assert_eq!(receipt.local_display, "14:00 on 2024-05-10");
        assert_eq!(receipt.media_path, "/var/videos/a.mp4");
        assert!(host.jobs().contains_key(&receipt.job_id.as_str().parse().unwrap()));
    }

    #[tokio::test]
    async fn test_schedule_with_unset_host_zone_uses_utc() {
        let host = Arc::new(MockHost::new(""));
        let receipt = orchestrator(&host)
            .schedule_later(
                MediaAsset::new("/var/videos/a.mp4"),
                at("2024-05-10 14:00"),
                "Asia/Tehran",
            )
            .await
            .unwrap();

        assert_eq!(receipt.host_zone, "UTC");
        assert!(host
            .commands()
            .iter()
            .any(|c| c.starts_with("TZ='UTC' at -f")));
    }

    #[tokio::test]
    async fn test_bad_zone_has_no_host_side_effects() {
        let host = Arc::new(MockHost::new("UTC"));
        let err = orchestrator(&host)
            .schedule_later(
                MediaAsset::new("/var/videos/a.mp4"),
                at("2024-05-10 14:00"),
                "Mars/Olympus_Mons",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::ZoneResolution { .. }));
        assert!(host.commands().is_empty());
        assert!(host.file("/root/stream_starter.sh").is_none());
    }

    #[tokio::test]
    async fn test_bad_host_zone_has_no_host_side_effects() {
        let host = Arc::new(MockHost::new("Not/AZone"));
        let err = orchestrator(&host)
            .schedule_later(
                MediaAsset::new("/var/videos/a.mp4"),
                at("2024-05-10 14:00"),
                "UTC",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::ZoneResolution { .. }));
        assert_eq!(host.commands(), vec!["cat '/etc/timezone'".to_string()]);
        assert!(host.file("/root/stream_starter.sh").is_none());
    }

    #[tokio::test]
    async fn test_list_and_cancel_jobs() {
        let host = Arc::new(MockHost::new("UTC"));
        let orch = orchestrator(&host);
        let receipt = orch
            .schedule_later(
                MediaAsset::new("/var/videos/a.mp4"),
                at("2024-05-10 14:00"),
                "UTC",
            )
            .await
            .unwrap();

        let jobs = orch.list_jobs("UTC").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, receipt.job_id);

        orch.cancel_job(&receipt.job_id).await.unwrap();
        assert!(orch.list_jobs("UTC").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_assets() {
        let host = Arc::new(MockHost::default());
        host.put_file("/var/videos/b.mp4", "");
        host.put_file("/var/videos/a.mp4", "");
        host.put_file("/var/www/player/index.html", "");

        let assets = orchestrator(&host).list_assets().await.unwrap();
        assert_eq!(assets, vec!["a.mp4".to_string(), "b.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_idle_template_applied_when_offline() {
        let host = Arc::new(MockHost::default());
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "<h1>back soon</h1>").unwrap();

        let update = orchestrator(&host)
            .set_page_template(PageKind::Idle, file.path())
            .await
            .unwrap();

        assert!(update.applied);
        assert_eq!(update.template_path, "/var/www/idle_template.html");
        assert_eq!(
            host.file("/var/www/idle_template.html").unwrap(),
            "<h1>back soon</h1>"
        );
        assert_eq!(
            host.commands().last().unwrap(),
            "cp '/var/www/idle_template.html' '/var/www/player/index.html'"
        );
    }

    #[tokio::test]
    async fn test_idle_template_not_applied_while_live() {
        let host = Arc::new(MockHost::default());
        host.set_relay_running(true);
        let file = NamedTempFile::new().unwrap();

        let update = orchestrator(&host)
            .set_page_template(PageKind::Idle, file.path())
            .await
            .unwrap();
        assert!(!update.applied);
    }

    #[tokio::test]
    async fn test_player_template_is_only_uploaded() {
        let host = Arc::new(MockHost::default());
        let file = NamedTempFile::new().unwrap();

        let update = orchestrator(&host)
            .set_page_template(PageKind::Player, file.path())
            .await
            .unwrap();
        assert!(!update.applied);
        assert_eq!(update.template_path, "/var/www/player_template.html");
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn test_lost_connection_surfaces() {
        let host = Arc::new(MockHost::default());
        let orch = orchestrator(&host);
        host.drop_connection();

        assert!(!orch.is_connected());
        let err = orch.check_live_status().await.unwrap_err();
        assert!(err.is_session_lost());
    }
}
