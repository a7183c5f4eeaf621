/*!
 * Background workers and the outcome delivery queue
 *
 * Front ends never block on the host. Each operation is handed to the
 * `Dispatcher`, which runs it as a tokio task and posts exactly one terminal
 * `Outcome` (uploads also post progress) to a single ordered channel. The front
 * end drains that channel on its own schedule and is the only place that
 * touches front-end state.
 */

use chrono::NaiveDateTime;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::PathBuf;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::RelayError;
use crate::orchestrator::{MediaAsset, PageKind, PageUpdate, ScheduleReceipt, StreamOrchestrator};
use crate::queue::{JobId, ScheduledJob};
use crate::session::RemoteSession;

/// Operation names carried by failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Start,
    Schedule,
    ListJobs,
    Cancel,
    Status,
    Stop,
    ListMedia,
    Page,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Upload => "upload",
            Operation::Start => "start",
            Operation::Schedule => "schedule",
            Operation::ListJobs => "list jobs",
            Operation::Cancel => "cancel",
            Operation::Status => "status",
            Operation::Stop => "stop",
            Operation::ListMedia => "list media",
            Operation::Page => "page update",
        };
        f.write_str(name)
    }
}

/// Message posted by a worker
#[derive(Debug)]
pub enum Outcome {
    UploadProgress { sent: u64, total: u64 },
    Uploaded(MediaAsset),
    Started { media_path: String },
    Scheduled(ScheduleReceipt),
    Jobs(Vec<ScheduledJob>),
    Cancelled(JobId),
    Status { live: bool },
    Stopped { still_live: bool },
    Media(Vec<String>),
    PageUpdated(PageUpdate),
    Failed {
        operation: Operation,
        error: RelayError,
        /// An asset the operation consumed but could not use, handed back
        returned: Option<MediaAsset>,
    },
}

impl Outcome {
    fn failed(operation: Operation, error: RelayError) -> Self {
        Outcome::Failed {
            operation,
            error,
            returned: None,
        }
    }

    /// Whether this outcome means the session is gone
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Outcome::Failed { error, .. } if error.is_session_lost())
    }
}

/// Sending half of the delivery queue
#[derive(Clone)]
pub struct OutcomePublisher {
    sender: Sender<Outcome>,
}

impl OutcomePublisher {
    /// Publish an outcome
    pub fn publish(&self, outcome: Outcome) {
        let _ = self.sender.send(outcome); // Front end may already be gone
    }
}

/// Receiving half of the delivery queue
pub struct OutcomeQueue {
    receiver: Receiver<Outcome>,
}

impl OutcomeQueue {
    /// Everything posted so far, in posting order (non-blocking)
    pub fn drain(&self) -> Vec<Outcome> {
        self.receiver.try_iter().collect()
    }
}

/// Create a connected publisher and queue
pub fn outcome_channel() -> (OutcomePublisher, OutcomeQueue) {
    let (sender, receiver) = unbounded();
    (OutcomePublisher { sender }, OutcomeQueue { receiver })
}

/// Runs orchestrator operations on a tokio runtime
pub struct Dispatcher<S: RemoteSession> {
    orchestrator: StreamOrchestrator<S>,
    runtime: Handle,
    publisher: OutcomePublisher,
    local_zone: String,
}

impl<S: RemoteSession> Dispatcher<S> {
    pub fn new(
        orchestrator: StreamOrchestrator<S>,
        runtime: Handle,
        local_zone: impl Into<String>,
    ) -> (Self, OutcomeQueue) {
        let (publisher, queue) = outcome_channel();
        (
            Self {
                orchestrator,
                runtime,
                publisher,
                local_zone: local_zone.into(),
            },
            queue,
        )
    }

    pub fn local_zone(&self) -> &str {
        &self.local_zone
    }

    pub fn upload(&self, local_path: PathBuf) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();
        let progress = self.publisher.clone();

        self.runtime.spawn(async move {
            let mut last_percent = None;
            let on_progress = Box::new(move |sent: u64, total: u64| {
                let percent = if total == 0 { 100 } else { sent * 100 / total };
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    progress.publish(Outcome::UploadProgress { sent, total });
                }
            });

            let outcome = match orchestrator.upload_asset(&local_path, on_progress).await {
                Ok(asset) => Outcome::Uploaded(asset),
                Err(e) => Outcome::failed(Operation::Upload, e),
            };
            publisher.publish(outcome);
        })
    }

    pub fn start(&self, asset: MediaAsset) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();

        self.runtime.spawn(async move {
            let media_path = asset.remote_path().to_string();
            let outcome = match orchestrator.start_now(asset).await {
                Ok(()) => Outcome::Started { media_path },
                Err(error) => Outcome::Failed {
                    operation: Operation::Start,
                    error,
                    returned: Some(MediaAsset::new(media_path)),
                },
            };
            publisher.publish(outcome);
        })
    }

    pub fn schedule(&self, asset: MediaAsset, local: NaiveDateTime) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();
        let local_zone = self.local_zone.clone();

        self.runtime.spawn(async move {
            let media_path = asset.remote_path().to_string();
            let outcome = match orchestrator.schedule_later(asset, local, &local_zone).await {
                Ok(receipt) => Outcome::Scheduled(receipt),
                Err(error) => Outcome::Failed {
                    operation: Operation::Schedule,
                    error,
                    returned: Some(MediaAsset::new(media_path)),
                },
            };
            publisher.publish(outcome);
        })
    }

    pub fn refresh_jobs(&self) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();
        let local_zone = self.local_zone.clone();

        self.runtime.spawn(async move {
            let outcome = match orchestrator.list_jobs(&local_zone).await {
                Ok(jobs) => Outcome::Jobs(jobs),
                Err(e) => Outcome::failed(Operation::ListJobs, e),
            };
            publisher.publish(outcome);
        })
    }

    pub fn cancel(&self, id: JobId) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();

        self.runtime.spawn(async move {
            let outcome = match orchestrator.cancel_job(&id).await {
                Ok(()) => Outcome::Cancelled(id),
                Err(e) => Outcome::failed(Operation::Cancel, e),
            };
            publisher.publish(outcome);
        })
    }

    pub fn check_status(&self) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();

        self.runtime.spawn(async move {
            let outcome = match orchestrator.check_live_status().await {
                Ok(live) => Outcome::Status { live },
                Err(e) => Outcome::failed(Operation::Status, e),
            };
            publisher.publish(outcome);
        })
    }

    pub fn stop(&self) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();

        self.runtime.spawn(async move {
            let outcome = match orchestrator.hard_stop().await {
                Ok(still_live) => Outcome::Stopped { still_live },
                Err(e) => Outcome::failed(Operation::Stop, e),
            };
            publisher.publish(outcome);
        })
    }

    pub fn list_media(&self) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();

        self.runtime.spawn(async move {
            let outcome = match orchestrator.list_assets().await {
                Ok(names) => Outcome::Media(names),
                Err(e) => Outcome::failed(Operation::ListMedia, e),
            };
            publisher.publish(outcome);
        })
    }

    pub fn set_page(&self, kind: PageKind, local_path: PathBuf) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let publisher = self.publisher.clone();

        self.runtime.spawn(async move {
            let outcome = match orchestrator.set_page_template(kind, &local_path).await {
                Ok(update) => Outcome::PageUpdated(update),
                Err(e) => Outcome::failed(Operation::Page, e),
            };
            publisher.publish(outcome);
        })
    }
}
