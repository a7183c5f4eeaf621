/*!
 * relayctl - remote scheduling and execution for a single live-video relay
 *
 * Uploads media to a streaming host over SSH and starts it right away or
 * schedules it with the host's `at` facility:
 * - Idempotent control scripts that always restore the idle page
 * - Operator-local to host-local time conversion across zones and DST
 * - Pending jobs rebuilt from `atq` on every listing, cancellable by id
 * - Background workers reporting through one ordered delivery queue
 */

pub mod cli_style;
pub mod commands;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod queue;
pub mod script;
pub mod session;
pub mod time;

// Re-export commonly used types
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use orchestrator::{MediaAsset, PageKind, ScheduleReceipt, StreamOrchestrator};
pub use queue::{JobId, Schedule, ScheduleQueueManager, ScheduledJob, Submission};
pub use script::{ControlScript, PageSource, ScriptGenerator};
pub use session::{CommandOutput, RemoteSession, SessionError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
