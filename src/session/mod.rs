//! Remote session layer
//!
//! The `RemoteSession` contract lives in `relayctl-core-interface`; this module
//! provides the SSH implementation and, for unit tests, an in-memory host.

pub mod ssh;

#[cfg(test)]
pub mod mock;

pub use relayctl_core_interface::{
    CommandOutput, ProgressFn, RemoteSession, Result as SessionResult, SessionError,
};
pub use ssh::{SshAuth, SshConfig, SshSession};
