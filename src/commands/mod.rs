//! Interactive helpers used by the CLI entry point

pub mod connect;
pub mod init;
