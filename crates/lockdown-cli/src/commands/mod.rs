//! Command handlers for the Lockdown CLI.

pub mod init;
pub mod lock;
pub mod maintenance;
pub mod misc;
pub mod status;
pub mod watch;
