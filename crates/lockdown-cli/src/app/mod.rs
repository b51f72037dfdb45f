//! Application-level utilities for the Lockdown CLI.
//!
//! This module provides:
//! - Config and vault root resolution
//! - The terminal host handed to the lock coordinator

mod context;
mod terminal;

pub use context::AppContext;
pub use terminal::TerminalIndicator;
