//! UI primitives for the Lockdown CLI.
//!
//! This module provides:
//! - **Context**: Environment detection (TTY, width, color, unicode) and
//!   output mode resolution (json, plain, pretty)
//! - **Theme**: Badge tokens and text styles
//! - **Render**: Tables, headers, receipts, hints
//! - **Progress**: Spinner shown while keys are derived

mod context;
pub mod progress;
pub mod render;
pub mod theme;

pub use context::{OutputMode, UiContext};
pub use progress::Spinner;
pub use render::{badge, hint, print, print_error, receipt, table, Column};
pub use theme::Badge;
