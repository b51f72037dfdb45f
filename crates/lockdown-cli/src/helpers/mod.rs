//! Helper functions for the Lockdown CLI.

pub mod input;
pub mod paths;

pub use input::{env_password, prompt_password};
pub use paths::document_id;
