use clap::{ArgAction, Args, Parser, Subcommand};
use clap_complete::Shell;

use lockdown_core::VERSION;

use crate::constants::DEFAULT_WATCH_INTERVAL_MS;

/// Lockdown - password-lock individual notes and folders in a document vault
#[derive(Parser)]
#[command(name = "lockdown")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Vault root directory (overrides the config file)
    #[arg(short, long, global = true, env = "LOCKDOWN_ROOT")]
    pub root: Option<String>,

    /// Config file path
    #[arg(long, global = true, env = "LOCKDOWN_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// ASCII-only symbols
    #[arg(long, global = true)]
    pub ascii: bool,

    /// Never prompt; passwords come from LOCKDOWN_PASSWORD
    #[arg(long, global = true)]
    pub no_input: bool,
}

/// Arguments for the `init` command
#[derive(Args)]
pub struct InitArgs {
    /// Vault root directory (defaults to the current directory)
    #[arg(value_name = "ROOT")]
    pub path: Option<String>,

    /// Session timeout in minutes (0 disables it)
    #[arg(long)]
    pub timeout_minutes: Option<i64>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// A document or folder inside the vault
#[derive(Args)]
pub struct PathArgs {
    /// Document or folder path (absolute, or relative to the vault root)
    #[arg(value_name = "PATH")]
    pub path: String,
}

/// Arguments for the `lock` command
#[derive(Args)]
pub struct LockArgs {
    /// Document or folder path (absolute, or relative to the vault root)
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Skip the confirmation when locking a folder
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the `status` command
#[derive(Args)]
pub struct StatusArgs {
    /// Only report entries under this path
    #[arg(value_name = "PATH")]
    pub path: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Output format (table, plain)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,
}

/// Arguments for the `mv` command
#[derive(Args)]
pub struct MoveArgs {
    /// Current path of a locked document
    #[arg(value_name = "FROM")]
    pub from: String,

    /// New path
    #[arg(value_name = "TO")]
    pub to: String,
}

/// Arguments for the `watch` command
#[derive(Args)]
pub struct WatchArgs {
    /// Polling interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_WATCH_INTERVAL_MS)]
    pub interval_ms: u64,
}

/// Arguments for the `completions` command
#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_name = "SHELL")]
    pub shell: Shell,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up a vault: write the config and an empty lock registry
    Init(InitArgs),

    /// Lock a document, or every document in a folder
    Lock(LockArgs),

    /// Unlock a document or folder
    Unlock(PathArgs),

    /// Print a locked document's content without unlocking it
    Show(PathArgs),

    /// List locked documents and folders
    Status(StatusArgs),

    /// Rewrite a duplicated or damaged envelope in canonical form
    Repair(PathArgs),

    /// Drop registry entries whose document or folder is gone
    Prune,

    /// Move a locked document and re-seal it for its new path
    Mv(MoveArgs),

    /// Re-lock edits to locked documents until interrupted or timed out
    Watch(WatchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
