//! Lockdown CLI - password-lock notes and folders in a document vault
//!
//! This is the command-line host for Lockdown. It wires the core lock
//! coordinator to the filesystem, the terminal and a config file.

mod app;
mod cli;
mod commands;
mod config;
mod constants;
mod errors;
mod helpers;
mod ui;

use clap::Parser;
use lockdown_core::VERSION;

use crate::app::AppContext;
use crate::cli::{Cli, Commands};
use crate::commands::{init, lock, maintenance, misc, status, watch};
use crate::ui::print_error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ctx = AppContext::new(&cli);

    if let Err(e) = run(&ctx, &cli).await {
        let ui_ctx = ctx.ui_context(false, None);
        let classified = errors::classify(&e);
        tracing::debug!(error = ?e, "Command failed");
        print_error(&ui_ctx, &classified.to_string(), classified.hint());
        std::process::exit(classified.exit_code());
    }
}

/// Logs go to stderr. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "lockdown_core=warn,lockdown_cli=warn",
        1 => "lockdown_core=info,lockdown_cli=info",
        _ => "lockdown_core=debug,lockdown_cli=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(ctx: &AppContext<'_>, cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Init(args)) => {
            init::handle_init(ctx, args)?;
        }
        Some(Commands::Lock(args)) => {
            lock::handle_lock(ctx, args).await?;
        }
        Some(Commands::Unlock(args)) => {
            lock::handle_unlock(ctx, args).await?;
        }
        Some(Commands::Show(args)) => {
            lock::handle_show(ctx, args).await?;
        }
        Some(Commands::Status(args)) => {
            status::handle_status(ctx, args).await?;
        }
        Some(Commands::Repair(args)) => {
            maintenance::handle_repair(ctx, args).await?;
        }
        Some(Commands::Prune) => {
            maintenance::handle_prune(ctx).await?;
        }
        Some(Commands::Mv(args)) => {
            maintenance::handle_mv(ctx, args).await?;
        }
        Some(Commands::Watch(args)) => {
            watch::handle_watch(ctx, args).await?;
        }
        Some(Commands::Completions(args)) => {
            misc::handle_completions(args)?;
        }
        None => {
            println!("Lockdown v{}", VERSION);
            println!("\nQuickstart:");
            println!("  lockdown init ~/notes");
            println!("  lockdown lock journal/private.md");
            println!("  lockdown show journal/private.md");
            println!("  lockdown unlock journal/private.md");
            println!("\nRun `lockdown --help` for full usage.");
        }
    }

    Ok(())
}
