//! `lockdown watch`: keep locked documents locked while they are edited.
//!
//! The vault root is polled for changes. An edit that leaves plaintext in a
//! locked document is encrypted again with the session password. The
//! session ends on Ctrl-C or once the password cache times out; either way
//! open documents are re-locked before exiting.

use std::sync::Arc;
use std::time::Duration;

use lockdown_core::{LockIndicator, LockdownError};

use crate::app::{AppContext, TerminalIndicator};
use crate::cli::WatchArgs;
use crate::helpers::{env_password, prompt_password};
use crate::ui::{badge, print, Badge};

/// Consecutive empty-vault polls before the session counts as expired.
const EXPIRED_POLLS: u32 = 2;

pub async fn handle_watch(ctx: &AppContext<'_>, args: &WatchArgs) -> anyhow::Result<()> {
    let ui = ctx.ui_context(false, None);
    let indicator: Arc<dyn LockIndicator> = Arc::new(TerminalIndicator::new(ui.clone()));
    let (store, coordinator) = ctx.coordinator(&ui, None, false, Some(indicator)).await?;

    let password = match env_password() {
        Some(password) => password,
        None if ctx.interactive(&ui) => {
            tokio::task::spawn_blocking(|| prompt_password("Session password", false))
                .await?
                .ok_or(LockdownError::Cancelled)?
        }
        None => return Err(LockdownError::Cancelled.into()),
    };
    coordinator.set_root_password(password);

    let interval = Duration::from_millis(args.interval_ms.max(50));
    let (changes, watcher) = store.watch(interval);

    if !ctx.quiet() {
        let root = store.root().display().to_string();
        print(
            &ui,
            &badge(&ui, Badge::Info, &format!("Watching {} (Ctrl-C to stop)", root)),
        );
    }

    let run = coordinator.run(changes);
    tokio::pin!(run);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    let mut poll = tokio::time::interval(interval);
    let mut empty_polls = 0;
    let mut run_finished = false;

    loop {
        tokio::select! {
            result = &mut run => {
                run_finished = true;
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Watch loop stopped");
                }
                break;
            }
            signal = &mut interrupted => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                tracing::info!("Interrupted");
                break;
            }
            _ = poll.tick() => {
                if coordinator.vault().is_empty() {
                    empty_polls += 1;
                    if empty_polls >= EXPIRED_POLLS {
                        tracing::info!("Session timed out");
                        break;
                    }
                } else {
                    empty_polls = 0;
                }
            }
        }
    }

    // Dropping the watcher closes the change stream, which ends `run`.
    watcher.abort();
    if !run_finished {
        if let Err(e) = run.await {
            tracing::warn!(error = %e, "Watch loop stopped");
        }
    }
    coordinator.shutdown().await;

    if !ctx.quiet() {
        print(&ui, &badge(&ui, Badge::Ok, "Session closed"));
    }
    Ok(())
}
