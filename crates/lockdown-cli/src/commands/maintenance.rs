//! `lockdown repair`, `prune` and `mv`.

use lockdown_core::FsDocumentStore;

use crate::app::AppContext;
use crate::cli::{MoveArgs, PathArgs};
use crate::errors::CliError;
use crate::helpers::document_id;
use crate::ui::{badge, print, receipt, Badge, Spinner};

pub async fn handle_repair(ctx: &AppContext<'_>, args: &PathArgs) -> anyhow::Result<()> {
    let ui = ctx.ui_context(false, None);
    let spinner = Spinner::new(&ui, "Repairing");
    let (store, coordinator) = ctx.coordinator(&ui, spinner.handle(), false, None).await?;
    let id = document_id(&store, &args.path)?;

    spinner.start();
    let repaired = coordinator.repair_document(&id).await?;
    spinner.finish();
    coordinator.vault().clear_all();

    if !ctx.quiet() {
        if repaired {
            print(&ui, &receipt(&ui, "Repaired", &[("Document", id.as_str())]));
        } else if ui.mode.is_pretty() {
            print(
                &ui,
                &badge(&ui, Badge::Info, &format!("{} is already intact", id)),
            );
        } else {
            print(&ui, &format!("status=unchanged\ndocument={}", id));
        }
    }
    Ok(())
}

pub async fn handle_prune(ctx: &AppContext<'_>) -> anyhow::Result<()> {
    let ui = ctx.ui_context(false, None);
    let (_, coordinator) = ctx.coordinator(&ui, None, false, None).await?;
    let removed = coordinator.prune_missing().await?;

    if ctx.quiet() {
        return Ok(());
    }
    if ui.mode.is_pretty() {
        if removed.is_empty() {
            print(&ui, &badge(&ui, Badge::Info, "Nothing to prune"));
        } else {
            print(
                &ui,
                &badge(&ui, Badge::Ok, &format!("Pruned {} entries", removed.len())),
            );
            for id in &removed {
                print(&ui, &format!("  {}", id));
            }
        }
    } else {
        print(&ui, "status=ok");
        for id in &removed {
            print(&ui, &format!("removed={}", id));
        }
    }
    Ok(())
}

fn rename(store: &FsDocumentStore, from: &str, to: &str) -> anyhow::Result<()> {
    let from_path = store.resolve(from)?;
    let to_path = store.resolve(to)?;
    if let Some(parent) = to_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&from_path, &to_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to move {} to {}: {}",
            from_path.display(),
            to_path.display(),
            e
        )
    })
}

/// Move the file, then re-seal it for its new id. The file is moved back if
/// re-sealing fails.
pub async fn handle_mv(ctx: &AppContext<'_>, args: &MoveArgs) -> anyhow::Result<()> {
    let ui = ctx.ui_context(false, None);
    let spinner = Spinner::new(&ui, "Moving");
    let (store, coordinator) = ctx.coordinator(&ui, spinner.handle(), false, None).await?;
    let from = document_id(&store, &args.from)?;
    let to = document_id(&store, &args.to)?;

    if !coordinator.registry().is_directly_locked(&from) {
        return Err(CliError::invalid_input(format!(
            "{} is not locked (use a plain `mv` for unlocked documents)",
            from
        ))
        .into());
    }
    if store.resolve(to.as_str())?.exists() {
        return Err(CliError::invalid_input(format!("{} already exists", to)).into());
    }

    spinner.start();
    rename(&store, from.as_str(), to.as_str())?;
    if let Err(e) = coordinator.relocate(&from, &to).await {
        spinner.finish();
        if let Err(rollback) = rename(&store, to.as_str(), from.as_str()) {
            tracing::error!(error = %rollback, "Failed to move document back after relocation failure");
        }
        return Err(e.into());
    }
    spinner.finish();
    coordinator.vault().clear_all();

    if !ctx.quiet() {
        print(
            &ui,
            &receipt(&ui, "Moved", &[("From", from.as_str()), ("To", to.as_str())]),
        );
    }
    Ok(())
}
