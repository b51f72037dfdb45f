//! `lockdown lock`, `unlock` and `show`.

use lockdown_core::{DocumentId, FsDocumentStore, LockCoordinator};

use crate::app::AppContext;
use crate::cli::{LockArgs, PathArgs};
use crate::helpers::document_id;
use crate::ui::{hint, print, receipt, Spinner};

/// Folder targets: directories on disk, and folders the registry already
/// tracks (their directory may hold only envelopes).
fn is_folder(store: &FsDocumentStore, coordinator: &LockCoordinator, id: &DocumentId) -> bool {
    coordinator.registry().is_container_locked(id.as_str())
        || store.resolve(id.as_str()).map(|p| p.is_dir()).unwrap_or(false)
}

pub async fn handle_lock(ctx: &AppContext<'_>, args: &LockArgs) -> anyhow::Result<()> {
    let ui = ctx.ui_context(false, None);
    let spinner = Spinner::new(&ui, "Locking");
    let (store, coordinator) = ctx
        .coordinator(&ui, spinner.handle(), args.yes, None)
        .await?;
    let id = document_id(&store, &args.path)?;

    spinner.start();
    if is_folder(&store, &coordinator, &id) {
        let count = coordinator.lock_container(id.as_str()).await?;
        spinner.finish();
        if !ctx.quiet() {
            let count = count.to_string();
            print(
                &ui,
                &receipt(&ui, "Locked folder", &[("Folder", id.as_str()), ("Documents", &count)]),
            );
        }
    } else {
        coordinator.lock_document(&id).await?;
        spinner.finish();
        if !ctx.quiet() {
            print(&ui, &receipt(&ui, "Locked", &[("Document", id.as_str())]));
            print(&ui, &hint(&ui, &format!("lockdown show {}", id)));
        }
    }
    Ok(())
}

pub async fn handle_unlock(ctx: &AppContext<'_>, args: &PathArgs) -> anyhow::Result<()> {
    let ui = ctx.ui_context(false, None);
    let spinner = Spinner::new(&ui, "Unlocking");
    let (store, coordinator) = ctx.coordinator(&ui, spinner.handle(), false, None).await?;
    let id = document_id(&store, &args.path)?;

    spinner.start();
    if is_folder(&store, &coordinator, &id) {
        let count = coordinator.unlock_container(id.as_str()).await?;
        spinner.finish();
        if !ctx.quiet() {
            let count = count.to_string();
            print(
                &ui,
                &receipt(
                    &ui,
                    "Unlocked folder",
                    &[("Folder", id.as_str()), ("Documents", &count)],
                ),
            );
        }
    } else {
        coordinator.unlock_document(&id).await?;
        spinner.finish();
        if !ctx.quiet() {
            print(&ui, &receipt(&ui, "Unlocked", &[("Document", id.as_str())]));
        }
    }
    Ok(())
}

/// Decrypt to stdout; storage is left encrypted.
pub async fn handle_show(ctx: &AppContext<'_>, args: &PathArgs) -> anyhow::Result<()> {
    let ui = ctx.ui_context(false, None);
    let spinner = Spinner::new(&ui, "Decrypting");
    let (store, coordinator) = ctx.coordinator(&ui, spinner.handle(), false, None).await?;
    let id = document_id(&store, &args.path)?;

    spinner.start();
    let plaintext = coordinator.open_document(&id).await?;
    spinner.finish();
    // The session ends with this process; nothing is left to re-lock.
    coordinator.vault().clear_all();

    print!("{}", plaintext);
    if !plaintext.ends_with('\n') {
        println!();
    }
    Ok(())
}
