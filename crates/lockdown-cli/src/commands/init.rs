//! `lockdown init`: write the config and an empty registry.

use std::path::PathBuf;

use lockdown_core::coordinator::DEFAULT_REGISTRY_PATH;
use lockdown_core::{LockRegistry, VaultConfig};

use crate::app::AppContext;
use crate::cli::InitArgs;
use crate::config::{write_config, LockdownConfig};
use crate::errors::CliError;
use crate::ui::{hint, print, receipt};

pub fn handle_init(ctx: &AppContext, args: &InitArgs) -> anyhow::Result<()> {
    let ui = ctx.ui_context(false, None);
    let config_path = ctx.config_path()?;
    if config_path.exists() && !args.force {
        return Err(CliError::invalid_input(format!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        ))
        .into());
    }

    let raw_root = match args.path.as_ref().or(ctx.root_flag()) {
        Some(root) => PathBuf::from(root),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&raw_root)
        .map_err(|e| anyhow::anyhow!("Failed to create vault root {}: {}", raw_root.display(), e))?;
    let root = std::fs::canonicalize(&raw_root)?;

    let registry_path = root.join(DEFAULT_REGISTRY_PATH);
    if !registry_path.exists() {
        if let Some(parent) = registry_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&registry_path, LockRegistry::new().to_json()?)?;
    }

    let timeout = args
        .timeout_minutes
        .unwrap_or(VaultConfig::default().timeout_minutes);
    write_config(&config_path, &LockdownConfig::new(root.clone(), timeout))?;
    tracing::info!(root = %root.display(), "Initialized vault");

    if !ctx.quiet() {
        let root_display = root.display().to_string();
        let config_display = config_path.display().to_string();
        print(
            &ui,
            &receipt(
                &ui,
                "Initialized vault",
                &[("Root", &root_display), ("Config", &config_display)],
            ),
        );
        print(&ui, &hint(&ui, "lockdown lock <PATH>"));
    }
    Ok(())
}
