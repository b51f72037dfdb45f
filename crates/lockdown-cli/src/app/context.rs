//! Application context for the Lockdown CLI.
//!
//! Bundles the parsed arguments with the lazily-loaded config and builds the
//! document store and lock coordinator commands work against.

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::ProgressBar;
use once_cell::unsync::OnceCell;

use lockdown_core::host::NoopIndicator;
use lockdown_core::{
    EncryptionService, FsDocumentStore, Host, LockCoordinator, LockIndicator, LockRegistry,
};

use crate::cli::Cli;
use crate::config::{default_config_path, read_config, LockdownConfig};
use crate::errors::CliError;
use crate::ui::UiContext;

use super::terminal::TerminalPrompter;

pub struct AppContext<'a> {
    cli: &'a Cli,
    config: OnceCell<LockdownConfig>,
}

impl<'a> AppContext<'a> {
    pub fn new(cli: &'a Cli) -> Self {
        Self {
            cli,
            config: OnceCell::new(),
        }
    }

    pub fn quiet(&self) -> bool {
        self.cli.quiet
    }

    /// `--root` / `LOCKDOWN_ROOT` as given.
    pub fn root_flag(&self) -> Option<&String> {
        self.cli.root.as_ref()
    }

    /// `--config` / `LOCKDOWN_CONFIG`, else the XDG default.
    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.cli.config {
            Some(path) => Ok(PathBuf::from(path)),
            None => default_config_path(),
        }
    }

    /// The config file, or defaults when there is none.
    pub fn config(&self) -> anyhow::Result<&LockdownConfig> {
        self.config.get_or_try_init(|| {
            let path = self.config_path()?;
            if path.exists() {
                read_config(&path)
            } else {
                tracing::debug!(path = %path.display(), "No config file; using defaults");
                Ok(LockdownConfig::default())
            }
        })
    }

    /// UI context honoring the `[ui]` config section.
    pub fn ui_context(&self, json: bool, format: Option<&str>) -> UiContext {
        let (ascii, color) = self
            .config()
            .map(|c| (c.ui.ascii, c.ui.color))
            .unwrap_or((false, None));
        UiContext::from_env(json, format, self.cli.no_color, self.cli.ascii || ascii, color)
    }

    /// Vault root: `--root` / `LOCKDOWN_ROOT`, else the config file.
    pub fn root(&self) -> anyhow::Result<PathBuf> {
        let raw = match &self.cli.root {
            Some(root) => root.clone(),
            None => self.config()?.vault.root.clone().ok_or_else(|| {
                CliError::not_found(
                    "No vault root configured",
                    "Hint: Run `lockdown init <ROOT>` or pass --root.",
                )
            })?,
        };
        std::fs::canonicalize(&raw).map_err(|_| {
            CliError::not_found(
                format!("Vault root {} does not exist", raw),
                "Hint: Check the path, or run `lockdown init <ROOT>`.",
            )
            .into()
        })
    }

    pub fn store(&self) -> anyhow::Result<Arc<FsDocumentStore>> {
        Ok(Arc::new(FsDocumentStore::new(self.root()?)))
    }

    /// Whether prompts may be shown.
    pub fn interactive(&self, ui: &UiContext) -> bool {
        !self.cli.no_input && ui.is_interactive()
    }

    /// Build a coordinator over the vault root.
    ///
    /// `spinner` is hidden while the prompter asks for input.
    pub async fn coordinator(
        &self,
        ui: &UiContext,
        spinner: Option<ProgressBar>,
        assume_yes: bool,
        indicator: Option<Arc<dyn LockIndicator>>,
    ) -> anyhow::Result<(Arc<FsDocumentStore>, LockCoordinator)> {
        let config = self.config()?;
        let store = self.store()?;
        let host = Host {
            store: store.clone(),
            prompter: Arc::new(TerminalPrompter::new(
                self.interactive(ui),
                assume_yes,
                spinner,
            )),
            indicator: indicator.unwrap_or_else(|| Arc::new(NoopIndicator)),
        };
        let coordinator = LockCoordinator::load(
            host,
            EncryptionService::new(config.kdf_params()?),
            config.vault_config(),
            config.coordinator_config(),
        )
        .await?;
        Ok((store, coordinator))
    }

    /// Read the persisted registry without building a coordinator.
    pub fn registry(&self, store: &FsDocumentStore) -> anyhow::Result<LockRegistry> {
        let path = store.root().join(lockdown_core::coordinator::DEFAULT_REGISTRY_PATH);
        match std::fs::read_to_string(&path) {
            Ok(json) => Ok(LockRegistry::from_json(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LockRegistry::new()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read registry {}: {}",
                path.display(),
                e
            )),
        }
    }
}
