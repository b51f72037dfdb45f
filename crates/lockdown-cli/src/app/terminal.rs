//! Terminal implementations of the coordinator's host contracts.

use async_trait::async_trait;
use dialoguer::Confirm;
use indicatif::ProgressBar;

use lockdown_core::{DocumentId, IndicatorState, LockIndicator, Password, Prompter};

use crate::helpers::{env_password, prompt_password};
use crate::ui::{badge, Badge, UiContext};

/// Prompts on the terminal, or answers from `LOCKDOWN_PASSWORD`.
pub struct TerminalPrompter {
    interactive: bool,
    assume_yes: bool,
    spinner: Option<ProgressBar>,
}

impl TerminalPrompter {
    pub fn new(interactive: bool, assume_yes: bool, spinner: Option<ProgressBar>) -> Self {
        Self {
            interactive,
            assume_yes,
            spinner,
        }
    }
}

/// Run a blocking dialog with the spinner hidden.
async fn blocking_dialog<T, F>(spinner: Option<ProgressBar>, dialog: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> Option<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || match spinner {
        Some(bar) => bar.suspend(dialog),
        None => dialog(),
    })
    .await
    .ok()
    .flatten()
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn request_password(&self, prompt: &str, is_new: bool) -> Option<Password> {
        if let Some(password) = env_password() {
            return Some(password);
        }
        if !self.interactive {
            tracing::debug!("No TTY and no LOCKDOWN_PASSWORD; treating prompt as cancelled");
            return None;
        }
        let prompt = prompt.to_string();
        blocking_dialog(self.spinner.clone(), move || prompt_password(&prompt, is_new)).await
    }

    async fn request_confirmation(&self, message: &str) -> Option<bool> {
        if self.assume_yes {
            return Some(true);
        }
        if !self.interactive {
            return None;
        }
        let message = message.to_string();
        blocking_dialog(self.spinner.clone(), move || {
            Confirm::new()
                .with_prompt(message)
                .default(false)
                .interact_opt()
                .ok()
                .flatten()
        })
        .await
    }
}

/// Prints a line whenever a document settles in a new state.
pub struct TerminalIndicator {
    ui: UiContext,
}

impl TerminalIndicator {
    pub fn new(ui: UiContext) -> Self {
        Self { ui }
    }
}

impl LockIndicator for TerminalIndicator {
    fn apply(&self, id: &DocumentId, state: IndicatorState) {
        let kind = match state {
            IndicatorState::Locked => Badge::Locked,
            IndicatorState::Unlocked => Badge::Unlocked,
            IndicatorState::Busy => return,
        };
        if self.ui.mode.is_json() {
            return;
        }
        eprintln!("{}", badge(&self.ui, kind, id.as_str()));
    }
}
