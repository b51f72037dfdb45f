//! Password input: `LOCKDOWN_PASSWORD`, else an interactive prompt.

use dialoguer::Password as PasswordPrompt;

use lockdown_core::Password;

use crate::constants::env;

/// Password from `LOCKDOWN_PASSWORD`, if set and non-empty.
pub fn env_password() -> Option<Password> {
    std::env::var(env::PASSWORD)
        .ok()
        .and_then(|value| Password::new(value).ok())
}

/// Ask on the terminal. `is_new` asks twice and requires a match.
///
/// Returns `None` when the prompt is dismissed or the terminal is gone.
pub fn prompt_password(prompt: &str, is_new: bool) -> Option<Password> {
    loop {
        let mut input = PasswordPrompt::new().with_prompt(prompt);
        if is_new {
            input = input.with_confirmation("Confirm password", "Passwords do not match");
        }
        let value = input.interact().ok()?;
        match Password::new(value) {
            Ok(password) => return Some(password),
            Err(e) => eprintln!("{}", e),
        }
    }
}
