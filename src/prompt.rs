//! Terminal prompts for values the parameters left out.

use anyhow::Context;
use decorator::external::{PromptError, SecretSource};
use dialoguer::{Confirm, Input, Password};

/// Prompts on the attached terminal, failing with [`PromptError::NoTty`]
/// when nobody is there to answer.
pub struct TerminalSecrets;

fn attended() -> Result<(), PromptError> {
    if console::user_attended() {
        Ok(())
    } else {
        Err(PromptError::NoTty)
    }
}

impl SecretSource for TerminalSecrets {
    fn prompt(&self, message: &str) -> Result<String, PromptError> {
        attended()?;
        let value: String = Input::new()
            .with_prompt(message.trim_end_matches([':', ' ']))
            .interact_text()
            .context("Failed to read input")?;
        Ok(value)
    }

    fn prompt_password(&self, message: &str, confirm: bool) -> Result<String, PromptError> {
        attended()?;
        let mut password = Password::new().with_prompt(message.trim_end_matches([':', ' ']));
        if confirm {
            password = password.with_confirmation("Confirm password", "Passwords do not match");
        }
        Ok(password.interact().context("Failed to read password")?)
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError> {
        attended()?;
        Ok(Confirm::new()
            .with_prompt(message)
            .default(default)
            .interact()
            .context("Failed to read confirmation")?)
    }
}
