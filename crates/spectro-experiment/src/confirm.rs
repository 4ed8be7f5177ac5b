//! Operator confirmation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use spectro_core::capabilities::Confirm;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Answers every prompt the same way without asking (`--yes`).
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Default for AutoConfirm {
    fn default() -> Self {
        Self(true)
    }
}

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, prompt: &str) -> Result<bool> {
        tracing::info!(prompt, answer = self.0, "auto-confirmed");
        Ok(self.0)
    }
}

/// Asks on the terminal. Accepts `y`, `yes`, `o`, `oui`; anything else is no.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

/// Whether an answer typed by the operator means yes.
pub fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "o" | "oui"
    )
}

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> Result<bool> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{} [y/N] ", prompt).as_bytes())
            .await
            .context("Failed to write prompt")?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .context("Failed to read answer")?;
        Ok(is_yes(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" Oui "));
        assert!(is_yes("YES"));
        assert!(!is_yes("non"));
        assert!(!is_yes(""));
    }

    #[tokio::test]
    async fn auto_confirm_answers_fixed_value() {
        assert!(AutoConfirm::default().confirm("go?").await.unwrap());
        assert!(!AutoConfirm(false).confirm("go?").await.unwrap());
    }
}
