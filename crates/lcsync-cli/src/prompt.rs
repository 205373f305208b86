//! Terminal deletion prompt
//!
//! Implements `IDeletionPrompt` by asking on stderr and reading one line from
//! stdin. Concurrent deletions are asked one at a time. End of input counts
//! as "no", so a detached watcher restores folders instead of deleting.
//!
//! The read happens on a detached thread rather than the runtime's blocking
//! pool: a question abandoned at shutdown must not keep the runtime alive.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use lcsync_core::ports::{DeletionRequest, IDeletionPrompt};

/// Interprets an answer; only `y` / `yes` confirm
pub fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Asks the developer in the terminal
#[derive(Default)]
pub struct TerminalPrompt {
    turn: Mutex<()>,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl IDeletionPrompt for TerminalPrompt {
    async fn confirm(&self, request: &DeletionRequest) -> Result<bool> {
        let _turn = self.turn.lock().await;
        let question = format!(
            "Folder {} was removed.\nDelete {} on the remote? [y/N] ",
            request.path.display(),
            request
        );

        let (tx, rx) = oneshot::channel();
        std::thread::Builder::new()
            .name("lcsync-prompt".to_string())
            .spawn(move || {
                // the receiver is gone if the question was abandoned
                let _ = tx.send(ask_on_terminal(&question));
            })
            .context("Failed to start prompt thread")?;

        let answer = rx
            .await
            .context("Prompt thread ended without an answer")?
            .context("Failed to read answer from stdin")?;

        let confirmed = answer.as_deref().map(parse_answer).unwrap_or(false);
        debug!(request = %request, confirmed, "Deletion prompt answered");
        Ok(confirmed)
    }
}

/// Writes `question` to stderr and reads one line; `None` at end of input
fn ask_on_terminal(question: &str) -> io::Result<Option<String>> {
    let mut stderr = io::stderr();
    stderr.write_all(question.as_bytes())?;
    stderr.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}
