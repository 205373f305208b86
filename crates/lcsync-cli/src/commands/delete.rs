//! Delete command - Settle a folder removal by hand
//!
//! Runs the same flow the watcher uses when a mirrored folder disappears:
//! confirm and remove the element remotely, or restore the folder from the
//! remote record.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use serde_json::json;

use lcsync_core::ports::{AutoConfirm, IDeletionPrompt};
use lcsync_sync::deletion::DeletionOutcome;

use crate::context::{AppContext, Services};
use crate::output::Output;
use crate::prompt::TerminalPrompt;

#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Removed folder (a method, role, task or class folder)
    pub dir: PathBuf,

    /// Confirm without asking
    #[arg(long, conflicts_with = "restore")]
    pub yes: bool,

    /// Decline without asking (restore the folder)
    #[arg(long)]
    pub restore: bool,
}

fn describe(outcome: &DeletionOutcome) -> String {
    match outcome {
        DeletionOutcome::Removed { kind, remote_id } => {
            format!("removed {kind} from {remote_id}")
        }
        DeletionOutcome::RolledBack(path) => format!("restored {}", path.display()),
        DeletionOutcome::AlreadyAbsent => "already absent on the remote".to_string(),
        DeletionOutcome::Unpublished => "owner is unpublished, nothing to remove".to_string(),
        DeletionOutcome::Ignored => "entity deletion is not supported remotely".to_string(),
        DeletionOutcome::NotRecognized => "not a mirrored folder".to_string(),
        DeletionOutcome::Undecided => "interrupted before an answer, nothing changed".to_string(),
    }
}

impl DeleteCommand {
    pub async fn execute(&self, ctx: &AppContext, out: Output) -> Result<()> {
        ctx.require_root()?;
        let dir = if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            std::env::current_dir()?.join(&self.dir)
        };
        if dir.exists() {
            bail!("{} still exists; remove it first", dir.display());
        }

        let prompt: Arc<dyn IDeletionPrompt> = if self.yes {
            Arc::new(AutoConfirm(true))
        } else if self.restore {
            Arc::new(AutoConfirm(false))
        } else {
            Arc::new(TerminalPrompt::new())
        };

        let services = Services::new(ctx, ctx.gateway()?);
        let outcome = services.deletion(prompt).handle_removed_dir(&dir).await?;

        let summary = describe(&outcome);
        out.report(
            json!({"dir": dir.display().to_string(), "outcome": summary}),
            |out| {
                if outcome == DeletionOutcome::Ignored {
                    out.warn(&format!("{}: {}", dir.display(), summary));
                } else {
                    out.success(&format!("{}: {}", dir.display(), summary));
                }
            },
        );
        Ok(())
    }
}
