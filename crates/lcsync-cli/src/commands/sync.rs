//! Sync command - Push local changes once, without watching
//!
//! With a path, runs the per-file pipeline for that file. Without one, walks
//! the whole environment root.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use lcsync_sync::engine::SyncOutcome;

use crate::context::{AppContext, Services};
use crate::output::{format_duration_ms, Output};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// File to sync; the whole environment when omitted
    pub path: Option<PathBuf>,
}

fn describe(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Ignored => "not a mirrored artifact".to_string(),
        SyncOutcome::Created { kind, remote_id } => format!("created {kind} {remote_id}"),
        SyncOutcome::Patched {
            kind,
            remote_id,
            operations,
        } => format!("patched {kind} {remote_id} ({operations} operation(s))"),
        SyncOutcome::Unchanged => "already up to date".to_string(),
        SyncOutcome::Skipped => "nothing to send".to_string(),
    }
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &AppContext, out: Output) -> Result<()> {
        ctx.require_root()?;
        let services = Services::new(ctx, ctx.gateway()?);

        if let Some(path) = &self.path {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                std::env::current_dir()
                    .context("Cannot determine the current directory")?
                    .join(path)
            };
            let outcome = services.engine.sync_path(&path).await?;
            let summary = describe(&outcome);
            out.report(
                json!({"path": path.display().to_string(), "outcome": summary}),
                |out| out.success(&format!("{}: {}", path.display(), summary)),
            );
            return Ok(());
        }

        let report = services.engine.sync_all().await?;
        out.report(
            json!({
                "visited": report.visited,
                "created": report.created,
                "patched": report.patched,
                "unchanged": report.unchanged,
                "errors": report.errors,
                "duration_ms": report.duration_ms,
            }),
            |out| {
                out.success(&format!(
                    "Synced {} in {}",
                    ctx.root.display(),
                    format_duration_ms(report.duration_ms)
                ));
                out.info(&format!("Visited:   {}", report.visited));
                out.info(&format!("Created:   {}", report.created));
                out.info(&format!("Patched:   {}", report.patched));
                out.info(&format!("Unchanged: {}", report.unchanged));
                for error in &report.errors {
                    out.error(error);
                }
            },
        );
        Ok(())
    }
}
