//! Watch command - Mirror local edits to the remote as they happen
//!
//! Starts the file watcher on the environment root and runs the watch loop
//! until Ctrl+C / SIGTERM. Per-entity failures are logged and the loop keeps
//! running; only setup failures end the command with an error.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use lcsync_core::ports::{AutoConfirm, IDeletionPrompt};
use lcsync_sync::scheduler::{WatchScheduler, WatchTiming};
use lcsync_sync::watcher::FileWatcher;

use crate::context::{AppContext, Services};
use crate::output::Output;
use crate::prompt::TerminalPrompt;

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Propagate folder deletions without asking
    #[arg(long)]
    pub yes: bool,
}

impl WatchCommand {
    pub async fn execute(
        &self,
        ctx: &AppContext,
        out: Output,
        shutdown: CancellationToken,
    ) -> Result<()> {
        ctx.require_root()?;
        let services = Services::new(ctx, ctx.gateway()?);

        let prompt: Arc<dyn IDeletionPrompt> = if self.yes || !ctx.config.deletion.confirm {
            Arc::new(AutoConfirm(true))
        } else {
            Arc::new(TerminalPrompt::new())
        };

        let (mut watcher, change_rx) = FileWatcher::new()?;
        let handle = watcher.watch(&ctx.root)?;

        let timing = WatchTiming {
            debounce: Duration::from_millis(ctx.config.watch.debounce_ms),
            stability_check_ms: ctx.config.watch.stability_check_ms,
            removal_settle: Duration::from_millis(ctx.config.watch.removal_settle_ms),
        };
        let scheduler = WatchScheduler::new(
            change_rx,
            Arc::clone(&services.engine),
            Arc::new(services.scaffolder()),
            Arc::new(services.deletion(prompt).with_shutdown(shutdown.clone())),
            timing,
            shutdown,
        );

        out.success(&format!(
            "Watching {} ({})",
            handle.path().display(),
            ctx.environment
        ));
        out.info("Press Ctrl+C to stop");

        scheduler.run().await;

        watcher.unwatch(handle)?;
        info!("Watch command finished");
        out.success("Stopped watching");
        Ok(())
    }
}
