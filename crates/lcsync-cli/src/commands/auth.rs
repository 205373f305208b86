//! Auth commands - Login, Logout, and Status for the platform token
//!
//! Provides the `lcsync auth` CLI subcommands which:
//! 1. `login`  - Verifies a token against the platform and stores it in the
//!    system keyring for the configured environment.
//! 2. `logout` - Clears the stored token.
//! 3. `status` - Shows which token would be used and where it comes from.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::json;
use tracing::info;

use lcsync_remote::auth::{resolve_token, KeyringTokenStorage, TokenSource, TOKEN_ENV_VAR};
use lcsync_remote::client::GatewayClient;
use lcsync_remote::gateway::HttpRemoteGateway;
use lcsync_remote::GatewayError;

use crate::context::AppContext;
use crate::output::Output;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Store an access token for the configured environment
    Login {
        /// Token to store; read from stdin when omitted
        #[arg(long)]
        token: Option<String>,

        /// Store without checking the token against the platform
        #[arg(long)]
        no_verify: bool,
    },
    /// Remove the stored token
    Logout,
    /// Show the token in effect
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &AppContext, out: Output) -> Result<()> {
        match self {
            AuthCommand::Login { token, no_verify } => {
                self.execute_login(ctx, out, token.clone(), *no_verify).await
            }
            AuthCommand::Logout => self.execute_logout(ctx, out),
            AuthCommand::Status => self.execute_status(ctx, out),
        }
    }

    async fn execute_login(
        &self,
        ctx: &AppContext,
        out: Output,
        token: Option<String>,
        no_verify: bool,
    ) -> Result<()> {
        let token = match token {
            Some(token) => token,
            None => read_token()?,
        };
        let token = token.trim().to_string();
        if token.is_empty() {
            bail!("Empty token");
        }

        if !no_verify {
            verify(ctx, &token).await?;
        }

        let account = ctx.account();
        let stored = KeyringTokenStorage::store(&account, &token)?;
        info!(account = %account, "Token stored");

        out.report(
            json!({
                "success": true,
                "environment": ctx.environment.to_string(),
                "account": account,
                "stored_at": stored.stored_at.to_rfc3339(),
            }),
            |out| out.success(&format!("Token stored for {account}")),
        );
        Ok(())
    }

    fn execute_logout(&self, ctx: &AppContext, out: Output) -> Result<()> {
        let account = ctx.account();
        KeyringTokenStorage::clear(&account)?;

        out.report(json!({"success": true, "account": account}), |out| {
            out.success(&format!("Token cleared for {account}"));
            if std::env::var_os(TOKEN_ENV_VAR).is_some() {
                out.warn(&format!("{TOKEN_ENV_VAR} is still set and will be used"));
            }
        });
        Ok(())
    }

    fn execute_status(&self, ctx: &AppContext, out: Output) -> Result<()> {
        let account = ctx.account();
        let resolved = resolve_token(&account)?;
        let stored_at = KeyringTokenStorage::load(&account)
            .ok()
            .flatten()
            .map(|stored| stored.stored_at);

        let source = resolved.as_ref().map(|r| match r.source {
            TokenSource::EnvironmentVariable => TOKEN_ENV_VAR,
            TokenSource::Keyring => "keyring",
        });

        out.report(
            json!({
                "environment": ctx.environment.to_string(),
                "base_url": ctx.base_url.as_str(),
                "account": account,
                "authenticated": resolved.is_some(),
                "source": source,
                "stored_at": stored_at.map(|t| t.to_rfc3339()),
            }),
            |out| {
                match source {
                    Some(source) => out.success(&format!("Token available ({source})")),
                    None => out.warn("No token. Run 'lcsync auth login'."),
                }
                out.info(&format!("Environment: {}", ctx.environment));
                out.info(&format!("Remote:      {}", ctx.base_url));
                out.info(&format!("Account:     {account}"));
                if let Some(stored_at) = stored_at {
                    out.info(&format!(
                        "Stored:      {}",
                        stored_at.format("%Y-%m-%d %H:%M:%S UTC")
                    ));
                }
            },
        );
        Ok(())
    }
}

/// Reads one line from stdin
fn read_token() -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "Access token: ")?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read token from stdin")?;
    Ok(line)
}

/// Runs a one-hit search to check the token is accepted
async fn verify(ctx: &AppContext, token: &str) -> Result<()> {
    let client = GatewayClient::new(
        &ctx.base_url,
        token,
        Duration::from_secs(ctx.config.remote.timeout_secs),
    )?;
    let gateway = HttpRemoteGateway::new(client);

    match gateway.search_page("class", &json!({}), 1, None).await {
        Ok(_) => Ok(()),
        Err(GatewayError::Unauthorized(message)) => {
            bail!("The platform rejected the token: {message}")
        }
        Err(e) => Err(e).context("Failed to verify the token"),
    }
}
