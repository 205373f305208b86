//! Command wiring
//!
//! Loads and validates the configuration, resolves the environment and its
//! token, and builds the sync services a command needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use url::Url;

use lcsync_core::config::Config;
use lcsync_core::environment::Environment;
use lcsync_core::ports::{IDeletionPrompt, IRemoteGateway};
use lcsync_remote::auth::{self, resolve_token, TokenSource, TOKEN_ENV_VAR};
use lcsync_remote::client::GatewayClient;
use lcsync_remote::gateway::HttpRemoteGateway;
use lcsync_sync::deletion::DeletionCoordinator;
use lcsync_sync::engine::SyncEngine;
use lcsync_sync::fetch::{Fetcher, Materializer};
use lcsync_sync::scaffold::Scaffolder;
use lcsync_sync::store::ManifestStore;

/// Validated configuration plus the environment it selects
#[derive(Debug)]
pub struct AppContext {
    pub config_path: PathBuf,
    pub config: Config,
    pub base_url: Url,
    pub environment: Environment,
    /// Local root of the environment, `<workspace.root>/<env>`
    pub root: PathBuf,
}

impl AppContext {
    /// Loads the configuration at `config_path` (or the default path)
    ///
    /// A missing file means defaults; a file that does not parse, or any
    /// validation error, fails setup.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::default_path);
        let config = if config_path.exists() {
            Config::load(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?
        } else {
            debug!(config_path = %config_path.display(), "No config file, using defaults");
            Config::default()
        };

        let errors = config.validate();
        if !errors.is_empty() {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            bail!(
                "Invalid configuration ({}): {}",
                config_path.display(),
                details.join("; ")
            );
        }

        let base_url = config.base_url()?;
        let environment = Environment::from_base_url(&base_url);
        let root = environment.root(&config.workspace.root);
        info!(environment = %environment, root = %root.display(), "Resolved environment");

        Ok(Self {
            config_path,
            config,
            base_url,
            environment,
            root,
        })
    }

    /// Keyring account of this environment
    pub fn account(&self) -> String {
        auth::account(self.environment, &self.base_url)
    }

    /// Fails unless the environment root exists
    pub fn require_root(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!(
                "Environment root {} does not exist. Run 'lcsync fetch' first.",
                self.root.display()
            );
        }
        Ok(())
    }

    /// Builds the HTTP gateway with this environment's token
    pub fn gateway(&self) -> Result<Arc<dyn IRemoteGateway>> {
        let account = self.account();
        let Some(resolved) = resolve_token(&account)? else {
            bail!(
                "No token for {}. Run 'lcsync auth login' or set {}.",
                account,
                TOKEN_ENV_VAR
            );
        };
        if resolved.source == TokenSource::EnvironmentVariable {
            debug!("Using token from {}", TOKEN_ENV_VAR);
        }

        let client = GatewayClient::new(
            &self.base_url,
            resolved.token,
            Duration::from_secs(self.config.remote.timeout_secs),
        )
        .context("Failed to build HTTP client")?;
        Ok(Arc::new(HttpRemoteGateway::new(client)))
    }

    pub fn page_size(&self) -> u32 {
        self.config.remote.page_size
    }
}

/// Everything the sync commands run on, sharing one manifest store
pub struct Services {
    pub gateway: Arc<dyn IRemoteGateway>,
    pub store: Arc<ManifestStore>,
    pub engine: Arc<SyncEngine>,
    root: PathBuf,
    page_size: u32,
}

impl Services {
    pub fn new(ctx: &AppContext, gateway: Arc<dyn IRemoteGateway>) -> Self {
        let store = Arc::new(ManifestStore::new());
        let engine = Arc::new(SyncEngine::new(
            ctx.root.clone(),
            Arc::clone(&gateway),
            Arc::clone(&store),
        ));
        Self {
            gateway,
            store,
            engine,
            root: ctx.root.clone(),
            page_size: ctx.page_size(),
        }
    }

    pub fn materializer(&self) -> Materializer {
        Materializer::new(self.root.clone(), Arc::clone(&self.store))
    }

    pub fn fetcher(&self) -> Fetcher {
        Fetcher::new(Arc::clone(&self.gateway), self.materializer(), self.page_size)
    }

    pub fn scaffolder(&self) -> Scaffolder {
        Scaffolder::new(Arc::clone(&self.store))
    }

    pub fn deletion(&self, prompt: Arc<dyn IDeletionPrompt>) -> DeletionCoordinator {
        DeletionCoordinator::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.store),
            self.materializer(),
            prompt,
            self.page_size,
        )
    }
}
