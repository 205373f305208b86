//! Config command - View and validate the lcsync configuration
//!
//! These subcommands work on a broken configuration too, so they load the
//! file directly instead of going through `AppContext`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::json;
use tracing::info;

use lcsync_core::config::Config;
use lcsync_core::environment::Environment;

use crate::output::Output;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: Option<&Path>, out: Output) -> Result<()> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::default_path);
        match self {
            ConfigCommand::Show => execute_show(&config_path, out),
            ConfigCommand::Validate => execute_validate(&config_path, out),
        }
    }
}

fn execute_show(config_path: &Path, out: Output) -> Result<()> {
    let config = Config::load_or_default(config_path);
    info!(config_path = %config_path.display(), "Showing configuration");

    let environment = config
        .base_url()
        .ok()
        .map(|url| Environment::from_base_url(&url));

    if out.is_json() {
        let mut value =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        value["environment"] = json!(environment.map(|e| e.to_string()));
        out.report(value, |_| {});
        return Ok(());
    }

    out.success(&format!("Configuration ({})", config_path.display()));
    if let Some(environment) = environment {
        out.info(&format!(
            "Environment: {} ({})",
            environment,
            environment.root(&config.workspace.root).display()
        ));
    }
    out.info("");
    let yaml =
        serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        out.info(line);
    }
    Ok(())
}

fn execute_validate(config_path: &Path, out: Output) -> Result<()> {
    if !config_path.exists() {
        bail!("No configuration file at {}", config_path.display());
    }
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;

    let errors = config.validate();
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    out.report(
        json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": messages,
        }),
        |out| {
            if errors.is_empty() {
                out.success(&format!("{} is valid", config_path.display()));
            } else {
                for message in &messages {
                    out.error(message);
                }
            }
        },
    );

    if !errors.is_empty() {
        bail!("{} invalid setting(s)", errors.len());
    }
    Ok(())
}
