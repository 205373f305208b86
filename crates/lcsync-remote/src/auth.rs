//! Access token storage
//!
//! Tokens are kept in the OS credential store, one entry per environment and
//! host, so a dev token is never sent to production. The `LCSYNC_TOKEN`
//! environment variable overrides the stored token (CI and scripted runs).
//!
//! ## Components
//!
//! - [`KeyringTokenStorage`] - Store, load and clear tokens in the system keyring
//! - [`resolve_token`] - Environment variable first, keyring second

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use lcsync_core::environment::Environment;

/// Keyring service name for storing tokens
const KEYRING_SERVICE: &str = "lcsync";

/// Environment variable that overrides the stored token
pub const TOKEN_ENV_VAR: &str = "LCSYNC_TOKEN";

/// Keyring username for an environment and the host it points at
pub fn account(environment: Environment, base_url: &Url) -> String {
    format!("{}@{}", environment, base_url.host_str().unwrap_or("localhost"))
}

// ============================================================================
// KeyringTokenStorage
// ============================================================================

/// A token as kept in the keyring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub stored_at: DateTime<Utc>,
}

/// Stores and retrieves access tokens from the system keyring
///
/// Entries are JSON-encoded [`StoredToken`]s under the service name `lcsync`
/// and the username returned by [`account`].
pub struct KeyringTokenStorage;

impl KeyringTokenStorage {
    /// Stores `token` for `account`, replacing any previous one
    pub fn store(account: &str, token: &str) -> Result<StoredToken> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, account)
            .context("Failed to create keyring entry")?;

        let stored = StoredToken {
            token: token.to_string(),
            stored_at: Utc::now(),
        };
        let json = serde_json::to_string(&stored).context("Failed to serialize token")?;

        entry
            .set_password(&json)
            .context("Failed to store token in keyring")?;

        debug!("Stored token in keyring for {}", account);
        Ok(stored)
    }

    /// Loads the token stored for `account`
    ///
    /// # Returns
    /// `Some(StoredToken)` if found, `None` if no entry exists
    pub fn load(account: &str) -> Result<Option<StoredToken>> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, account)
            .context("Failed to create keyring entry")?;

        match entry.get_password() {
            Ok(json) => {
                let stored: StoredToken = serde_json::from_str(&json)
                    .context("Failed to deserialize token from keyring")?;
                debug!("Loaded token from keyring for {}", account);
                Ok(Some(stored))
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No token found in keyring for {}", account);
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to read token from keyring"),
        }
    }

    /// Removes the token stored for `account`
    ///
    /// Succeeds when there was nothing to remove.
    pub fn clear(account: &str) -> Result<()> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, account)
            .context("Failed to create keyring entry")?;

        match entry.delete_credential() {
            Ok(()) => {
                debug!("Cleared token from keyring for {}", account);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to clear token from keyring"),
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Where a resolved token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    EnvironmentVariable,
    Keyring,
}

/// A token ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub token: String,
    pub source: TokenSource,
}

/// Resolves the token for `account`: `LCSYNC_TOKEN` first, then the keyring
pub fn resolve_token(account: &str) -> Result<Option<ResolvedToken>> {
    resolve_from(std::env::var(TOKEN_ENV_VAR).ok(), account)
}

fn resolve_from(env_value: Option<String>, account: &str) -> Result<Option<ResolvedToken>> {
    if let Some(token) = env_value.filter(|t| !t.trim().is_empty()) {
        return Ok(Some(ResolvedToken {
            token: token.trim().to_string(),
            source: TokenSource::EnvironmentVariable,
        }));
    }

    Ok(KeyringTokenStorage::load(account)?.map(|stored| ResolvedToken {
        token: stored.token,
        source: TokenSource::Keyring,
    }))
}
