//! Deployment environment
//!
//! Each environment has its own local root directory and its own access token.
//! The environment is resolved once at startup from the remote base URL and
//! never changes while the process runs.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::DomainError;

/// Target environment of the remote platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Hom,
    Prod,
}

impl Environment {
    /// Resolves the environment from the remote base URL
    ///
    /// A host or path containing `dev` selects [`Environment::Dev`], `hom`
    /// selects [`Environment::Hom`]; anything else is production.
    #[must_use]
    pub fn from_base_url(url: &Url) -> Self {
        let haystack = format!("{}{}", url.host_str().unwrap_or_default(), url.path())
            .to_ascii_lowercase();
        if haystack.contains("dev") {
            Environment::Dev
        } else if haystack.contains("hom") {
            Environment::Hom
        } else {
            Environment::Prod
        }
    }

    /// Lowercase name, also the folder name under the workspace root
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Hom => "hom",
            Environment::Prod => "prod",
        }
    }

    /// Local root directory of this environment
    #[must_use]
    pub fn root(self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(self.as_str())
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "hom" => Ok(Environment::Hom),
            "prod" => Ok(Environment::Prod),
            other => Err(DomainError::InvalidEnvironment(other.to_string())),
        }
    }
}
