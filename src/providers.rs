//! Provider registry loader.
//!
//! Reads `ai/config/providers.json` from a working directory and resolves a
//! provider name to the command launched for it. A missing or unreadable
//! registry degrades to the built-in default rather than failing the run.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Relative path within a working directory to the provider registry.
pub const PROVIDERS_PATH: &str = "ai/config/providers.json";

/// Provider chosen when neither the request nor the registry names one.
pub const DEFAULT_PROVIDER: &str = "claude";

fn default_provider_name() -> String {
    DEFAULT_PROVIDER.to_owned()
}

/// One registered provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderEntry {
    /// Registry key.
    pub name: String,
    /// Shell command launched for this provider.
    #[serde(default)]
    pub cli: Option<String>,
    /// Informational model label.
    #[serde(default)]
    pub model: Option<String>,
}

/// Key to command table with a designated default key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderRegistry {
    /// Key used when a request does not name a provider.
    #[serde(default = "default_provider_name")]
    pub default: String,
    /// Registered providers, searched in order.
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            default: default_provider_name(),
            providers: Vec::new(),
        }
    }
}

/// Outcome of resolving a provider name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    /// Provider key that was chosen.
    pub name: String,
    /// Command to launch through the shell.
    pub command: String,
}

impl ProviderRegistry {
    /// Load the registry from `{workdir}/ai/config/providers.json`.
    ///
    /// A missing file yields the default registry silently; an unreadable
    /// or malformed file yields it with a warning.
    #[must_use]
    pub fn load(workdir: &Path) -> Self {
        let path = workdir.join(PROVIDERS_PATH);

        if !path.exists() {
            debug!(path = %path.display(), "no provider registry, using defaults");
            return Self::default();
        }

        let raw = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read provider registry, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(registry) => registry,
            Err(err) => {
                warn!(path = %path.display(), %err, "malformed provider registry, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve `requested` (or the registry default) to a launch command.
    ///
    /// An unknown key, or an entry without `cli`, is treated as the name of
    /// the executable itself.
    #[must_use]
    pub fn resolve(&self, requested: Option<&str>) -> ResolvedProvider {
        let name = requested
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.default)
            .to_owned();

        let command = self
            .providers
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.cli.clone())
            .filter(|cli| !cli.trim().is_empty())
            .unwrap_or_else(|| name.clone());

        ResolvedProvider { name, command }
    }
}
