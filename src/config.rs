use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use url::Url;

use crate::fields::load_fields;
use crate::providers::gitlab::StatusPolicy;
use crate::server::FailurePolicy;

pub const DEFAULT_DATASET: &str = "buildevents";
pub const DEFAULT_API_HOST: &str = "https://api.honeycomb.io";
pub const DEFAULT_CI_PROVIDER: &str = "GitLab-CI";

const CANDIDATES: [&str; 4] = [
    "buildevents.toml",
    "buildevents.json",
    "buildevents.yaml",
    "buildevents.yml",
];

/// One layer of settings, as read from a config file or the command line.
///
/// Every field is optional; layers are merged with [`PartialConfig::or`] and
/// the result resolved into a [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartialConfig {
    /// Telemetry API key
    pub api_key: Option<String>,

    /// Dataset events are sent to
    pub dataset: Option<String>,

    /// Telemetry API base URL
    pub api_host: Option<String>,

    /// logfmt file of extra fields added to every span
    pub fields_file: Option<PathBuf>,

    /// `ci_provider` label on every span
    pub ci_provider: Option<String>,

    pub status_policy: Option<StatusPolicy>,

    pub failure_policy: Option<FailurePolicy>,
}

impl PartialConfig {
    /// Load a config file.
    ///
    /// Searches in this order:
    /// 1. Specified path
    /// 2. `./buildevents.{toml,json,yaml,yml}`
    /// 3. `buildevents/config.toml` in the platform config directory
    ///
    /// Returns an empty layer if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        if let Some(found) = Self::find_in(Path::new(".")) {
            return Self::load_from_path(&found);
        }

        if let Some(dir) = dirs::config_dir() {
            let path = dir.join("buildevents").join("config.toml");
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    fn find_in(dir: &Path) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.exists())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        debug!("Loading config from {}", path.display());

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Fills every unset field of `self` from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            api_key: self.api_key.or(fallback.api_key),
            dataset: self.dataset.or(fallback.dataset),
            api_host: self.api_host.or(fallback.api_host),
            fields_file: self.fields_file.or(fallback.fields_file),
            ci_provider: self.ci_provider.or(fallback.ci_provider),
            status_policy: self.status_policy.or(fallback.status_policy),
            failure_policy: self.failure_policy.or(fallback.failure_policy),
        }
    }
}

/// Process-wide settings, resolved once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` writes events to stdout instead of sending them
    pub api_key: Option<String>,
    pub dataset: String,
    /// Validated base URL of the events API
    pub api_host: String,
    pub ci_provider: String,
    pub extra_fields: IndexMap<String, Value>,
    pub status_policy: StatusPolicy,
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Applies defaults, validates the API host and reads the fields file.
    ///
    /// # Errors
    ///
    /// Returns an error if the API host is not a URL or the fields file cannot
    /// be loaded.
    pub fn resolve(partial: PartialConfig) -> Result<Self> {
        let api_host = partial.api_host.as_deref().unwrap_or(DEFAULT_API_HOST);
        Url::parse(api_host).with_context(|| format!("Invalid API host: {api_host}"))?;

        let extra_fields = match &partial.fields_file {
            Some(path) => load_fields(path)
                .with_context(|| format!("Failed to load fields file: {}", path.display()))?,
            None => IndexMap::new(),
        };

        Ok(Self {
            api_key: partial.api_key.filter(|key| !key.is_empty()),
            dataset: partial
                .dataset
                .unwrap_or_else(|| DEFAULT_DATASET.to_string()),
            api_host: api_host.to_string(),
            ci_provider: partial
                .ci_provider
                .unwrap_or_else(|| DEFAULT_CI_PROVIDER.to_string()),
            extra_fields,
            status_policy: partial.status_policy.unwrap_or_default(),
            failure_policy: partial.failure_policy.unwrap_or_default(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            dataset: DEFAULT_DATASET.to_string(),
            api_host: DEFAULT_API_HOST.to_string(),
            ci_provider: DEFAULT_CI_PROVIDER.to_string(),
            extra_fields: IndexMap::new(),
            status_policy: StatusPolicy::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}
