//! CLI configuration: defaults, an optional JSON file, then environment
//! overrides.

use anyhow::{anyhow, Context, Result};
use retrosyn_core::{AvailabilityCache, CommonSubstances, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CACHE_PATH_ENV: &str = "RETROSYN_CACHE";
pub const COMMON_SUBSTANCES_ENV: &str = "RETROSYN_COMMON_SUBSTANCES";
pub const PUBCHEM_URL_ENV: &str = "RETROSYN_PUBCHEM_URL";
pub const OFFLINE_ENV: &str = "RETROSYN_OFFLINE";

pub const DEFAULT_CACHE_PATH: &str = "substance_query_result.json";
pub const DEFAULT_PUBCHEM_URL: &str = "https://pubchem.ncbi.nlm.nih.gov/rest/pug";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrosynConfig {
    /// Availability cache file, created on first write.
    pub cache_path: PathBuf,
    /// JSON array of extra always-available names.
    pub common_substances_path: Option<PathBuf>,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub pubchem_url: String,
    pub timeout_secs: u64,
    /// Skip the external lookup; answer from the cache and curated set only.
    pub offline: bool,
}

impl Default for RetrosynConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            common_substances_path: None,
            max_attempts: 1,
            retry_delay_ms: 1000,
            pubchem_url: DEFAULT_PUBCHEM_URL.to_string(),
            timeout_secs: 30,
            offline: false,
        }
    }
}

impl RetrosynConfig {
    /// Defaults, overlaid by `path` when given, then by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Apply `RETROSYN_*` overrides read through `get`.
    pub fn with_env(mut self, get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = get(CACHE_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.cache_path = PathBuf::from(v.trim());
        }
        if let Some(v) = get(COMMON_SUBSTANCES_ENV).filter(|v| !v.trim().is_empty()) {
            self.common_substances_path = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = get(PUBCHEM_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.pubchem_url = v.trim().to_string();
        }
        if let Some(v) = get(OFFLINE_ENV) {
            self.offline = parse_flag(&v).ok_or_else(|| {
                anyhow!("{OFFLINE_ENV} must be one of 1/0/true/false/yes/no, got `{v}`")
            })?;
        }
        Ok(self)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Built-in polymers and reagents plus the configured list, if any.
    pub fn common_substances(&self) -> Result<CommonSubstances> {
        let mut common = CommonSubstances::builtin();
        if let Some(path) = &self.common_substances_path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read substance list {}", path.display()))?;
            let extra = CommonSubstances::from_json_str(&text)
                .with_context(|| format!("failed to parse substance list {}", path.display()))?;
            tracing::debug!(path = %path.display(), names = extra.len(), "loaded common substances");
            common.merge(extra);
        }
        Ok(common)
    }

    pub fn cache(&self) -> Result<AvailabilityCache> {
        AvailabilityCache::load(&self.cache_path)
            .with_context(|| format!("failed to open cache {}", self.cache_path.display()))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
