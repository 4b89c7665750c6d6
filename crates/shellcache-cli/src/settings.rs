//! CLI settings.
//!
//! Stored at `~/.config/shellcache/config.json`. Environment variables
//! override the file: `SHELLCACHE_ORIGIN`, `SHELLCACHE_VERSION`,
//! `SHELLCACHE_CACHE_DIR` and `SHELLCACHE_LOG_DIR`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shellcache_core::CacheConfig;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub origin: Option<String>,
    pub version: String,
    pub cache_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub network_timeout_ms: u64,
    /// Replaces the built-in precache manifest when set
    pub manifest: Option<Vec<String>>,
    pub trusted_hosts: Vec<String>,
    pub backing_store_hosts: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            origin: None,
            version: "1".to_string(),
            cache_dir: None,
            log_dir: None,
            network_timeout_ms: shellcache_core::config::DEFAULT_NETWORK_TIMEOUT_MS,
            manifest: None,
            trusted_hosts: Vec::new(),
            backing_store_hosts: Vec::new(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", path.display()))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(origin) = var("SHELLCACHE_ORIGIN") {
            self.origin = Some(origin);
        }
        if let Some(version) = var("SHELLCACHE_VERSION") {
            self.version = version;
        }
        if let Some(dir) = var("SHELLCACHE_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = var("SHELLCACHE_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn cache_config(&self) -> Result<CacheConfig> {
        let origin = self.origin.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No origin configured. Set SHELLCACHE_ORIGIN or \"origin\" in {CONFIG_FILE}")
        })?;

        let mut config = CacheConfig::new(origin, &self.version)?
            .with_network_timeout(Duration::from_millis(self.network_timeout_ms));
        if let Some(ref manifest) = self.manifest {
            config = config.with_manifest(manifest.iter().cloned());
        }
        for host in &self.trusted_hosts {
            config = config.with_trusted_host(host.clone());
        }
        for host in &self.backing_store_hosts {
            config = config.with_backing_store_host(host.clone());
        }
        Ok(config)
    }

    /// Cache directory, one subdirectory per origin host
    pub fn cache_dir(&self, config: &CacheConfig) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        let host = config.origin.host_str().unwrap_or("default");
        Ok(cache_dir.join(APP_NAME).join(host))
    }
}
