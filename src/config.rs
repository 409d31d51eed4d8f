//! Configuration for the crawler.
//!
//! Precedence, lowest first: built-in defaults, the config file (found with
//! `prefer` or given with `--config`), `FRONTIER_*` environment variables,
//! then command-line flags. Identities are only ever read from the config
//! file or a separate JSON file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryConfig;
use crate::llm::LlmConfig;
use crate::models::Identity;
use crate::scrapers::browser::BrowserEngineConfig;
use crate::scrapers::platform::DEFAULT_BASE_URL;
use crate::scrapers::rate_limiter::{RateLimitConfig, DEFAULT_BLOCK_THRESHOLD};
use crate::scrapers::RetryPolicy;
use crate::services::intel::IntelConfig;
use crate::services::orchestrator::OrchestratorConfig;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "frontier.db";

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Explicit user agent, or "impersonate" for a random desktop browser.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between requests to one domain, in milliseconds.
    pub request_delay_ms: u64,
    pub retry: RetryPolicy,
    pub block_threshold: u32,
    pub proxy_url: Option<String>,
    pub rotation_url: Option<String>,
    pub base_url: String,
    pub orchestrator: OrchestratorConfig,
    pub discovery: DiscoveryConfig,
    pub intel: IntelConfig,
    pub browser: BrowserEngineConfig,
    pub llm: LlmConfig,
    pub identities: Vec<Identity>,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("frontier");

        Self {
            database_path: data_dir.join(DEFAULT_DATABASE_FILENAME),
            user_agent: None,
            request_timeout: 30,
            request_delay_ms: 2000,
            retry: RetryPolicy::default(),
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            proxy_url: None,
            rotation_url: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            orchestrator: OrchestratorConfig::default(),
            discovery: DiscoveryConfig::default(),
            intel: IntelConfig::default(),
            browser: BrowserEngineConfig::default(),
            llm: LlmConfig::default(),
            identities: Vec::new(),
        }
    }
}

impl Settings {
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            base_delay: Duration::from_millis(self.request_delay_ms),
            block_threshold: self.block_threshold.max(1),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Fail unless at least one identity is configured.
    pub fn require_identities(&self) -> anyhow::Result<&[Identity]> {
        if self.identities.is_empty() {
            anyhow::bail!(
                "no identities configured; add an `identities` list to the config file or pass --identities <file.json>"
            );
        }
        Ok(&self.identities)
    }

    /// Apply `FRONTIER_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = env_value::<String>("FRONTIER_DATABASE") {
            self.database_path = PathBuf::from(shellexpand::tilde(&path).into_owned());
        }
        if let Some(workers) = env_value("FRONTIER_WORKERS") {
            self.orchestrator.workers = workers;
        }
        if let Some(batch) = env_value("FRONTIER_BATCH_SIZE") {
            self.orchestrator.batch_size = batch;
        }
        if let Some(min) = env_value("FRONTIER_MIN_AUDIENCE") {
            self.discovery.filter.min_audience = min;
        }
        if let Some(secs) = env_value("FRONTIER_IDLE_WAIT") {
            self.orchestrator.idle_wait = Duration::from_secs(secs);
        }
        if let Some(proxy) = env_value::<String>("FRONTIER_PROXY_URL") {
            self.proxy_url = Some(proxy);
        }
        if let Some(url) = env_value::<String>("FRONTIER_ROTATION_URL") {
            self.rotation_url = Some(url);
        }
        if let Some(delay) = env_value("FRONTIER_REQUEST_DELAY_MS") {
            self.request_delay_ms = delay;
        }
        self.llm = std::mem::take(&mut self.llm).with_env_overrides();
    }
}

/// Parse a non-empty environment variable.
fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok().filter(|s| !s.trim().is_empty())?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={}", name, raw);
            None
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_cap_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_wait_secs: Option<u64>,
    /// Consecutive 403s before the egress is rotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_cooldown_secs: Option<u64>,
    /// Outbound proxy. May contain a `{session}` placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Control-plane URL that assigns the proxy a new exit IP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_wait_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recover_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_error_backoff_secs: Option<u64>,
    /// Rotate egress after this many targets. 0 disables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate_every: Option<usize>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub intel: IntelConfig,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<Identity>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover a `frontier` config file in the standard locations.
    pub async fn load() -> anyhow::Result<Self> {
        match prefer::load("frontier").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default()),
            },
            // No config file found
            Err(_) => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file, parsed by extension.
    pub async fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).context("Failed to parse TOML config")?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).context("Failed to parse YAML config")?
            }
            _ => serde_json::from_str(&contents).context("Failed to parse JSON config")?,
        };

        config.source_path = Some(path.to_path_buf());
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Directory relative paths in the file are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref database) = self.database {
            settings.database_path = self.resolve_path(database);
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(attempts) = self.max_attempts {
            settings.retry.max_attempts = attempts.max(1);
        }
        if let Some(ms) = self.backoff_base_ms {
            settings.retry.backoff_base = Duration::from_millis(ms);
        }
        if let Some(secs) = self.backoff_cap_secs {
            settings.retry.backoff_cap = Duration::from_secs(secs);
        }
        if let Some(secs) = self.rate_limit_wait_secs {
            settings.retry.rate_limit_wait = Duration::from_secs(secs);
        }
        if let Some(threshold) = self.block_threshold {
            settings.block_threshold = threshold;
        }
        if let Some(secs) = self.block_cooldown_secs {
            settings.retry.block_cooldown = Duration::from_secs(secs);
        }
        if let Some(ref proxy) = self.proxy_url {
            settings.proxy_url = Some(proxy.clone());
        }
        if let Some(ref url) = self.rotation_url {
            settings.rotation_url = Some(url.clone());
        }
        if let Some(ref base) = self.base_url {
            settings.base_url = base.trim_end_matches('/').to_string();
            settings.intel.base_url = settings.base_url.clone();
        }

        let orch = &mut settings.orchestrator;
        if let Some(workers) = self.workers {
            orch.workers = workers;
        }
        if let Some(batch) = self.batch_size {
            orch.batch_size = batch;
        }
        if let Some(secs) = self.idle_wait_secs {
            orch.idle_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = self.stale_timeout_secs {
            orch.stale_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.recover_interval_secs {
            orch.recover_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.loop_error_backoff_secs {
            orch.loop_error_backoff = Duration::from_secs(secs);
        }
        if let Some(every) = self.rotate_every {
            orch.rotate_every = every;
        }

        settings.discovery = self.discovery;
        settings.intel = IntelConfig {
            base_url: settings.base_url.clone(),
            ..self.intel.clone()
        };
        settings.browser = self.browser.clone();
        settings.llm = self.llm.clone();
        settings.identities = self.identities.clone();
    }
}

/// Read identities from a JSON file: either an array or `{"identities": [...]}`.
pub async fn load_identities(path: &Path) -> anyhow::Result<Vec<Identity>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdentityFile {
        List(Vec<Identity>),
        Wrapped { identities: Vec<Identity> },
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read identities file {}", path.display()))?;
    let parsed: IdentityFile = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse identities file {}", path.display()))?;
    let identities = match parsed {
        IdentityFile::List(list) => list,
        IdentityFile::Wrapped { identities } => identities,
    };
    tracing::info!("Loaded {} identities from {}", identities.len(), path.display());
    Ok(identities)
}

/// Where settings come from besides the defaults.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (skips discovery).
    pub config_path: Option<PathBuf>,
    /// Database path override.
    pub database: Option<PathBuf>,
    /// Identities file, replacing any identities from the config file.
    pub identities_path: Option<PathBuf>,
}

/// Load settings with explicit options.
pub async fn load_settings(options: &LoadOptions) -> anyhow::Result<Settings> {
    let config = match &options.config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await?,
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings.apply_env_overrides();

    if let Some(ref database) = options.database {
        settings.database_path = database.clone();
    }
    if let Some(ref path) = options.identities_path {
        settings.identities = load_identities(path).await?;
    }

    Ok(settings)
}
