use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Collection coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// How long a successful snapshot is served from cache, in milliseconds.
    /// 0 disables caching — every scrape drives or joins a fresh collection.
    #[serde(default = "default_cache_window_ms")]
    pub cache_window_ms: u64,
    /// Initial scrape buffer size. Large enough that most deployments never
    /// hit a growth event.
    #[serde(default = "default_initial_buffer_bytes")]
    pub initial_buffer_bytes: usize,
    /// Hard ceiling on scrape buffer growth. Exceeding it fails the
    /// collection pass rather than truncating the output.
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
}

/// Scrape endpoint settings, used by the server binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_cache_window_ms() -> u64 { 300 }
fn default_initial_buffer_bytes() -> usize { 85_000 }
fn default_max_buffer_bytes() -> usize { 100 * 1024 * 1024 }
fn default_addr() -> String { "0.0.0.0:9464".into() }
fn default_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            cache_window_ms: default_cache_window_ms(),
            initial_buffer_bytes: default_initial_buffer_bytes(),
            max_buffer_bytes: default_max_buffer_bytes(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            path: default_path(),
        }
    }
}

impl CollectorConfig {
    pub fn cache_window(&self) -> Duration {
        Duration::from_millis(self.cache_window_ms)
    }
}

impl ExporterConfig {
    /// Load configuration from a YAML file + `PROMSNAP_` env overrides.
    /// Nested keys use `__` in the environment, e.g.
    /// `PROMSNAP_COLLECTOR__CACHE_WINDOW_MS=0`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: ExporterConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("PROMSNAP_").split("__"))
            .extract()?;
        Ok(config)
    }
}
