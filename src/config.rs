use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub server_url: Arc<str>,
    pub poll_interval_ms: u64,
    pub http_timeout_secs: u64,
    pub cache_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    bind_addr: Option<SocketAddr>,
    #[serde(default)]
    server_url: Option<String>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    http_timeout_secs: Option<u64>,
    #[serde(default)]
    cache_path: Option<PathBuf>,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        let defaults = Config::default();
        Self {
            bind_addr: raw.bind_addr.unwrap_or(defaults.bind_addr),
            server_url: raw
                .server_url
                .map(Arc::from)
                .unwrap_or(defaults.server_url),
            poll_interval_ms: raw.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
            http_timeout_secs: raw.http_timeout_secs.unwrap_or(defaults.http_timeout_secs),
            cache_path: raw.cache_path.unwrap_or(defaults.cache_path),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            server_url: Arc::from("http://127.0.0.1:3000"),
            poll_interval_ms: 2000,
            http_timeout_secs: 30,
            cache_path: default_data_dir().join("webhooks.json"),
        }
    }
}

impl Config {
    /// File given explicitly, else the per-user config file, else defaults;
    /// environment variables override whichever was used.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut cfg = if let Some(path) = path {
            read_file(&path)?
        } else {
            let default_path = default_config_path();
            if default_path.exists() {
                read_file(&default_path)?
            } else {
                Self::default()
            }
        };

        if let Ok(v) = env::var("HOOKWATCH_BIND") {
            cfg.bind_addr = v
                .parse()
                .with_context(|| format!("HOOKWATCH_BIND is not a socket address: {v}"))?;
        }
        if let Ok(v) = env::var("HOOKWATCH_SERVER_URL") {
            cfg.server_url = v.into();
        }
        maybe_env_u64(&mut cfg.poll_interval_ms, "POLL_INTERVAL_MS");
        maybe_env_u64(&mut cfg.http_timeout_secs, "HTTP_TIMEOUT_SECS");
        if let Ok(p) = env::var("CACHE_PATH") {
            cfg.cache_path = PathBuf::from(p);
        }
        validate(&cfg)?;
        Ok(cfg)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn read_file(path: &Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let parsed = toml::from_str::<RawConfig>(&raw)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(Config::from(parsed))
}

pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".hookwatch/config.toml"))
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".hookwatch"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "hookwatch", "hookwatch")
}

pub fn validate(cfg: &Config) -> Result<()> {
    if cfg.server_url.trim().is_empty() {
        anyhow::bail!("server_url is required (set via HOOKWATCH_SERVER_URL or config)");
    }
    if cfg.poll_interval_ms == 0 {
        anyhow::bail!("poll_interval_ms must be greater than zero");
    }
    if cfg.http_timeout_secs == 0 {
        anyhow::bail!("http_timeout_secs must be greater than zero");
    }
    if cfg.cache_path.as_os_str().is_empty() {
        anyhow::bail!("cache_path must not be empty");
    }
    Ok(())
}

fn maybe_env_u64(val: &mut u64, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<u64>() {
            *val = n;
        }
    }
}
