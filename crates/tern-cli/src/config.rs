//! Configuration file parsing for tern.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file names, in lookup order.
const CONFIG_NAMES: &[&str] = &["tern.toml", ".ternrc.toml"];

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    /// `tern serve` defaults
    #[serde(default)]
    pub server: ServerConfig,

    /// `tern fetch` defaults
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub fs: FsConfig,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Default tracing directive; `RUST_LOG` still applies on top.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Prepended to every echoed request body.
    #[serde(default = "default_echo_prefix")]
    pub echo_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            echo_prefix: default_echo_prefix(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request deadline; 0 disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FsConfig {
    /// Base delay between `tern rm` retries.
    #[serde(default = "default_rm_retry_delay_ms")]
    pub rm_retry_delay_ms: u64,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            rm_retry_delay_ms: default_rm_retry_delay_ms(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_echo_prefix() -> String {
    "echo:".to_string()
}

fn default_user_agent() -> String {
    concat!("tern/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_rm_retry_delay_ms() -> u64 {
    100
}

/// Load configuration from `path`, or from the nearest config file above
/// the current directory. No file means defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config_path = match path {
        Some(path) if !path.exists() => {
            anyhow::bail!("Config file {} does not exist", path.display())
        }
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| find_config_file(&cwd)),
    };

    let Some(path) = config_path else {
        return Ok(Config::default());
    };
    let content = std::fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
    tracing::debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Search `start` and its ancestors for a config file.
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }
    None
}
