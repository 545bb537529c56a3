use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// How long to wait for a pooled connection before giving up. Bounds
    /// queue time under concurrent sessions, independent of how long one
    /// query may run.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_query_timeout_secs() -> u64 {
    10
}
fn default_acquire_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// `"anthropic"` or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            max_tokens: 1024,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_model_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    /// Hard ceiling on result rows; every executed query is clamped to it.
    #[serde(default = "default_row_limit")]
    pub row_limit: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            row_limit: default_row_limit(),
        }
    }
}

fn default_row_limit() -> i64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7410".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.query.row_limit < 1 {
        anyhow::bail!("query.row_limit must be >= 1");
    }

    if config.db.max_connections < 1 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    if config.db.query_timeout_secs == 0 {
        anyhow::bail!("db.query_timeout_secs must be > 0");
    }

    if config.db.acquire_timeout_secs == 0 {
        anyhow::bail!("db.acquire_timeout_secs must be > 0");
    }

    if config.model.timeout_secs == 0 {
        anyhow::bail!("model.timeout_secs must be > 0");
    }

    if config.model.is_enabled() && config.model.model.is_none() {
        anyhow::bail!(
            "model.model must be specified when provider is '{}'",
            config.model.provider
        );
    }

    match config.model.provider.as_str() {
        "disabled" | "anthropic" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled or anthropic.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("gpr.toml");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let (_tmp, path) = write_config("[db]\npath = \"./data/gpr.db\"\n");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.db.max_connections, 5);
        assert_eq!(cfg.db.query_timeout_secs, 10);
        assert_eq!(cfg.db.acquire_timeout_secs, 5);
        assert_eq!(cfg.query.row_limit, 200);
        assert!(!cfg.model.is_enabled());
    }

    #[test]
    fn acquire_timeout_is_independent_of_query_timeout() {
        let (_tmp, path) = write_config(
            "[db]\npath = \"./data/gpr.db\"\nquery_timeout_secs = 30\nacquire_timeout_secs = 2\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.db.query_timeout_secs, 30);
        assert_eq!(cfg.db.acquire_timeout_secs, 2);
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        for line in ["query_timeout_secs = 0", "acquire_timeout_secs = 0"] {
            let (_tmp, path) =
                write_config(&format!("[db]\npath = \"./data/gpr.db\"\n{}\n", line));
            assert!(load_config(&path).is_err(), "{} should be rejected", line);
        }
    }

    #[test]
    fn enabled_provider_requires_model_name() {
        let (_tmp, path) = write_config(
            "[db]\npath = \"./data/gpr.db\"\n\n[model]\nprovider = \"anthropic\"\n",
        );
        assert!(load_config(&path).is_err());
    }
}
