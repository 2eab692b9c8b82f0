//! Environment-driven settings for the binaries.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3002";
pub const DEFAULT_DATA_DIR: &str = "workflows";
pub const DEFAULT_LOG_FILTER: &str = "info,werkbank=debug";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid socket address: {value}")]
    InvalidBind { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    pub api_url: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl EditorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup("WERKBANK_API_URL") {
            let url = url.trim();
            if url.is_empty() {
                return Err(ConfigError::Empty {
                    var: "WERKBANK_API_URL",
                });
            }
            config.api_url = url.to_string();
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    /// YAML list of agent definitions served by `GET /api/agents`.
    pub agents_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3002)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            agents_file: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("WERKBANK_BIND") {
            config.bind = bind.trim().parse().map_err(|_| ConfigError::InvalidBind {
                var: "WERKBANK_BIND",
                value: bind.clone(),
            })?;
        }

        if let Some(dir) = lookup("WERKBANK_DATA_DIR") {
            if dir.trim().is_empty() {
                return Err(ConfigError::Empty {
                    var: "WERKBANK_DATA_DIR",
                });
            }
            config.data_dir = PathBuf::from(dir.trim());
        }

        config.agents_file = lookup("WERKBANK_AGENTS_FILE")
            .filter(|path| !path.trim().is_empty())
            .map(|path| PathBuf::from(path.trim()));

        Ok(config)
    }
}

fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn editor_defaults_and_override() {
        let config = EditorConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);

        let config =
            EditorConfig::from_lookup(env(&[("WERKBANK_API_URL", " http://api:8080 ")])).unwrap();
        assert_eq!(config.api_url, "http://api:8080");

        assert!(matches!(
            EditorConfig::from_lookup(env(&[("WERKBANK_API_URL", "  ")])),
            Err(ConfigError::Empty { .. })
        ));
    }

    #[test]
    fn server_reads_all_variables() {
        let config = ServerConfig::from_lookup(env(&[
            ("WERKBANK_BIND", "127.0.0.1:4000"),
            ("WERKBANK_DATA_DIR", "/tmp/flows"),
            ("WERKBANK_AGENTS_FILE", "agents.yaml"),
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 4000);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/flows"));
        assert_eq!(config.agents_file, Some(PathBuf::from("agents.yaml")));
    }

    #[test]
    fn server_rejects_bad_bind_address() {
        let err = ServerConfig::from_lookup(env(&[("WERKBANK_BIND", "nowhere")])).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
        assert_eq!(ServerConfig::from_lookup(env(&[])).unwrap(), ServerConfig::default());
    }
}
