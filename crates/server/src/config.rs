use coinledger_cache::{DEFAULT_LIMIT, DEFAULT_TTL_MINUTES};
use coinledger_core::password::DEFAULT_COST;
use coinledger_core::{AssetSource, SourceError};
use coinledger_data::{CoinApiConfig, CoinApiSource, CsvAssetSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("csv source selected but no csv_path configured")]
    MissingCsvPath,
    #[error("Failed to set up asset source: {0}")]
    Source(#[from] SourceError),
}

/// Top-level server configuration. Every field has a default, so an empty
/// document is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub store: StoreConfig,
    pub source: SourceConfig,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`, or use the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7777,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Negative values are accepted here and clamped by the cache itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_minutes: i64,
    pub limit: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: DEFAULT_TTL_MINUTES as i64,
            limit: DEFAULT_LIMIT as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// bcrypt work factor for new password hashes.
    pub bcrypt_cost: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("user-database.txt"),
            bcrypt_cost: DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Coinapi,
    Csv,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub csv_path: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let coinapi = CoinApiConfig::default();
        Self {
            kind: SourceKind::default(),
            base_url: coinapi.base_url,
            api_key: coinapi.api_key,
            timeout_secs: coinapi.timeout_secs,
            csv_path: None,
        }
    }
}

impl SourceConfig {
    pub fn coinapi(&self) -> CoinApiConfig {
        CoinApiConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            timeout_secs: self.timeout_secs,
        }
    }

    /// Build the configured catalog source.
    pub fn build(&self) -> Result<Box<dyn AssetSource>, ConfigError> {
        match self.kind {
            SourceKind::Coinapi => Ok(Box::new(CoinApiSource::new(self.coinapi())?)),
            SourceKind::Csv => {
                let path = self.csv_path.clone().ok_or(ConfigError::MissingCsvPath)?;
                Ok(Box::new(CsvAssetSource::new(path)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.bind_addr(), "127.0.0.1:7777");
        assert_eq!(config.cache.ttl_minutes, 30);
        assert_eq!(config.cache.limit, 150);
        assert_eq!(config.store.path, PathBuf::from("user-database.txt"));
        assert_eq!(config.source.kind, SourceKind::Coinapi);
        assert_eq!(config.source.base_url, "https://rest.coinapi.io");
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_toml_str(
            r#"
            [server]
            port = 9000

            [cache]
            ttl_minutes = -1

            [source]
            kind = "csv"
            csv_path = "assets.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.cache.ttl_minutes, -1);
        assert_eq!(config.cache.limit, 150);
        assert_eq!(config.source.kind, SourceKind::Csv);
        assert!(config.source.build().is_ok());
    }

    #[test]
    fn test_csv_source_needs_path() {
        let source = SourceConfig {
            kind: SourceKind::Csv,
            ..SourceConfig::default()
        };
        assert!(matches!(source.build(), Err(ConfigError::MissingCsvPath)));
    }

    #[test]
    fn test_bad_document() {
        assert!(matches!(
            Config::from_toml_str("[server]\nport = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/coinledger.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(Config::load(None).is_ok());
    }
}
