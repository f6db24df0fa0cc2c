use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub visitor: VisitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "DatabaseConfig::default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    /// Process-local store, for development and tests
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorConfig {
    pub cookie_name: String,
    /// HMAC secret for visitor cookies. A random key is used when unset.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    pub pixel_path: String,
}

impl DatabaseConfig {
    const fn default_max_connections() -> u32 {
        10
    }

    const fn default_acquire_timeout_secs() -> u64 {
        5
    }
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            cookie_name: "tally".to_string(),
            secret: None,
            pixel_path: "/vpixel.gif".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let backend_str = var("DATABASE_BACKEND").unwrap_or_else(|| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "memory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url =
            var("DATABASE_URL").unwrap_or_else(|| "sqlite://./tally.db".to_string());

        let max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v
                .parse::<u32>()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            None => DatabaseConfig::default_max_connections(),
        };

        let acquire_timeout_secs = match var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .context("DATABASE_ACQUIRE_TIMEOUT_SECS must be a positive integer")?,
            None => DatabaseConfig::default_acquire_timeout_secs(),
        };

        let api_host = var("API_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let api_port = var("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        let defaults = VisitorConfig::default();
        let cookie_name = var("VISITOR_COOKIE_NAME").unwrap_or(defaults.cookie_name);
        let secret = var("VISITOR_SECRET").filter(|s| !s.is_empty());
        let pixel_path = var("PIXEL_PATH").unwrap_or(defaults.pixel_path);

        if !pixel_path.starts_with('/') {
            anyhow::bail!("PIXEL_PATH must start with '/', got '{pixel_path}'");
        }

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
                acquire_timeout_secs,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            visitor: VisitorConfig {
                cookie_name,
                secret,
                pixel_path,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.database.url, "sqlite://./tally.db");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.acquire_timeout_secs, 5);
        assert_eq!(config.api_server.port, 8080);
        assert_eq!(config.visitor.cookie_name, "tally");
        assert_eq!(config.visitor.secret, None);
        assert_eq!(config.visitor.pixel_path, "/vpixel.gif");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_BACKEND", "Memory"),
            ("DATABASE_ACQUIRE_TIMEOUT_SECS", "2"),
            ("API_PORT", "9000"),
            ("VISITOR_SECRET", "s3cret"),
            ("PIXEL_PATH", "/p.gif"),
        ])
        .unwrap();
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        assert_eq!(config.database.acquire_timeout_secs, 2);
        assert_eq!(config.api_server.port, 9000);
        assert_eq!(config.visitor.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.visitor.pixel_path, "/p.gif");

        // Empty secret counts as unset; unknown backend falls back to sqlite
        let config = config_from(&[("VISITOR_SECRET", ""), ("DATABASE_BACKEND", "mongo")]).unwrap();
        assert_eq!(config.visitor.secret, None);
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = config_from(&[("PIXEL_PATH", "vpixel.gif")]).unwrap_err();
        assert!(err.to_string().contains("PIXEL_PATH"));

        assert!(config_from(&[("API_PORT", "not-a-port")]).is_err());
        assert!(config_from(&[("DATABASE_MAX_CONNECTIONS", "-1")]).is_err());
    }
}
