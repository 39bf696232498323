//! Configuration manager for rotoken.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_PORT: u16 = 8888;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    port: Option<u16>,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Option<Token>,
    /// Related to refresh token storage.
    #[serde(skip_serializing)]
    pub cache: Option<Cache>,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Json Web Token configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    pub key_id: Option<String>,
    /// Derived from `private_key_pem` when empty.
    #[serde(default)]
    pub public_key_pem: String,
    pub private_key_pem: String,
    #[serde(default)]
    pub audiences: Vec<String>,
    /// Access token lifetime, in seconds.
    #[serde(default = "default_access_ttl")]
    pub access_ttl: u64,
    /// Refresh token lifetime, in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl: u64,
    /// Tolerated clock skew, in seconds.
    pub leeway: Option<u64>,
}

fn default_access_ttl() -> u64 {
    crate::user::DEFAULT_ACCESS_TTL.num_seconds() as u64
}

fn default_refresh_ttl() -> u64 {
    crate::refresh::DEFAULT_TTL.num_seconds() as u64
}

/// Longest accepted token lifetime.
pub const MAX_TTL: TimeDelta = TimeDelta::days(365 * 100);

/// Lifetime out of a number of seconds, if positive and at most [`MAX_TTL`].
fn lifetime(seconds: u64) -> Option<TimeDelta> {
    i64::try_from(seconds)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .filter(|ttl| *ttl > TimeDelta::zero() && *ttl <= MAX_TTL)
}

impl Token {
    /// Access token lifetime. `None` when out of range.
    pub fn access_ttl(&self) -> Option<TimeDelta> {
        lifetime(self.access_ttl)
    }

    /// Refresh token lifetime. `None` when out of range.
    pub fn refresh_ttl(&self) -> Option<TimeDelta> {
        lifetime(self.refresh_ttl)
    }
}

/// Refresh token storage configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Cache {
    /// Redis URL. Tokens are kept in memory when missing.
    pub address: Option<String>,
    /// Key prefix.
    pub prefix: Option<String>,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Port the server listens on.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(&file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(mut config) => {
                    config.version = VERSION.to_owned();
                    config.path = file_path;
                    Arc::new(config)
                },
                Err(err) => Arc::new(self.error(err)),
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "cannot read `config.yaml` file");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let config: Configuration = serde_yaml::from_str(
            r#"
name: rotoken
port: 9000
token:
  private_key_pem: "pem"
  audiences: ["api.example.com"]
cache:
  prefix: "rt"
"#,
        )
        .unwrap();

        assert_eq!(config.port(), 9000);
        let token = config.token.unwrap();
        assert!(token.public_key_pem.is_empty());
        assert_eq!(token.access_ttl(), Some(TimeDelta::minutes(15)));
        assert_eq!(token.refresh_ttl(), Some(TimeDelta::days(30)));
        assert_eq!(token.leeway, None);

        let cache = config.cache.unwrap();
        assert_eq!(cache.address, None);
        assert_eq!(cache.prefix.as_deref(), Some("rt"));
        assert_eq!(config.argon2, None);
    }

    #[test]
    fn test_ttl_out_of_range() {
        let token = |refresh_ttl: u64| Token {
            key_id: None,
            public_key_pem: String::new(),
            private_key_pem: String::new(),
            audiences: Vec::new(),
            access_ttl: 900,
            refresh_ttl,
            leeway: None,
        };

        assert_eq!(token(u64::MAX).refresh_ttl(), None);
        assert_eq!(token(10_000_000_000_000_000).refresh_ttl(), None);
        assert_eq!(token(i64::MAX as u64).refresh_ttl(), None);
        assert_eq!(token(0).refresh_ttl(), None);
        assert_eq!(
            token(MAX_TTL.num_seconds() as u64).refresh_ttl(),
            Some(MAX_TTL)
        );
        assert_eq!(token(MAX_TTL.num_seconds() as u64 + 1).refresh_ttl(), None);
    }

    #[test]
    fn test_missing_file() {
        let config = Configuration::default()
            .path(PathBuf::from("/nonexistent/config.yaml"))
            .read();

        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.version(), VERSION);
        assert!(config.token.is_none());
    }
}
