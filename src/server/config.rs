// src/server/config.rs

//! Bootstrap configuration.
//!
//! Unlike the teacher's `RemiConfig` — which owns upstream/conversion/
//! federation sections for a CDN proxy — revkeep only needs enough
//! configuration to find its database and storage roots and bind a
//! socket. Everything else (lock timeouts, retention limits, JWT
//! expiration) is a `Setting` row in the metadata index, adjustable at
//! runtime through the admin control plane without a restart.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_db_path() -> String {
    "/var/lib/revkeep/revkeep.db".to_string()
}

fn default_maintenance_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevkeepConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// JWT signing secret. Loading falls back to the `REVKEEP_JWT_SECRET`
    /// environment variable so it never has to live in a checked-in file.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

impl Default for RevkeepConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            jwt_secret: None,
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

impl RevkeepConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let mut config: RevkeepConfig = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw).map_err(|e| Error::Validation(format!("invalid config at {path:?}: {e}")))?
        } else {
            RevkeepConfig::default()
        };

        if let Ok(addr) = std::env::var("REVKEEP_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(db_path) = std::env::var("REVKEEP_DB_PATH") {
            config.db_path = db_path;
        }
        if let Ok(secret) = std::env::var("REVKEEP_JWT_SECRET") {
            config.jwt_secret = Some(secret);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.db_path.trim().is_empty() {
            return Err(Error::Validation("db_path must not be empty".into()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|_| Error::Validation(format!("invalid bind_addr '{}'", self.bind_addr)))
    }

    pub fn db_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.db_path)
    }

    /// JWT secret, failing loudly at startup rather than signing tokens
    /// with a predictable default.
    pub fn jwt_secret_bytes(&self) -> Result<Vec<u8>> {
        self.jwt_secret
            .clone()
            .map(|s| s.into_bytes())
            .ok_or_else(|| Error::Validation("jwt_secret is not configured (set REVKEEP_JWT_SECRET)".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_valid_socket_addr() {
        let config = RevkeepConfig::default();
        assert!(config.socket_addr().is_ok());
    }

    #[test]
    fn invalid_bind_addr_fails_validation() {
        let mut config = RevkeepConfig::default();
        config.bind_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = RevkeepConfig::load(&path).unwrap();
        assert_eq!(config.bind_addr, default_bind_addr());
    }

    #[test]
    fn load_parses_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revkeep.toml");
        std::fs::write(&path, "bind_addr = \"127.0.0.1:9090\"\ndb_path = \"/tmp/revkeep.db\"\n").unwrap();
        let config = RevkeepConfig::load(&path).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.db_path, "/tmp/revkeep.db");
    }
}
