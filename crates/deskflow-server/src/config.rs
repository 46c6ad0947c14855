//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use deskflow_shared::constants::{
    ACCESS_TOKEN_TTL_SECS, APP_NAME, DEFAULT_HTTP_PORT, MAX_DOCUMENT_SIZE, REFRESH_TOKEN_TTL_SECS,
};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./deskflow.db`
    pub database_path: PathBuf,

    /// Directory where uploaded documents are stored.
    /// Env: `DOCUMENT_STORAGE_PATH`
    /// Default: `./uploads`
    pub document_storage_path: PathBuf,

    /// Maximum size of a single uploaded document, in bytes.
    /// Env: `MAX_DOCUMENT_SIZE`
    pub max_document_size: usize,

    /// Ed25519 seed used to sign credentials (hex-encoded, 64 chars).
    /// Env: `CREDENTIAL_SIGNING_KEY`
    /// Default: none, an ephemeral key is generated at startup.
    pub signing_seed: Option<[u8; 32]>,

    /// Env: `ACCESS_TOKEN_TTL_SECS`
    pub access_token_ttl: Duration,

    /// Env: `REFRESH_TOKEN_TTL_SECS`
    pub refresh_token_ttl: Duration,

    /// Per-request deadline.
    /// Env: `REQUEST_TIMEOUT_SECS`
    /// Default: 30 s
    pub request_timeout: Duration,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    pub instance_name: String,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("document_storage_path", &self.document_storage_path)
            .field("max_document_size", &self.max_document_size)
            .field("signing_seed", &self.signing_seed.map(|_| "<redacted>"))
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("request_timeout", &self.request_timeout)
            .field("instance_name", &self.instance_name)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./deskflow.db"),
            document_storage_path: PathBuf::from("./uploads"),
            max_document_size: MAX_DOCUMENT_SIZE,
            signing_seed: None,
            access_token_ttl: Duration::from_secs(ACCESS_TOKEN_TTL_SECS.unsigned_abs()),
            refresh_token_ttl: Duration::from_secs(REFRESH_TOKEN_TTL_SECS.unsigned_abs()),
            request_timeout: Duration::from_secs(30),
            instance_name: APP_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parsed::<SocketAddr>(&lookup, "HTTP_ADDR") {
            config.http_addr = addr;
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("DOCUMENT_STORAGE_PATH") {
            config.document_storage_path = PathBuf::from(path);
        }

        if let Some(size) = parsed::<usize>(&lookup, "MAX_DOCUMENT_SIZE") {
            config.max_document_size = size;
        }

        if let Some(hex_seed) = lookup("CREDENTIAL_SIGNING_KEY") {
            match parse_hex_seed(&hex_seed) {
                Ok(seed) => config.signing_seed = Some(seed),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Invalid CREDENTIAL_SIGNING_KEY, using an ephemeral key"
                    );
                }
            }
        }

        if let Some(secs) = parsed::<u64>(&lookup, "ACCESS_TOKEN_TTL_SECS") {
            config.access_token_ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = parsed::<u64>(&lookup, "REFRESH_TOKEN_TTL_SECS") {
            config.refresh_token_ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = parsed::<u64>(&lookup, "REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

/// Read and parse `key`; an unparsable value is logged and ignored.
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

/// Parse a 64-character hex string into a 32-byte seed.
fn parse_hex_seed(hex: &str) -> Result<[u8; 32], String> {
    let hex = hex.trim();
    if hex.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex.len()));
    }

    let bytes = hex::decode(hex).map_err(|e| format!("invalid hex: {e}"))?;
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes);
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.max_document_size, 20 * 1024 * 1024);
        assert_eq!(config.access_token_ttl, Duration::from_secs(3600));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(3 * 3600));
        assert!(config.signing_seed.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let seed = "ab".repeat(32);
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/var/lib/deskflow/db.sqlite"),
            ("CREDENTIAL_SIGNING_KEY", seed.as_str()),
            ("REQUEST_TIMEOUT_SECS", "5"),
        ]);

        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/var/lib/deskflow/db.sqlite"));
        assert_eq!(config.signing_seed, Some([0xab; 32]));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("MAX_DOCUMENT_SIZE", "lots"),
            ("CREDENTIAL_SIGNING_KEY", "abcd"),
        ]);

        assert_eq!(config.http_addr, ServerConfig::default().http_addr);
        assert_eq!(config.max_document_size, MAX_DOCUMENT_SIZE);
        assert!(config.signing_seed.is_none());
    }

    #[test]
    fn test_parse_hex_seed_wrong_length() {
        assert!(parse_hex_seed("abcd").is_err());
        assert!(parse_hex_seed(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_debug_redacts_seed() {
        let seed = "11".repeat(32);
        let config = from_pairs(&[("CREDENTIAL_SIGNING_KEY", seed.as_str())]);
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("17, 17"));
    }
}
