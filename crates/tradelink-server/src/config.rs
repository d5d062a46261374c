use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use tradelink_gateway::RelayScope;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TRADELINK_JWT_SECRET is unset or still a placeholder")]
    WeakSecret,
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl_hours: i64,
    pub relay_scope: RelayScope,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so parsing can be tested without
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("TRADELINK_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::WeakSecret);
        }

        let db_path: PathBuf = lookup("TRADELINK_DB_PATH")
            .unwrap_or_else(|| "tradelink.db".into())
            .into();

        let host = lookup("TRADELINK_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("TRADELINK_PORT").unwrap_or_else(|| "5000".into());
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "TRADELINK_HOST/TRADELINK_PORT",
                reason: e.to_string(),
            })?;

        let token_ttl_hours = match lookup("TRADELINK_TOKEN_TTL_HOURS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "TRADELINK_TOKEN_TTL_HOURS",
                    reason: format!("'{}' is not a positive number of hours", raw),
                })?,
            None => 24,
        };

        let relay_scope = match lookup("TRADELINK_RELAY_SCOPE") {
            Some(raw) => raw.parse::<RelayScope>().map_err(|reason| ConfigError::Invalid {
                name: "TRADELINK_RELAY_SCOPE",
                reason,
            })?,
            None => RelayScope::default(),
        };

        let allowed_origins = lookup("TRADELINK_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            token_ttl_hours,
            relay_scope,
            allowed_origins,
        })
    }
}
