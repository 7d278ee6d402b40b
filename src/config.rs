use {
    crate::domain::webhook::PendingPolicy,
    std::{env, net::SocketAddr},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Process configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub webhook_secret: String,
    pub bind_addr: SocketAddr,
    pub provider_name: String,
    pub pending_policy: PendingPolicy,
    pub effect_max_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an injectable source, for tests.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            get(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let pending_policy = match get("PENDING_STATUS_POLICY") {
            Some(v) => v.parse().map_err(|e: crate::domain::error::EscrowError| {
                ConfigError::Invalid {
                    name: "PENDING_STATUS_POLICY",
                    reason: e.to_string(),
                }
            })?,
            None => PendingPolicy::default(),
        };

        let effect_max_attempts = match get("EFFECT_MAX_ATTEMPTS") {
            Some(v) => v
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "EFFECT_MAX_ATTEMPTS",
                    reason: format!("expected a positive integer, got {v:?}"),
                })?,
            None => 5,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            webhook_secret: required("WEBHOOK_SECRET")?,
            bind_addr,
            provider_name: get("PROVIDER_NAME").unwrap_or_else(|| "payfast".to_string()),
            pending_policy,
            effect_max_attempts,
        })
    }
}
