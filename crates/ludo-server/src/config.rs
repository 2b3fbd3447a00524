//! Server configuration from the environment.

use crate::orchestrator::OrchestratorConfig;
use std::net::{AddrParseError, SocketAddr};
use thiserror::Error;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid SERVER_ADDR '{value}': {source}")]
    InvalidAddr {
        value: String,
        source: AddrParseError,
    },

    #[error("invalid boolean for {var}: '{value}'")]
    InvalidBool { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `SERVER_ADDR`
    pub addr: SocketAddr,
    /// `RUST_LOG`
    pub log_filter: String,
    pub orchestrator: OrchestratorConfig,
}

impl ServerConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let addr_value = lookup("SERVER_ADDR").unwrap_or_else(|| DEFAULT_ADDR.into());
        let addr: SocketAddr = addr_value
            .parse()
            .map_err(|source| ConfigError::InvalidAddr {
                value: addr_value.clone(),
                source,
            })?;

        let log_filter = lookup("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.into());

        let allow_dice_override = match lookup("LUDO_ALLOW_DICE_OVERRIDE") {
            Some(value) => parse_bool("LUDO_ALLOW_DICE_OVERRIDE", &value)?,
            None => false,
        };

        Ok(Self {
            addr,
            log_filter,
            orchestrator: OrchestratorConfig {
                allow_dice_override,
            },
        })
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}
