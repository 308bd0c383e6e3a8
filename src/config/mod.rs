use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::fetch::{DEFAULT_REDIRECT_LIMIT, DEFAULT_TIMEOUT, USER_AGENT};

const DEFAULT_ADDR: &str = "0.0.0.0:80";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    pub redirect_limit: usize,
    /// Lets the fetcher reach loopback and private networks.
    pub allow_private_targets: bool,
    pub is_production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let fetch_timeout = match var("FETCH_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse("FETCH_TIMEOUT_SECS", &value)?),
            None => DEFAULT_TIMEOUT,
        };
        let redirect_limit = match var("FETCH_REDIRECT_LIMIT") {
            Some(value) => parse("FETCH_REDIRECT_LIMIT", &value)?,
            None => DEFAULT_REDIRECT_LIMIT,
        };
        let allow_private_targets = match var("ALLOW_PRIVATE_TARGETS") {
            Some(value) => parse_bool("ALLOW_PRIVATE_TARGETS", &value)?,
            None => false,
        };

        Ok(Config {
            addr: normalize_addr(&var("ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string())),
            fetch_timeout,
            user_agent: var("FETCH_USER_AGENT").unwrap_or_else(|| USER_AGENT.to_string()),
            redirect_limit,
            allow_private_targets,
            is_production: var("APP_ENV").as_deref() == Some("production"),
        })
    }
}

/// A bare `:PORT` binds every interface.
fn normalize_addr(addr: &str) -> String {
    let addr = addr.trim();
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}
