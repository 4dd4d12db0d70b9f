use std::str::FromStr;
use std::time::Duration;

use relay_tower::TowerConfig;
use reqwest::header::{HeaderName, HeaderValue};

/// Log filter used when `RUST_LOG` is unset: `info` for every crate of
/// the worker.
pub const DEFAULT_LOG_FILTER: &str =
    "relay_worker=info,relay_dispatch=info,relay_tower=info,relay_writer=info,relay_task=info";

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Remote-work API connection settings.
    pub tower: TowerConfig,
    /// Overall ceiling on waiting for the jobs of one request.
    pub request_timeout: Duration,
    /// HTTP timeout for task-state backend calls.
    pub http_timeout: Duration,
    /// Extra header sent on every task-state backend call.
    pub identity_header: Option<(HeaderName, HeaderValue)>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default |
    /// |--------------------------|---------|
    /// | `TOWER_URL`              | required|
    /// | `TOWER_TOKEN`            | unset   |
    /// | `TOWER_SKIP_VERIFY_CERT` | `false` |
    /// | `HTTP_TIMEOUT_SECS`      | `30`    |
    /// | `MONITOR_POLL_SECS`      | `5`     |
    /// | `REQUEST_TIMEOUT_SECS`   | `600`   |
    /// | `TASK_IDENTITY_HEADER`   | unset   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("TOWER_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("TOWER_URL"))?;

        let http_timeout_secs: u64 = parse_var(&lookup, "HTTP_TIMEOUT_SECS", 30)?;
        let poll_secs: u64 = parse_var(&lookup, "MONITOR_POLL_SECS", 5)?;
        let request_timeout_secs: u64 = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 600)?;

        let skip_verify_cert = match lookup("TOWER_SKIP_VERIFY_CERT") {
            None => false,
            Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::Invalid {
                var: "TOWER_SKIP_VERIFY_CERT",
                value: value.clone(),
                reason: "expected true or false".into(),
            })?,
        };

        let identity_header = lookup("TASK_IDENTITY_HEADER")
            .filter(|v| !v.trim().is_empty())
            .map(|raw| {
                relay_task::parse_header(&raw).map_err(|e| ConfigError::Invalid {
                    var: "TASK_IDENTITY_HEADER",
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let tower = TowerConfig {
            base_url,
            token: lookup("TOWER_TOKEN").filter(|v| !v.is_empty()),
            skip_verify_cert,
            timeout: Duration::from_secs(http_timeout_secs),
            poll_interval: Duration::from_secs(poll_secs),
        };

        Ok(Self {
            tower,
            request_timeout: Duration::from_secs(request_timeout_secs),
            http_timeout: Duration::from_secs(http_timeout_secs),
            identity_header,
        })
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
