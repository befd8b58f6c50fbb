/*
 * Responsibility
 * - Load process configuration once at startup (.env + environment variables)
 * - Validate it: a missing authority root key / API id fails startup, never a request
 * - Everything here is read-only after `from_env()` returns
 */
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_UNKEY_BASE_URL: &str = "https://api.unkey.dev";
const DEFAULT_UNKEY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_UNKEY_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or("development").to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Settings for the remote key authority (Unkey).
#[derive(Clone)]
pub struct UnkeyConfig {
    pub root_key: String,
    // Verification namespace every key is checked against.
    pub api_id: String,
    pub base_url: Url,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl fmt::Debug for UnkeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the root key
        f.debug_struct("UnkeyConfig")
            .field("root_key", &"<redacted>")
            .field("api_id", &self.api_id)
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub unkey: UnkeyConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a `Config` from an arbitrary key lookup.
    ///
    /// `from_env` is a thin wrapper over this; tests pass a map instead of
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let app_env = AppEnv::parse(lookup("APP_ENV").as_deref());

        let root_key = required(&lookup, "UNKEY_ROOT_KEY")?;
        let api_id = required(&lookup, "UNKEY_API_ID")?;

        let base_url = lookup("UNKEY_BASE_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UNKEY_BASE_URL.to_string());
        let base_url =
            Url::parse(base_url.trim()).map_err(|_| ConfigError::Invalid("UNKEY_BASE_URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid("UNKEY_BASE_URL"));
        }

        let timeout_ms = parse_or(&lookup, "UNKEY_TIMEOUT_MS", DEFAULT_UNKEY_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid("UNKEY_TIMEOUT_MS"));
        }

        let max_retries = parse_or(&lookup, "UNKEY_MAX_RETRIES", DEFAULT_UNKEY_MAX_RETRIES)?;

        Ok(Self {
            addr,
            app_env,
            unkey: UnkeyConfig {
                root_key,
                api_id,
                base_url,
                timeout: Duration::from_millis(timeout_ms),
                max_retries,
            },
        })
    }
}

// Blank counts as missing: an empty root key would only fail later, per request.
fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid(key))
        }
        _ => Ok(default),
    }
}
