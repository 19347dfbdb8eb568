use std::env;

use anyhow::{anyhow, Result};

use crate::utils::non_blank;

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://trading-api.kalshi.com/trade-api/v2";

fn get_env(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        None => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
    }
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<u64>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_u16(key: &str, default: u16) -> Result<u16> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<u16>()
            .map_err(|e| anyhow!("{key} invalid port: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone)]
pub struct Settings {
    // Listener
    pub host: String,
    pub port: u16,

    // Upstream
    pub upstream_base_url: String,
    pub upstream_timeout_secs: u64,

    /// Copy the caller's `Authorization` header onto market requests.
    pub forward_authorization: bool,

    /// Served under `/static` when set.
    pub static_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            upstream_timeout_secs: 30,
            forward_authorization: false,
            static_dir: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let upstream_base_url = get_env_string("UPSTREAM_BASE_URL", &defaults.upstream_base_url)
            .trim_end_matches('/')
            .to_string();

        let s = Self {
            host: get_env_string("GATEWAY_HOST", &defaults.host),
            port: get_env_u16("GATEWAY_PORT", defaults.port)?,
            upstream_base_url,
            upstream_timeout_secs: get_env_u64(
                "UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout_secs,
            )?,
            forward_authorization: get_env_bool(
                "FORWARD_AUTHORIZATION",
                defaults.forward_authorization,
            ),
            static_dir: get_env("STATIC_DIR"),
        };

        s.validate()?;
        Ok(s)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.upstream_timeout_secs < 1 {
            return Err(anyhow!(
                "UPSTREAM_TIMEOUT_SECS must be >= 1 (got {})",
                self.upstream_timeout_secs
            ));
        }
        let url = url::Url::parse(&self.upstream_base_url).map_err(|e| {
            anyhow!(
                "UPSTREAM_BASE_URL invalid ({}): {e}",
                self.upstream_base_url
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "UPSTREAM_BASE_URL must be http(s) (got {})",
                self.upstream_base_url
            ));
        }
        if url.cannot_be_a_base() {
            return Err(anyhow!(
                "UPSTREAM_BASE_URL cannot be used as a base (got {})",
                self.upstream_base_url
            ));
        }
        Ok(())
    }
}
