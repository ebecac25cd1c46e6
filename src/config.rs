//! Process configuration read from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{GatewayError, Result};

pub const DEFAULT_API_URL: &str = "https://graph.tractive.com/4";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CACHE_CAPACITY: u64 = 1000;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;
/// Upper bound for the fallback cache TTL. moka refuses anything past 1000 years.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Which cached report a failed lookup may fall back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Any tracker's last report of the same kind.
    #[default]
    SharedSlot,
    /// Only the same tracker's last report.
    PerTracker,
}

impl FallbackPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "shared" | "shared-slot" => Some(Self::SharedSlot),
            "per-tracker" | "tracker" => Some(Self::PerTracker),
            _ => None,
        }
    }
}

/// Tractive account used for `auth/token`.
#[derive(Clone)]
pub struct AccountCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Configuration for the gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Account credentials; absent when `TRACTIVE_EMAIL`/`TRACTIVE_PASSWORD` are unset.
    pub account: Option<AccountCredentials>,
    pub api_url: String,
    /// Per upstream call
    pub timeout: Duration,
    pub fallback: FallbackPolicy,
    /// Capacity of the per-tracker fallback cache
    pub cache_capacity: u64,
    /// Lifetime of a per-tracker fallback entry
    pub cache_ttl: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            account: None,
            api_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            fallback: FallbackPolicy::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Unset keys take their defaults;
    /// set but malformed keys are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let account = match (non_empty("TRACTIVE_EMAIL"), non_empty("TRACTIVE_PASSWORD")) {
            (Some(email), Some(password)) => Some(AccountCredentials { email, password }),
            (None, None) => None,
            _ => {
                return Err(GatewayError::Config(
                    "TRACTIVE_EMAIL and TRACTIVE_PASSWORD must be set together".to_string(),
                ));
            }
        };

        let api_url = non_empty("TRACTIVE_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);

        let timeout = match non_empty("TRACTIVE_TIMEOUT_SECS") {
            Some(v) => parse_secs("TRACTIVE_TIMEOUT_SECS", &v, MAX_TIMEOUT_SECS)?,
            None => defaults.timeout,
        };

        let fallback = match non_empty("TRACTIVE_FALLBACK") {
            Some(v) => FallbackPolicy::parse(&v).ok_or_else(|| {
                GatewayError::Config(format!(
                    "TRACTIVE_FALLBACK must be 'shared' or 'per-tracker', got '{v}'"
                ))
            })?,
            None => defaults.fallback,
        };

        let cache_capacity = match non_empty("TRACTIVE_CACHE_CAPACITY") {
            Some(v) => parse_number("TRACTIVE_CACHE_CAPACITY", &v)?,
            None => defaults.cache_capacity,
        };

        let cache_ttl = match non_empty("TRACTIVE_CACHE_TTL_SECS") {
            Some(v) => parse_secs("TRACTIVE_CACHE_TTL_SECS", &v, MAX_CACHE_TTL.as_secs())?,
            None => defaults.cache_ttl,
        };

        Ok(Self {
            account,
            api_url,
            timeout,
            fallback,
            cache_capacity,
            cache_ttl,
        })
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| GatewayError::Config(format!("{key} must be a number, got '{value}'")))
}

/// Whole seconds in `1..=max`.
fn parse_secs(key: &str, value: &str, max: u64) -> Result<Duration> {
    let secs = parse_number(key, value)?;
    if secs == 0 || secs > max {
        return Err(GatewayError::Config(format!(
            "{key} must be between 1 and {max} seconds, got '{value}'"
        )));
    }
    Ok(Duration::from_secs(secs))
}
