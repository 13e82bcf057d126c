//! Authentication session configuration.
//!
//! Defaults can be overlaid from environment variables:
//!
//! | Variable                    | Field               | Example     |
//! |-----------------------------|---------------------|-------------|
//! | `PAYGATE_USER_ID`           | `user_id`           | `alice`     |
//! | `PAYGATE_SIGNING_ALGORITHM` | `signing_algorithm` | `ed25519`   |
//! | `PAYGATE_RECENCY_WINDOW`    | `recency_window`    | `5s`, `2m`  |
//! | `PAYGATE_PREFER_BIOMETRIC`  | `prefer_biometric`  | `false`     |

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::identity::SigningAlgorithm;
use crate::keystore::DEFAULT_RECENCY_WINDOW;

pub const ENV_USER_ID: &str = "PAYGATE_USER_ID";
pub const ENV_SIGNING_ALGORITHM: &str = "PAYGATE_SIGNING_ALGORITHM";
pub const ENV_RECENCY_WINDOW: &str = "PAYGATE_RECENCY_WINDOW";
pub const ENV_PREFER_BIOMETRIC: &str = "PAYGATE_PREFER_BIOMETRIC";

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable was set to something that does not parse.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Settings for one [`AuthController`](crate::controller::AuthController).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// The single principal of this device session.
    pub user_id: String,
    /// Alias of the presence-per-use signing key.
    pub signing_alias: String,
    /// Alias of the recency-window symmetric key.
    pub recency_alias: String,
    pub signing_algorithm: SigningAlgorithm,
    #[serde(deserialize_with = "deserialize_duration")]
    pub recency_window: Duration,
    /// The user's choice to authenticate with biometrics when available.
    pub prefer_biometric: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_id: "user".to_string(),
            signing_alias: "paygate.purchase.signing".to_string(),
            recency_alias: "paygate.purchase.recency".to_string(),
            signing_algorithm: SigningAlgorithm::default(),
            recency_window: DEFAULT_RECENCY_WINDOW,
            prefer_biometric: true,
        }
    }
}

impl AuthConfig {
    /// Defaults overlaid with the `PAYGATE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a malformed variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Overlay values produced by `lookup` onto `self`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a malformed value.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user_id) = lookup(ENV_USER_ID) {
            if user_id.trim().is_empty() {
                return Err(invalid(ENV_USER_ID, user_id));
            }
            self.user_id = user_id;
        }
        if let Some(value) = lookup(ENV_SIGNING_ALGORITHM) {
            self.signing_algorithm = value
                .parse()
                .map_err(|_| invalid(ENV_SIGNING_ALGORITHM, value))?;
        }
        if let Some(value) = lookup(ENV_RECENCY_WINDOW) {
            self.recency_window =
                parse_duration(&value).ok_or_else(|| invalid(ENV_RECENCY_WINDOW, value))?;
        }
        if let Some(value) = lookup(ENV_PREFER_BIOMETRIC) {
            self.prefer_biometric =
                parse_bool(&value).ok_or_else(|| invalid(ENV_PREFER_BIOMETRIC, value))?;
        }
        Ok(self)
    }
}

fn invalid(name: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue { name, value }
}

/// Parse a duration like `"5s"`, `"1500ms"`, `"2m"`, `"1h"` or a bare number
/// of seconds. Zero is rejected.
#[must_use]
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    let (num_str, millis_per_unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        // Assume seconds if no unit
        (s, 1_000)
    };

    let num: u64 = num_str.trim().parse().ok()?;
    let millis = num.checked_mul(millis_per_unit)?;
    (millis > 0).then(|| Duration::from_millis(millis))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {raw:?}")))
}
