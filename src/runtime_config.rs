//! # Runtime Configuration Module
//!
//! Service-wide defaults that every newly registered [`Method`](crate::method::Method)
//! inherits. The configuration is passed explicitly to
//! [`Registry::new`](crate::registry::Registry::new); nothing is read from
//! ambient global state after that point.
//!
//! ## Environment Variables
//!
//! ### `METHODCHAIN_REQUIRE_AUTH`
//!
//! `true`/`false`. Whether new methods require authentication. Default: `true`.
//!
//! ### `METHODCHAIN_RESULT_POLICY`
//!
//! Which stage's result a dispatch returns:
//! - `primary` - the primary handler's result (default)
//! - `first` - the first non-null result of any stage
//! - `last` - the result of the last stage that ran
//!
//! ### `METHODCHAIN_THROTTLE_MODE`
//!
//! What a throttled method does when its bucket is empty:
//! - `reject` - fail the call immediately (default)
//! - `wait` - wait up to one refill interval for a token, then fail
//!
//! ## Config Files
//!
//! [`RuntimeConfig::load`] accepts the same keys from a TOML or YAML file:
//!
//! ```toml
//! require_authentication = false
//! result_policy = "last"
//! throttle_mode = "wait"
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use methodchain::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("auth required by default: {}", config.require_authentication);
//! ```

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::method::ResultPolicy;

/// How a method reacts when its rate limiter has no token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleMode {
    /// Fail the call immediately with `Throttled`
    #[default]
    Reject,
    /// Block the caller for at most one refill interval, then fail if still empty
    Wait,
}

impl ThrottleMode {
    /// Parse throttle mode from string
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" | "shed" => Some(Self::Reject),
            "wait" | "block" => Some(Self::Wait),
            _ => None,
        }
    }
}

/// Service-wide defaults applied when a method is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Initial value of each new method's authentication flag
    pub require_authentication: bool,
    /// Result policy of each new method
    pub result_policy: ResultPolicy,
    /// Reaction to an empty token bucket
    pub throttle_mode: ThrottleMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            require_authentication: true,
            result_policy: ResultPolicy::PrimaryResult,
            throttle_mode: ThrottleMode::Reject,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// Uses the same keys as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let require_authentication = lookup("METHODCHAIN_REQUIRE_AUTH")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.require_authentication);

        let result_policy = lookup("METHODCHAIN_RESULT_POLICY")
            .and_then(|s| ResultPolicy::parse(&s))
            .unwrap_or(defaults.result_policy);

        let throttle_mode = lookup("METHODCHAIN_THROTTLE_MODE")
            .and_then(|s| ThrottleMode::parse(&s))
            .unwrap_or(defaults.throttle_mode);

        Self {
            require_authentication,
            result_policy,
            throttle_mode,
        }
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("Failed to parse TOML runtime config")
    }

    /// Parse a YAML document; missing keys take their defaults
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).context("Failed to parse YAML runtime config")
    }

    /// Load a config file, choosing the format by extension (`.toml`, `.yaml`, `.yml`)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read runtime config {}", path.display()))?;

        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => bail!(
                "Unsupported runtime config format for {} (expected .toml, .yaml or .yml)",
                path.display()
            ),
        };
        parsed.with_context(|| format!("Invalid runtime config {}", path.display()))
    }

    /// Same configuration with authentication off by default
    #[must_use]
    pub fn without_authentication(mut self) -> Self {
        self.require_authentication = false;
        self
    }

    #[must_use]
    pub fn with_result_policy(mut self, policy: ResultPolicy) -> Self {
        self.result_policy = policy;
        self
    }

    #[must_use]
    pub fn with_throttle_mode(mut self, mode: ThrottleMode) -> Self {
        self.throttle_mode = mode;
        self
    }
}
