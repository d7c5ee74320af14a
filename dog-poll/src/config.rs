//! Poll configuration.
//!
//! Defaults match the server contract (10 retries, 15 seconds apart). Hosts
//! can override them in code with the `with_*` setters or from the
//! environment using the `PREFIX__KEY` convention:
//!
//! ```bash
//! export DOGPOLL__ATTEMPTS=5
//! export DOGPOLL__RETRY_DELAY_MS=2000
//! ```

use std::time::Duration;

use crate::{PollError, PollResult};

/// Prefix used by [`PollConfig::from_default_env`]
pub const DEFAULT_ENV_PREFIX: &str = "DOGPOLL__";

const ATTEMPTS_KEY: &str = "ATTEMPTS";
const RETRY_DELAY_MS_KEY: &str = "RETRY_DELAY_MS";

/// Configuration for a poll engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Retries allowed after the first upload before giving up.
    /// An engine uploads at most `attempts + 1` times.
    pub attempts: u32,

    /// Pause between two upload attempts
    pub retry_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            retry_delay: Duration::from_secs(15),
        }
    }
}

impl PollConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry budget
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set the delay between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Load overrides from `DOGPOLL__*` environment variables
    pub fn from_default_env() -> PollResult<Self> {
        Self::from_env(DEFAULT_ENV_PREFIX)
    }

    /// Load overrides from environment variables named `{prefix}{KEY}`
    pub fn from_env(prefix: &str) -> PollResult<Self> {
        Self::from_lookup(|key| std::env::var(format!("{prefix}{key}")).ok())
    }

    /// Build a config from an arbitrary key lookup, starting from defaults.
    ///
    /// Recognized keys are `ATTEMPTS` and `RETRY_DELAY_MS`; a key that is
    /// present but unparsable is an error rather than a silent default.
    pub fn from_lookup<F>(lookup: F) -> PollResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ATTEMPTS_KEY) {
            config.attempts = raw
                .trim()
                .parse()
                .map_err(|_| PollError::invalid_config(ATTEMPTS_KEY, raw.clone()))?;
        }

        if let Some(raw) = lookup(RETRY_DELAY_MS_KEY) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|_| PollError::invalid_config(RETRY_DELAY_MS_KEY, raw.clone()))?;
            config.retry_delay = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PollConfig::default();
        assert_eq!(config.attempts, 10);
        assert_eq!(config.retry_delay, Duration::from_secs(15));
    }

    #[test]
    fn test_builder_setters() {
        let config = PollConfig::new()
            .with_attempts(3)
            .with_retry_delay(Duration::from_millis(250));

        assert_eq!(config.attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_lookup_overrides() {
        let config =
            PollConfig::from_lookup(lookup_from(&[("ATTEMPTS", "4"), ("RETRY_DELAY_MS", " 1500 ")]))
                .unwrap();

        assert_eq!(config.attempts, 4);
        assert_eq!(config.retry_delay, Duration::from_millis(1500));
    }

    #[test]
    fn test_lookup_keeps_defaults_for_missing_keys() {
        let config = PollConfig::from_lookup(lookup_from(&[("ATTEMPTS", "0")])).unwrap();

        assert_eq!(config.attempts, 0);
        assert_eq!(config.retry_delay, Duration::from_secs(15));
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let result = PollConfig::from_lookup(lookup_from(&[("RETRY_DELAY_MS", "soon")]));
        assert!(matches!(
            result,
            Err(PollError::InvalidConfig { ref key, .. }) if key == "RETRY_DELAY_MS"
        ));

        let result = PollConfig::from_lookup(lookup_from(&[("ATTEMPTS", "-1")]));
        assert!(matches!(result, Err(PollError::InvalidConfig { .. })));
    }

    #[test]
    fn test_from_env_with_unused_prefix() {
        let config = PollConfig::from_env("DOGPOLL_TEST_UNSET_PREFIX__").unwrap();
        assert_eq!(config, PollConfig::default());
    }
}
