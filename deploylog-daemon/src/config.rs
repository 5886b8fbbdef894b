//! Runtime configuration for the store and daemon.
//!
//! Everything hangs off a home directory; the remaining knobs come from the
//! environment and fall back to defaults when unset or malformed.

use std::path::PathBuf;
use std::time::Duration;

use crate::paths::{DEFAULT_QUEUE_DEPTH, DEFAULT_WRITE_TIMEOUT};

pub const ENV_WRITE_TIMEOUT_MS: &str = "DEPLOYLOG_WRITE_TIMEOUT_MS";
pub const ENV_QUEUE_DEPTH: &str = "DEPLOYLOG_QUEUE_DEPTH";
pub const ENV_LOG_FORMAT: &str = "DEPLOYLOG_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub home: PathBuf,
    /// Upper bound on how long a caller waits for a queued mutation.
    pub write_timeout: Duration,
    /// Capacity of the mutation queue.
    pub queue_depth: usize,
    pub log_format: LogFormat,
}

impl DaemonConfig {
    /// Defaults rooted at `home`, ignoring the environment.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            log_format: LogFormat::Text,
        }
    }

    /// Defaults rooted at `home`, overridden from the process environment.
    pub fn from_env(home: impl Into<PathBuf>) -> Self {
        Self::from_lookup(home, |key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        home: impl Into<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::new(home);

        if let Some(raw) = lookup(ENV_WRITE_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.write_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(value = %raw, "ignoring invalid {ENV_WRITE_TIMEOUT_MS}"),
            }
        }

        if let Some(raw) = lookup(ENV_QUEUE_DEPTH) {
            match raw.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => config.queue_depth = depth,
                _ => tracing::warn!(value = %raw, "ignoring invalid {ENV_QUEUE_DEPTH}"),
            }
        }

        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "json" => config.log_format = LogFormat::Json,
                "text" => config.log_format = LogFormat::Text,
                _ => tracing::warn!(value = %raw, "ignoring invalid {ENV_LOG_FORMAT}"),
            }
        }

        config
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_empty() {
        let config = DaemonConfig::from_lookup("/home/ci", lookup(&[]));
        assert_eq!(config, DaemonConfig::new("/home/ci"));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_applied() {
        let config = DaemonConfig::from_lookup(
            "/home/ci",
            lookup(&[
                (ENV_WRITE_TIMEOUT_MS, "250"),
                (ENV_QUEUE_DEPTH, "8"),
                (ENV_LOG_FORMAT, "JSON"),
            ]),
        );
        assert_eq!(config.write_timeout, Duration::from_millis(250));
        assert_eq!(config.queue_depth, 8);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[rstest]
    #[case(ENV_WRITE_TIMEOUT_MS, "soon")]
    #[case(ENV_WRITE_TIMEOUT_MS, "0")]
    #[case(ENV_QUEUE_DEPTH, "0")]
    #[case(ENV_QUEUE_DEPTH, "-4")]
    #[case(ENV_LOG_FORMAT, "xml")]
    fn malformed_values_fall_back(#[case] key: &str, #[case] value: &str) {
        let config = DaemonConfig::from_lookup("/home/ci", lookup(&[(key, value)]));
        assert_eq!(config, DaemonConfig::new("/home/ci"));
    }
}
