//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings for the watch loops and reconcilers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// Deadline for a single reconcile pass
    pub reconcile_timeout: Duration,
    /// Maximum concurrent reconciles per resource kind
    pub concurrency: u16,
    /// Debounce window for bursts of watch events
    pub debounce: Duration,
    /// Port of the health and metrics server
    pub health_port: u16,
    /// First error backoff
    pub backoff_min: Duration,
    /// Error backoff cap
    pub backoff_max: Duration,
    /// Re-verification interval for converged objects
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            reconcile_timeout: Duration::from_secs(120),
            concurrency: 3,
            debounce: Duration::from_secs(5),
            health_port: 8080,
            backoff_min: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            resync_interval: Duration::from_secs(600),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let config = Self {
            watch_namespace,
            reconcile_timeout: secs(&lookup, "RECONCILE_TIMEOUT_SECS", defaults.reconcile_timeout)?,
            concurrency: number(&lookup, "CONTROLLER_CONCURRENCY", defaults.concurrency)?,
            debounce: secs(&lookup, "DEBOUNCE_SECS", defaults.debounce)?,
            health_port: number(&lookup, "HEALTH_PORT", defaults.health_port)?,
            backoff_min: secs(&lookup, "BACKOFF_MIN_SECS", defaults.backoff_min)?,
            backoff_max: secs(&lookup, "BACKOFF_MAX_SECS", defaults.backoff_max)?,
            resync_interval: secs(&lookup, "RESYNC_INTERVAL_SECS", defaults.resync_interval)?,
        };

        if config.concurrency == 0 {
            return Err(ControllerError::InvalidConfig(
                "CONTROLLER_CONCURRENCY must be at least 1".to_string(),
            ));
        }
        if config.reconcile_timeout.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        if config.backoff_max < config.backoff_min {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MAX_SECS ({}) must not be below BACKOFF_MIN_SECS ({})",
                config.backoff_max.as_secs(),
                config.backoff_min.as_secs()
            )));
        }

        Ok(config)
    }
}

fn number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ControllerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} must be a number, got {:?}: {}", key, raw, e))
        }),
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ControllerError>
where
    F: Fn(&str) -> Option<String>,
{
    number(lookup, key, default.as_secs()).map(Duration::from_secs)
}
