//! Configuration for the sync engine.

use std::time::Duration;

/// Default namespace for persisted keys.
pub const DEFAULT_NAMESPACE: &str = "outbox";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the backend (e.g. `https://api.example.com`).
    pub server_url: String,
    /// Namespace prefix for the persisted keys.
    pub namespace: String,
    /// Retry budget.
    pub retry: RetryConfig,
    /// Interval of the reachability probe; `None` disables it.
    pub probe_interval: Option<Duration>,
    /// Path requested by the reachability probe.
    pub health_path: String,
    /// Interval of the periodic drain while online.
    pub sync_interval: Duration,
    /// Pause between two dispatches within one drain.
    pub inter_mutation_delay: Duration,
    /// Request timeout used by the HTTP client.
    pub timeout: Duration,
    /// Maximum number of recent error strings kept in the status.
    pub max_recent_errors: usize,
    /// Bearer token sent with every request.
    pub auth_token: Option<String>,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            retry: RetryConfig::default(),
            probe_interval: Some(Duration::from_secs(30)),
            health_path: "/health".to_string(),
            sync_interval: Duration::from_secs(60),
            inter_mutation_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(30),
            max_recent_errors: 10,
            auth_token: None,
        }
    }

    /// Sets the storage namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the probe interval. Zero disables the probe.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = Some(interval).filter(|interval| !interval.is_zero());
        self
    }

    /// Disables the reachability probe.
    pub fn without_probe(mut self) -> Self {
        self.probe_interval = None;
        self
    }

    /// Sets the probe path.
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    /// Sets the periodic drain interval. Zero disables periodic drains.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the pause between dispatches.
    pub fn with_inter_mutation_delay(mut self, delay: Duration) -> Self {
        self.inter_mutation_delay = delay;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the recent error capacity.
    pub fn with_max_recent_errors(mut self, max: usize) -> Self {
        self.max_recent_errors = max;
        self
    }

    /// Sets the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Storage key of the mutation queue.
    pub fn queue_key(&self) -> String {
        format!("{}.mutation_queue", self.namespace)
    }

    /// Storage key of the last sync snapshot.
    pub fn snapshot_key(&self) -> String {
        format!("{}.last_sync", self.namespace)
    }

    /// Storage key written when checking that storage is usable.
    pub fn probe_key(&self) -> String {
        format!("{}.probe", self.namespace)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}

/// Configuration for the per-mutation retry budget.
///
/// Retries are not immediate: a failed mutation waits for the next drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Failed attempts allowed before a mutation is evicted.
    pub max_attempts: u32,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Creates a configuration that evicts on the first failure.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1 }
    }

    /// Returns true once `retry_count` failures use up the budget.
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_attempts
    }

    /// Attempts left after `retry_count` failures.
    pub fn remaining(&self, retry_count: u32) -> u32 {
        self.max_attempts.saturating_sub(retry_count)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::new("https://api.example.com");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.probe_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.inter_mutation_delay, Duration::from_millis(100));
        assert_eq!(config.queue_key(), "outbox.mutation_queue");
        assert_eq!(config.snapshot_key(), "outbox.last_sync");
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://api.example.com")
            .with_namespace("crm")
            .with_retry(RetryConfig::new(5))
            .without_probe()
            .with_inter_mutation_delay(Duration::ZERO)
            .with_auth_token("secret");

        assert_eq!(config.server_url, "https://api.example.com");
        assert_eq!(config.queue_key(), "crm.mutation_queue");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.probe_interval, None);
        assert_eq!(config.inter_mutation_delay, Duration::ZERO);
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn zero_intervals_disable_timers() {
        let config = SyncConfig::new("https://api.example.com")
            .with_probe_interval(Duration::ZERO)
            .with_sync_interval(Duration::ZERO);
        assert_eq!(config.probe_interval, None);
        assert!(config.sync_interval.is_zero());

        let config = config.with_probe_interval(Duration::from_secs(5));
        assert_eq!(config.probe_interval, Some(Duration::from_secs(5)));
    }

    #[test]
    fn retry_budget() {
        let retry = RetryConfig::default();
        assert!(!retry.is_exhausted(2));
        assert!(retry.is_exhausted(3));
        assert_eq!(retry.remaining(1), 2);
        assert_eq!(retry.remaining(5), 0);

        assert_eq!(RetryConfig::new(0).max_attempts, 1);
        assert!(RetryConfig::no_retry().is_exhausted(1));
    }
}
