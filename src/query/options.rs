use std::time::Duration;

/// Longest pause between two retry attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Per-query behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
  /// How long fetched data counts as fresh
  pub stale_time: Duration,
  /// Disabled queries never fetch and stay idle until data arrives some other way
  pub enabled: bool,
  /// Extra attempts after a failed fetch
  pub retry: u32,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(5 * 60),
      enabled: true,
      retry: 0,
    }
  }
}

impl QueryOptions {
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn enabled(mut self, enabled: bool) -> Self {
    self.enabled = enabled;
    self
  }

  pub fn with_retry(mut self, retry: u32) -> Self {
    self.retry = retry;
    self
  }
}

/// Backoff before retry number `attempt` (0-based): 1s, 2s, 4s, ... capped at 30s.
pub fn retry_delay(attempt: u32) -> Duration {
  let secs = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
  Duration::from_secs(secs).min(MAX_RETRY_DELAY)
}
