use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::FetchError;

/// Lifecycle status of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Query is disabled and will not fetch
  Idle,
  /// A fetch is in flight (first load or background refresh)
  Pending,
  /// The last fetch succeeded
  Success,
  /// The last fetch failed
  Error,
}

/// Snapshot of a query as seen by one consumer.
///
/// While a background refresh is pending, `data` still holds the previous
/// result so consumers can keep rendering it.
#[derive(Debug)]
pub struct QueryState<T> {
  pub status: QueryStatus,
  pub data: Option<Arc<T>>,
  pub error: Option<FetchError>,
  /// Wall-clock time the current data arrived
  pub fetched_at: Option<DateTime<Utc>>,
  /// Consecutive failed attempts of the most recent request
  pub failure_count: u32,
}

impl<T> QueryState<T> {
  pub(crate) fn idle() -> Self {
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      fetched_at: None,
      failure_count: 0,
    }
  }

  pub fn is_idle(&self) -> bool {
    self.status == QueryStatus::Idle
  }

  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Pending
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  /// Pending with earlier data still available.
  pub fn is_refreshing(&self) -> bool {
    self.is_loading() && self.data.is_some()
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_deref()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.error.as_ref()
  }
}

// Manual impl: `T` itself need not be Clone, only the Arc is cloned.
impl<T> Clone for QueryState<T> {
  fn clone(&self) -> Self {
    Self {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      failure_count: self.failure_count,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_idle_state() {
    let state: QueryState<i32> = QueryState::idle();
    assert!(state.is_idle());
    assert!(!state.is_loading());
    assert!(state.data().is_none());
    assert!(state.error().is_none());
  }

  #[test]
  fn test_refreshing_requires_data() {
    let mut state = QueryState {
      status: QueryStatus::Pending,
      data: None,
      error: None,
      fetched_at: None,
      failure_count: 0,
    };
    assert!(state.is_loading());
    assert!(!state.is_refreshing());

    state.data = Some(Arc::new(7));
    assert!(state.is_refreshing());
    assert_eq!(state.data(), Some(&7));
  }
}
