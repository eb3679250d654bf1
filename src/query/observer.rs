//! Live handle on one cache entry.
//!
//! An observer is what a UI component holds: it reads the current state,
//! waits for transitions, and triggers refetches. Dropping it unsubscribes.
//!
//! # Example
//!
//! ```ignore
//! let mut featured = news.get_featured(Some(5));
//!
//! // In the render path
//! let state = featured.state();
//! match state.status {
//!     QueryStatus::Pending => render_spinner(),
//!     QueryStatus::Success => render_items(state.data().unwrap()),
//!     QueryStatus::Error => render_error(state.error().unwrap()),
//!     QueryStatus::Idle => {}
//! }
//!
//! // In the event loop
//! while let Some(state) = featured.changed().await {
//!     redraw(state);
//! }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use super::entry::{CacheEntry, EntryState};
use super::key::QueryKey;
use super::options::QueryOptions;
use super::state::{QueryState, QueryStatus};

pub struct QueryObserver<T> {
  entry: Arc<CacheEntry>,
  receiver: watch::Receiver<EntryState>,
  options: QueryOptions,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> QueryObserver<T> {
  pub(crate) fn new(entry: Arc<CacheEntry>, options: QueryOptions) -> Self {
    entry.attach();
    let receiver = entry.subscribe();
    Self {
      entry,
      receiver,
      options,
      _marker: PhantomData,
    }
  }

  /// Fetch on mount when the entry failed or has no fresh data.
  ///
  /// Must run after `new`, so the receiver already exists when the request
  /// starts. On a multi-threaded runtime the request may settle before this
  /// returns; the receiver is then left marked changed so `changed()` still
  /// reports the result.
  pub(crate) fn mount(&mut self) {
    let stale_time = self.options.stale_time;
    let started = self
      .entry
      .fetch_if(|s| s.status == QueryStatus::Error || s.is_stale(stale_time));

    if started.is_none() {
      debug!(key = %self.entry.key(), "serving fresh data from cache");
      return;
    }
    let settled = self.receiver.borrow_and_update().status != QueryStatus::Pending;
    if settled {
      self.receiver.mark_changed();
    }
  }

  pub fn key(&self) -> &QueryKey {
    self.entry.key()
  }

  pub fn options(&self) -> &QueryOptions {
    &self.options
  }

  /// Current state.
  pub fn state(&self) -> QueryState<T> {
    if !self.options.enabled && self.receiver.borrow().data.is_none() {
      return QueryState::idle();
    }
    self.receiver.borrow().typed(self.entry.key())
  }

  /// Wait for the next state transition.
  ///
  /// Returns `None` once the entry can no longer change.
  pub async fn changed(&mut self) -> Option<QueryState<T>> {
    self.receiver.changed().await.ok()?;
    let state = self.receiver.borrow_and_update().typed(self.entry.key());
    Some(state)
  }

  /// Wait until the query is not pending and return that state.
  ///
  /// Returns immediately for idle or settled queries.
  pub async fn settled(&mut self) -> QueryState<T> {
    if self.options.enabled {
      let _ = self
        .receiver
        .wait_for(|s| s.status != QueryStatus::Pending)
        .await;
    }
    self.state()
  }

  /// Whether the data is older than this observer's staleness window.
  pub fn is_stale(&self) -> bool {
    self.receiver.borrow().is_stale(self.options.stale_time)
  }

  /// Issue a new request even if one is in flight, and wait for it.
  ///
  /// The newer request wins: a slower response to an earlier request is
  /// discarded. Disabled queries stay idle.
  pub async fn refetch(&mut self) -> QueryState<T> {
    if !self.options.enabled {
      return self.state();
    }
    if let Some(id) = self.entry.start_fetch(true) {
      self.entry.wait_settled(id).await;
    }
    self.state()
  }

  /// Start a background refresh if the data went stale. Returns whether a
  /// request was issued or joined.
  pub fn refresh_if_stale(&self) -> bool {
    if !self.options.enabled {
      return false;
    }
    let stale_time = self.options.stale_time;
    self.entry.fetch_if(|s| s.is_stale(stale_time)).is_some()
  }
}

impl<T> Drop for QueryObserver<T> {
  fn drop(&mut self) {
    self.entry.detach();
  }
}

impl<T> std::fmt::Debug for QueryObserver<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("QueryObserver")
      .field("key", self.entry.key())
      .field("options", &self.options)
      .finish_non_exhaustive()
  }
}
