//! A single cache entry: state, in-flight bookkeeping and the fetch task.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::key::QueryKey;
use super::options::retry_delay;
use super::state::{QueryState, QueryStatus};
use crate::error::FetchError;

/// Type-erased payload, so one store can hold every resource type.
pub(crate) type AnyData = Arc<dyn Any + Send + Sync>;

pub(crate) type ErasedFetcher =
  Arc<dyn Fn() -> BoxFuture<'static, Result<AnyData, FetchError>> + Send + Sync>;

/// Wrap a typed fetcher so its output can be stored in the shared map.
pub(crate) fn erase<T, F, Fut>(fetcher: F) -> ErasedFetcher
where
  T: Send + Sync + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
  Arc::new(move || {
    fetcher()
      .map(|result| result.map(|data| Arc::new(data) as AnyData))
      .boxed()
  })
}

/// Untyped state published to every subscriber of an entry.
#[derive(Debug, Clone)]
pub(crate) struct EntryState {
  pub status: QueryStatus,
  pub data: Option<AnyData>,
  pub error: Option<FetchError>,
  pub data_updated_at: Option<Instant>,
  pub fetched_at: Option<DateTime<Utc>>,
  pub failure_count: u32,
  /// Id of the most recent request whose outcome has been applied
  pub settled_request: u64,
  /// Set by invalidation; cleared by the next successful fetch
  pub invalidated: bool,
}

impl EntryState {
  fn new() -> Self {
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      data_updated_at: None,
      fetched_at: None,
      failure_count: 0,
      settled_request: 0,
      invalidated: false,
    }
  }

  /// Downcast into the view a typed consumer sees.
  pub fn typed<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
    let data = match self.data.clone().map(|d| d.downcast::<T>()) {
      Some(Ok(data)) => Some(data),
      Some(Err(_)) => {
        return QueryState {
          status: QueryStatus::Error,
          data: None,
          error: Some(FetchError::TypeMismatch {
            key: key.to_string(),
          }),
          fetched_at: self.fetched_at,
          failure_count: self.failure_count,
        };
      }
      None => None,
    };

    QueryState {
      status: self.status,
      data,
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      failure_count: self.failure_count,
    }
  }

  pub fn is_stale(&self, stale_time: Duration) -> bool {
    self.invalidated
      || self
        .data_updated_at
        .map(|t| t.elapsed() >= stale_time)
        .unwrap_or(true)
  }
}

pub(crate) struct CacheEntry {
  key: QueryKey,
  state: watch::Sender<EntryState>,
  /// Request id currently allowed to settle the entry
  inflight: Mutex<Option<u64>>,
  next_request: AtomicU64,
  /// Fetcher and the retry count it was registered with
  fetcher: Mutex<Option<(ErasedFetcher, u32)>>,
  observers: AtomicUsize,
  inactive_since: Mutex<Option<Instant>>,
  /// Set once the entry is dropped from the store
  retired: AtomicBool,
}

impl CacheEntry {
  pub fn new(key: QueryKey) -> Self {
    let (state, _) = watch::channel(EntryState::new());
    Self {
      key,
      state,
      inflight: Mutex::new(None),
      next_request: AtomicU64::new(0),
      fetcher: Mutex::new(None),
      observers: AtomicUsize::new(0),
      inactive_since: Mutex::new(Some(Instant::now())),
      retired: AtomicBool::new(false),
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn subscribe(&self) -> watch::Receiver<EntryState> {
    self.state.subscribe()
  }

  pub fn snapshot(&self) -> EntryState {
    self.state.borrow().clone()
  }

  pub fn is_fetching(&self) -> bool {
    lock(&self.inflight).is_some()
  }

  pub fn observer_count(&self) -> usize {
    self.observers.load(Ordering::SeqCst)
  }

  /// Remember how to fetch this entry, and how often to retry. The most
  /// recent registration wins.
  pub fn set_fetcher(&self, fetcher: ErasedFetcher, retry: u32) {
    *lock(&self.fetcher) = Some((fetcher, retry));
  }

  /// Detach the entry from the store. A request already in flight still
  /// settles for existing observers, but no new request is started.
  pub fn retire(&self) {
    self.retired.store(true, Ordering::SeqCst);
  }

  pub fn is_retired(&self) -> bool {
    self.retired.load(Ordering::SeqCst)
  }

  pub fn attach(&self) {
    self.observers.fetch_add(1, Ordering::SeqCst);
    *lock(&self.inactive_since) = None;
  }

  pub fn detach(&self) {
    if self.observers.fetch_sub(1, Ordering::SeqCst) == 1 {
      *lock(&self.inactive_since) = Some(Instant::now());
    }
  }

  /// Eligible for eviction: unobserved, idle on the network, and inactive
  /// for at least `gc_time`.
  pub fn is_collectable(&self, gc_time: Duration) -> bool {
    self.observer_count() == 0
      && !self.is_fetching()
      && lock(&self.inactive_since)
        .map(|since| since.elapsed() >= gc_time)
        .unwrap_or(false)
  }

  pub fn invalidate(&self) {
    self.state.send_modify(|s| s.invalidated = true);
  }

  /// Start a fetch, or join the one already in flight.
  ///
  /// With `force` a new request is issued even if one is in flight; the
  /// older request's response is then discarded when it arrives. Returns the
  /// id of the request the caller should wait on, or `None` if the entry has
  /// no fetcher or was retired.
  pub fn start_fetch(self: &Arc<Self>, force: bool) -> Option<u64> {
    self.begin(force, |_| true)
  }

  /// Fetch only if `needs_fetch` holds for the current state.
  ///
  /// The check runs under the in-flight lock, which `settle` also holds, so
  /// a request settling concurrently is seen before deciding.
  pub fn fetch_if(
    self: &Arc<Self>,
    needs_fetch: impl FnOnce(&EntryState) -> bool,
  ) -> Option<u64> {
    self.begin(false, needs_fetch)
  }

  fn begin(
    self: &Arc<Self>,
    force: bool,
    needs_fetch: impl FnOnce(&EntryState) -> bool,
  ) -> Option<u64> {
    if self.is_retired() {
      debug!(key = %self.key, "entry removed from store, not fetching");
      return None;
    }
    let (fetcher, retry) = lock(&self.fetcher).clone()?;

    let mut inflight = lock(&self.inflight);
    if !needs_fetch(&*self.state.borrow()) {
      return None;
    }
    if let Some(current) = *inflight {
      if !force {
        debug!(key = %self.key, request = current, "joining in-flight request");
        return Some(current);
      }
      debug!(key = %self.key, request = current, "superseding in-flight request");
    }

    let id = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
    *inflight = Some(id);
    self.state.send_modify(|s| {
      s.status = QueryStatus::Pending;
      s.error = None;
      s.failure_count = 0;
    });
    drop(inflight);

    debug!(key = %self.key, request = id, "fetching");
    let entry = Arc::clone(self);
    tokio::spawn(async move {
      let (result, failures) = entry.run(fetcher, id, retry).await;
      entry.settle(id, result, failures);
    });

    Some(id)
  }

  /// Wait until request `id` (or a newer one) has been applied.
  pub async fn wait_settled(&self, id: u64) -> EntryState {
    let mut rx = self.state.subscribe();
    let settled = rx.wait_for(|s| s.settled_request >= id).await.map(|s| s.clone());
    // The sender lives in `self`, so the channel cannot close under us
    settled.unwrap_or_else(|_| self.snapshot())
  }

  async fn run(
    &self,
    fetcher: ErasedFetcher,
    id: u64,
    retry: u32,
  ) -> (Result<AnyData, FetchError>, u32) {
    let mut failures = 0;
    loop {
      let attempt = AssertUnwindSafe(async { (fetcher)().await })
        .catch_unwind()
        .await;
      let err = match attempt {
        Ok(Ok(data)) => return (Ok(data), failures),
        Ok(Err(err)) => err,
        Err(_) => FetchError::aborted("fetch task panicked"),
      };
      failures += 1;

      if failures > retry || matches!(err, FetchError::Aborted { .. }) || !self.is_current(id) {
        return (Err(err), failures);
      }

      debug!(key = %self.key, request = id, failures, error = %err, "retrying");
      self.state.send_modify(|s| {
        if s.status == QueryStatus::Pending {
          s.failure_count = failures;
        }
      });
      tokio::time::sleep(retry_delay(failures - 1)).await;
    }
  }

  fn is_current(&self, id: u64) -> bool {
    *lock(&self.inflight) == Some(id)
  }

  fn settle(&self, id: u64, result: Result<AnyData, FetchError>, failures: u32) {
    let mut inflight = lock(&self.inflight);
    if *inflight != Some(id) {
      debug!(key = %self.key, request = id, "discarding superseded response");
      return;
    }
    *inflight = None;

    if let Err(err) = &result {
      warn!(key = %self.key, request = id, error = %err, "fetch failed");
    }

    self.state.send_modify(|s| {
      s.settled_request = id;
      match result {
        Ok(data) => {
          s.status = QueryStatus::Success;
          s.data = Some(data);
          s.error = None;
          s.data_updated_at = Some(Instant::now());
          s.fetched_at = Some(Utc::now());
          s.failure_count = 0;
          s.invalidated = false;
        }
        Err(err) => {
          s.status = QueryStatus::Error;
          s.error = Some(err);
          s.failure_count = failures;
        }
      }
    });
    drop(inflight);

    if self.observer_count() == 0 {
      *lock(&self.inactive_since) = Some(Instant::now());
    }
  }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
