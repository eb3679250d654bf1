//! Query client: the shared store that owns every cache entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use super::entry::{erase, lock, CacheEntry};
use super::key::QueryKey;
use super::observer::QueryObserver;
use super::options::QueryOptions;
use crate::error::FetchError;

/// Store-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryClientConfig {
  /// How long an unobserved entry is kept before eviction
  pub gc_time: Duration,
}

impl Default for QueryClientConfig {
  fn default() -> Self {
    Self {
      gc_time: Duration::from_secs(5 * 60),
    }
  }
}

struct Inner {
  entries: Mutex<HashMap<QueryKey, Arc<CacheEntry>>>,
  config: QueryClientConfig,
}

/// Cache of query results shared by every consumer that holds a clone.
///
/// Deduplicates concurrent requests for the same key, serves fresh data
/// without touching the network, and refreshes stale data on access.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new(QueryClientConfig::default())
  }
}

impl QueryClient {
  pub fn new(config: QueryClientConfig) -> Self {
    Self {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        config,
      }),
    }
  }

  pub fn config(&self) -> &QueryClientConfig {
    &self.inner.config
  }

  fn entry(&self, key: &QueryKey) -> Arc<CacheEntry> {
    let mut entries = lock(&self.inner.entries);
    Arc::clone(
      entries
        .entry(key.clone())
        .or_insert_with(|| Arc::new(CacheEntry::new(key.clone()))),
    )
  }

  fn existing(&self, key: &QueryKey) -> Option<Arc<CacheEntry>> {
    lock(&self.inner.entries).get(key).cloned()
  }

  /// Subscribe to a query, fetching it if there is no fresh data.
  ///
  /// Disabled queries only subscribe; they never touch the network.
  pub fn observe<T, F, Fut>(
    &self,
    key: QueryKey,
    options: QueryOptions,
    fetcher: F,
  ) -> QueryObserver<T>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let entry = self.entry(&key);
    if options.enabled {
      entry.set_fetcher(erase(fetcher), options.retry);
    }

    let mut observer = QueryObserver::new(entry, options);
    if options.enabled {
      observer.mount();
    }
    observer
  }

  /// Fetch a query and wait for its data, using the cache when it is fresh.
  pub async fn fetch_query<T, F, Fut>(
    &self,
    key: QueryKey,
    options: QueryOptions,
    fetcher: F,
  ) -> Result<Arc<T>, FetchError>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let entry = self.entry(&key);
    entry.set_fetcher(erase(fetcher), options.retry);

    let stale_time = options.stale_time;
    let state = match entry.fetch_if(|s| s.data.is_none() || s.is_stale(stale_time)) {
      Some(id) => entry.wait_settled(id).await,
      None => {
        debug!(key = %key, "serving fresh data from cache");
        entry.snapshot()
      }
    };

    let typed = state.typed::<T>(&key);
    match (typed.data, typed.error) {
      (_, Some(err)) => Err(err),
      (Some(data), None) => Ok(data),
      (None, None) => Err(FetchError::aborted(format!("no data for {}", key))),
    }
  }

  /// Cached data for `key`, fresh or not, without fetching.
  pub fn get_query_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
    let entry = self.existing(key)?;
    entry.snapshot().typed::<T>(key).data
  }

  /// Mark one entry stale. Observed entries refetch right away.
  pub fn invalidate(&self, key: &QueryKey) -> bool {
    match self.existing(key) {
      Some(entry) => {
        Self::invalidate_entry(&entry);
        true
      }
      None => false,
    }
  }

  /// Mark every entry of `resource` (optionally one `scope`) stale.
  pub fn invalidate_matching(&self, resource: &str, scope: Option<&str>) -> usize {
    let matching: Vec<Arc<CacheEntry>> = lock(&self.inner.entries)
      .values()
      .filter(|e| e.key().matches(resource, scope))
      .cloned()
      .collect();

    for entry in &matching {
      Self::invalidate_entry(entry);
    }
    matching.len()
  }

  fn invalidate_entry(entry: &Arc<CacheEntry>) {
    debug!(key = %entry.key(), "invalidating");
    entry.invalidate();
    if entry.observer_count() > 0 {
      entry.start_fetch(false);
    }
  }

  /// Drop one entry.
  ///
  /// Live observers keep their handle and its last state, but it no longer
  /// fetches; observe the key again for a handle on the new entry.
  pub fn remove(&self, key: &QueryKey) -> bool {
    match lock(&self.inner.entries).remove(key) {
      Some(entry) => {
        entry.retire();
        true
      }
      None => false,
    }
  }

  /// Drop every entry. Live observers stop fetching, as with `remove`.
  pub fn clear(&self) {
    for (_, entry) in lock(&self.inner.entries).drain() {
      entry.retire();
    }
  }

  pub fn len(&self) -> usize {
    lock(&self.inner.entries).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Evict entries that have been inactive for longer than `gc_time`.
  pub fn collect_garbage(&self) -> usize {
    let gc_time = self.inner.config.gc_time;
    let mut entries = lock(&self.inner.entries);
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_collectable(gc_time));
    let evicted = before - entries.len();
    if evicted > 0 {
      debug!(evicted, remaining = entries.len(), "collected inactive queries");
    }
    evicted
  }

  /// Run `collect_garbage` every `interval` until the last client clone is
  /// dropped.
  pub fn spawn_gc(&self, interval: Duration) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(&self.inner);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
          break;
        };
        QueryClient { inner }.collect_garbage();
      }
    })
  }
}
