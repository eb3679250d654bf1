//! News queries with transparent caching.
//!
//! Each accessor returns a [`QueryObserver`] backed by the shared
//! [`QueryClient`]: identical parameters share one cache entry and one
//! in-flight request, and fresh data is served without a network call.

use std::sync::Arc;

use super::keys;
use super::source::NewsSource;
use super::types::{ListParams, NewsItem, NewsPage};
use crate::query::{QueryClient, QueryObserver, QueryOptions};

#[derive(Clone)]
pub struct NewsQueries {
  client: QueryClient,
  source: Arc<dyn NewsSource>,
  retry: u32,
}

impl NewsQueries {
  pub fn new(client: QueryClient, source: Arc<dyn NewsSource>) -> Self {
    Self {
      client,
      source,
      retry: 0,
    }
  }

  /// Retry failed fetches up to `retry` extra times with backoff.
  pub fn with_retry(mut self, retry: u32) -> Self {
    self.retry = retry;
    self
  }

  pub fn client(&self) -> &QueryClient {
    &self.client
  }

  fn options(&self) -> QueryOptions {
    QueryOptions::default().with_retry(self.retry)
  }

  /// Paginated, optionally filtered listing.
  pub fn get_list(&self, params: ListParams) -> QueryObserver<NewsPage> {
    let key = keys::list(&params);
    let source = Arc::clone(&self.source);
    let params = Arc::new(params);

    self.client.observe(
      key,
      self.options().with_stale_time(keys::LIST_STALE_TIME),
      move || {
        let source = Arc::clone(&source);
        let params = Arc::clone(&params);
        async move { source.list(&params).await }
      },
    )
  }

  /// Curated subset, `DEFAULT_FEATURED_LIMIT` items unless told otherwise.
  pub fn get_featured(&self, limit: Option<u32>) -> QueryObserver<Vec<NewsItem>> {
    let limit = limit.unwrap_or(keys::DEFAULT_FEATURED_LIMIT);
    let source = Arc::clone(&self.source);

    self.client.observe(
      keys::featured(limit),
      self.options().with_stale_time(keys::FEATURED_STALE_TIME),
      move || {
        let source = Arc::clone(&source);
        async move { source.featured(limit).await }
      },
    )
  }

  /// Most recent items, `DEFAULT_LATEST_LIMIT` unless told otherwise.
  pub fn get_latest(&self, limit: Option<u32>) -> QueryObserver<Vec<NewsItem>> {
    let limit = limit.unwrap_or(keys::DEFAULT_LATEST_LIMIT);
    let source = Arc::clone(&self.source);

    self.client.observe(
      keys::latest(limit),
      self.options().with_stale_time(keys::LATEST_STALE_TIME),
      move || {
        let source = Arc::clone(&source);
        async move { source.latest(limit).await }
      },
    )
  }

  /// A single item. A missing or blank id yields an idle handle and no request.
  pub fn get_by_id(&self, id: Option<&str>) -> QueryObserver<NewsItem> {
    let id: Arc<str> = Arc::from(id.map(str::trim).unwrap_or_default());
    let source = Arc::clone(&self.source);

    self.client.observe(
      keys::detail(&id),
      self
        .options()
        .with_stale_time(keys::DETAIL_STALE_TIME)
        .enabled(!id.is_empty()),
      move || {
        let source = Arc::clone(&source);
        let id = Arc::clone(&id);
        async move { source.by_id(&id).await }
      },
    )
  }

  /// Mark every cached news query stale; observed ones refetch.
  pub fn invalidate_all(&self) -> usize {
    self.client.invalidate_matching(keys::RESOURCE, None)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::FetchError;
  use crate::query::QueryStatus;
  use async_trait::async_trait;
  use serde_json::{json, Map};
  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;

  fn item(id: &str, title: &str) -> NewsItem {
    let mut fields = Map::new();
    fields.insert("title".to_string(), json!(title));
    NewsItem {
      id: id.to_string(),
      fields,
    }
  }

  /// Source that counts calls and replays scripted detail responses.
  #[derive(Default)]
  struct MockSource {
    list_calls: AtomicU32,
    featured_calls: AtomicU32,
    latest_calls: AtomicU32,
    detail_calls: AtomicU32,
    latest_failures: AtomicU32,
    details: Mutex<VecDeque<(Duration, NewsItem)>>,
  }

  #[async_trait]
  impl NewsSource for MockSource {
    async fn list(&self, params: &ListParams) -> Result<NewsPage, FetchError> {
      self.list_calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok(NewsPage {
        items: vec![item(&format!("p{}", params.page), "listed")],
        pagination: None,
      })
    }

    async fn featured(&self, limit: u32) -> Result<Vec<NewsItem>, FetchError> {
      self.featured_calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok((0..limit).map(|i| item(&i.to_string(), "featured")).collect())
    }

    async fn latest(&self, limit: u32) -> Result<Vec<NewsItem>, FetchError> {
      let call = self.latest_calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(20)).await;
      if call < self.latest_failures.load(Ordering::SeqCst) {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");
        return Err(FetchError::transport(io));
      }
      Ok((0..limit).map(|i| item(&i.to_string(), "latest")).collect())
    }

    async fn by_id(&self, id: &str) -> Result<NewsItem, FetchError> {
      self.detail_calls.fetch_add(1, Ordering::SeqCst);
      let scripted = self.details.lock().unwrap().pop_front();
      match scripted {
        Some((delay, item)) => {
          tokio::time::sleep(delay).await;
          Ok(item)
        }
        None => Ok(item(id, "default")),
      }
    }
  }

  fn setup() -> (Arc<MockSource>, NewsQueries) {
    let source = Arc::new(MockSource::default());
    let queries = NewsQueries::new(QueryClient::default(), source.clone());
    (source, queries)
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_equal_keys_issue_one_call() {
    let (source, news) = setup();

    let mut a = news.get_list(ListParams::default());
    let mut b = news.get_list(ListParams::default().limit(10).page(1));
    let (a, b) = tokio::join!(a.settled(), b.settled());

    assert_eq!(source.list_calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(a.data.as_ref().unwrap(), b.data.as_ref().unwrap()));
  }

  #[tokio::test(start_paused = true)]
  async fn test_featured_twice_within_window_is_cached() {
    let (source, news) = setup();

    let first = news.get_featured(Some(5)).settled().await;
    tokio::time::advance(Duration::from_millis(900)).await;
    let mut again = news.get_featured(Some(5));
    assert!(again.state().is_success());
    let second = again.settled().await;

    assert_eq!(source.featured_calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(
      first.data.as_ref().unwrap(),
      second.data.as_ref().unwrap()
    ));
    assert_eq!(second.data().unwrap().len(), 5);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_featured_refreshes_once_in_background() {
    let (source, news) = setup();

    news.get_featured(None).settled().await;
    tokio::time::advance(keys::FEATURED_STALE_TIME + Duration::from_secs(1)).await;

    let mut first = news.get_featured(None);
    let mut second = news.get_featured(None);

    let refreshing = first.state();
    assert_eq!(refreshing.status, QueryStatus::Pending);
    assert!(refreshing.data.is_some());
    assert!(refreshing.error.is_none());

    let after = first.changed().await.unwrap();
    assert!(after.is_success());
    assert!(second.settled().await.is_success());
    assert_eq!(source.featured_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_list_pages_are_independent() {
    let (source, news) = setup();

    let page1 = news
      .get_list(ListParams::default().page(1).limit(10))
      .settled()
      .await;
    let page2 = news
      .get_list(ListParams::default().page(2).limit(10))
      .settled()
      .await;

    assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);
    assert_eq!(page1.data().unwrap().items[0].id, "p1");
    assert_eq!(page2.data().unwrap().items[0].id, "p2");
    assert_eq!(news.client().len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_empty_id_issues_no_request() {
    let (source, news) = setup();

    let mut blank = news.get_by_id(Some(""));
    let mut absent = news.get_by_id(None);
    let mut spaces = news.get_by_id(Some("   "));

    assert!(blank.settled().await.is_idle());
    assert!(absent.settled().await.is_idle());
    assert!(spaces.refetch().await.is_idle());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.detail_calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_latest_transport_error_then_refetch_succeeds() {
    let (source, news) = setup();
    source.latest_failures.store(1, Ordering::SeqCst);

    let mut latest = news.get_latest(Some(5));
    let failed = latest.settled().await;
    assert!(failed.is_error());
    assert!(failed.error().unwrap().is_transport());
    assert!(failed.error().unwrap().to_string().contains("connection reset"));

    // The refresh after a failure shows loading, not the old error
    assert!(latest.refresh_if_stale());
    let retrying = latest.state();
    assert_eq!(retrying.status, QueryStatus::Pending);
    assert!(retrying.error().is_none());
    assert!(retrying.data().is_none());
    let refreshed = latest.settled().await;
    assert!(refreshed.is_success());
    assert_eq!(source.latest_calls.load(Ordering::SeqCst), 2);

    let recovered = latest.refetch().await;
    assert!(recovered.is_success());
    assert!(recovered.error().is_none());
    assert_eq!(recovered.data().unwrap().len(), 5);
    assert_eq!(source.latest_calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_error_entry_refetches_for_new_observer() {
    let (source, news) = setup();
    source.latest_failures.store(1, Ordering::SeqCst);

    assert!(news.get_latest(None).settled().await.is_error());

    let mut next = news.get_latest(None);
    let pending = next.state();
    assert!(pending.is_loading());
    assert!(pending.error().is_none());
    assert!(next.settled().await.is_success());
    assert_eq!(source.latest_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_parallel_featured_requests_issue_one_call() {
    let (source, news) = setup();

    let tasks: Vec<_> = (0..32)
      .map(|_| {
        let news = news.clone();
        tokio::spawn(async move { news.get_featured(None).settled().await })
      })
      .collect();

    for joined in futures::future::join_all(tasks).await {
      let state = joined.unwrap();
      assert!(state.is_success());
      assert_eq!(state.data().unwrap().len(), 3);
    }
    assert_eq!(source.featured_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_retry_recovers_within_one_request() {
    let source = Arc::new(MockSource::default());
    source.latest_failures.store(2, Ordering::SeqCst);
    let news = NewsQueries::new(QueryClient::default(), source.clone()).with_retry(2);

    let state = news.get_latest(None).settled().await;
    assert!(state.is_success());
    assert_eq!(source.latest_calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_out_of_order_responses_keep_latest_request() {
    let (source, news) = setup();
    {
      let mut details = source.details.lock().unwrap();
      details.push_back((Duration::from_millis(200), item("42", "first")));
      details.push_back((Duration::from_millis(10), item("42", "second")));
    }

    let mut detail = news.get_by_id(Some("42"));
    let state = detail.refetch().await;
    assert_eq!(state.data().unwrap().str_field("title"), Some("second"));

    // Let the slow first response arrive
    tokio::time::sleep(Duration::from_millis(500)).await;
    let state = detail.state();
    assert!(state.is_success());
    assert_eq!(state.data().unwrap().str_field("title"), Some("second"));
    assert_eq!(source.detail_calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_all_refreshes_observed_news() {
    let (source, news) = setup();

    let mut featured = news.get_featured(None);
    featured.settled().await;
    news.get_latest(None).settled().await;

    assert_eq!(news.invalidate_all(), 2);
    featured.settled().await;
    assert_eq!(source.featured_calls.load(Ordering::SeqCst), 2);
    // Latest has no observer left: stale, but refetched only on next access
    assert_eq!(source.latest_calls.load(Ordering::SeqCst), 1);
    news.get_latest(None).settled().await;
    assert_eq!(source.latest_calls.load(Ordering::SeqCst), 2);
  }
}
