//! Where news comes from.

use async_trait::async_trait;

use super::types::{ListParams, NewsItem, NewsPage};
use crate::api::ApiClient;
use crate::error::FetchError;

/// Read access to the news collection.
#[async_trait]
pub trait NewsSource: Send + Sync {
  async fn list(&self, params: &ListParams) -> Result<NewsPage, FetchError>;

  async fn featured(&self, limit: u32) -> Result<Vec<NewsItem>, FetchError>;

  async fn latest(&self, limit: u32) -> Result<Vec<NewsItem>, FetchError>;

  async fn by_id(&self, id: &str) -> Result<NewsItem, FetchError>;
}

/// News source backed by the storefront HTTP service.
#[derive(Clone, Debug)]
pub struct HttpNewsSource {
  api: ApiClient,
}

impl HttpNewsSource {
  pub fn new(api: ApiClient) -> Self {
    Self { api }
  }
}

#[async_trait]
impl NewsSource for HttpNewsSource {
  async fn list(&self, params: &ListParams) -> Result<NewsPage, FetchError> {
    let mut query = vec![
      ("page", params.page.to_string()),
      ("limit", params.limit.to_string()),
    ];
    if let Some(search) = params.search_term() {
      query.push(("search", search.to_string()));
    }

    let (items, pagination) = self
      .api
      .get::<Vec<NewsItem>>(&["news"], &query)
      .await?
      .into_data()?;
    Ok(NewsPage { items, pagination })
  }

  async fn featured(&self, limit: u32) -> Result<Vec<NewsItem>, FetchError> {
    let (items, _) = self
      .api
      .get::<Vec<NewsItem>>(&["news", "featured"], &[("limit", limit.to_string())])
      .await?
      .into_data()?;
    Ok(items)
  }

  async fn latest(&self, limit: u32) -> Result<Vec<NewsItem>, FetchError> {
    let (items, _) = self
      .api
      .get::<Vec<NewsItem>>(&["news", "latest"], &[("limit", limit.to_string())])
      .await?
      .into_data()?;
    Ok(items)
  }

  async fn by_id(&self, id: &str) -> Result<NewsItem, FetchError> {
    let (item, _) = self
      .api
      .get::<NewsItem>(&["news", id], &[])
      .await?
      .into_data()?;
    Ok(item)
  }
}
