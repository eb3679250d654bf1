//! Query keys and freshness windows for news queries.

use std::time::Duration;

use super::types::ListParams;
use crate::query::QueryKey;

pub const RESOURCE: &str = "news";

pub const DEFAULT_FEATURED_LIMIT: u32 = 3;
pub const DEFAULT_LATEST_LIMIT: u32 = 5;

pub const LIST_STALE_TIME: Duration = Duration::from_secs(5 * 60);
pub const FEATURED_STALE_TIME: Duration = Duration::from_secs(10 * 60);
pub const LATEST_STALE_TIME: Duration = Duration::from_secs(10 * 60);
pub const DETAIL_STALE_TIME: Duration = Duration::from_secs(5 * 60);

pub fn list(params: &ListParams) -> QueryKey {
  QueryKey::new(RESOURCE, "list")
    .param("page", params.page)
    .param("limit", params.limit)
    .opt_param("search", params.search_term())
}

pub fn featured(limit: u32) -> QueryKey {
  QueryKey::new(RESOURCE, "featured").param("limit", limit)
}

pub fn latest(limit: u32) -> QueryKey {
  QueryKey::new(RESOURCE, "latest").param("limit", limit)
}

pub fn detail(id: &str) -> QueryKey {
  QueryKey::new(RESOURCE, "detail").param("id", id)
}
