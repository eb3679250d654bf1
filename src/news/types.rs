use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::api::Pagination;

/// A news entry. Only `id` is interpreted; every other field is carried
/// through as the service sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
  #[serde(deserialize_with = "id_as_string")]
  pub id: String,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl NewsItem {
  pub fn field(&self, name: &str) -> Option<&Value> {
    self.fields.get(name)
  }

  pub fn str_field(&self, name: &str) -> Option<&str> {
    self.field(name).and_then(Value::as_str)
  }
}

/// One page of a news listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsPage {
  pub items: Vec<NewsItem>,
  pub pagination: Option<Pagination>,
}

/// Parameters of a news listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListParams {
  pub page: u32,
  pub limit: u32,
  pub search: Option<String>,
}

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

impl Default for ListParams {
  fn default() -> Self {
    Self {
      page: DEFAULT_PAGE,
      limit: DEFAULT_LIMIT,
      search: None,
    }
  }
}

impl ListParams {
  pub fn page(mut self, page: u32) -> Self {
    self.page = page;
    self
  }

  pub fn limit(mut self, limit: u32) -> Self {
    self.limit = limit;
    self
  }

  pub fn search(mut self, search: impl Into<String>) -> Self {
    self.search = Some(search.into());
    self
  }

  /// Trimmed search term; blank counts as no search.
  pub fn search_term(&self) -> Option<&str> {
    self
      .search
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
  }
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "expected string or number id, got {}",
      other
    ))),
  }
}
