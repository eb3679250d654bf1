//! Query keys: deterministic identifiers for (resource, parameters) pairs.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one logical query result set.
///
/// Parameters live in a sorted map, so two keys built from the same
/// parameters compare equal regardless of the order they were added in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  resource: String,
  scope: String,
  params: BTreeMap<String, String>,
}

impl QueryKey {
  pub fn new(resource: impl Into<String>, scope: impl Into<String>) -> Self {
    Self {
      resource: resource.into(),
      scope: scope.into(),
      params: BTreeMap::new(),
    }
  }

  /// Add a parameter. A later value for the same name replaces the earlier one.
  pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
    self.params.insert(name.into(), value.to_string());
    self
  }

  /// Add a parameter only when a value is present.
  pub fn opt_param(self, name: impl Into<String>, value: Option<impl ToString>) -> Self {
    match value {
      Some(v) => self.param(name, v),
      None => self,
    }
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  pub fn scope(&self) -> &str {
    &self.scope
  }

  pub fn params(&self) -> &BTreeMap<String, String> {
    &self.params
  }

  /// Canonical text form, e.g. `news/list?limit=10&page=1`.
  pub fn canonical(&self) -> String {
    let mut out = format!("{}/{}", self.resource, self.scope);
    let mut sep = '?';
    for (name, value) in &self.params {
      out.push(sep);
      out.push_str(&escape(name));
      out.push('=');
      out.push_str(&escape(value));
      sep = '&';
    }
    out
  }

  /// SHA256 of the canonical form, for stable fixed-length identifiers.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.canonical().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Whether this key belongs to `resource`, optionally narrowed to `scope`.
  pub fn matches(&self, resource: &str, scope: Option<&str>) -> bool {
    self.resource == resource && scope.map_or(true, |s| self.scope == s)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.canonical())
  }
}

/// Escape the separators used by the canonical form so distinct parameter
/// sets never render to the same string.
fn escape(s: &str) -> String {
  url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
