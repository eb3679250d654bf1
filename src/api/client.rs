use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::envelope::ApiResponse;
use crate::config::ApiConfig;
use crate::error::FetchError;

/// HTTP client for the storefront service
#[derive(Clone, Debug)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;
    if base_url.cannot_be_a_base() {
      return Err(eyre!("API base URL {} cannot carry a path", base_url));
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(config.user_agent.clone())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Build `{base}/{segments...}?{query}`. Segments are percent-encoded.
  pub fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    if !query.is_empty() {
      url.query_pairs_mut().extend_pairs(query);
    }
    url
  }

  /// GET an endpoint and decode its envelope.
  ///
  /// Non-2xx answers become `FetchError::Status`, keeping the envelope's
  /// message when the body carries one.
  pub async fn get<T: DeserializeOwned>(
    &self,
    segments: &[&str],
    query: &[(&str, String)],
  ) -> Result<ApiResponse<T>, FetchError> {
    let url = self.endpoint(segments, query);
    debug!(%url, "GET");

    let response = self.http.get(url).send().await?;
    let status = response.status();
    let body = response.bytes().await.map_err(FetchError::transport)?;

    if !status.is_success() {
      let message = serde_json::from_slice::<ApiResponse<serde_json::Value>>(&body)
        .ok()
        .and_then(|envelope| envelope.message);
      return Err(FetchError::Status {
        status: status.as_u16(),
        message,
      });
    }

    Ok(serde_json::from_slice(&body)?)
  }
}
