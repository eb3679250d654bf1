//! Serde types for the storefront service's response envelope.
//!
//! Every endpoint answers `{success, data, message?, pagination?}`; `data`
//! is passed through to callers untouched.

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
  #[serde(default)]
  pub success: bool,
  pub data: Option<T>,
  pub message: Option<String>,
  pub pagination: Option<Pagination>,
}

/// Pagination block returned with list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
  pub page: u32,
  pub limit: u32,
  #[serde(default)]
  pub total: u64,
  #[serde(default)]
  pub total_pages: u32,
}

impl<T> ApiResponse<T> {
  /// Unwrap the payload, turning `success = false` into a service error.
  pub fn into_data(self) -> Result<(T, Option<Pagination>), FetchError> {
    if !self.success {
      return Err(FetchError::service(
        self
          .message
          .unwrap_or_else(|| "request was not successful".to_string()),
      ));
    }

    match self.data {
      Some(data) => Ok((data, self.pagination)),
      None => Err(FetchError::decode("response has no data")),
    }
  }
}
