//! Errors surfaced through query handles.

use std::sync::Arc;
use thiserror::Error;

/// Failure of a single fetch.
///
/// One failed request may be delivered to every consumer that shares it, so
/// the error is cheap to clone and keeps its cause behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  /// The request never produced a response (connect, timeout, TLS, ...).
  #[error("transport error: {0}")]
  Transport(#[source] Arc<dyn std::error::Error + Send + Sync>),

  /// The service answered with a non-success HTTP status.
  #[error("service returned HTTP {status}{}", detail(.message))]
  Status { status: u16, message: Option<String> },

  /// The service answered `success = false`.
  #[error("service reported failure: {message}")]
  Service { message: String },

  /// The response body did not have the expected shape.
  #[error("invalid response payload: {message}")]
  Decode { message: String },

  /// A cache entry holds a value of another type than the one requested.
  #[error("cached value for {key} has an unexpected type")]
  TypeMismatch { key: String },

  /// The fetch task stopped before producing a result.
  #[error("fetch aborted: {message}")]
  Aborted { message: String },
}

impl FetchError {
  pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Transport(Arc::new(err))
  }

  pub fn service(message: impl Into<String>) -> Self {
    Self::Service {
      message: message.into(),
    }
  }

  pub fn decode(message: impl Into<String>) -> Self {
    Self::Decode {
      message: message.into(),
    }
  }

  pub fn aborted(message: impl Into<String>) -> Self {
    Self::Aborted {
      message: message.into(),
    }
  }

  /// Whether the failure happened before the service answered.
  pub fn is_transport(&self) -> bool {
    matches!(self, Self::Transport(_))
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      Self::decode(err.to_string())
    } else {
      Self::transport(err)
    }
  }
}

impl From<serde_json::Error> for FetchError {
  fn from(err: serde_json::Error) -> Self {
    Self::decode(err.to_string())
  }
}

fn detail(message: &Option<String>) -> String {
  message
    .as_deref()
    .map(|m| format!(": {}", m))
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_display_includes_message() {
    let err = FetchError::Status {
      status: 503,
      message: Some("maintenance".to_string()),
    };
    assert_eq!(err.to_string(), "service returned HTTP 503: maintenance");

    let err = FetchError::Status {
      status: 404,
      message: None,
    };
    assert_eq!(err.to_string(), "service returned HTTP 404");
  }

  #[test]
  fn test_transport_keeps_source() {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
    let err = FetchError::transport(io);
    assert!(err.is_transport());
    assert!(std::error::Error::source(&err).is_some());
    assert!(err.to_string().contains("refused"));
  }
}
