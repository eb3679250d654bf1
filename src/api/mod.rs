//! Client for the storefront's remote resource service.

mod client;
mod envelope;

pub use client::ApiClient;
pub use envelope::{ApiResponse, Pagination};
