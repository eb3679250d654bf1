//! Data layer of the game-account storefront.
//!
//! [`query`] is a resource-agnostic cache for async fetches; [`news`] builds
//! the storefront's news accessors on top of it, fetching through [`api`].

pub mod api;
pub mod config;
pub mod error;
pub mod news;
pub mod query;

pub use error::FetchError;
