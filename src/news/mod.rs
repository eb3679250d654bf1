//! News: the storefront's announcement feed.

mod hooks;
pub mod keys;
mod source;
mod types;

pub use hooks::NewsQueries;
pub use source::{HttpNewsSource, NewsSource};
pub use types::{ListParams, NewsItem, NewsPage, DEFAULT_LIMIT, DEFAULT_PAGE};
