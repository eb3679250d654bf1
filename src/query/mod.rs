//! Async query cache for data fetching.
//!
//! Inspired by TanStack Query. A [`QueryClient`] holds one entry per
//! [`QueryKey`]; consumers get a [`QueryObserver`] that reports
//! pending/success/error transitions. The client guarantees:
//! - one in-flight request per key (concurrent callers share it)
//! - no network round-trip while data is fresh
//! - a background refresh on access once data is stale
//! - a superseded response never overwrites a newer one

mod client;
mod entry;
mod key;
mod observer;
mod options;
mod state;

pub use client::{QueryClient, QueryClientConfig};
pub use key::QueryKey;
pub use observer::QueryObserver;
pub use options::{retry_delay, QueryOptions};
pub use state::{QueryState, QueryStatus};
