//! Client-side server status watch.
//!
//! Polls a health endpoint that returns `{ "<server>": { "status", "last_checked" } }`,
//! keeps the last good snapshot across transient failures, and derives a
//! critical alert whenever any server is not online.
//!
//! ```text
//! PollScheduler ──tick──▶ StatusSource::fetch() ──FetchOutcome──▶ StatusStore::reconcile()
//!       │                                                              │
//!       └────────────── on_update(MonitorState) ◀──────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod models;
pub mod store;

pub use config::WatchConfig;
pub use engine::{PollHandle, PollScheduler, DEFAULT_POLL_INTERVAL};
pub use fetcher::{StatusFetcher, StatusSource};
pub use models::{ErrorKind, FetchError, FetchOutcome, MonitorState, ServerState, ServerStatus, StatusSnapshot};
pub use store::{StatusReader, StatusStore};
