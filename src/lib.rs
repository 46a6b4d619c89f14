//! Offline-first data core for the Khet farming companion app.
//!
//! Three layers:
//!
//! - [`cache`]: a durable key-value store plus [`CachedQuery`], the
//!   cache-then-network query the screens read through,
//! - [`backend`]: a typed client for the hosted backend's auth and
//!   table endpoints,
//! - [`data`]: per-screen providers composing the two.
//!
//! Screens own their queries: call [`CachedQuery::load`] once, poll
//! every tick, render from the flags. Connectivity loss never surfaces
//! as an error, only as stale data plus an offline flag.

pub mod backend;
pub mod cache;
pub mod config;
pub mod data;
pub mod logging;

pub use backend::BackendClient;
pub use cache::{CachedQuery, KeyValueStore, SqliteStore};
pub use config::Config;
