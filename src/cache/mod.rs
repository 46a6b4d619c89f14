//! Durable key-value caching with stale-while-revalidate queries.
//!
//! This module provides the app's offline-first data layer:
//! - A string key-value store abstraction with SQLite and in-memory backends
//! - Pluggable value codecs (JSON by default)
//! - `CachedQuery`, which serves the stored value immediately and upgrades
//!   it in the background, falling back to an offline flag when the
//!   network is unavailable

mod codec;
mod query;
mod store;

pub use codec::{Codec, JsonCodec};
pub use query::CachedQuery;
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
