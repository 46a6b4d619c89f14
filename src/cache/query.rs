//! Cached query with stale-while-revalidate reads.
//!
//! `CachedQuery<T>` is the one data-loading primitive every screen uses:
//! given a durable slot key and a fetcher, it surfaces the previously stored
//! value immediately (when there is one) and upgrades it in the background
//! once the network fetch lands. A failed fetch never clears surfaced data;
//! it only raises the offline flag.
//!
//! # Example
//!
//! ```ignore
//! let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open()?);
//! let client = client.clone();
//! let mut prices = CachedQuery::new("market_prices_v1", store, move || {
//!     let client = client.clone();
//!     async move { client.market_prices().await }
//! });
//!
//! // Start the load cycle
//! prices.load();
//!
//! // In the shell's tick loop
//! if prices.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! if prices.is_offline() {
//!     // show the offline banner over whatever data() holds
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::codec::{Codec, JsonCodec};
use super::store::KeyValueStore;

/// A boxed future that produces a fetch result
type BoxFuture<T> = Pin<Box<dyn Future<Output = color_eyre::Result<T>> + Send>>;

/// A factory function that creates futures for fetching fresh data
type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// What a load cycle reports back as its phases settle.
enum CycleEvent<T> {
  /// Cache phase surfaced a previously stored value
  CacheHit(T),
  /// Network phase succeeded (the value is already persisted)
  Fetched(T),
  /// Network phase failed
  FetchFailed,
}

/// A cached query bound to one durable slot.
///
/// State is owned by the consumer (one instance per mounted screen, created
/// anew when the slot key changes) while the slot itself is process-wide:
/// two instances over the same key share the durable value but not the
/// in-memory flags.
///
/// Overlapping load cycles are not coalesced; whichever cycle settles last
/// wins the in-memory state and the slot.
pub struct CachedQuery<T, C = JsonCodec> {
  key: String,
  store: Arc<dyn KeyValueStore>,
  codec: Arc<C>,
  fetcher: FetcherFn<T>,
  data: Option<T>,
  loading: bool,
  refreshing: bool,
  offline: bool,
  tx: mpsc::UnboundedSender<CycleEvent<T>>,
  rx: mpsc::UnboundedReceiver<CycleEvent<T>>,
}

impl<T> CachedQuery<T>
where
  T: Send + 'static,
  JsonCodec: Codec<T>,
{
  /// Create a query over `key` with the default JSON codec.
  ///
  /// `key` must be non-empty and unique per logical query (bake entity ids
  /// or language codes into it where they matter). The fetcher must be safe
  /// to call repeatedly and concurrently with itself.
  pub fn new<F, Fut>(key: impl Into<String>, store: Arc<dyn KeyValueStore>, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = color_eyre::Result<T>> + Send + 'static,
  {
    Self::with_codec(key, store, JsonCodec, fetcher)
  }
}

impl<T, C> CachedQuery<T, C>
where
  T: Send + 'static,
  C: Codec<T> + 'static,
{
  /// Create a query with an explicit codec.
  pub fn with_codec<F, Fut>(
    key: impl Into<String>,
    store: Arc<dyn KeyValueStore>,
    codec: C,
    fetcher: F,
  ) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = color_eyre::Result<T>> + Send + 'static,
  {
    let key = key.into();
    debug_assert!(!key.is_empty(), "cache slot key must be non-empty");

    let (tx, rx) = mpsc::unbounded_channel();

    Self {
      key,
      store,
      codec: Arc::new(codec),
      fetcher: Box::new(move || Box::pin(fetcher())),
      data: None,
      loading: false,
      refreshing: false,
      offline: false,
      tx,
      rx,
    }
  }

  /// The slot key this query reads and writes.
  pub fn key(&self) -> &str {
    &self.key
  }

  /// Latest known value, from cache or network.
  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  /// True until the first value (or the first network settle) arrives.
  pub fn is_loading(&self) -> bool {
    self.loading
  }

  /// True while a manual refresh is in flight.
  pub fn is_refreshing(&self) -> bool {
    self.refreshing
  }

  /// True if the most recent network attempt failed.
  pub fn is_offline(&self) -> bool {
    self.offline
  }

  /// Begin a load cycle: cache phase first, then the network phase.
  ///
  /// Shows the full loading state only when no data is held yet, so a
  /// re-load over existing data revalidates silently in the background.
  pub fn load(&mut self) {
    if self.data.is_none() {
      self.loading = true;
    }
    self.spawn_cycle(false);
  }

  /// Re-run the network phase only, as a user-initiated refresh.
  ///
  /// The cache phase is skipped: whatever is on screen stays up until the
  /// fetch settles.
  pub fn refresh(&mut self) {
    self.refreshing = true;
    self.spawn_cycle(true);
  }

  /// Fold pending cycle events into the query state.
  ///
  /// Returns `true` if anything changed (data arrived, a fetch settled).
  /// Call this from the shell's tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(event) = self.rx.try_recv() {
      self.apply(event);
      changed = true;
    }
    changed
  }

  fn apply(&mut self, event: CycleEvent<T>) {
    match event {
      CycleEvent::CacheHit(value) => {
        self.data = Some(value);
        self.loading = false;
      }
      CycleEvent::Fetched(value) => {
        self.data = Some(value);
        self.offline = false;
        self.loading = false;
        self.refreshing = false;
      }
      CycleEvent::FetchFailed => {
        // Keep whatever the cache phase surfaced
        self.offline = true;
        self.loading = false;
        self.refreshing = false;
      }
    }
  }

  /// Internal: run one load cycle on the runtime.
  fn spawn_cycle(&self, is_refresh: bool) {
    let key = self.key.clone();
    let store = Arc::clone(&self.store);
    let codec = Arc::clone(&self.codec);
    let future = (self.fetcher)();
    let tx = self.tx.clone();

    tokio::spawn(async move {
      // Cache phase: best effort, every failure is a miss.
      if !is_refresh {
        match store.get(&key) {
          Ok(Some(text)) => match codec.decode(&text) {
            // Ignore send errors - the owning query may have been dropped
            Ok(value) => {
              let _ = tx.send(CycleEvent::CacheHit(value));
            }
            Err(e) => warn!("[{}] discarding unreadable cache entry: {}", key, e),
          },
          Ok(None) => {}
          Err(e) => warn!("[{}] cache read failed: {}", key, e),
        }
      }

      // Network phase
      match future.await {
        Ok(value) => {
          if tx.is_closed() {
            // Owner torn down mid-fetch: leave the slot and state untouched
            return;
          }
          match codec.encode(&value) {
            Ok(text) => {
              if let Err(e) = store.set(&key, &text) {
                // Only hurts future cold starts; the fresh value still lands
                warn!("[{}] cache write failed: {}", key, e);
              }
            }
            Err(e) => warn!("[{}] could not serialize fetch result: {}", key, e),
          }
          let _ = tx.send(CycleEvent::Fetched(value));
        }
        Err(e) => {
          debug!("[{}] network fetch failed, serving cache: {}", key, e);
          let _ = tx.send(CycleEvent::FetchFailed);
        }
      }
    });
  }
}

// CachedQuery is not Clone: the flags belong to exactly one owner. Two
// screens over the same key each construct their own query and share only
// the durable slot.

impl<T: std::fmt::Debug, C> std::fmt::Debug for CachedQuery<T, C> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CachedQuery")
      .field("key", &self.key)
      .field("data", &self.data)
      .field("loading", &self.loading)
      .field("refreshing", &self.refreshing)
      .field("offline", &self.offline)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::store::MemoryStore;
  use color_eyre::eyre::eyre;
  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;

  /// Store wrapper that counts reads, to show the refresh path never
  /// touches the cache phase.
  struct CountingStore {
    inner: MemoryStore,
    gets: AtomicUsize,
  }

  impl CountingStore {
    fn new() -> Self {
      Self {
        inner: MemoryStore::new(),
        gets: AtomicUsize::new(0),
      }
    }

    fn get_count(&self) -> usize {
      self.gets.load(Ordering::SeqCst)
    }
  }

  impl KeyValueStore for CountingStore {
    fn get(&self, key: &str) -> color_eyre::Result<Option<String>> {
      self.gets.fetch_add(1, Ordering::SeqCst);
      self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> color_eyre::Result<()> {
      self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> color_eyre::Result<()> {
      self.inner.remove(key)
    }
  }

  /// Store whose reads and writes always fail.
  struct BrokenStore;

  impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> color_eyre::Result<Option<String>> {
      Err(eyre!("store unavailable"))
    }

    fn set(&self, _key: &str, _value: &str) -> color_eyre::Result<()> {
      Err(eyre!("store unavailable"))
    }

    fn remove(&self, _key: &str) -> color_eyre::Result<()> {
      Err(eyre!("store unavailable"))
    }
  }

  /// Fetcher that pops scripted results in order.
  fn scripted_fetcher<T: Send + 'static>(
    results: Vec<color_eyre::Result<T>>,
  ) -> impl Fn() -> Pin<Box<dyn Future<Output = color_eyre::Result<T>> + Send>> + Send + Sync {
    let script = Arc::new(Mutex::new(VecDeque::from(results)));
    move || {
      let script = Arc::clone(&script);
      Box::pin(async move {
        script
          .lock()
          .expect("script lock")
          .pop_front()
          .expect("fetcher called more times than scripted")
      })
    }
  }

  async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
  }

  fn seed(store: &MemoryStore, key: &str, value: &impl serde::Serialize) {
    store
      .set(key, &serde_json::to_string(value).unwrap())
      .unwrap();
  }

  #[tokio::test]
  async fn cache_value_surfaces_without_waiting_for_fetch() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "market_prices_v1", &vec!["banana", "coconut"]);

    let mut query: CachedQuery<Vec<String>> =
      CachedQuery::new("market_prices_v1", store, || {
        std::future::pending::<color_eyre::Result<Vec<String>>>()
      });

    query.load();
    assert!(query.is_loading());

    settle().await;
    assert!(query.poll());

    assert_eq!(query.data(), Some(&vec!["banana".to_string(), "coconut".to_string()]));
    assert!(!query.is_loading());
    assert!(!query.is_offline());
  }

  #[tokio::test]
  async fn network_result_replaces_cache_value_and_slot() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "quest_detail_3", &"stale");

    let mut query: CachedQuery<String> = CachedQuery::new(
      "quest_detail_3",
      store.clone(),
      scripted_fetcher(vec![Ok("fresh".to_string())]),
    );

    query.load();
    settle().await;
    query.poll();

    assert_eq!(query.data(), Some(&"fresh".to_string()));
    assert!(!query.is_offline());
    assert!(!query.is_loading());
    assert_eq!(
      store.get("quest_detail_3").unwrap().as_deref(),
      Some("\"fresh\"")
    );
  }

  #[tokio::test]
  async fn failed_fetch_keeps_cache_value_and_slot() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "lessons_list_static_day1", &vec![1, 2, 3]);

    let mut query: CachedQuery<Vec<i64>> = CachedQuery::new(
      "lessons_list_static_day1",
      store.clone(),
      scripted_fetcher(vec![Err(eyre!("connection refused"))]),
    );

    query.load();
    settle().await;
    query.poll();

    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
    assert!(query.is_offline());
    assert!(!query.is_loading());
    assert_eq!(
      store.get("lessons_list_static_day1").unwrap().as_deref(),
      Some("[1,2,3]")
    );
  }

  #[tokio::test]
  async fn cold_start_success_fills_data_and_slot() {
    let store = Arc::new(MemoryStore::new());

    let mut query: CachedQuery<Vec<i64>> = CachedQuery::new(
      "lessons_list_static_day1",
      store.clone(),
      scripted_fetcher(vec![Ok(vec![7, 8])]),
    );

    query.load();
    assert!(query.data().is_none());
    assert!(query.is_loading());

    settle().await;
    query.poll();

    assert_eq!(query.data(), Some(&vec![7, 8]));
    assert!(!query.is_loading());
    assert!(!query.is_offline());
    assert_eq!(
      store.get("lessons_list_static_day1").unwrap().as_deref(),
      Some("[7,8]")
    );
  }

  #[tokio::test]
  async fn cold_start_failure_goes_offline_with_no_data() {
    let store = Arc::new(MemoryStore::new());

    let mut query: CachedQuery<Vec<i64>> = CachedQuery::new(
      "market_prices_v1",
      store.clone(),
      scripted_fetcher(vec![Err(eyre!("dns failure"))]),
    );

    query.load();
    settle().await;
    query.poll();

    assert!(query.data().is_none());
    assert!(!query.is_loading());
    assert!(query.is_offline());
    assert_eq!(store.get("market_prices_v1").unwrap(), None);
  }

  #[tokio::test]
  async fn refresh_skips_cache_phase_and_upgrades_on_success() {
    let store = Arc::new(CountingStore::new());
    seed(&store.inner, "market_prices_v1", &"cached");

    let mut query: CachedQuery<String> = CachedQuery::new(
      "market_prices_v1",
      store.clone(),
      scripted_fetcher(vec![Err(eyre!("offline")), Ok("fresh".to_string())]),
    );

    query.load();
    settle().await;
    query.poll();

    // Cache surfaced, fetch failed
    assert_eq!(query.data(), Some(&"cached".to_string()));
    assert!(query.is_offline());
    assert_eq!(store.get_count(), 1);

    query.refresh();
    assert!(query.is_refreshing());

    settle().await;
    query.poll();

    assert_eq!(query.data(), Some(&"fresh".to_string()));
    assert!(!query.is_refreshing());
    assert!(!query.is_offline());
    // No second cache read: refresh goes straight to the network
    assert_eq!(store.get_count(), 1);
  }

  #[tokio::test]
  async fn failed_refresh_keeps_data_and_clears_refreshing() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "quest_detail_9", &"held");

    let mut query: CachedQuery<String> = CachedQuery::new(
      "quest_detail_9",
      store.clone(),
      scripted_fetcher(vec![
        Err(eyre!("offline")),
        Err(eyre!("still offline")),
      ]),
    );

    query.load();
    settle().await;
    query.poll();
    assert_eq!(query.data(), Some(&"held".to_string()));

    query.refresh();
    settle().await;
    query.poll();

    assert_eq!(query.data(), Some(&"held".to_string()));
    assert!(query.is_offline());
    assert!(!query.is_refreshing());
  }

  #[tokio::test]
  async fn teardown_suppresses_late_results() {
    let store = Arc::new(MemoryStore::new());
    let gate = Arc::new(tokio::sync::Notify::new());

    let fetcher_gate = Arc::clone(&gate);
    let mut query: CachedQuery<i64> =
      CachedQuery::new("quest_detail_7", store.clone(), move || {
        let gate = Arc::clone(&fetcher_gate);
        Box::pin(async move {
          gate.notified().await;
          Ok(42i64)
        }) as BoxFuture<i64>
      });

    query.load();
    settle().await;

    // Screen goes away while the fetch is parked
    drop(query);

    gate.notify_one();
    settle().await;

    // The late success neither panicked nor wrote the slot
    assert_eq!(store.get("quest_detail_7").unwrap(), None);
  }

  #[tokio::test]
  async fn persisted_result_survives_as_next_cold_start() {
    let store = Arc::new(MemoryStore::new());

    let mut first: CachedQuery<Vec<String>> = CachedQuery::new(
      "market_prices_v1",
      store.clone(),
      scripted_fetcher(vec![Ok(vec!["cardamom".to_string()])]),
    );
    first.load();
    settle().await;
    first.poll();
    drop(first);

    let mut second: CachedQuery<Vec<String>> = CachedQuery::new(
      "market_prices_v1",
      store.clone(),
      scripted_fetcher(vec![Err(eyre!("no network"))]),
    );
    second.load();
    settle().await;
    second.poll();

    assert_eq!(second.data(), Some(&vec!["cardamom".to_string()]));
    assert!(second.is_offline());
  }

  #[tokio::test]
  async fn corrupt_cache_entry_is_a_miss() {
    let store = Arc::new(MemoryStore::new());
    store.set("quest_detail_2", "{not valid json").unwrap();

    let mut query: CachedQuery<String> = CachedQuery::new(
      "quest_detail_2",
      store.clone(),
      scripted_fetcher(vec![Err(eyre!("offline"))]),
    );

    query.load();
    settle().await;
    query.poll();

    assert!(query.data().is_none());
    assert!(query.is_offline());
    // The corrupt entry is left alone; failures never mutate the slot
    assert_eq!(
      store.get("quest_detail_2").unwrap().as_deref(),
      Some("{not valid json")
    );
  }

  #[tokio::test]
  async fn broken_store_degrades_to_network_only() {
    let store = Arc::new(BrokenStore);

    let mut query: CachedQuery<String> = CachedQuery::new(
      "user_profile",
      store,
      scripted_fetcher(vec![Ok("live".to_string())]),
    );

    query.load();
    settle().await;
    query.poll();

    // Read and write-back both failed, but the fetched value still lands
    assert_eq!(query.data(), Some(&"live".to_string()));
    assert!(!query.is_offline());
    assert!(!query.is_loading());
  }

  #[tokio::test]
  async fn overlapping_cycles_last_write_wins() {
    let store = Arc::new(MemoryStore::new());

    let mut query: CachedQuery<i64> = CachedQuery::new(
      "lessons_list_static_day1",
      store.clone(),
      scripted_fetcher(vec![Ok(1), Ok(2)]),
    );

    query.load();
    query.load();
    settle().await;
    query.poll();

    // Both cycles settled; the later fetch result is the one that sticks
    assert_eq!(query.data(), Some(&2));
    assert!(!query.is_loading());
  }
}
