//! Market price board.

use std::sync::Arc;

use crate::backend::{BackendClient, MarketPrice};
use crate::cache::{CachedQuery, KeyValueStore};

/// Durable slot for the market price list
const MARKET_PRICES_KEY: &str = "market_prices_v1";

/// Cached query over the full price board.
pub fn market_prices_query(
  client: BackendClient,
  store: Arc<dyn KeyValueStore>,
) -> CachedQuery<Vec<MarketPrice>> {
  CachedQuery::new(MARKET_PRICES_KEY, store, move || {
    let client = client.clone();
    async move { client.market_prices().await }
  })
}

/// Case-insensitive crop name search over a price list.
pub fn filter_by_name<'a>(prices: &'a [MarketPrice], query: &str) -> Vec<&'a MarketPrice> {
  let needle = query.to_lowercase();
  prices
    .iter()
    .filter(|p| p.name.to_lowercase().contains(&needle))
    .collect()
}
