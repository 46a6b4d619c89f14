//! Pluggable serialization for cached values.

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Encodes values into the UTF-8 text blobs the store holds and back.
///
/// A value that fails to decode is treated by the query as a cache miss,
/// never as a fatal error.
pub trait Codec<T>: Send + Sync {
  fn encode(&self, value: &T) -> Result<String>;
  fn decode(&self, text: &str) -> Result<T>;
}

/// Default codec: JSON via serde.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
  T: Serialize + DeserializeOwned,
{
  fn encode(&self, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| eyre!("Failed to serialize cached value: {}", e))
  }

  fn decode(&self, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| eyre!("Failed to deserialize cached value: {}", e))
  }
}
