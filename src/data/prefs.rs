//! Local preferences kept in the key-value store.
//!
//! The display language lives locally first and on the profile second,
//! so a reinstall can recover it after sign-in. Translation string
//! tables are the shell's concern; this module only resolves which
//! language to render.

use color_eyre::{eyre::eyre, Result};
use tracing::warn;

use crate::backend::{BackendClient, ProfileUpdate};
use crate::cache::KeyValueStore;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "hi"];

const LANGUAGE_KEY: &str = "user_language";
const ONBOARDING_LANGUAGE_KEY: &str = "onboarding_lang";
const ONBOARDING_REWARD_KEY: &str = "onboarding_reward_claimed";

fn is_supported(language: &str) -> bool {
  SUPPORTED_LANGUAGES.contains(&language)
}

/// Locally stored language, if one was chosen and is still supported.
pub fn stored_language(store: &dyn KeyValueStore) -> Option<String> {
  match store.get(LANGUAGE_KEY) {
    Ok(Some(language)) if is_supported(&language) => Some(language),
    Ok(_) => None,
    Err(e) => {
      warn!("Failed to read stored language: {}", e);
      None
    }
  }
}

/// Resolve the display language: local store, then the signed-in
/// profile, then the deployment default (`Config::language`).
///
/// A profile hit is written back locally so the next launch resolves
/// without a network call. An unsupported `default` resolves to "en".
pub async fn resolve_language(
  client: &BackendClient,
  store: &dyn KeyValueStore,
  default: &str,
) -> String {
  if let Some(language) = stored_language(store) {
    return language;
  }

  if let Some(user_id) = client.user_id().await {
    match client.profile_language(&user_id).await {
      Ok(Some(language)) if is_supported(&language) => {
        if let Err(e) = store.set(LANGUAGE_KEY, &language) {
          warn!("Failed to store language preference: {}", e);
        }
        return language;
      }
      Ok(_) => {}
      Err(e) => warn!("Failed to read profile language: {}", e),
    }
  }

  if is_supported(default) {
    default.to_string()
  } else {
    DEFAULT_LANGUAGE.to_string()
  }
}

/// Persist the chosen language locally and, when signed in, on the
/// profile.
pub async fn set_language(
  client: &BackendClient,
  store: &dyn KeyValueStore,
  language: &str,
) -> Result<()> {
  if !is_supported(language) {
    return Err(eyre!("Unsupported language: {}", language));
  }

  store
    .set(LANGUAGE_KEY, language)
    .map_err(|e| eyre!("Failed to store language preference: {}", e))?;
  store
    .set(ONBOARDING_LANGUAGE_KEY, language)
    .map_err(|e| eyre!("Failed to store language preference: {}", e))?;

  if let Some(user_id) = client.user_id().await {
    let update = ProfileUpdate {
      language: Some(language.to_string()),
      ..Default::default()
    };
    client.update_profile(&user_id, &update).await?;
  }

  Ok(())
}

/// Whether the day-one onboarding reward has already been granted.
pub fn onboarding_reward_claimed(store: &dyn KeyValueStore) -> bool {
  match store.get(ONBOARDING_REWARD_KEY) {
    Ok(value) => value.as_deref() == Some("true"),
    Err(e) => {
      warn!("Failed to read onboarding flag: {}", e);
      false
    }
  }
}

/// Record that the onboarding reward has been granted.
pub fn mark_onboarding_reward_claimed(store: &dyn KeyValueStore) -> Result<()> {
  store
    .set(ONBOARDING_REWARD_KEY, "true")
    .map_err(|e| eyre!("Failed to store onboarding flag: {}", e))
}
