//! Sign-in flow and launch routing.
//!
//! Accounts are keyed by a display username; the backend only ever sees
//! the synthetic email derived from it. A guest who finished the first
//! lesson before creating an account gets that progress synced right
//! after login.

use color_eyre::Result;
use tracing::warn;

use crate::backend::{BackendClient, Session};
use crate::cache::KeyValueStore;
use crate::data::prefs;

/// Derive the synthetic account email for a display username.
///
/// Lowercased with everything outside `a-z0-9` stripped, so
/// "Asha Kumar!" and "ashakumar" land on the same account.
pub fn email_from_username(username: &str) -> String {
  let clean: String = username
    .to_lowercase()
    .chars()
    .filter(char::is_ascii_alphanumeric)
    .collect();
  format!("{}@khet.com", clean)
}

/// Sign in, then sync any lesson the guest completed before the account
/// existed.
///
/// The sync is best effort: the session is valid either way and the
/// lesson can simply be replayed.
pub async fn login(
  client: &BackendClient,
  store: &dyn KeyValueStore,
  username: &str,
  password: &str,
  pending_lesson: Option<i64>,
) -> Result<Session> {
  let email = email_from_username(username);
  let session = client.sign_in_with_password(&email, password).await?;

  if let Some(lesson_id) = pending_lesson {
    match client.complete_lesson(&session.user.id, lesson_id).await {
      Ok(()) => {
        if let Err(e) = prefs::mark_onboarding_reward_claimed(store) {
          warn!("Failed to record onboarding reward flag: {}", e);
        }
      }
      Err(e) => warn!("Failed to sync guest lesson completion: {}", e),
    }
  }

  Ok(session)
}

/// First screen to show on launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchTarget {
  Dashboard,
  Login,
  LanguageSelect,
}

/// Route the app's first screen.
///
/// A restorable session lands on the dashboard even when its token is
/// stale and cannot be refreshed: the data layer degrades to cached
/// content rather than bouncing an offline user back to login.
pub async fn launch_target(client: &BackendClient, store: &dyn KeyValueStore) -> LaunchTarget {
  match client.restore_session().await {
    Ok(Some(session)) => {
      if session.is_expired() {
        if let Err(e) = client.refresh_session().await {
          warn!("Keeping stale session after failed refresh: {}", e);
        }
      }
      return LaunchTarget::Dashboard;
    }
    Ok(None) => {}
    Err(e) => warn!("Session restore failed: {}", e),
  }

  if prefs::stored_language(store).is_some() {
    LaunchTarget::Login
  } else {
    LaunchTarget::LanguageSelect
  }
}
