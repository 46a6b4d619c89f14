//! Embedded mini-game channel.
//!
//! The game ships as hosted web content inside a WebView; the only
//! message it sends back is a bare completion marker. Everything else
//! on the channel is ignored. Recognizing the marker triggers the
//! crediting sequence against the backend.

use color_eyre::Result;

use crate::backend::{BackendClient, ProfileUpdate};

/// Where the embedded game content is hosted.
pub const GAME_URL: &str = "https://eclectic-otter-4571bc.netlify.app/";

const COMPLETE_MESSAGE: &str = "lesson_complete";
const FALLBACK_POINTS: i64 = 150;
const XP_PER_LESSON: i64 = 100;

/// Message recognized on the game's outbound channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
  LessonComplete,
}

/// Interpret a raw message posted by the game content.
///
/// Only the exact completion marker counts; anything else is noise.
pub fn parse_game_message(raw: &str) -> Option<GameEvent> {
  if raw == COMPLETE_MESSAGE {
    Some(GameEvent::LessonComplete)
  } else {
    None
  }
}

/// What a completed lesson credited to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionReward {
  pub coins_awarded: i64,
  pub new_coins: i64,
  pub new_xp: i64,
}

/// Credit a finished lesson: record the completion, then award the
/// lesson's coins and a fixed XP bump.
///
/// Guests earn nothing here; their completion is synced at login
/// instead. Lessons missing a points row award the fallback amount.
pub async fn record_completion(
  client: &BackendClient,
  lesson_id: i64,
) -> Result<Option<CompletionReward>> {
  let user_id = match client.user_id().await {
    Some(id) => id,
    None => return Ok(None),
  };

  let points = client
    .lesson_points(lesson_id)
    .await?
    .unwrap_or(FALLBACK_POINTS);

  client.complete_lesson(&user_id, lesson_id).await?;

  let profile = client.profile(&user_id).await?;
  let new_coins = profile.coins.unwrap_or(0) + points;
  let new_xp = profile.xp.unwrap_or(0) + XP_PER_LESSON;

  let update = ProfileUpdate {
    coins: Some(new_coins),
    xp: Some(new_xp),
    ..Default::default()
  };
  client.update_profile(&user_id, &update).await?;

  Ok(Some(CompletionReward {
    coins_awarded: points,
    new_coins,
    new_xp,
  }))
}
