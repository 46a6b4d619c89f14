//! Quest details with completion tracking.

use std::sync::Arc;

use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendClient, Quest};
use crate::cache::{CachedQuery, KeyValueStore};

/// Slot key for one quest's detail view
fn quest_detail_key(quest_id: i64) -> String {
  format!("quest_detail_{}", quest_id)
}

/// A quest joined with the user's completion state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestDetail {
  pub quest: Quest,
  pub is_completed: bool,
}

impl QuestDetail {
  /// Whether the verification quiz can be started.
  ///
  /// Completed quests stay closed, and the quiz needs connectivity.
  pub fn can_take_quiz(&self, offline: bool) -> bool {
    !self.is_completed && !offline
  }
}

/// Fetch one quest and whether the signed-in user has completed it.
///
/// Signed-out users always see the quest as pending.
pub async fn fetch_quest_detail(client: &BackendClient, quest_id: i64) -> Result<QuestDetail> {
  let quest = client.quest(quest_id).await?;

  let is_completed = match client.user_id().await {
    Some(user_id) => client.quest_completed(&user_id, quest_id).await?,
    None => false,
  };

  Ok(QuestDetail {
    quest,
    is_completed,
  })
}

/// Cached query over one quest's details.
pub fn quest_detail_query(
  client: BackendClient,
  store: Arc<dyn KeyValueStore>,
  quest_id: i64,
) -> CachedQuery<QuestDetail> {
  CachedQuery::new(quest_detail_key(quest_id), store, move || {
    let client = client.clone();
    async move { fetch_quest_detail(&client, quest_id).await }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use mockito::Matcher;

  #[test]
  fn slot_keys_bake_in_the_quest_id() {
    assert_eq!(quest_detail_key(3), "quest_detail_3");
    assert_eq!(quest_detail_key(41), "quest_detail_41");
  }

  #[test]
  fn quiz_gating_requires_pending_and_online() {
    let detail = QuestDetail {
      quest: Quest {
        id: 1,
        title: "Mulching".to_string(),
        description: String::new(),
        xp_reward: 10,
      },
      is_completed: false,
    };
    assert!(detail.can_take_quiz(false));
    assert!(!detail.can_take_quiz(true));

    let done = QuestDetail {
      is_completed: true,
      ..detail
    };
    assert!(!done.can_take_quiz(false));
  }

  #[tokio::test]
  async fn signed_out_fetch_reads_only_the_quest() {
    let mut server = mockito::Server::new_async().await;
    let quest = server
      .mock("GET", "/rest/v1/quests")
      .match_query(Matcher::UrlEncoded("id".into(), "eq.5".into()))
      .with_status(200)
      .with_body(r#"{"id":5,"title":"Drip Irrigation","description":"Lay a line","xp_reward":75}"#)
      .create_async()
      .await;
    // No user_quests mock: a signed-out fetch must not ask for completions

    let store = Arc::new(MemoryStore::new());
    let client = BackendClient::with_key(&server.url(), "anon-key", store).unwrap();

    let detail = fetch_quest_detail(&client, 5).await.unwrap();
    assert_eq!(detail.quest.title, "Drip Irrigation");
    assert!(!detail.is_completed);
    quest.assert_async().await;
  }

  #[tokio::test]
  async fn query_key_varies_per_quest() {
    let store = Arc::new(MemoryStore::new());
    let client =
      BackendClient::with_key("https://example.invalid", "anon-key", store.clone()).unwrap();

    let query = quest_detail_query(client, store, 12);
    assert_eq!(query.key(), "quest_detail_12");
  }
}
