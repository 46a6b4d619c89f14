//! Reward vine: a fixed ladder of discounts unlocked with coins.
//!
//! Nodes unlock strictly bottom-up. Unlocking debits the profile's coin
//! balance and records the reward; redemption happens offline via a QR
//! payload shown to the vendor.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendClient, ProfileUpdate};

struct CatalogEntry {
  id: i64,
  cost: i64,
  title: &'static str,
  kind: RewardKind,
}

/// Launch reward ladder, fixed client-side like the lesson catalog.
const REWARD_CATALOG: &[CatalogEntry] = &[
  CatalogEntry {
    id: 1,
    cost: 1000,
    title: "3% OFF RATION",
    kind: RewardKind::Ration,
  },
  CatalogEntry {
    id: 2,
    cost: 3000,
    title: "2% DISC SEEDS",
    kind: RewardKind::Seeds,
  },
  CatalogEntry {
    id: 3,
    cost: 5000,
    title: "5% OFF RATION",
    kind: RewardKind::Ration,
  },
  CatalogEntry {
    id: 4,
    cost: 6000,
    title: "6% OFF FERTILIZER",
    kind: RewardKind::Fertilizer,
  },
  CatalogEntry {
    id: 5,
    cost: 8000,
    title: "5% DISC SEEDS",
    kind: RewardKind::Seeds,
  },
  CatalogEntry {
    id: 6,
    cost: 10000,
    title: "10% OFF RATION",
    kind: RewardKind::Ration,
  },
];

/// What a reward node discounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
  Ration,
  Seeds,
  Fertilizer,
}

/// One node on the reward vine with its resolved unlock state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardNode {
  pub id: i64,
  pub cost: i64,
  pub title: String,
  pub kind: RewardKind,
  pub unlocked: bool,
  /// Next in line: the only node that can be unlocked right now
  pub current: bool,
}

/// The full vine plus the balance available to spend on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardTree {
  pub nodes: Vec<RewardNode>,
  pub coins: i64,
}

/// Result of an unlock attempt; only `Unlocked` touched the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
  Unlocked { remaining_coins: i64 },
  AlreadyUnlocked,
  NotNextInLine,
  InsufficientCoins { needed: i64 },
}

/// Resolve the static catalog against the set of unlocked reward ids.
///
/// The current node is the one after the highest unlocked id, or the
/// first node when nothing is unlocked yet.
pub fn resolve_nodes(unlocked: &[i64]) -> Vec<RewardNode> {
  let max_unlocked = unlocked.iter().copied().max();

  REWARD_CATALOG
    .iter()
    .map(|entry| {
      let is_unlocked = unlocked.contains(&entry.id);
      let current = !is_unlocked
        && match max_unlocked {
          Some(max) => entry.id == max + 1,
          None => entry.id == 1,
        };
      RewardNode {
        id: entry.id,
        cost: entry.cost,
        title: entry.title.to_string(),
        kind: entry.kind,
        unlocked: is_unlocked,
        current,
      }
    })
    .collect()
}

/// Fetch the signed-in user's reward tree: coins plus unlock states.
pub async fn fetch_reward_tree(client: &BackendClient) -> Result<RewardTree> {
  let user_id = client
    .user_id()
    .await
    .ok_or_else(|| eyre!("Not signed in"))?;

  let (profile, unlocked) = tokio::try_join!(
    client.profile(&user_id),
    client.unlocked_reward_ids(&user_id)
  )?;

  Ok(RewardTree {
    nodes: resolve_nodes(&unlocked),
    coins: profile.coins.unwrap_or(0),
  })
}

impl RewardTree {
  /// Vine fill fraction. The top segment only fills once a node past the
  /// last one would exist, so a complete ladder still reads as growing.
  pub fn progress(&self) -> f64 {
    let unlocked = self.nodes.iter().filter(|n| n.unlocked).count();
    unlocked as f64 / (self.nodes.len() + 1) as f64
  }

  /// Attempt to unlock a node, debiting coins and recording the reward.
  ///
  /// Guard failures report an outcome without touching the backend. The
  /// caller refetches the tree after a successful unlock.
  pub async fn unlock(&self, client: &BackendClient, reward_id: i64) -> Result<UnlockOutcome> {
    let node = self
      .nodes
      .iter()
      .find(|n| n.id == reward_id)
      .ok_or_else(|| eyre!("Unknown reward id: {}", reward_id))?;

    if node.unlocked {
      return Ok(UnlockOutcome::AlreadyUnlocked);
    }
    if !node.current {
      return Ok(UnlockOutcome::NotNextInLine);
    }
    if self.coins < node.cost {
      return Ok(UnlockOutcome::InsufficientCoins {
        needed: node.cost - self.coins,
      });
    }

    let user_id = client
      .user_id()
      .await
      .ok_or_else(|| eyre!("Not signed in"))?;

    let remaining_coins = self.coins - node.cost;
    let update = ProfileUpdate {
      coins: Some(remaining_coins),
      ..Default::default()
    };
    client.update_profile(&user_id, &update).await?;
    client.unlock_reward(&user_id, reward_id).await?;

    Ok(UnlockOutcome::Unlocked { remaining_coins })
  }
}

/// Payload encoded into the redemption QR code shown to the vendor.
pub fn qr_payload(reward_id: i64, user_id: &str) -> String {
  format!("REWARD:{}:{}", reward_id, user_id)
}
