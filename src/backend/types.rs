use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated backend session, persisted across restarts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  pub refresh_token: String,
  pub user: AuthUser,
  pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
  /// Whether the access token has expired (with a small clock-skew buffer)
  pub fn is_expired(&self) -> bool {
    match self.expires_at {
      Some(at) => at - chrono::Duration::seconds(60) <= Utc::now(),
      None => false,
    }
  }
}

/// The user a session belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
  pub id: String,
  pub email: Option<String>,
}

/// A row from the profiles table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
  pub id: String,
  /// Spendable balance; null for freshly provisioned rows
  pub coins: Option<i64>,
  pub xp: Option<i64>,
  pub language: Option<String>,
}

/// Partial update for a profiles row; unset fields are left untouched
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub coins: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub xp: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub language: Option<String>,
}

/// A row from the market_prices table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
  pub id: i64,
  /// Stable crop identifier, e.g. "black_pepper"
  pub crop_id: String,
  pub name: String,
  pub price: f64,
  /// Pricing unit, e.g. "kg" or "quintal"
  pub unit: String,
  #[serde(default)]
  pub trend: Trend,
  #[serde(default)]
  pub change: f64,
  pub last_updated: Option<DateTime<Utc>>,
}

/// Price movement since the previous sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
  Up,
  Down,
  #[default]
  #[serde(other)]
  Stable,
}

/// A row from the quests table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
  pub id: i64,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub xp_reward: i64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_trend_reads_as_stable() {
    let price: MarketPrice = serde_json::from_str(
      r#"{"id":1,"crop_id":"rice","name":"Rice","price":42.0,"unit":"kg","trend":"sideways"}"#,
    )
    .unwrap();
    assert_eq!(price.trend, Trend::Stable);
  }

  #[test]
  fn missing_trend_defaults_to_stable() {
    let price: MarketPrice = serde_json::from_str(
      r#"{"id":1,"crop_id":"rice","name":"Rice","price":42.0,"unit":"kg"}"#,
    )
    .unwrap();
    assert_eq!(price.trend, Trend::Stable);
    assert_eq!(price.change, 0.0);
  }

  #[test]
  fn session_expiry_honors_buffer() {
    let session = Session {
      access_token: "t".to_string(),
      refresh_token: "r".to_string(),
      user: AuthUser {
        id: "u1".to_string(),
        email: None,
      },
      expires_at: Some(Utc::now() + chrono::Duration::seconds(30)),
    };
    assert!(session.is_expired());

    let session = Session {
      expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
      ..session
    };
    assert!(!session.is_expired());
  }

  #[test]
  fn profile_update_serializes_only_set_fields() {
    let update = ProfileUpdate {
      coins: Some(250),
      ..Default::default()
    };
    assert_eq!(serde_json::to_string(&update).unwrap(), r#"{"coins":250}"#);
  }
}
