//! Serde-deserializable types matching backend API responses.
//!
//! The auth endpoints wrap their payloads differently from the shape we
//! persist, so these stay separate from the domain types. Table rows come
//! back as clean JSON and deserialize straight into domain types; only
//! narrow projections get their own row structs here.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::types::{AuthUser, Session};

// ============================================================================
// Auth endpoint responses
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTokenResponse {
  pub access_token: String,
  pub refresh_token: String,
  /// Lifetime in seconds, relative to now
  pub expires_in: Option<i64>,
  /// Absolute expiry as a unix timestamp; preferred when present
  pub expires_at: Option<i64>,
  pub user: ApiAuthUser,
}

#[derive(Debug, Deserialize)]
pub struct ApiAuthUser {
  pub id: String,
  pub email: Option<String>,
}

/// Error body from the auth endpoints.
///
/// Older deployments answer with `error`/`error_description`, newer ones
/// with `msg`.
#[derive(Debug, Default, Deserialize)]
pub struct ApiAuthError {
  pub error: Option<String>,
  pub error_description: Option<String>,
  pub msg: Option<String>,
}

impl ApiAuthError {
  pub fn message(&self) -> String {
    self
      .error_description
      .clone()
      .or_else(|| self.msg.clone())
      .or_else(|| self.error.clone())
      .unwrap_or_else(|| "Unknown error".to_string())
  }
}

// ============================================================================
// Data endpoint responses
// ============================================================================

/// Error body from the data endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ApiRestError {
  pub message: Option<String>,
}

/// Join row referencing a completed lesson
#[derive(Debug, Deserialize)]
pub struct ApiLessonRef {
  pub lesson_id: i64,
}

/// Join row referencing an unlocked reward
#[derive(Debug, Deserialize)]
pub struct ApiRewardRef {
  pub reward_id: i64,
}

/// Projection of a lessons row onto its points column
#[derive(Debug, Deserialize)]
pub struct ApiPointsRow {
  pub points: Option<i64>,
}

/// Projection of a profiles row onto its language column
#[derive(Debug, Deserialize)]
pub struct ApiLanguageRow {
  pub language: Option<String>,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiTokenResponse {
  pub fn into_session(self) -> Session {
    let expires_at = self
      .expires_at
      .and_then(|ts| DateTime::from_timestamp(ts, 0))
      .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));

    Session {
      access_token: self.access_token,
      refresh_token: self.refresh_token,
      user: AuthUser {
        id: self.user.id,
        email: self.user.email,
      },
      expires_at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_response_prefers_absolute_expiry() {
    let response: ApiTokenResponse = serde_json::from_str(
      r#"{
        "access_token": "at",
        "refresh_token": "rt",
        "expires_in": 3600,
        "expires_at": 1756000000,
        "user": { "id": "u1", "email": "demo@khet.com" }
      }"#,
    )
    .unwrap();

    let session = response.into_session();
    assert_eq!(
      session.expires_at,
      DateTime::from_timestamp(1756000000, 0)
    );
    assert_eq!(session.user.id, "u1");
  }

  #[test]
  fn token_response_falls_back_to_relative_expiry() {
    let response: ApiTokenResponse = serde_json::from_str(
      r#"{
        "access_token": "at",
        "refresh_token": "rt",
        "expires_in": 3600,
        "user": { "id": "u1" }
      }"#,
    )
    .unwrap();

    let before = Utc::now();
    let session = response.into_session();
    let expires_at = session.expires_at.unwrap();
    assert!(expires_at >= before + Duration::seconds(3590));
    assert!(expires_at <= Utc::now() + Duration::seconds(3610));
  }

  #[test]
  fn auth_error_message_tries_all_fields() {
    let error: ApiAuthError =
      serde_json::from_str(r#"{"code":400,"msg":"Invalid login credentials"}"#).unwrap();
    assert_eq!(error.message(), "Invalid login credentials");

    let error: ApiAuthError =
      serde_json::from_str(r#"{"error":"invalid_grant","error_description":"Bad password"}"#)
        .unwrap();
    assert_eq!(error.message(), "Bad password");

    assert_eq!(ApiAuthError::default().message(), "Unknown error");
  }
}
