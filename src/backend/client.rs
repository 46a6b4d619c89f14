use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::{header, Client as HttpClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::backend::api_types::{
  ApiAuthError, ApiLanguageRow, ApiLessonRef, ApiPointsRow, ApiRestError, ApiRewardRef,
  ApiTokenResponse,
};
use crate::backend::types::{MarketPrice, Profile, ProfileUpdate, Quest, Session};
use crate::cache::KeyValueStore;
use crate::config::Config;

/// Durable slot holding the serialized auth session
const SESSION_KEY: &str = "auth_session";

/// Backend API client wrapper.
///
/// Wraps the hosted Postgres backend: password auth under `auth/v1` and
/// table access under `rest/v1`. The signed-in session is kept in memory
/// and mirrored into the key-value store so it survives restarts.
#[derive(Clone)]
pub struct BackendClient {
  http: HttpClient,
  base_url: Url,
  anon_key: String,
  session: Arc<RwLock<Option<Session>>>,
  store: Arc<dyn KeyValueStore>,
}

impl BackendClient {
  pub fn new(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
    let anon_key = Config::get_anon_key()?;
    Self::with_key(&config.backend.url, &anon_key, store)
  }

  /// Create a client with an explicit anon key, skipping the environment
  /// lookup.
  pub fn with_key(base_url: &str, anon_key: &str, store: Arc<dyn KeyValueStore>) -> Result<Self> {
    let mut base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid backend URL {}: {}", base_url, e))?;
    if !base_url.path().ends_with('/') {
      base_url.set_path(&format!("{}/", base_url.path()));
    }

    let http = HttpClient::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      anon_key: anon_key.to_string(),
      session: Arc::new(RwLock::new(None)),
      store,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint path {}: {}", path, e))
  }

  // ==========================================================================
  // Auth
  // ==========================================================================

  /// Current session, if signed in.
  pub async fn session(&self) -> Option<Session> {
    self.session.read().await.clone()
  }

  /// Id of the signed-in user, if any.
  pub async fn user_id(&self) -> Option<String> {
    self.session.read().await.as_ref().map(|s| s.user.id.clone())
  }

  /// Sign in with email and password, persisting the session for restarts.
  pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
    let url = self.endpoint("auth/v1/token?grant_type=password")?;

    let response = self
      .http
      .post(url)
      .header("apikey", &self.anon_key)
      .bearer_auth(&self.anon_key)
      .json(&serde_json::json!({ "email": email, "password": password }))
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach auth endpoint: {}", e))?;

    if !response.status().is_success() {
      let error: ApiAuthError = response.json().await.unwrap_or_default();
      return Err(eyre!("Login failed: {}", error.message()));
    }

    let token: ApiTokenResponse = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse auth response: {}", e))?;

    let session = token.into_session();
    self.persist_session(&session);
    *self.session.write().await = Some(session.clone());
    Ok(session)
  }

  /// Exchange the refresh token for a fresh access token.
  pub async fn refresh_session(&self) -> Result<Session> {
    let refresh_token = {
      let guard = self.session.read().await;
      match guard.as_ref() {
        Some(s) => s.refresh_token.clone(),
        None => return Err(eyre!("No session to refresh")),
      }
    };

    let url = self.endpoint("auth/v1/token?grant_type=refresh_token")?;
    let response = self
      .http
      .post(url)
      .header("apikey", &self.anon_key)
      .bearer_auth(&self.anon_key)
      .json(&serde_json::json!({ "refresh_token": refresh_token }))
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach auth endpoint: {}", e))?;

    if !response.status().is_success() {
      let error: ApiAuthError = response.json().await.unwrap_or_default();
      return Err(eyre!("Session refresh failed: {}", error.message()));
    }

    let token: ApiTokenResponse = response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse auth response: {}", e))?;

    let session = token.into_session();
    self.persist_session(&session);
    *self.session.write().await = Some(session.clone());
    Ok(session)
  }

  /// Restore a persisted session from the local store.
  ///
  /// A missing or unreadable entry yields `None`. An expired session is
  /// restored as-is so the caller can decide to refresh it.
  pub async fn restore_session(&self) -> Result<Option<Session>> {
    let text = match self.store.get(SESSION_KEY)? {
      Some(text) => text,
      None => return Ok(None),
    };

    let session: Session = match serde_json::from_str(&text) {
      Ok(session) => session,
      Err(e) => {
        warn!("Discarding unreadable persisted session: {}", e);
        let _ = self.store.remove(SESSION_KEY);
        return Ok(None);
      }
    };

    *self.session.write().await = Some(session.clone());
    Ok(Some(session))
  }

  /// Sign out, revoking the server-side session and clearing local state.
  ///
  /// The server call is best effort; local state is cleared either way.
  pub async fn sign_out(&self) -> Result<()> {
    let access_token = self.session.write().await.take().map(|s| s.access_token);

    if let Some(token) = access_token {
      let url = self.endpoint("auth/v1/logout")?;
      let result = self
        .http
        .post(url)
        .header("apikey", &self.anon_key)
        .bearer_auth(&token)
        .send()
        .await;
      match result {
        Ok(response) if !response.status().is_success() => {
          debug!("Logout endpoint returned {}", response.status());
        }
        Err(e) => debug!("Logout request failed: {}", e),
        _ => {}
      }
    }

    self
      .store
      .remove(SESSION_KEY)
      .map_err(|e| eyre!("Failed to clear persisted session: {}", e))?;
    Ok(())
  }

  fn persist_session(&self, session: &Session) {
    match serde_json::to_string(session) {
      Ok(text) => {
        if let Err(e) = self.store.set(SESSION_KEY, &text) {
          warn!("Failed to persist session: {}", e);
        }
      }
      Err(e) => warn!("Failed to serialize session: {}", e),
    }
  }

  // ==========================================================================
  // Table reads
  // ==========================================================================

  /// All market prices, ordered by crop name.
  pub async fn market_prices(&self) -> Result<Vec<MarketPrice>> {
    self
      .rest_get(
        "market_prices",
        &[
          ("select", "*".to_string()),
          ("order", "name.asc".to_string()),
        ],
      )
      .await
  }

  /// Ids of lessons the user has completed.
  pub async fn completed_lesson_ids(&self, user_id: &str) -> Result<Vec<i64>> {
    let rows: Vec<ApiLessonRef> = self
      .rest_get(
        "user_lessons",
        &[
          ("select", "lesson_id".to_string()),
          ("user_id", format!("eq.{}", user_id)),
        ],
      )
      .await?;
    Ok(rows.into_iter().map(|r| r.lesson_id).collect())
  }

  /// A single quest by id.
  pub async fn quest(&self, quest_id: i64) -> Result<Quest> {
    self
      .rest_get_single(
        "quests",
        &[
          ("select", "*".to_string()),
          ("id", format!("eq.{}", quest_id)),
        ],
      )
      .await
  }

  /// Whether the user has completed the quest.
  pub async fn quest_completed(&self, user_id: &str, quest_id: i64) -> Result<bool> {
    let rows: Vec<serde_json::Value> = self
      .rest_get(
        "user_quests",
        &[
          ("select", "id".to_string()),
          ("user_id", format!("eq.{}", user_id)),
          ("quest_id", format!("eq.{}", quest_id)),
        ],
      )
      .await?;
    Ok(!rows.is_empty())
  }

  /// The user's profile row.
  pub async fn profile(&self, user_id: &str) -> Result<Profile> {
    self
      .rest_get_single(
        "profiles",
        &[("select", "*".to_string()), ("id", format!("eq.{}", user_id))],
      )
      .await
  }

  /// Language stored on the user's profile, if any.
  pub async fn profile_language(&self, user_id: &str) -> Result<Option<String>> {
    let rows: Vec<ApiLanguageRow> = self
      .rest_get(
        "profiles",
        &[
          ("select", "language".to_string()),
          ("id", format!("eq.{}", user_id)),
        ],
      )
      .await?;
    Ok(rows.into_iter().next().and_then(|r| r.language))
  }

  /// Points configured for a lesson.
  pub async fn lesson_points(&self, lesson_id: i64) -> Result<Option<i64>> {
    let rows: Vec<ApiPointsRow> = self
      .rest_get(
        "lessons",
        &[
          ("select", "points".to_string()),
          ("id", format!("eq.{}", lesson_id)),
        ],
      )
      .await?;
    Ok(rows.into_iter().next().and_then(|r| r.points))
  }

  /// Reward ids the user has unlocked.
  pub async fn unlocked_reward_ids(&self, user_id: &str) -> Result<Vec<i64>> {
    let rows: Vec<ApiRewardRef> = self
      .rest_get(
        "user_rewards",
        &[
          ("select", "reward_id".to_string()),
          ("user_id", format!("eq.{}", user_id)),
        ],
      )
      .await?;
    Ok(rows.into_iter().map(|r| r.reward_id).collect())
  }

  // ==========================================================================
  // Table writes
  // ==========================================================================

  /// Apply a partial update to the user's profile.
  pub async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()> {
    let request = self
      .rest_request(
        Method::PATCH,
        "profiles",
        &[("id", format!("eq.{}", user_id))],
      )
      .await?;
    let response = request
      .json(update)
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach backend: {}", e))?;
    Self::check_status(response, "profiles").await?;
    Ok(())
  }

  /// Record a completed lesson, replacing any existing completion row.
  pub async fn complete_lesson(&self, user_id: &str, lesson_id: i64) -> Result<()> {
    let body = serde_json::json!({
      "user_id": user_id,
      "lesson_id": lesson_id,
      "completed_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });

    let request = self
      .rest_request(
        Method::POST,
        "user_lessons",
        &[("on_conflict", "user_id,lesson_id".to_string())],
      )
      .await?;
    let response = request
      .header("Prefer", "resolution=merge-duplicates")
      .json(&body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach backend: {}", e))?;
    Self::check_status(response, "user_lessons").await?;
    Ok(())
  }

  /// Record an unlocked reward for the user.
  pub async fn unlock_reward(&self, user_id: &str, reward_id: i64) -> Result<()> {
    let body = serde_json::json!({ "user_id": user_id, "reward_id": reward_id });

    let request = self.rest_request(Method::POST, "user_rewards", &[]).await?;
    let response = request
      .json(&body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach backend: {}", e))?;
    Self::check_status(response, "user_rewards").await?;
    Ok(())
  }

  // ==========================================================================
  // Request plumbing
  // ==========================================================================

  /// Bearer token for data calls: the user's token when signed in, the anon
  /// key otherwise.
  async fn bearer(&self) -> String {
    match self.session.read().await.as_ref() {
      Some(s) => s.access_token.clone(),
      None => self.anon_key.clone(),
    }
  }

  async fn rest_request(
    &self,
    method: Method,
    table: &str,
    query: &[(&str, String)],
  ) -> Result<RequestBuilder> {
    let url = self.endpoint(&format!("rest/v1/{}", table))?;
    let bearer = self.bearer().await;
    Ok(
      self
        .http
        .request(method, url)
        .header("apikey", &self.anon_key)
        .bearer_auth(bearer)
        .query(query),
    )
  }

  async fn rest_get<T: DeserializeOwned>(
    &self,
    table: &str,
    query: &[(&str, String)],
  ) -> Result<Vec<T>> {
    let request = self.rest_request(Method::GET, table, query).await?;
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach backend: {}", e))?;
    let response = Self::check_status(response, table).await?;
    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {} rows: {}", table, e))
  }

  /// Fetch exactly one row as an object rather than a one-element array.
  async fn rest_get_single<T: DeserializeOwned>(
    &self,
    table: &str,
    query: &[(&str, String)],
  ) -> Result<T> {
    let request = self.rest_request(Method::GET, table, query).await?;
    let response = request
      .header(header::ACCEPT, "application/vnd.pgrst.object+json")
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach backend: {}", e))?;
    let response = Self::check_status(response, table).await?;
    response
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {} row: {}", table, e))
  }

  async fn check_status(response: Response, table: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let message = match response.json::<ApiRestError>().await {
      Ok(body) => body.message.unwrap_or_else(|| status.to_string()),
      Err(_) => status.to_string(),
    };
    Err(eyre!("Backend request for {} failed: {}", table, message))
  }
}

impl std::fmt::Debug for BackendClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BackendClient")
      .field("base_url", &self.base_url.as_str())
      .finish_non_exhaustive()
  }
}
