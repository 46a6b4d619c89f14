//! Lesson list joined with per-user progress.
//!
//! Lesson content is fixed client-side for the launch curriculum; only
//! completion rows come from the backend. Statuses unlock strictly in
//! sequence order.

use std::collections::HashSet;
use std::sync::Arc;

use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::backend::BackendClient;
use crate::cache::{CachedQuery, KeyValueStore};

/// Durable slot for the lesson list
const LESSONS_KEY: &str = "lessons_list_static_day1";

struct CatalogEntry {
  id: i64,
  sequence: i64,
  title: &'static str,
  description: &'static str,
  points: i64,
}

/// Launch curriculum, fixed client-side so lessons past it stay hidden
/// until their content ships.
const LESSON_CATALOG: &[CatalogEntry] = &[
  CatalogEntry {
    id: 1,
    sequence: 1,
    title: "Soil Health Basics",
    description: "Understanding your land's foundation.",
    points: 100,
  },
  CatalogEntry {
    id: 2,
    sequence: 2,
    title: "Organic Fertilizers",
    description: "Boost crops naturally and safely.",
    points: 150,
  },
  CatalogEntry {
    id: 3,
    sequence: 3,
    title: "Women in Farming",
    description: "Empowering communities together.",
    points: 200,
  },
];

/// Where a lesson sits in the user's progression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
  Current,
  Completed,
  Locked,
}

/// A lesson with its resolved progression status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
  pub id: i64,
  pub sequence: i64,
  pub title: String,
  pub description: String,
  pub points: i64,
  pub status: LessonStatus,
}

/// Resolve lesson statuses from the set of completed lesson ids.
///
/// The lesson right after the highest completed sequence is current; with
/// no progress at all, the first lesson is.
fn resolve_statuses(completed_ids: &HashSet<i64>) -> Vec<Lesson> {
  let last_completed_seq = LESSON_CATALOG
    .iter()
    .filter(|entry| completed_ids.contains(&entry.id))
    .map(|entry| entry.sequence)
    .max()
    .unwrap_or(0);

  LESSON_CATALOG
    .iter()
    .map(|entry| {
      let status = if completed_ids.contains(&entry.id) {
        LessonStatus::Completed
      } else if entry.sequence == last_completed_seq + 1 {
        LessonStatus::Current
      } else {
        LessonStatus::Locked
      };

      Lesson {
        id: entry.id,
        sequence: entry.sequence,
        title: entry.title.to_string(),
        description: entry.description.to_string(),
        points: entry.points,
        status,
      }
    })
    .collect()
}

/// Fetch the lesson list joined with the signed-in user's progress.
///
/// Without a session every lesson resolves as if no progress exists.
pub async fn fetch_lessons(client: &BackendClient) -> Result<Vec<Lesson>> {
  let completed_ids: HashSet<i64> = match client.user_id().await {
    Some(user_id) => client
      .completed_lesson_ids(&user_id)
      .await?
      .into_iter()
      .collect(),
    None => HashSet::new(),
  };

  Ok(resolve_statuses(&completed_ids))
}

/// Cached query over the lesson list.
pub fn lessons_query(
  client: BackendClient,
  store: Arc<dyn KeyValueStore>,
) -> CachedQuery<Vec<Lesson>> {
  CachedQuery::new(LESSONS_KEY, store, move || {
    let client = client.clone();
    async move { fetch_lessons(&client).await }
  })
}

/// Derived view over a lesson list for the lessons screen
#[derive(Debug, Clone, PartialEq)]
pub struct LessonsSummary {
  pub current: Option<Lesson>,
  pub upcoming: Vec<Lesson>,
  /// Completed lessons, most recently reached first
  pub completed: Vec<Lesson>,
  pub total_score: i64,
}

/// Split a lesson list into the screen's sections.
pub fn summarize(lessons: &[Lesson]) -> LessonsSummary {
  let current = lessons
    .iter()
    .find(|l| l.status == LessonStatus::Current)
    .cloned();
  let upcoming: Vec<Lesson> = lessons
    .iter()
    .filter(|l| l.status == LessonStatus::Locked)
    .cloned()
    .collect();

  let mut completed: Vec<Lesson> = lessons
    .iter()
    .filter(|l| l.status == LessonStatus::Completed)
    .cloned()
    .collect();
  completed.sort_by(|a, b| b.sequence.cmp(&a.sequence));

  let total_score = completed.iter().map(|l| l.points).sum();

  LessonsSummary {
    current,
    upcoming,
    completed,
    total_score,
  }
}
