//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; failures become JSON error bodies via `AppError`.

use std::sync::Arc;
use axum::{extract::{Path, Query, State}, Json};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::logic;
use crate::protocol::*;
use crate::session::ScopeKey;
use crate::state::AppState;

/// A blank session id is a client error.
fn learner(session_id: &str) -> AppResult<&str> {
  let id = session_id.trim();
  if id.is_empty() {
    return Err(AppError::BadRequest("sessionId must not be empty".into()));
  }
  Ok(id)
}

fn scope(session_id: &str, subject: &str, subtopic: &str) -> AppResult<ScopeKey> {
  Ok(ScopeKey::new(learner(session_id)?, subject, subtopic))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut { ok: true, classifier: state.classifier.is_some() })
}

#[instrument(level = "info", skip(state))]
pub async fn http_subjects(State(state): State<Arc<AppState>>) -> Json<SubjectsOut> {
  Json(logic::subjects(&state).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_subject_tags(
  State(state): State<Arc<AppState>>,
  Path(subject): Path<String>,
) -> AppResult<Json<TagsOut>> {
  Ok(Json(logic::subject_tags(&state, &subject).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_subtopics(
  State(state): State<Arc<AppState>>,
  Path(subject): Path<String>,
) -> AppResult<Json<SubtopicsOut>> {
  Ok(Json(logic::subtopics(&state, &subject).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_start_quiz(
  State(state): State<Arc<AppState>>,
  Path((subject, subtopic)): Path<(String, String)>,
  body: Option<Json<StartQuizIn>>,
) -> AppResult<Json<QuizOut>> {
  let requested = body.and_then(|Json(b)| b.session_id).filter(|s| !s.trim().is_empty());
  let session_id = requested.unwrap_or_else(|| Uuid::new_v4().to_string());
  let key = scope(&session_id, &subject, &subtopic)?;
  let out = logic::start_quiz(&state, &key).await?;
  info!(target: "quizpath", %subject, %subtopic, questions = out.questions.len(), "HTTP quiz served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body), fields(answers = body.answers.len()))]
pub async fn http_analyze(
  State(state): State<Arc<AppState>>,
  Path((subject, subtopic)): Path<(String, String)>,
  Json(body): Json<AnalyzeIn>,
) -> AppResult<Json<AnalyzeOut>> {
  let key = scope(&body.session_id, &subject, &subtopic)?;
  let out = logic::analyze(&state, &key, &body.submission()?).await?;
  info!(target: "analysis", %subject, %subtopic, percentage = out.score.percentage, weak = out.weak_topics.len(), "HTTP analysis done");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_generate_remedial(
  State(state): State<Arc<AppState>>,
  Path((subject, subtopic)): Path<(String, String)>,
  Json(body): Json<SessionIn>,
) -> AppResult<Json<RemedialOut>> {
  let key = scope(&body.session_id, &subject, &subtopic)?;
  Ok(Json(logic::generate_remediation(&state, &key).await?))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_take_remedial(
  State(state): State<Arc<AppState>>,
  Path((subject, subtopic)): Path<(String, String)>,
  Query(q): Query<SessionQuery>,
) -> AppResult<Json<RemedialOut>> {
  let key = scope(&q.session_id, &subject, &subtopic)?;
  Ok(Json(logic::remedial_quiz(&state, &key).await?))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_results(
  State(state): State<Arc<AppState>>,
  Path((subject, subtopic)): Path<(String, String)>,
  Query(q): Query<SessionQuery>,
) -> AppResult<Json<ResultsOut>> {
  let key = scope(&q.session_id, &subject, &subtopic)?;
  Ok(Json(logic::results(&state, &key).await?))
}

#[instrument(level = "info", skip(state, body), fields(subject = %body.subject, tags = body.tags.len()))]
pub async fn http_find_lessons(
  State(state): State<Arc<AppState>>,
  Json(body): Json<FindLessonsIn>,
) -> AppResult<Json<FindLessonsOut>> {
  Ok(Json(logic::find_lessons(&state, &body.subject, body.tags).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_lesson(
  State(state): State<Arc<AppState>>,
  Path((subject, subtopic, lesson_id)): Path<(String, String, String)>,
) -> AppResult<Json<LessonOut>> {
  Ok(Json(logic::lesson(&state, &subject, &subtopic, &lesson_id).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_clear_cache(
  State(state): State<Arc<AppState>>,
  body: Option<Json<ClearCacheIn>>,
) -> AppResult<Json<ClearCacheOut>> {
  let req = body.map(|Json(b)| b).unwrap_or_default();
  let cleared = logic::clear_cache(&state, req.subject.as_deref(), req.subtopic.as_deref()).await?;
  Ok(Json(ClearCacheOut { cleared }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_videos(
  State(state): State<Arc<AppState>>,
  Path((subject, subtopic)): Path<(String, String)>,
) -> AppResult<Json<VideosOut>> {
  Ok(Json(logic::videos(&state, &subject, &subtopic).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_video(
  State(state): State<Arc<AppState>>,
  Path((subject, subtopic, topic_key)): Path<(String, String, String)>,
) -> AppResult<Json<VideoOut>> {
  Ok(Json(logic::video(&state, &subject, &subtopic, &topic_key).await?))
}

#[instrument(level = "info", skip(state, body), fields(topic = ?body.topic))]
pub async fn http_update_progress(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ProgressIn>,
) -> AppResult<Json<ProgressOut>> {
  let learner = learner(&body.session_id)?;
  Ok(Json(logic::update_progress(&state, learner, body.topic.as_deref(), body.progress).await?))
}

#[instrument(level = "info", skip(state, q))]
pub async fn http_progress(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SessionQuery>,
) -> AppResult<Json<ProgressOut>> {
  Ok(Json(logic::progress(&state, learner(&q.session_id)?).await))
}
