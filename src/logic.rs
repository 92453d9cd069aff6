//! Pipeline orchestration shared by the HTTP handlers.
//!
//! This includes:
//!   - Starting a quiz (snapshot of served questions per scope)
//!   - Analysis: grade → prompt → classifier → validate → commit weak tags
//!   - Remediation: follow-up questions + review lessons from weak tags
//!   - Results, lesson lookup and content listings (subjects, videos)
//!   - Per-learner topic progress
//!
//! Every operation re-reads the content it needs, so cache invalidation
//! between requests is always safe.

use tracing::{debug, error, info, instrument, warn};

use crate::content::ContentRepository;
use crate::domain::default_quiz_title;
use crate::error::{AppError, AppResult, ClassifierFailure};
use crate::grading::{grade_submission, Submission};
use crate::prompt::build_analysis_prompt;
use crate::protocol::{
  served_questions, AnalyzeOut, FindLessonsOut, LessonOut, ProgressOut, QuizOut, RemedialOut, ResultsOut, SubjectsOut,
  SubtopicOut, SubtopicsOut, TagsOut, VideoOut, VideosOut,
};
use crate::remediation::{build_bundle, find_lessons_by_tags, select_lessons};
use crate::response::validate_response;
use crate::session::{AnalysisSummary, QuizType, ScopeKey};
use crate::state::AppState;
use crate::util::trunc_for_log;

/// Serve the subtopic's quiz and reset the learner's scope.
#[instrument(level = "info", skip(state), fields(subject = %key.subject, subtopic = %key.subtopic))]
pub async fn start_quiz(state: &AppState, key: &ScopeKey) -> AppResult<QuizOut> {
  let cfg = ensure_subject(state.content.as_ref(), &key.subject).await?;
  if !cfg.has_subtopic(&key.subtopic) {
    return Err(AppError::ContentNotFound(format!("Subtopic '{}' not found in {}.", key.subtopic, key.subject)));
  }

  let questions = state.content.quiz_questions(&key.subject, &key.subtopic).await;
  if questions.is_empty() {
    warn!(target: "quizpath", subject = %key.subject, subtopic = %key.subtopic, "Quiz missing or has no questions");
    return Err(AppError::ContentNotFound(format!("No quiz questions found for {}/{}.", key.subject, key.subtopic)));
  }
  let title = state
    .content
    .quiz(&key.subject, &key.subtopic)
    .await
    .map(|q| q.title)
    .filter(|t| !t.trim().is_empty())
    .unwrap_or_else(|| default_quiz_title(&key.subject, &key.subtopic));

  let epoch = state.sessions.start_quiz(key, questions.clone()).await;
  info!(target: "quizpath", epoch, questions = questions.len(), "Quiz started");

  Ok(QuizOut {
    session_id: key.learner.clone(),
    quiz_type: QuizType::Initial,
    title,
    questions: served_questions(&questions),
  })
}

/// Grade the submission, ask the classifier for weak tags, and commit the result.
///
/// Any classifier failure aborts before the scope is touched, so earlier
/// weak tags stay as they were.
#[instrument(level = "info", skip(state, submission), fields(subject = %key.subject, subtopic = %key.subtopic, answers = submission.len()))]
pub async fn analyze(state: &AppState, key: &ScopeKey, submission: &Submission) -> AppResult<AnalyzeOut> {
  let record = state.sessions.get(key).await.ok_or_else(AppError::session_missing)?;
  let served = record.served_for_analysis()?;

  let report = grade_submission(served, submission, state.mastery_threshold);
  let invalid = report.invalid_positions();
  if !invalid.is_empty() {
    warn!(target: "analysis", ?invalid, "Submission contains structurally invalid questions");
  }
  debug!(
    target: "analysis",
    correct = report.score.correct,
    total = report.score.total,
    percentage = report.score.percentage,
    "Submission graded"
  );

  let vocab = state.content.allowed_tags(&key.subject).await;
  if vocab.is_empty() {
    warn!(target: "analysis", subject = %key.subject, "Subject has no allowed tags; no weak tags can be accepted");
  }
  let prompt = build_analysis_prompt(&state.prompts, &report.transcript(), &vocab);

  let classifier = state
    .classifier
    .as_ref()
    .ok_or_else(|| ClassifierFailure::Unavailable("no classifier configured".into()))?;

  let raw = match tokio::time::timeout(state.classifier_timeout, classifier.classify(&prompt)).await {
    Ok(reply) => reply?,
    Err(_) => {
      error!(target: "analysis", classifier = classifier.name(), timeout = ?state.classifier_timeout, "Classifier timed out");
      return Err(ClassifierFailure::Unavailable("classifier timed out".into()).into());
    }
  };

  let verdict = match validate_response(&raw, &vocab) {
    Ok(v) => v,
    Err(e) => {
      error!(target: "analysis", error = %e, raw = %trunc_for_log(&raw, 300), "Classifier response rejected");
      debug!(target: "analysis", raw = %raw, "Full rejected classifier response");
      return Err(e.into());
    }
  };
  if !verdict.rejected.is_empty() {
    warn!(target: "analysis", rejected = ?verdict.rejected, "Dropped tags outside the allowed vocabulary");
  }
  info!(target: "analysis", weak_tags = ?verdict.weak_tags, "Analysis complete");

  let summary = AnalysisSummary { feedback: verdict.feedback.clone(), score: report.score };
  let weak_tags = verdict.weak_tags.clone();
  state
    .sessions
    .update_if_current(key, record.epoch, move |r| {
      r.record_analysis(weak_tags, summary);
      Ok(())
    })
    .await?;

  Ok(AnalyzeOut {
    feedback: verdict.feedback,
    weak_topics: verdict.weak_tags,
    score: report.score,
    outcomes: report.outcomes,
  })
}

/// Build and store the remedial quiz for the last analysis.
#[instrument(level = "info", skip(state), fields(subject = %key.subject, subtopic = %key.subtopic))]
pub async fn generate_remediation(state: &AppState, key: &ScopeKey) -> AppResult<RemedialOut> {
  let record = state.sessions.get(key).await.ok_or_else(AppError::session_missing)?;

  let weak_tags = match record.weak_tags_for_remediation() {
    Ok(tags) => tags,
    Err(e @ AppError::NoWeakTopics) => {
      info!(target: "remediation", "No weak topics; nothing to remediate");
      return Err(remember_failure(state, key, record.epoch, e).await);
    }
    Err(e) => return Err(e),
  };

  let pool = state.content.question_pool(&key.subject, &key.subtopic).await;
  let catalog = state.content.lesson_catalog(&key.subject).await;
  debug!(target: "remediation", pool = pool.len(), catalog = catalog.len(), ?weak_tags, "Selecting remediation");

  let bundle = match build_bundle(&weak_tags, &pool, &catalog) {
    Ok(b) => b,
    Err(e) => {
      warn!(target: "remediation", ?weak_tags, "No pool questions match the weak tags");
      return Err(remember_failure(state, key, record.epoch, e).await);
    }
  };

  let unmatched: Vec<String> = bundle.unmatched_tags().into_iter().map(str::to_string).collect();
  if !unmatched.is_empty() {
    debug!(target: "remediation", ?unmatched, "Weak tags without a review lesson");
  }
  info!(target: "remediation", questions = bundle.remedial_questions.len(), "Remedial quiz generated");

  let lessons = bundle.lessons.clone();
  let (title, questions) = state
    .sessions
    .update_if_current(key, record.epoch, move |r| {
      r.record_remediation(bundle);
      r.remedial_quiz()
    })
    .await?;

  Ok(RemedialOut {
    session_id: key.learner.clone(),
    title,
    targeted_topics: weak_tags,
    questions: served_questions(&questions),
    lessons,
    unmatched_topics: unmatched,
  })
}

/// Store the user-facing message of a generation failure, then hand the error back.
async fn remember_failure(state: &AppState, key: &ScopeKey, epoch: u64, err: AppError) -> AppError {
  let message = err.user_message();
  let stored = state
    .sessions
    .update_if_current(key, epoch, |r| {
      r.fail_generation(message);
      Ok(())
    })
    .await;
  match stored {
    Ok(()) => err,
    Err(restarted) => restarted,
  }
}

/// The stored remedial quiz, for taking it (again).
#[instrument(level = "info", skip(state), fields(subject = %key.subject, subtopic = %key.subtopic))]
pub async fn remedial_quiz(state: &AppState, key: &ScopeKey) -> AppResult<RemedialOut> {
  let (title, questions) = state.sessions.update(key, |r| r.remedial_quiz()).await?;
  let record = state.sessions.get(key).await.ok_or_else(AppError::session_missing)?;
  let bundle = record.remediation.unwrap_or_default();
  let unmatched_topics = bundle.unmatched_tags().into_iter().map(str::to_string).collect();
  Ok(RemedialOut {
    session_id: key.learner.clone(),
    title,
    questions: served_questions(&questions),
    targeted_topics: record.targeted_topics,
    lessons: bundle.lessons,
    unmatched_topics,
  })
}

/// Results of the last analysis plus recommended lessons.
#[instrument(level = "info", skip(state), fields(subject = %key.subject, subtopic = %key.subtopic))]
pub async fn results(state: &AppState, key: &ScopeKey) -> AppResult<ResultsOut> {
  let snap = state.sessions.update(key, |r| r.show_results()).await?;

  let (recommended_lessons, remedial_questions) = match snap.remediation {
    Some(bundle) => (bundle.lessons, bundle.remedial_questions),
    None if !snap.weak_tags.is_empty() => {
      let catalog = state.content.lesson_catalog(&key.subject).await;
      (select_lessons(&snap.weak_tags, &catalog), vec![])
    }
    None => (vec![], vec![]),
  };
  let subtopic_lessons = state.content.lessons(&key.subject, &key.subtopic).await;
  let videos = state.content.videos(&key.subject, &key.subtopic).await.into_iter().map(VideoOut::from).collect();

  if let Some(msg) = &snap.pending_error {
    debug!(target: "quizpath", message = %msg, "Showing pending generation message");
  }

  Ok(ResultsOut {
    quiz_type: snap.quiz_type,
    score: snap.last_analysis.as_ref().map(|a| a.score),
    feedback: snap.last_analysis.map(|a| a.feedback),
    weak_topics: snap.weak_tags,
    recommended_lessons,
    remedial_questions: served_questions(&remedial_questions),
    subtopic_lessons,
    videos,
    quiz_generation_error: snap.pending_error,
  })
}

#[instrument(level = "info", skip(state, tags), fields(%subject, tags = tags.len()))]
pub async fn find_lessons(state: &AppState, subject: &str, tags: Vec<String>) -> AppResult<FindLessonsOut> {
  if tags.is_empty() {
    return Err(AppError::BadRequest("tags must not be empty".into()));
  }
  ensure_subject(state.content.as_ref(), subject).await?;
  let catalog = state.content.lesson_catalog(subject).await;
  let lessons = find_lessons_by_tags(&tags, &catalog);
  Ok(FindLessonsOut { count: lessons.len(), lessons, searched_tags: tags })
}

#[instrument(level = "info", skip(state))]
pub async fn lesson(state: &AppState, subject: &str, subtopic: &str, lesson_id: &str) -> AppResult<LessonOut> {
  let entry = state
    .content
    .lessons(subject, subtopic)
    .await
    .into_iter()
    .find(|e| e.id == lesson_id)
    .ok_or_else(|| AppError::ContentNotFound(format!("Lesson '{}' not found in {}/{}.", lesson_id, subject, subtopic)))?;
  Ok(LessonOut {
    subject: subject.into(),
    subtopic: subtopic.into(),
    lesson_id: entry.id,
    lesson: entry.lesson,
  })
}

#[instrument(level = "info", skip(state))]
pub async fn subject_tags(state: &AppState, subject: &str) -> AppResult<TagsOut> {
  let cfg = ensure_subject(state.content.as_ref(), subject).await?;
  Ok(TagsOut { subject: subject.into(), tags: cfg.allowed_keywords })
}

#[instrument(level = "info", skip(state))]
pub async fn subtopics(state: &AppState, subject: &str) -> AppResult<SubtopicsOut> {
  let cfg = ensure_subject(state.content.as_ref(), subject).await?;
  let subtopics = cfg
    .subtopics
    .into_iter()
    .map(|(id, info)| SubtopicOut { id, name: info.name, description: info.description, order: info.order })
    .collect();
  Ok(SubtopicsOut { subject: subject.into(), subtopics })
}

/// Subjects that have both a config and display info.
#[instrument(level = "info", skip(state))]
pub async fn subjects(state: &AppState) -> SubjectsOut {
  let subjects = state.content.subjects().await;
  debug!(target: "content", count = subjects.len(), "Subjects discovered");
  SubjectsOut { subjects }
}

#[instrument(level = "info", skip(state))]
pub async fn videos(state: &AppState, subject: &str, subtopic: &str) -> AppResult<VideosOut> {
  let cfg = ensure_subject(state.content.as_ref(), subject).await?;
  if !cfg.has_subtopic(subtopic) {
    return Err(AppError::ContentNotFound(format!("Subtopic '{}' not found in {}.", subtopic, subject)));
  }
  let videos = state.content.videos(subject, subtopic).await.into_iter().map(VideoOut::from).collect();
  Ok(VideosOut { subject: subject.into(), subtopic: subtopic.into(), videos })
}

#[instrument(level = "info", skip(state))]
pub async fn video(state: &AppState, subject: &str, subtopic: &str, topic_key: &str) -> AppResult<VideoOut> {
  state
    .content
    .videos(subject, subtopic)
    .await
    .into_iter()
    .find(|v| v.key == topic_key)
    .map(VideoOut::from)
    .ok_or_else(|| AppError::ContentNotFound(format!("Video '{}' not found in {}/{}.", topic_key, subject, subtopic)))
}

/// Record one topic's progress. Both the topic and a non-null value are required.
#[instrument(level = "info", skip(state, progress))]
pub async fn update_progress(
  state: &AppState,
  learner: &str,
  topic: Option<&str>,
  progress: Option<serde_json::Value>,
) -> AppResult<ProgressOut> {
  let topic = topic.map(str::trim).filter(|t| !t.is_empty());
  let (Some(topic), Some(value)) = (topic, progress.filter(|v| !v.is_null())) else {
    return Err(AppError::BadRequest("Missing data: topic and progress are required".into()));
  };
  let progress = state.sessions.record_progress(learner, topic.to_string(), value).await;
  debug!(target: "quizpath", %topic, topics = progress.len(), "Progress recorded");
  Ok(ProgressOut { session_id: learner.into(), progress })
}

#[instrument(level = "info", skip(state))]
pub async fn progress(state: &AppState, learner: &str) -> ProgressOut {
  ProgressOut { session_id: learner.into(), progress: state.sessions.progress(learner).await }
}

/// Drop cached content: everything, or one subtopic.
#[instrument(level = "info", skip(state))]
pub async fn clear_cache(state: &AppState, subject: Option<&str>, subtopic: Option<&str>) -> AppResult<String> {
  let cleared = match (subject, subtopic) {
    (Some(s), Some(t)) => {
      state.content.invalidate(Some((s, t))).await;
      format!("{}/{}", s, t)
    }
    (None, None) => {
      state.content.invalidate(None).await;
      "all".to_string()
    }
    _ => return Err(AppError::BadRequest("subject and subtopic must be given together".into())),
  };
  info!(target: "content", %cleared, "Content cache cleared");
  Ok(cleared)
}

async fn ensure_subject(content: &dyn ContentRepository, subject: &str) -> AppResult<crate::domain::SubjectConfig> {
  content
    .subject_config(subject)
    .await
    .ok_or_else(|| AppError::ContentNotFound(format!("Subject '{}' not found.", subject)))
}
