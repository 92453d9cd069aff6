//! Error taxonomy of the remediation pipeline and its HTTP mapping.
//!
//! Grading problems never show up here: they are per-question outcomes.
//! Everything below aborts the request it happens in.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;

/// Why the external classifier could not produce a usable analysis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierFailure {
  /// Call failed, timed out, or no classifier is configured.
  #[error("classifier unavailable: {0}")]
  Unavailable(String),
  /// No JSON value could be extracted, or the object carries none of the expected fields.
  #[error("malformed classifier response: {0}")]
  MalformedResponse(String),
  /// JSON was found but it is not the object/field types we asked for.
  #[error("unexpected classifier response shape: {0}")]
  UnexpectedShape(String),
}

#[derive(Error, Debug)]
pub enum AppError {
  #[error("not found: {0}")]
  ContentNotFound(String),

  /// Analysis or remediation requested without the quiz state it needs.
  #[error("{0}")]
  SessionStateMissing(String),

  /// Analysis ran and found nothing to remediate.
  #[error("You've mastered all identified topics! No remedial quiz needed.")]
  NoWeakTopics,

  #[error("No remedial questions are available for weak topics: {}", .tags.join(", "))]
  NoRemedialContent { tags: Vec<String> },

  #[error(transparent)]
  Classifier(#[from] ClassifierFailure),

  #[error("bad request: {0}")]
  BadRequest(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
  pub fn session_missing() -> Self {
    AppError::SessionStateMissing("Quiz session data not found. Please take the main quiz first.".into())
  }

  /// Stable machine-readable code for clients.
  pub fn code(&self) -> &'static str {
    match self {
      AppError::ContentNotFound(_) => "content_not_found",
      AppError::SessionStateMissing(_) => "session_state_missing",
      AppError::NoWeakTopics => "no_weak_topics",
      AppError::NoRemedialContent { .. } => "no_remedial_content",
      AppError::Classifier(ClassifierFailure::Unavailable(_)) => "classifier_unavailable",
      AppError::Classifier(ClassifierFailure::MalformedResponse(_)) => "malformed_classifier_response",
      AppError::Classifier(ClassifierFailure::UnexpectedShape(_)) => "unexpected_classifier_shape",
      AppError::BadRequest(_) => "bad_request",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      AppError::ContentNotFound(_) => StatusCode::NOT_FOUND,
      AppError::SessionStateMissing(_) => StatusCode::BAD_REQUEST,
      AppError::NoWeakTopics => StatusCode::CONFLICT,
      AppError::NoRemedialContent { .. } => StatusCode::NOT_FOUND,
      AppError::Classifier(ClassifierFailure::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Classifier(_) => StatusCode::BAD_GATEWAY,
      AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
    }
  }

  /// Text shown to the learner. Classifier internals stay in the logs.
  pub fn user_message(&self) -> String {
    match self {
      AppError::Classifier(ClassifierFailure::Unavailable(_)) => {
        "Could not complete analysis: the analysis service is unavailable. Please try again.".into()
      }
      AppError::Classifier(ClassifierFailure::MalformedResponse(_)) => {
        "Could not complete analysis: the analysis response did not contain a valid JSON object.".into()
      }
      AppError::Classifier(ClassifierFailure::UnexpectedShape(_)) => {
        "Could not complete analysis: the analysis response format was invalid.".into()
      }
      AppError::NoRemedialContent { .. } => {
        "We couldn't find specific follow-up questions for your weak topics. Please review the materials and try the main quiz again.".into()
      }
      other => other.to_string(),
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let body = Json(json!({
      "error": self.code(),
      "message": self.user_message(),
    }));
    (self.status(), body).into_response()
  }
}
