//! Submission grading.
//!
//! Scores raw answers against the served questions, index for index, and renders
//! the per-question transcript that is later handed to the classifier.
//! Pure: no I/O, no state.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Question, QuestionKind};

const NO_ANSWER: &str = "[No answer provided]";

/// Learner answers keyed by 0-based position in serving order.
pub type Submission = BTreeMap<usize, String>;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GradeStatus {
  Correct,
  Incorrect,
  /// The question itself is broken (e.g. `answer_index` out of range).
  InvalidQuestionData,
  /// Coding answers are left to the classifier.
  PendingReview,
}

impl GradeStatus {
  fn label(&self) -> &'static str {
    match self {
      GradeStatus::Correct => "Correct",
      GradeStatus::Incorrect => "Incorrect",
      GradeStatus::InvalidQuestionData => "Invalid Question Data",
      GradeStatus::PendingReview => "For AI Review",
    }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
  pub position: usize,
  pub status: GradeStatus,
  #[serde(skip)]
  pub detail: String,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Score {
  pub correct: usize,
  pub total: usize,
  pub percentage: u32,
  pub mastered: bool,
}

impl Score {
  /// `percentage` rounds half to even; 0 when there are no questions.
  pub fn new(correct: usize, total: usize, mastery_threshold: f64) -> Self {
    if total == 0 {
      return Self { correct, total, percentage: 0, mastered: false };
    }
    let ratio = correct as f64 / total as f64;
    Self {
      correct,
      total,
      percentage: (ratio * 100.0).round_ties_even() as u32,
      mastered: ratio >= mastery_threshold,
    }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GradeReport {
  pub outcomes: Vec<GradeOutcome>,
  pub score: Score,
}

impl GradeReport {
  /// Concatenated per-question details, in quiz order.
  pub fn transcript(&self) -> String {
    self.outcomes.iter().map(|o| o.detail.as_str()).collect()
  }

  pub fn invalid_positions(&self) -> Vec<usize> {
    self
      .outcomes
      .iter()
      .filter(|o| o.status == GradeStatus::InvalidQuestionData)
      .map(|o| o.position)
      .collect()
  }
}

/// Grade every served question. Invalid questions count toward `total` but never `correct`.
pub fn grade_submission(questions: &[Question], submission: &Submission, mastery_threshold: f64) -> GradeReport {
  let outcomes: Vec<GradeOutcome> = questions
    .iter()
    .enumerate()
    .map(|(i, q)| grade_question(i, q, submission.get(&i).map(String::as_str)))
    .collect();
  let correct = outcomes.iter().filter(|o| o.status == GradeStatus::Correct).count();
  GradeReport { score: Score::new(correct, questions.len(), mastery_threshold), outcomes }
}

fn grade_question(position: usize, q: &Question, answer: Option<&str>) -> GradeOutcome {
  let mut detail = format!(
    "Question {} (Type: {}): {}\nStudent's Answer:\n---\n{}\n---\n",
    position + 1,
    q.kind.as_str(),
    q.text,
    answer.unwrap_or(NO_ANSWER)
  );

  let status = match q.kind {
    QuestionKind::MultipleChoice => match q.correct_option() {
      None => GradeStatus::InvalidQuestionData,
      Some(expected) if answer == Some(expected) => GradeStatus::Correct,
      Some(expected) => {
        detail.push_str(&format!("Correct Answer: {}\n", expected));
        GradeStatus::Incorrect
      }
    },
    QuestionKind::FillInTheBlank => {
      let raw = q.correct_answer.as_deref().unwrap_or("");
      if alternatives(raw).next().is_none() {
        GradeStatus::InvalidQuestionData
      } else if answer.is_some_and(|a| blank_matches(raw, a)) {
        GradeStatus::Correct
      } else {
        detail.push_str(&format!("Correct Answer(s): {}\n", raw));
        GradeStatus::Incorrect
      }
    }
    QuestionKind::Coding => {
      if let Some(sample) = q.sample_solution.as_deref().filter(|s| !s.is_empty()) {
        detail.push_str(&format!("Sample Solution:\n---\n{}\n---\n", sample));
      }
      GradeStatus::PendingReview
    }
  };

  // Nothing submitted is wrong, unless the question itself cannot be graded.
  let status = match status {
    GradeStatus::InvalidQuestionData => status,
    _ if answer.is_none() => GradeStatus::Incorrect,
    _ => status,
  };

  detail.push_str(&format!("Status: {}\n\n", status.label()));
  GradeOutcome { position, status, detail }
}

/// Comma-separated alternatives, trimmed; empty entries are not answers.
fn alternatives(correct_answer: &str) -> impl Iterator<Item = &str> {
  correct_answer.split(',').map(str::trim).filter(|alt| !alt.is_empty())
}

fn blank_matches(correct_answer: &str, answer: &str) -> bool {
  let answer = answer.trim().to_lowercase();
  alternatives(correct_answer).any(|alt| alt.to_lowercase() == answer)
}
