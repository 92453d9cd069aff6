//! Domain models: questions, quizzes, lessons, subject configuration and tag vocabularies.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Which kind of question is this?
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  /// Learner picks one of `options`; correct text is `options[answer_index]`.
  #[default]
  MultipleChoice,
  /// Learner types a short answer; `correct_answer` may list alternatives separated by commas.
  FillInTheBlank,
  /// Learner writes code; never auto-graded, reviewed by the classifier.
  Coding,
}

impl QuestionKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionKind::MultipleChoice => "multiple_choice",
      QuestionKind::FillInTheBlank => "fill_in_the_blank",
      QuestionKind::Coding => "coding",
    }
  }
}

/// One item of a quiz or of a question pool, as stored in the content files.
/// Only the branch matching `kind` is meaningful.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  #[serde(rename = "type", default)]
  pub kind: QuestionKind,
  #[serde(rename = "question")]
  pub text: String,
  #[serde(default)]
  pub tags: Vec<String>,

  // multiple_choice
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub options: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub answer_index: Option<i64>,

  // fill_in_the_blank
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub correct_answer: Option<String>,

  // coding
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sample_solution: Option<String>,
}

impl Question {
  /// The correct option text, or None when `answer_index` is missing or out of range.
  pub fn correct_option(&self) -> Option<&str> {
    let idx = usize::try_from(self.answer_index?).ok()?;
    self.options.get(idx).map(String::as_str)
  }

  pub fn has_any_tag<'a>(&self, mut tags: impl Iterator<Item = &'a String>) -> bool {
    tags.any(|t| self.tags.contains(t))
  }
}

/// Ordered questions plus a display title.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuizDefinition {
  pub title: String,
  pub questions: Vec<Question>,
}

/// A review lesson. `content` blocks are opaque to the backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub content: Vec<serde_json::Value>,
  #[serde(rename = "videoId", default, skip_serializing_if = "Option::is_none")]
  pub video_id: Option<String>,
}

/// Lesson keyed by its id, in file order.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LessonEntry {
  pub id: String,
  pub lesson: Lesson,
}

/// A video attached to one topic of a subtopic (`videos.json`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Video {
  #[serde(default)]
  pub title: String,
  #[serde(rename = "videoId")]
  pub video_id: String,
  #[serde(default)]
  pub description: String,
}

impl Video {
  /// Player URL with the JS API enabled, as the results page embeds it.
  pub fn embed_url(&self) -> String {
    format!("https://www.youtube.com/embed/{}?enablejsapi=1", self.video_id)
  }
}

/// Video keyed by its topic key, in file order.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct VideoEntry {
  pub key: String,
  pub video: Video,
}

/// Display metadata of a subject (`subject_info.json`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubjectInfo {
  pub name: String,
  pub description: String,
  pub icon: String,
  pub color: String,
  pub status: String,
}

impl Default for SubjectInfo {
  fn default() -> Self {
    Self {
      name: String::new(),
      description: String::new(),
      icon: String::new(),
      color: String::new(),
      status: "active".into(),
    }
  }
}

/// One entry of the subject catalogue.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
  pub id: String,
  #[serde(flatten)]
  pub info: SubjectInfo,
  pub subtopic_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct SubtopicInfo {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default = "default_order")]
  pub order: u32,
}

fn default_order() -> u32 { 999 }

/// Per-subject settings: the allowed-tag vocabulary and the subtopic catalogue.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SubjectConfig {
  pub allowed_keywords: Vec<String>,
  /// (subtopic id, info) sorted by `order`, file order on ties.
  pub subtopics: Vec<(String, SubtopicInfo)>,
}

impl SubjectConfig {
  pub fn has_subtopic(&self, subtopic: &str) -> bool {
    self.subtopics.iter().any(|(id, _)| id == subtopic)
  }
}

/// Closed per-subject set of concept tags. The only authority on which tags may
/// become weak tags or be attached to content.
#[derive(Clone, Debug, Default)]
pub struct TagVocabulary {
  ordered: Vec<String>,
  set: HashSet<String>,
}

impl TagVocabulary {
  pub fn new(tags: impl IntoIterator<Item = String>) -> Self {
    let mut ordered = Vec::new();
    let mut set = HashSet::new();
    for t in tags {
      if set.insert(t.clone()) {
        ordered.push(t);
      }
    }
    Self { ordered, set }
  }

  /// Exact, case-sensitive membership.
  pub fn contains(&self, tag: &str) -> bool {
    self.set.contains(tag)
  }

  pub fn as_slice(&self) -> &[String] {
    &self.ordered
  }

  pub fn is_empty(&self) -> bool {
    self.ordered.is_empty()
  }
}

/// Default quiz title when the quiz file has none: "Python Functions Quiz".
pub fn default_quiz_title(subject: &str, subtopic: &str) -> String {
  format!("{} {} Quiz", title_case(subject), title_case(subtopic))
}

fn title_case(s: &str) -> String {
  s.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
    .filter(|w| !w.is_empty())
    .map(|w| {
      let mut chars = w.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
      }
    })
    .collect::<Vec<String>>()
    .join(" ")
}
