//! Content repository: read-only typed access to subjects, quizzes, question
//! pools and lessons, plus a cache-invalidation hook for admin edits.
//!
//! Missing or unreadable documents read as "absent" (logged), never as errors;
//! callers decide whether absence is a 404.
//!
//! On-disk layout under the content root:
//!   subjects/<subject>/subject_config.json
//!   subjects/<subject>/subject_info.json
//!   subjects/<subject>/<subtopic>/quiz_data.json
//!   subjects/<subject>/<subtopic>/question_pool.json
//!   subjects/<subject>/<subtopic>/lesson_plans.json
//!   subjects/<subject>/<subtopic>/videos.json

use std::{
  collections::HashMap,
  path::PathBuf,
  sync::Arc,
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
  default_quiz_title, Lesson, LessonEntry, Question, QuestionKind, QuizDefinition, SubjectConfig, SubjectInfo,
  SubjectSummary, SubtopicInfo, TagVocabulary, Video, VideoEntry,
};
use crate::remediation::CatalogLesson;

#[async_trait]
pub trait ContentRepository: Send + Sync {
  async fn subject_config(&self, subject: &str) -> Option<SubjectConfig>;

  async fn subject_info(&self, subject: &str) -> Option<SubjectInfo>;

  /// Candidate subject ids, sorted.
  async fn subject_ids(&self) -> Vec<String>;

  async fn quiz(&self, subject: &str, subtopic: &str) -> Option<QuizDefinition>;

  async fn question_pool(&self, subject: &str, subtopic: &str) -> Vec<Question>;

  /// Lessons of one subtopic, in file order.
  async fn lessons(&self, subject: &str, subtopic: &str) -> Vec<LessonEntry>;

  /// Topic videos of one subtopic, in file order.
  async fn videos(&self, subject: &str, subtopic: &str) -> Vec<VideoEntry>;

  /// Drop cached documents: everything, or one subject's subtopic.
  async fn invalidate(&self, scope: Option<(&str, &str)>);

  /// Subjects that have both a config and display info.
  async fn subjects(&self) -> Vec<SubjectSummary> {
    let mut out = Vec::new();
    for id in self.subject_ids().await {
      let (Some(cfg), Some(info)) = (self.subject_config(&id).await, self.subject_info(&id).await) else {
        debug!(target: "content", subject = %id, "Not listed: config or info missing");
        continue;
      };
      out.push(SubjectSummary { subtopic_count: cfg.subtopics.len(), id, info });
    }
    out
  }

  /// Questions in serving order; empty when the quiz is absent.
  async fn quiz_questions(&self, subject: &str, subtopic: &str) -> Vec<Question> {
    self.quiz(subject, subtopic).await.map(|q| q.questions).unwrap_or_default()
  }

  /// Empty when the subject is missing: every proposed tag is then rejected.
  async fn allowed_tags(&self, subject: &str) -> TagVocabulary {
    self
      .subject_config(subject)
      .await
      .map(|c| TagVocabulary::new(c.allowed_keywords))
      .unwrap_or_default()
  }

  /// All lessons of the subject across its subtopics (subtopic order, then file order).
  async fn lesson_catalog(&self, subject: &str) -> Vec<CatalogLesson> {
    let Some(cfg) = self.subject_config(subject).await else { return Vec::new() };
    let mut out = Vec::new();
    for (subtopic, _) in &cfg.subtopics {
      for entry in self.lessons(subject, subtopic).await {
        out.push(CatalogLesson { subtopic: subtopic.clone(), id: entry.id, lesson: entry.lesson });
      }
    }
    out
  }
}

// --- JSON document helpers (shared by both implementations) ---

fn parse_subject_config(doc: &Value) -> SubjectConfig {
  let allowed_keywords = doc
    .get("allowed_keywords")
    .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
    .unwrap_or_default();

  let mut subtopics: Vec<(String, SubtopicInfo)> = doc
    .get("subtopics")
    .and_then(Value::as_object)
    .map(|m| {
      m.iter()
        .map(|(id, v)| (id.clone(), serde_json::from_value::<SubtopicInfo>(v.clone()).unwrap_or_default()))
        .collect()
    })
    .unwrap_or_default();
  // Stable sort keeps file order among equal `order`.
  subtopics.sort_by_key(|(_, info)| info.order);

  SubjectConfig { allowed_keywords, subtopics }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Unreadable {
  /// Quizzes are graded by position: hold the slot with an ungradeable question.
  Keep,
  /// Pools are selected by tag: the entry is dropped.
  Skip,
}

fn parse_questions(doc: &Value, what: &str, unreadable: Unreadable) -> Vec<Question> {
  let Some(items) = doc.get("questions").and_then(Value::as_array) else { return Vec::new() };
  items
    .iter()
    .enumerate()
    .filter_map(|(i, v)| match serde_json::from_value::<Question>(v.clone()) {
      Ok(q) => Some(q),
      Err(e) if unreadable == Unreadable::Keep => {
        warn!(target: "content", %what, index = i, error = %e, "Unreadable question kept as invalid question data");
        Some(placeholder_question(v))
      }
      Err(e) => {
        warn!(target: "content", %what, index = i, error = %e, "Skipping unreadable question");
        None
      }
    })
    .collect()
}

/// Stand-in for an entry that does not parse. It has no answer key, so grading
/// reports it as invalid question data; text and tags are kept when readable.
fn placeholder_question(v: &Value) -> Question {
  let text = v.get("question").and_then(Value::as_str).unwrap_or("[Unreadable question]").to_string();
  let tags = v
    .get("tags")
    .and_then(Value::as_array)
    .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
    .unwrap_or_default();
  Question {
    kind: QuestionKind::MultipleChoice,
    text,
    tags,
    options: Vec::new(),
    answer_index: None,
    correct_answer: None,
    sample_solution: None,
  }
}

fn parse_quiz(doc: &Value, subject: &str, subtopic: &str) -> QuizDefinition {
  let title = doc
    .get("quiz_title")
    .and_then(Value::as_str)
    .map(str::to_string)
    .unwrap_or_else(|| default_quiz_title(subject, subtopic));
  QuizDefinition { title, questions: parse_questions(doc, "quiz", Unreadable::Keep) }
}

fn parse_lessons(doc: &Value) -> Vec<LessonEntry> {
  let Some(map) = doc.get("lessons").and_then(Value::as_object) else { return Vec::new() };
  lesson_entries(map)
}

fn parse_videos(doc: &Value) -> Vec<VideoEntry> {
  let Some(map) = doc.get("videos").and_then(Value::as_object) else { return Vec::new() };
  map
    .iter()
    .filter_map(|(key, v)| match serde_json::from_value::<Video>(v.clone()) {
      Ok(video) => Some(VideoEntry { key: key.clone(), video }),
      Err(e) => {
        warn!(target: "content", topic_key = %key, error = %e, "Skipping unreadable video");
        None
      }
    })
    .collect()
}

fn lesson_entries(map: &Map<String, Value>) -> Vec<LessonEntry> {
  map
    .iter()
    .filter_map(|(id, v)| match serde_json::from_value::<Lesson>(v.clone()) {
      Ok(lesson) => Some(LessonEntry { id: id.clone(), lesson }),
      Err(e) => {
        warn!(target: "content", lesson_id = %id, error = %e, "Skipping unreadable lesson");
        None
      }
    })
    .collect()
}

// --- File-backed repository ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum DocKind {
  SubjectConfig,
  SubjectInfo,
  Quiz,
  Pool,
  Lessons,
  Videos,
}

impl DocKind {
  fn file_name(&self) -> &'static str {
    match self {
      DocKind::SubjectConfig => "subject_config.json",
      DocKind::SubjectInfo => "subject_info.json",
      DocKind::Quiz => "quiz_data.json",
      DocKind::Pool => "question_pool.json",
      DocKind::Lessons => "lesson_plans.json",
      DocKind::Videos => "videos.json",
    }
  }
}

fn safe_id(s: &str) -> bool {
  !s.is_empty() && !s.contains(['/', '\\']) && s != "." && s != ".."
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct DocKey {
  subject: String,
  subtopic: Option<String>,
  kind: DocKind,
}

/// Reads JSON documents from disk and caches successful parses until invalidated.
#[derive(Clone)]
pub struct FsContent {
  root: PathBuf,
  cache: Arc<RwLock<HashMap<DocKey, Arc<Value>>>>,
}

impl FsContent {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into(), cache: Arc::new(RwLock::new(HashMap::new())) }
  }

  fn path_for(&self, key: &DocKey) -> Option<PathBuf> {
    // Ids come from URLs; never let them walk out of the content root.
    if !safe_id(&key.subject) || key.subtopic.as_deref().is_some_and(|s| !safe_id(s)) {
      return None;
    }
    let mut p = self.root.join("subjects").join(&key.subject);
    if let Some(sub) = &key.subtopic {
      p.push(sub);
    }
    p.push(key.kind.file_name());
    Some(p)
  }

  #[instrument(level = "debug", skip(self), fields(subject = %key.subject, subtopic = ?key.subtopic, kind = ?key.kind))]
  async fn load(&self, key: DocKey) -> Option<Arc<Value>> {
    if let Some(doc) = self.cache.read().await.get(&key).cloned() {
      return Some(doc);
    }
    let path = self.path_for(&key)?;
    let text = match tokio::fs::read_to_string(&path).await {
      Ok(t) => t,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(target: "content", path = %path.display(), "Document not found");
        return None;
      }
      Err(e) => {
        error!(target: "content", path = %path.display(), error = %e, "Failed to read document");
        return None;
      }
    };
    let doc = match serde_json::from_str::<Value>(&text) {
      Ok(v) => Arc::new(v),
      Err(e) => {
        error!(target: "content", path = %path.display(), error = %e, "Invalid JSON in document");
        return None;
      }
    };
    self.cache.write().await.insert(key, doc.clone());
    Some(doc)
  }

  fn key(subject: &str, subtopic: Option<&str>, kind: DocKind) -> DocKey {
    DocKey { subject: subject.to_string(), subtopic: subtopic.map(str::to_string), kind }
  }
}

#[async_trait]
impl ContentRepository for FsContent {
  async fn subject_config(&self, subject: &str) -> Option<SubjectConfig> {
    let doc = self.load(Self::key(subject, None, DocKind::SubjectConfig)).await?;
    Some(parse_subject_config(&doc))
  }

  async fn subject_info(&self, subject: &str) -> Option<SubjectInfo> {
    let doc = self.load(Self::key(subject, None, DocKind::SubjectInfo)).await?;
    match serde_json::from_value::<SubjectInfo>((*doc).clone()) {
      Ok(info) => Some(info),
      Err(e) => {
        warn!(target: "content", %subject, error = %e, "Unreadable subject info");
        None
      }
    }
  }

  async fn subject_ids(&self) -> Vec<String> {
    let dir = self.root.join("subjects");
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(e) => e,
      Err(e) => {
        debug!(target: "content", path = %dir.display(), error = %e, "No subjects directory");
        return Vec::new();
      }
    };
    let mut ids = Vec::new();
    loop {
      match entries.next_entry().await {
        Ok(Some(entry)) => {
          let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
          let name = entry.file_name();
          match name.to_str() {
            Some(id) if is_dir && safe_id(id) => ids.push(id.to_string()),
            _ => {}
          }
        }
        Ok(None) => break,
        Err(e) => {
          error!(target: "content", path = %dir.display(), error = %e, "Failed to scan subjects");
          break;
        }
      }
    }
    ids.sort();
    ids
  }

  async fn quiz(&self, subject: &str, subtopic: &str) -> Option<QuizDefinition> {
    let doc = self.load(Self::key(subject, Some(subtopic), DocKind::Quiz)).await?;
    Some(parse_quiz(&doc, subject, subtopic))
  }

  async fn question_pool(&self, subject: &str, subtopic: &str) -> Vec<Question> {
    match self.load(Self::key(subject, Some(subtopic), DocKind::Pool)).await {
      Some(doc) => parse_questions(&doc, "question_pool", Unreadable::Skip),
      None => Vec::new(),
    }
  }

  async fn lessons(&self, subject: &str, subtopic: &str) -> Vec<LessonEntry> {
    match self.load(Self::key(subject, Some(subtopic), DocKind::Lessons)).await {
      Some(doc) => parse_lessons(&doc),
      None => Vec::new(),
    }
  }

  async fn videos(&self, subject: &str, subtopic: &str) -> Vec<VideoEntry> {
    match self.load(Self::key(subject, Some(subtopic), DocKind::Videos)).await {
      Some(doc) => parse_videos(&doc),
      None => Vec::new(),
    }
  }

  async fn invalidate(&self, scope: Option<(&str, &str)>) {
    let mut cache = self.cache.write().await;
    match scope {
      None => {
        let n = cache.len();
        cache.clear();
        info!(target: "content", dropped = n, "Content cache cleared");
      }
      Some((subject, subtopic)) => {
        let before = cache.len();
        cache.retain(|k, _| !(k.subject == subject && k.subtopic.as_deref() == Some(subtopic)));
        info!(target: "content", %subject, %subtopic, dropped = before - cache.len(), "Content cache cleared for subtopic");
      }
    }
  }
}

// --- In-memory repository (built-in seed content and tests) ---

#[derive(Clone, Debug, Default)]
pub struct MemorySubtopic {
  pub quiz: Option<QuizDefinition>,
  pub pool: Vec<Question>,
  pub lessons: Vec<LessonEntry>,
  pub videos: Vec<VideoEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct MemorySubject {
  pub config: SubjectConfig,
  pub info: Option<SubjectInfo>,
  pub subtopics: HashMap<String, MemorySubtopic>,
}

#[derive(Clone, Default)]
pub struct MemoryContent {
  subjects: Arc<RwLock<HashMap<String, MemorySubject>>>,
}

impl MemoryContent {
  pub fn new(subjects: HashMap<String, MemorySubject>) -> Self {
    Self { subjects: Arc::new(RwLock::new(subjects)) }
  }

  /// Replace one subtopic (what an admin edit would do).
  #[cfg(test)]
  pub async fn put_subtopic(&self, subject: &str, subtopic: &str, data: MemorySubtopic) {
    let mut subjects = self.subjects.write().await;
    if let Some(s) = subjects.get_mut(subject) {
      s.subtopics.insert(subtopic.to_string(), data);
    }
  }

  async fn subtopic(&self, subject: &str, subtopic: &str) -> Option<MemorySubtopic> {
    self.subjects.read().await.get(subject)?.subtopics.get(subtopic).cloned()
  }
}

#[async_trait]
impl ContentRepository for MemoryContent {
  async fn subject_config(&self, subject: &str) -> Option<SubjectConfig> {
    self.subjects.read().await.get(subject).map(|s| s.config.clone())
  }

  async fn subject_info(&self, subject: &str) -> Option<SubjectInfo> {
    self.subjects.read().await.get(subject)?.info.clone()
  }

  async fn subject_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.subjects.read().await.keys().cloned().collect();
    ids.sort();
    ids
  }

  async fn quiz(&self, subject: &str, subtopic: &str) -> Option<QuizDefinition> {
    self.subtopic(subject, subtopic).await?.quiz
  }

  async fn question_pool(&self, subject: &str, subtopic: &str) -> Vec<Question> {
    self.subtopic(subject, subtopic).await.map(|s| s.pool).unwrap_or_default()
  }

  async fn lessons(&self, subject: &str, subtopic: &str) -> Vec<LessonEntry> {
    self.subtopic(subject, subtopic).await.map(|s| s.lessons).unwrap_or_default()
  }

  async fn videos(&self, subject: &str, subtopic: &str) -> Vec<VideoEntry> {
    self.subtopic(subject, subtopic).await.map(|s| s.videos).unwrap_or_default()
  }

  async fn invalidate(&self, _scope: Option<(&str, &str)>) {
    // Nothing cached: reads always see the current maps.
  }
}
