//! Per-learner quiz state, namespaced by (session id, subject, subtopic).
//!
//! Phases: NoQuiz → InitialServed → Analyzed → RemedialServed → ResultsShown.
//! `ScopeRecord` holds the transitions as plain methods so they can be tested
//! without a store; `SessionStore` is the shared map behind the HTTP layer.
//! The store also keeps each learner's topic progress, and drops anything left
//! idle for longer than its TTL.

use std::{
  collections::{BTreeMap, HashMap},
  sync::Arc,
  time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::Question;
use crate::error::{AppError, AppResult};
use crate::grading::Score;
use crate::remediation::RemediationBundle;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScopeKey {
  pub learner: String,
  pub subject: String,
  pub subtopic: String,
}

impl ScopeKey {
  pub fn new(learner: &str, subject: &str, subtopic: &str) -> Self {
    Self { learner: learner.into(), subject: subject.into(), subtopic: subtopic.into() }
  }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuizPhase {
  #[default]
  NoQuiz,
  InitialServed,
  Analyzed,
  RemedialServed,
  ResultsShown,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
  Initial,
  Remedial,
}

/// What the last analysis produced, kept for the results view.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
  pub feedback: String,
  pub score: Score,
}

#[derive(Clone, Debug, Default)]
pub struct ScopeRecord {
  pub phase: QuizPhase,
  pub quiz_type: Option<QuizType>,
  /// Questions in the order they were served; grading aligns with this.
  pub served: Vec<Question>,
  /// None = never analyzed; Some(empty) = analyzed, nothing weak.
  pub weak_tags: Option<Vec<String>>,
  pub last_analysis: Option<AnalysisSummary>,
  pub remediation: Option<RemediationBundle>,
  pub targeted_topics: Vec<String>,
  /// Message to show once on the next results view.
  pub pending_error: Option<String>,
  /// Bumped on every quiz start; late analysis results for an older epoch are dropped.
  pub epoch: u64,
}

/// Everything the results page needs from the session.
#[derive(Clone, Debug)]
pub struct ResultsSnapshot {
  pub quiz_type: Option<QuizType>,
  pub weak_tags: Vec<String>,
  pub last_analysis: Option<AnalysisSummary>,
  pub remediation: Option<RemediationBundle>,
  pub pending_error: Option<String>,
}

impl ScopeRecord {
  /// Fresh record for a newly served initial quiz.
  pub fn start(questions: Vec<Question>, epoch: u64) -> Self {
    Self {
      phase: QuizPhase::InitialServed,
      quiz_type: Some(QuizType::Initial),
      served: questions,
      epoch,
      ..Self::default()
    }
  }

  /// Served-question snapshot to grade against.
  pub fn served_for_analysis(&self) -> AppResult<&[Question]> {
    if self.phase == QuizPhase::NoQuiz || self.served.is_empty() {
      return Err(AppError::session_missing());
    }
    Ok(&self.served)
  }

  /// Commit a completed analysis; supersedes earlier weak tags and remediation.
  pub fn record_analysis(&mut self, weak_tags: Vec<String>, summary: AnalysisSummary) {
    self.weak_tags = Some(weak_tags);
    self.last_analysis = Some(summary);
    self.remediation = None;
    self.pending_error = None;
    self.phase = QuizPhase::Analyzed;
  }

  /// Weak tags to remediate. Never analyzed and analyzed-but-empty are different errors.
  pub fn weak_tags_for_remediation(&self) -> AppResult<Vec<String>> {
    match &self.weak_tags {
      None => Err(AppError::SessionStateMissing(
        "No analysis found for this quiz. Please take the main quiz first.".into(),
      )),
      Some(tags) if tags.is_empty() => Err(AppError::NoWeakTopics),
      Some(tags) => Ok(tags.clone()),
    }
  }

  pub fn record_remediation(&mut self, bundle: RemediationBundle) {
    self.targeted_topics = bundle.lessons.iter().map(|t| t.tag.clone()).collect();
    self.served = bundle.remedial_questions.clone();
    self.quiz_type = Some(QuizType::Remedial);
    self.remediation = Some(bundle);
    self.phase = QuizPhase::RemedialServed;
  }

  pub fn fail_generation(&mut self, message: String) {
    self.pending_error = Some(message);
  }

  /// The stored remedial quiz and its title.
  pub fn remedial_quiz(&mut self) -> AppResult<(String, Vec<Question>)> {
    let questions = match (&self.quiz_type, &self.remediation) {
      (Some(QuizType::Remedial), Some(b)) if !b.remedial_questions.is_empty() => b.remedial_questions.clone(),
      _ => {
        self.pending_error = Some("No remedial quiz was available to take. Perhaps try again or review more.".into());
        return Err(AppError::SessionStateMissing("No remedial quiz in session.".into()));
      }
    };
    let mut title = "Remedial Quiz".to_string();
    if !self.targeted_topics.is_empty() {
      title.push_str(&format!(" (Focusing on: {})", self.targeted_topics.join(", ")));
    }
    Ok((title, questions))
  }

  /// Read-only view of results; pops the pending message so it shows at most once.
  pub fn show_results(&mut self) -> AppResult<ResultsSnapshot> {
    match self.phase {
      QuizPhase::Analyzed | QuizPhase::RemedialServed | QuizPhase::ResultsShown => {}
      QuizPhase::NoQuiz | QuizPhase::InitialServed => return Err(AppError::session_missing()),
    }
    self.phase = QuizPhase::ResultsShown;
    Ok(ResultsSnapshot {
      quiz_type: self.quiz_type,
      weak_tags: self.weak_tags.clone().unwrap_or_default(),
      last_analysis: self.last_analysis.clone(),
      remediation: self.remediation.clone(),
      pending_error: self.pending_error.take(),
    })
  }
}

/// Topic key → progress value, as last reported by the learner's client.
pub type ProgressMap = BTreeMap<String, Value>;

#[derive(Clone, Debug)]
struct Tracked<T> {
  value: T,
  touched: Instant,
}

impl<T> Tracked<T> {
  fn new(value: T, now: Instant) -> Self {
    Self { value, touched: now }
  }

  fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(self.touched) >= ttl
  }
}

/// Shared session state: one record per (learner, subject, subtopic) plus
/// per-learner progress. Entries idle for `idle_ttl` are evicted.
#[derive(Clone)]
pub struct SessionStore {
  scopes: Arc<RwLock<HashMap<ScopeKey, Tracked<ScopeRecord>>>>,
  progress: Arc<RwLock<HashMap<String, Tracked<ProgressMap>>>>,
  epochs: Arc<RwLock<u64>>,
  idle_ttl: Duration,
}

impl SessionStore {
  pub fn new(idle_ttl: Duration) -> Self {
    Self {
      scopes: Arc::new(RwLock::new(HashMap::new())),
      progress: Arc::new(RwLock::new(HashMap::new())),
      epochs: Arc::new(RwLock::new(0)),
      idle_ttl,
    }
  }

  /// Clear the scope and snapshot the served questions. Returns the new epoch.
  pub async fn start_quiz(&self, key: &ScopeKey, questions: Vec<Question>) -> u64 {
    let now = Instant::now();
    self.evict_idle(now).await;
    let epoch = {
      let mut e = self.epochs.write().await;
      *e += 1;
      *e
    };
    self
      .scopes
      .write()
      .await
      .insert(key.clone(), Tracked::new(ScopeRecord::start(questions, epoch), now));
    epoch
  }

  pub async fn get(&self, key: &ScopeKey) -> Option<ScopeRecord> {
    self.scopes.read().await.get(key).map(|t| t.value.clone())
  }

  /// Run a transition on an existing record. A missing record is `SessionStateMissing`.
  pub async fn update<T>(&self, key: &ScopeKey, f: impl FnOnce(&mut ScopeRecord) -> AppResult<T>) -> AppResult<T> {
    let mut scopes = self.scopes.write().await;
    let slot = scopes.get_mut(key).ok_or_else(AppError::session_missing)?;
    slot.touched = Instant::now();
    f(&mut slot.value)
  }

  /// Like `update`, but only if the record still belongs to `epoch`.
  pub async fn update_if_current<T>(
    &self,
    key: &ScopeKey,
    epoch: u64,
    f: impl FnOnce(&mut ScopeRecord) -> AppResult<T>,
  ) -> AppResult<T> {
    self
      .update(key, |record| {
        if record.epoch != epoch {
          return Err(AppError::SessionStateMissing(
            "This quiz was restarted while it was being analyzed. Please submit again.".into(),
          ));
        }
        f(record)
      })
      .await
  }

  /// Store one topic's progress for the learner; returns the learner's whole map.
  pub async fn record_progress(&self, learner: &str, topic: String, value: Value) -> ProgressMap {
    let now = Instant::now();
    let mut all = self.progress.write().await;
    let slot = all.entry(learner.to_string()).or_insert_with(|| Tracked::new(ProgressMap::new(), now));
    slot.touched = now;
    slot.value.insert(topic, value);
    slot.value.clone()
  }

  /// The learner's progress; empty when nothing was reported.
  pub async fn progress(&self, learner: &str) -> ProgressMap {
    self.progress.read().await.get(learner).map(|t| t.value.clone()).unwrap_or_default()
  }

  /// Drop scopes and progress idle for at least the TTL. Returns how many entries went.
  pub async fn evict_idle(&self, now: Instant) -> usize {
    let ttl = self.idle_ttl;
    let scopes = {
      let mut map = self.scopes.write().await;
      let before = map.len();
      map.retain(|_, t| !t.is_idle(now, ttl));
      before - map.len()
    };
    let progress = {
      let mut map = self.progress.write().await;
      let before = map.len();
      map.retain(|_, t| !t.is_idle(now, ttl));
      before - map.len()
    };
    if scopes + progress > 0 {
      debug!(target: "quizpath", scopes, progress, ?ttl, "Evicted idle sessions");
    }
    scopes + progress
  }

  pub fn idle_ttl(&self) -> Duration {
    self.idle_ttl
  }
}
