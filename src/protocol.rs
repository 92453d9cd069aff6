//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Lesson, LessonEntry, Question, QuestionKind, SubjectSummary, VideoEntry};
use crate::error::{AppError, AppResult};
use crate::grading::{GradeOutcome, Score, Submission};
use crate::remediation::{LessonMatch, TagLessons};
use crate::session::{ProgressMap, QuizType};

/// A question as the learner sees it: no answer index, accepted answers or sample solution.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ServedQuestion {
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(rename = "question")]
    pub text: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl From<&Question> for ServedQuestion {
    fn from(q: &Question) -> Self {
        Self { kind: q.kind, text: q.text.clone(), tags: q.tags.clone(), options: q.options.clone() }
    }
}

pub fn served_questions(questions: &[Question]) -> Vec<ServedQuestion> {
    questions.iter().map(ServedQuestion::from).collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartQuizIn {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIn {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_id: String,
}

/// Answers keyed `"q0"`, `"q1"`, … (or plain `"0"`, `"1"`, …).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeIn {
    pub session_id: String,
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

impl AnalyzeIn {
    /// Positional submission; keys that are not positions are ignored.
    /// Two keys naming the same position (`"q0"` and `"0"`) are rejected.
    pub fn submission(&self) -> AppResult<Submission> {
        let mut out = Submission::new();
        for (k, v) in &self.answers {
            let Ok(idx) = k.strip_prefix('q').unwrap_or(k).parse::<usize>() else { continue };
            if out.insert(idx, v.clone()).is_some() {
                return Err(AppError::BadRequest(format!("answer for position {} given more than once", idx)));
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOut {
    pub session_id: String,
    pub quiz_type: QuizType,
    pub title: String,
    pub questions: Vec<ServedQuestion>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeOut {
    pub feedback: String,
    pub weak_topics: Vec<String>,
    pub score: Score,
    pub outcomes: Vec<GradeOutcome>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemedialOut {
    pub session_id: String,
    pub title: String,
    pub questions: Vec<ServedQuestion>,
    pub targeted_topics: Vec<String>,
    pub lessons: Vec<TagLessons>,
    pub unmatched_topics: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsOut {
    pub quiz_type: Option<QuizType>,
    pub score: Option<Score>,
    pub feedback: Option<String>,
    pub weak_topics: Vec<String>,
    /// One entry per weak topic; `lesson` is null when nothing matched.
    pub recommended_lessons: Vec<TagLessons>,
    pub remedial_questions: Vec<ServedQuestion>,
    /// Lessons of the current subtopic, for topics without a recommendation.
    pub subtopic_lessons: Vec<LessonEntry>,
    pub videos: Vec<VideoOut>,
    pub quiz_generation_error: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoOut {
    pub key: String,
    pub title: String,
    pub video_id: String,
    pub description: String,
    pub embed_url: String,
}

impl From<VideoEntry> for VideoOut {
    fn from(e: VideoEntry) -> Self {
        Self {
            embed_url: e.video.embed_url(),
            key: e.key,
            title: e.video.title,
            video_id: e.video.video_id,
            description: e.video.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VideosOut {
    pub subject: String,
    pub subtopic: String,
    pub videos: Vec<VideoOut>,
}

#[derive(Debug, Serialize)]
pub struct SubjectsOut {
    pub subjects: Vec<SubjectSummary>,
}

/// `topic` and `progress` are optional on the wire so a missing one is a 400, not a 422.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressIn {
    pub session_id: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub progress: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOut {
    pub session_id: String,
    pub progress: ProgressMap,
}

#[derive(Debug, Serialize)]
pub struct TagsOut {
    pub subject: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubtopicOut {
    pub id: String,
    pub name: String,
    pub description: String,
    pub order: u32,
}

#[derive(Debug, Serialize)]
pub struct SubtopicsOut {
    pub subject: String,
    pub subtopics: Vec<SubtopicOut>,
}

#[derive(Debug, Deserialize)]
pub struct FindLessonsIn {
    pub subject: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindLessonsOut {
    pub lessons: Vec<LessonMatch>,
    pub count: usize,
    pub searched_tags: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonOut {
    pub subject: String,
    pub subtopic: String,
    pub lesson_id: String,
    pub lesson: Lesson,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearCacheIn {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub subtopic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearCacheOut {
    pub cleared: String,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub classifier: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_keys_accept_q_prefix_and_plain_indices() {
        let body: AnalyzeIn = serde_json::from_str(
            r#"{"sessionId": "s", "answers": {"q0": "3", "1": "Four", "name": "x", "q": "y"}}"#,
        )
        .unwrap();
        let sub = body.submission().unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.get(&0).map(String::as_str), Some("3"));
        assert_eq!(sub.get(&1).map(String::as_str), Some("Four"));
    }

    #[test]
    fn same_position_under_two_keys_is_rejected() {
        let body: AnalyzeIn =
            serde_json::from_str(r#"{"sessionId": "s", "answers": {"q0": "def", "0": "func"}}"#).unwrap();
        assert!(matches!(body.submission(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn served_question_hides_answer_keys() {
        let q: Question = serde_json::from_str(
            r#"{"type": "coding", "question": "add", "tags": ["f"], "sample_solution": "def add(a, b): ..."}"#,
        )
        .unwrap();
        let v = serde_json::to_value(ServedQuestion::from(&q)).unwrap();
        assert_eq!(v, serde_json::json!({"type": "coding", "question": "add", "tags": ["f"]}));
    }
}
