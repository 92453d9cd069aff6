//! Remediation selection: follow-up questions from the pool and one review
//! lesson per weak tag.
//!
//! Everything here is a pure function of (weak tags, pool, lesson catalog), so
//! the same inputs always give the same bundle.

use std::collections::HashSet;

use serde::Serialize;

use crate::domain::{Lesson, Question};
use crate::error::{AppError, AppResult};

/// A lesson located somewhere in the subject, in catalog (subtopic, then file) order.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogLesson {
  pub subtopic: String,
  pub id: String,
  pub lesson: Lesson,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonPick {
  pub subtopic: String,
  pub lesson_id: String,
  pub title: String,
  pub tags: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub video_id: Option<String>,
  pub score: usize,
}

/// Best lesson for one weak tag; `lesson` is None when nothing in the subject carries the tag.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagLessons {
  pub tag: String,
  pub lesson: Option<LessonPick>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemediationBundle {
  pub remedial_questions: Vec<Question>,
  /// One entry per weak tag, in weak-tag order.
  pub lessons: Vec<TagLessons>,
}

impl RemediationBundle {
  pub fn unmatched_tags(&self) -> Vec<&str> {
    self.lessons.iter().filter(|t| t.lesson.is_none()).map(|t| t.tag.as_str()).collect()
  }
}

/// Pool questions sharing at least one tag with `weak_tags`, first occurrence
/// of each question text only, in pool order.
pub fn select_remedial_questions(weak_tags: &[String], pool: &[Question]) -> Vec<Question> {
  let mut seen_text: HashSet<&str> = HashSet::new();
  pool
    .iter()
    .filter(|q| q.has_any_tag(weak_tags.iter()))
    .filter(|q| seen_text.insert(q.text.as_str()))
    .cloned()
    .collect()
}

/// Number of lesson tags that contain, or are contained in, `target` (case-insensitive).
pub fn relevance_score(lesson_tags: &[String], target: &str) -> usize {
  let target = target.to_lowercase();
  lesson_tags
    .iter()
    .map(|t| t.to_lowercase())
    .filter(|t| t.contains(&target) || target.contains(t.as_str()))
    .count()
}

/// For each weak tag, the highest-scoring lesson carrying that exact tag.
/// Ties go to the earliest lesson in the catalog. The same lesson may win for several tags.
pub fn select_lessons(weak_tags: &[String], catalog: &[CatalogLesson]) -> Vec<TagLessons> {
  weak_tags
    .iter()
    .map(|tag| {
      let mut best: Option<(&CatalogLesson, usize)> = None;
      for entry in catalog.iter().filter(|e| e.lesson.tags.contains(tag)) {
        let score = relevance_score(&entry.lesson.tags, tag);
        if best.map_or(true, |(_, s)| score > s) {
          best = Some((entry, score));
        }
      }
      TagLessons {
        tag: tag.clone(),
        lesson: best.map(|(e, score)| LessonPick {
          subtopic: e.subtopic.clone(),
          lesson_id: e.id.clone(),
          title: e.lesson.title.clone(),
          tags: e.lesson.tags.clone(),
          video_id: e.lesson.video_id.clone(),
          score,
        }),
      }
    })
    .collect()
}

/// Remedial questions plus per-tag lessons. No matching pool question is an error, not mastery.
pub fn build_bundle(weak_tags: &[String], pool: &[Question], catalog: &[CatalogLesson]) -> AppResult<RemediationBundle> {
  let remedial_questions = select_remedial_questions(weak_tags, pool);
  if remedial_questions.is_empty() {
    return Err(AppError::NoRemedialContent { tags: weak_tags.to_vec() });
  }
  Ok(RemediationBundle { remedial_questions, lessons: select_lessons(weak_tags, catalog) })
}

/// A lesson matching a tag search, with the tags it matched on.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonMatch {
  pub subtopic: String,
  pub lesson_id: String,
  pub title: String,
  pub tags: Vec<String>,
  pub matching_tags: Vec<String>,
}

/// Every catalog lesson whose tags intersect `target_tags`.
pub fn find_lessons_by_tags(target_tags: &[String], catalog: &[CatalogLesson]) -> Vec<LessonMatch> {
  catalog
    .iter()
    .filter_map(|e| {
      let matching: Vec<String> = e.lesson.tags.iter().filter(|t| target_tags.contains(t)).cloned().collect();
      if matching.is_empty() {
        return None;
      }
      Some(LessonMatch {
        subtopic: e.subtopic.clone(),
        lesson_id: e.id.clone(),
        title: e.lesson.title.clone(),
        tags: e.lesson.tags.clone(),
        matching_tags: matching,
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::QuestionKind;

  fn q(text: &str, tags: &[&str]) -> Question {
    Question {
      kind: QuestionKind::FillInTheBlank,
      text: text.into(),
      tags: tags.iter().map(|s| s.to_string()).collect(),
      options: vec![],
      answer_index: None,
      correct_answer: Some("x".into()),
      sample_solution: None,
    }
  }

  fn lesson(subtopic: &str, id: &str, tags: &[&str]) -> CatalogLesson {
    CatalogLesson {
      subtopic: subtopic.into(),
      id: id.into(),
      lesson: Lesson {
        title: format!("Lesson {id}"),
        tags: tags.iter().map(|s| s.to_string()).collect(),
        content: vec![],
        video_id: None,
      },
    }
  }

  fn tags(t: &[&str]) -> Vec<String> {
    t.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn selects_intersecting_questions_in_order_without_duplicates() {
    let pool = vec![
      q("What does a for loop do?", &["loops", "syntax"]),
      q("Define a function.", &["functions"]),
      q("When does while stop?", &["loops"]),
      q("What does a for loop do?", &["loops"]),
    ];
    let picked = select_remedial_questions(&tags(&["loops"]), &pool);
    let texts: Vec<&str> = picked.iter().map(|q| q.text.as_str()).collect();
    assert_eq!(texts, vec!["What does a for loop do?", "When does while stop?"]);
  }

  #[test]
  fn question_tags_must_intersect_not_contain() {
    let pool = vec![q("a", &["loops"]), q("b", &["functions", "scope"])];
    let picked = select_remedial_questions(&tags(&["scope", "recursion"]), &pool);
    assert_eq!(picked.len(), 1);
    assert_eq!(picked[0].text, "b");
  }

  #[test]
  fn empty_selection_is_reported() {
    let pool = vec![q("a", &["loops"])];
    let err = build_bundle(&tags(&["functions"]), &pool, &[]).unwrap_err();
    assert!(matches!(err, AppError::NoRemedialContent { .. }));
  }

  #[test]
  fn relevance_counts_substring_related_tags() {
    let lesson_tags = tags(&["loops", "for loops", "Nested Loops", "functions"]);
    assert_eq!(relevance_score(&lesson_tags, "loops"), 3);
    assert_eq!(relevance_score(&lesson_tags, "FOR LOOPS"), 2);
  }

  #[test]
  fn best_lesson_searches_all_subtopics_and_breaks_ties_by_order() {
    let catalog = vec![
      lesson("basics", "intro", &["loops"]),
      lesson("control_flow", "loops_deep", &["loops", "while loops"]),
      lesson("control_flow", "loops_again", &["loops", "for loops"]),
    ];
    let picks = select_lessons(&tags(&["loops"]), &catalog);
    let pick = picks[0].lesson.as_ref().unwrap();
    assert_eq!(pick.lesson_id, "loops_deep");
    assert_eq!(pick.subtopic, "control_flow");
    assert_eq!(pick.score, 2);
  }

  #[test]
  fn candidates_need_the_exact_tag() {
    // "for loops" contains "loops" but the lesson is not tagged "loops".
    let catalog = vec![lesson("a", "l1", &["for loops"])];
    let picks = select_lessons(&tags(&["loops"]), &catalog);
    assert!(picks[0].lesson.is_none());
  }

  #[test]
  fn every_weak_tag_is_present_even_unmatched() {
    let catalog = vec![lesson("a", "l1", &["loops"])];
    let pool = vec![q("x", &["loops"])];
    let bundle = build_bundle(&tags(&["loops", "recursion"]), &pool, &catalog).unwrap();
    let keys: Vec<&str> = bundle.lessons.iter().map(|t| t.tag.as_str()).collect();
    assert_eq!(keys, vec!["loops", "recursion"]);
    assert_eq!(bundle.unmatched_tags(), vec!["recursion"]);
  }

  #[test]
  fn same_lesson_can_win_for_two_tags() {
    let catalog = vec![lesson("a", "both", &["loops", "functions"]), lesson("a", "other", &["syntax"])];
    let picks = select_lessons(&tags(&["loops", "functions"]), &catalog);
    assert_eq!(picks[0].lesson.as_ref().unwrap().lesson_id, "both");
    assert_eq!(picks[1].lesson.as_ref().unwrap().lesson_id, "both");
  }

  #[test]
  fn bundle_is_deterministic() {
    let catalog = vec![
      lesson("a", "l1", &["loops", "syntax"]),
      lesson("b", "l2", &["syntax", "syntax errors"]),
      lesson("b", "l3", &["loops"]),
    ];
    let pool = vec![q("1", &["syntax"]), q("2", &["loops"]), q("1", &["loops"])];
    let weak = tags(&["syntax", "loops"]);
    let first = build_bundle(&weak, &pool, &catalog).unwrap();
    for _ in 0..10 {
      assert_eq!(build_bundle(&weak, &pool, &catalog).unwrap(), first);
    }
  }

  #[test]
  fn find_by_tags_reports_matching_tags() {
    let catalog = vec![lesson("a", "l1", &["loops", "syntax"]), lesson("b", "l2", &["functions"])];
    let found = find_lessons_by_tags(&tags(&["syntax", "recursion"]), &catalog);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].lesson_id, "l1");
    assert_eq!(found[0].matching_tags, tags(&["syntax"]));
  }
}
