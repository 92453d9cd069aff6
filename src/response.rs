//! Classifier response validation.
//!
//! The classifier's reply is a proposal. We pull one JSON object out of free
//! text, read the feedback and the candidate weak tags, and keep only tags that
//! are exact members of the subject's vocabulary.
//!
//! Extraction grammar:
//! 1. Fenced blocks (```` ```json ... ``` ```` or ```` ``` ... ``` ````), in order; the first
//!    whose trimmed body parses as a JSON object wins.
//! 2. Otherwise every `{` / `[` in the text, left to right: take the balanced
//!    region (string and escape aware) and try to parse it. The first object wins.
//! 3. Parseable JSON that is never an object is an unexpected shape; no
//!    parseable JSON at all is a malformed response.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::TagVocabulary;
use crate::error::ClassifierFailure;

pub const FEEDBACK_FIELD: &str = "detailed_feedback";
pub const WEAK_TAGS_FIELD: &str = "weak_concept_tags";
const FALLBACK_FEEDBACK: &str = "No detailed feedback provided.";

static FENCED_BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();

fn fenced_block_regex() -> &'static Regex {
  FENCED_BLOCK_REGEX.get_or_init(|| {
    Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("Invalid fenced block regex")
  })
}

/// Validated classifier output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifierVerdict {
  pub feedback: String,
  /// Subset of the vocabulary, classifier order, no duplicates. May be empty.
  pub weak_tags: Vec<String>,
  /// Proposed tags that were dropped (outside the vocabulary or not strings).
  pub rejected: Vec<String>,
}

enum Found {
  Object(Map<String, Value>),
  Other(Value),
}

fn classify_value(v: Value) -> Found {
  match v {
    Value::Object(m) => Found::Object(m),
    other => Found::Other(other),
  }
}

/// Pull the first JSON object out of free text (see module docs for the grammar).
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, ClassifierFailure> {
  let mut first_other: Option<Value> = None;

  for cap in fenced_block_regex().captures_iter(raw) {
    let body = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
    if let Ok(v) = serde_json::from_str::<Value>(body) {
      match classify_value(v) {
        Found::Object(m) => return Ok(m),
        Found::Other(v) => {
          first_other.get_or_insert(v);
        }
      }
    }
  }

  for (start, ch) in raw.char_indices() {
    if ch != '{' && ch != '[' {
      continue;
    }
    let Some(end) = balanced_end(raw, start) else { continue };
    if let Ok(v) = serde_json::from_str::<Value>(&raw[start..end]) {
      match classify_value(v) {
        Found::Object(m) => return Ok(m),
        Found::Other(v) => {
          first_other.get_or_insert(v);
        }
      }
    }
  }

  match first_other {
    Some(v) => Err(ClassifierFailure::UnexpectedShape(format!("expected a JSON object, found {}", json_kind(&v)))),
    None => Err(ClassifierFailure::MalformedResponse("no JSON object found in classifier reply".into())),
  }
}

/// Byte offset just past the bracket that closes the one at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
  let mut stack: Vec<char> = Vec::new();
  let mut in_string = false;
  let mut escaped = false;

  for (offset, ch) in text[start..].char_indices() {
    if in_string {
      if escaped {
        escaped = false;
      } else if ch == '\\' {
        escaped = true;
      } else if ch == '"' {
        in_string = false;
      }
      continue;
    }
    match ch {
      '"' => in_string = true,
      '{' => stack.push('}'),
      '[' => stack.push(']'),
      '}' | ']' => {
        if stack.pop() != Some(ch) {
          return None;
        }
        if stack.is_empty() {
          return Some(start + offset + ch.len_utf8());
        }
      }
      _ => {}
    }
  }
  None
}

fn json_kind(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

/// Parse and filter a raw classifier reply against the subject's vocabulary.
///
/// An empty tag list is a valid result ("nothing to remediate"), never a failure.
pub fn validate_response(raw: &str, vocab: &TagVocabulary) -> Result<ClassifierVerdict, ClassifierFailure> {
  let obj = extract_json_object(raw)?;

  let feedback_field = obj.get(FEEDBACK_FIELD);
  let tags_field = obj.get(WEAK_TAGS_FIELD);
  if feedback_field.is_none() && tags_field.is_none() {
    return Err(ClassifierFailure::MalformedResponse(format!(
      "JSON object has neither '{}' nor '{}'",
      FEEDBACK_FIELD, WEAK_TAGS_FIELD
    )));
  }

  let feedback = match feedback_field {
    None | Some(Value::Null) => FALLBACK_FEEDBACK.to_string(),
    Some(Value::String(s)) => s.clone(),
    Some(other) => {
      return Err(ClassifierFailure::UnexpectedShape(format!(
        "'{}' is {}, expected a string",
        FEEDBACK_FIELD,
        json_kind(other)
      )))
    }
  };

  let proposed: &[Value] = match tags_field {
    None | Some(Value::Null) => &[],
    Some(Value::Array(items)) => items,
    Some(other) => {
      return Err(ClassifierFailure::UnexpectedShape(format!(
        "'{}' is {}, expected a list of strings",
        WEAK_TAGS_FIELD,
        json_kind(other)
      )))
    }
  };

  let mut seen = HashSet::new();
  let mut weak_tags = Vec::new();
  let mut rejected = Vec::new();
  for item in proposed {
    match item {
      Value::String(tag) if vocab.contains(tag) => {
        if seen.insert(tag.as_str()) {
          weak_tags.push(tag.clone());
        }
      }
      Value::String(tag) => rejected.push(tag.clone()),
      other => rejected.push(other.to_string()),
    }
  }

  Ok(ClassifierVerdict { feedback, weak_tags, rejected })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vocab(tags: &[&str]) -> TagVocabulary {
    TagVocabulary::new(tags.iter().map(|s| s.to_string()))
  }

  #[test]
  fn fenced_reply_is_filtered_against_vocabulary() {
    let raw = "```json\n{\"detailed_feedback\":\"ok\",\"weak_concept_tags\":[\"add\",\"bogus\"]}\n```";
    let v = validate_response(raw, &vocab(&["add", "subtract"])).unwrap();
    assert_eq!(v.feedback, "ok");
    assert_eq!(v.weak_tags, vec!["add".to_string()]);
    assert_eq!(v.rejected, vec!["bogus".to_string()]);
  }

  #[test]
  fn bare_object_inside_prose_is_found() {
    let raw = "Here is my analysis:\n{\"detailed_feedback\": \"Review loops {carefully}.\", \"weak_concept_tags\": [\"loops\"]}\nGood luck!";
    let v = validate_response(raw, &vocab(&["loops"])).unwrap();
    assert_eq!(v.feedback, "Review loops {carefully}.");
    assert_eq!(v.weak_tags, vec!["loops".to_string()]);
  }

  #[test]
  fn fenced_object_preferred_over_earlier_bare_object() {
    let raw = "Example: {\"weak_concept_tags\": [\"a\"]}\n```json\n{\"weak_concept_tags\": [\"b\"]}\n```";
    let v = validate_response(raw, &vocab(&["a", "b"])).unwrap();
    assert_eq!(v.weak_tags, vec!["b".to_string()]);
  }

  #[test]
  fn unparseable_prefix_braces_are_skipped() {
    let raw = "Use {braces} like {this}. {\"weak_concept_tags\": []}";
    let v = validate_response(raw, &vocab(&["a"])).unwrap();
    assert!(v.weak_tags.is_empty());
    assert_eq!(v.feedback, FALLBACK_FEEDBACK);
  }

  #[test]
  fn no_json_is_malformed_not_empty_success() {
    let err = validate_response("I could not analyze this submission.", &vocab(&["a"])).unwrap_err();
    assert!(matches!(err, ClassifierFailure::MalformedResponse(_)));
    let err = validate_response("", &vocab(&["a"])).unwrap_err();
    assert!(matches!(err, ClassifierFailure::MalformedResponse(_)));
  }

  #[test]
  fn object_without_expected_fields_is_malformed() {
    let err = validate_response("{\"answer\": 42}", &vocab(&["a"])).unwrap_err();
    assert!(matches!(err, ClassifierFailure::MalformedResponse(_)));
  }

  #[test]
  fn array_only_reply_is_unexpected_shape() {
    let err = validate_response("```json\n[\"loops\"]\n```", &vocab(&["loops"])).unwrap_err();
    assert!(matches!(err, ClassifierFailure::UnexpectedShape(_)));
  }

  #[test]
  fn wrong_field_types_are_unexpected_shape() {
    let err = validate_response("{\"weak_concept_tags\": \"loops\"}", &vocab(&["loops"])).unwrap_err();
    assert!(matches!(err, ClassifierFailure::UnexpectedShape(_)));
    let err = validate_response("{\"detailed_feedback\": 3, \"weak_concept_tags\": []}", &vocab(&["loops"])).unwrap_err();
    assert!(matches!(err, ClassifierFailure::UnexpectedShape(_)));
  }

  #[test]
  fn missing_tag_list_defaults_to_empty() {
    let v = validate_response("{\"detailed_feedback\": \"All good\"}", &vocab(&["a"])).unwrap();
    assert_eq!(v.feedback, "All good");
    assert!(v.weak_tags.is_empty());
  }

  #[test]
  fn tags_are_exact_case_sensitive_and_deduplicated() {
    let raw = r#"{"weak_concept_tags": ["Loops", "loops", " loops", "loops", 7, null]}"#;
    let v = validate_response(raw, &vocab(&["loops"])).unwrap();
    assert_eq!(v.weak_tags, vec!["loops".to_string()]);
    assert_eq!(v.rejected.len(), 4);
  }

  #[test]
  fn empty_vocabulary_rejects_everything() {
    let raw = r#"{"detailed_feedback": "x", "weak_concept_tags": ["loops", "functions"]}"#;
    let v = validate_response(raw, &TagVocabulary::default()).unwrap();
    assert!(v.weak_tags.is_empty());
  }

  #[test]
  fn adversarial_replies_never_leak_unknown_tags() {
    let allowed = vocab(&["add", "subtract"]);
    let replies = [
      r#"{"weak_concept_tags": ["ADD", "add ", "multiply", "subtract"]}"#,
      "```\n{\"weak_concept_tags\": [\"divide\"]}\n```",
      r#"{"weak_concept_tags": [["add"], {"tag": "add"}, "subtract\u0000"]}"#,
      r#"prefix [1, 2] {"detailed_feedback": "}", "weak_concept_tags": ["add"]} suffix"#,
    ];
    for raw in replies {
      if let Ok(v) = validate_response(raw, &allowed) {
        assert!(v.weak_tags.iter().all(|t| allowed.contains(t)), "{raw}");
      }
    }
  }

  #[test]
  fn balanced_scan_handles_escaped_quotes() {
    let raw = r#"note {"detailed_feedback": "say \"hi\" }", "weak_concept_tags": ["a"]} end"#;
    let v = validate_response(raw, &vocab(&["a"])).unwrap();
    assert_eq!(v.feedback, "say \"hi\" }");
  }
}
