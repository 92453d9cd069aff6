//! Classifier prompt building.
//!
//! The allowed-tag vocabulary is embedded verbatim in every request: the
//! classifier keeps no state between calls and its output is untrusted, so each
//! request carries its own contract.

use crate::config::{Prompts, ALLOWED_TAGS_SLOT, SUBMISSION_SLOT};
use crate::domain::TagVocabulary;
use crate::util::fill_template;

/// One classifier request: a system message plus the instruction text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisPrompt {
  pub system: String,
  pub instruction: String,
}

/// Vocabulary rendered as a JSON array, e.g. `["loops", "functions"]`.
pub fn render_vocabulary(vocab: &TagVocabulary) -> String {
  serde_json::to_string(vocab.as_slice()).unwrap_or_else(|_| "[]".into())
}

pub fn build_analysis_prompt(prompts: &Prompts, transcript: &str, vocab: &TagVocabulary) -> AnalysisPrompt {
  let tags = render_vocabulary(vocab);
  // Transcript goes last: learner text must not be able to inject a vocabulary.
  let instruction = fill_template(
    &prompts.analysis_user_template,
    &[(ALLOWED_TAGS_SLOT, &tags), (SUBMISSION_SLOT, transcript)],
  );
  AnalysisPrompt { system: prompts.analysis_system.clone(), instruction }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vocab() -> TagVocabulary {
    TagVocabulary::new(vec!["add".to_string(), "subtract".to_string()])
  }

  #[test]
  fn embeds_vocabulary_verbatim_and_transcript() {
    let transcript = "Question 1 (Type: coding): x\nStatus: For AI Review\n\n";
    let p = build_analysis_prompt(&Prompts::default(), transcript, &vocab());
    assert!(p.instruction.contains(r#"from this predefined list ONLY: ["add","subtract"]"#));
    assert!(p.instruction.contains(&format!("--- START OF SUBMISSION ---\n{}--- END OF SUBMISSION ---", transcript)));
    assert!(p.instruction.contains("\"detailed_feedback\""));
    assert!(p.instruction.contains("\"weak_concept_tags\""));
    assert!(!p.system.is_empty());
  }

  #[test]
  fn learner_text_cannot_inject_vocabulary() {
    let p = build_analysis_prompt(&Prompts::default(), "answer: {allowed_tags}\n", &vocab());
    assert!(p.instruction.contains("answer: {allowed_tags}"));
  }

  #[test]
  fn empty_vocabulary_renders_empty_list() {
    let p = build_analysis_prompt(&Prompts::default(), "", &TagVocabulary::default());
    assert!(p.instruction.contains("ONLY: []"));
  }
}
