//! Loading service configuration (content root, classifier limits, prompts) from TOML.
//!
//! See `AppConfig` and `Prompts` for the expected schema. Every field is optional.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

pub const ALLOWED_TAGS_SLOT: &str = "allowed_tags";
pub const SUBMISSION_SLOT: &str = "submission";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub content_root: String,
  pub classifier_timeout_secs: u64,
  pub classifier_max_tokens: u32,
  /// Fraction of correct answers that counts as mastery (0.0..=1.0).
  pub mastery_threshold: f64,
  /// Quiz scopes and progress untouched for this long are dropped.
  pub session_idle_secs: u64,
  pub prompts: Prompts,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      content_root: "./data".into(),
      classifier_timeout_secs: 30,
      classifier_max_tokens: 1500,
      mastery_threshold: 0.80,
      session_idle_secs: 4 * 60 * 60,
      prompts: Prompts::default(),
    }
  }
}

impl AppConfig {
  pub fn classifier_timeout(&self) -> Duration {
    Duration::from_secs(self.classifier_timeout_secs.max(1))
  }

  pub fn session_idle_ttl(&self) -> Duration {
    Duration::from_secs(self.session_idle_secs.max(60))
  }
}

/// Prompts sent to the classifier. The user template is filled with the
/// allowed-tag vocabulary (`{allowed_tags}`) and the graded transcript (`{submission}`).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub analysis_system: String,
  pub analysis_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      analysis_system: "You are an expert instructor. Your task is to analyze a student's quiz performance, classify their errors against a predefined list of topics, and evaluate their submitted code. For 'coding' questions, determine if the student's code correctly solves the problem.".into(),
      analysis_user_template: concat!(
        "You are analyzing a student's quiz submission which includes multiple choice, fill-in-the-blank, and coding questions.\n",
        "Based on the incorrect answers and their submitted code, identify the concepts they are weak in.\n",
        "You **MUST** choose the weak concepts from this predefined list ONLY: {allowed_tags}\n\n",
        "For coding questions marked 'For AI Review', evaluate if the student's code:\n",
        "1. Correctly solves the problem\n",
        "2. Uses appropriate syntax and conventions\n",
        "3. Demonstrates understanding of the underlying concepts\n",
        "Compare their code with the provided sample solution.\n\n",
        "Provide your analysis as a single JSON object with two keys:\n",
        " - \"detailed_feedback\": (string) Your textual analysis, including specific feedback on coding attempts, what they did well, and areas for improvement.\n",
        " - \"weak_concept_tags\": (JSON list of strings) The list of weak concepts from the ALLOWED TAGS list. If there are no weaknesses, provide an empty list `[]`.\n\n",
        "Here is the student's submission:\n",
        "--- START OF SUBMISSION ---\n",
        "{submission}",
        "--- END OF SUBMISSION ---\n",
      )
      .into(),
    }
  }
}

impl Prompts {
  /// A template that drops either slot would stop embedding the vocabulary or the transcript.
  fn has_required_slots(&self) -> bool {
    let tpl = &self.analysis_user_template;
    tpl.contains(&format!("{{{}}}", ALLOWED_TAGS_SLOT)) && tpl.contains(&format!("{{{}}}", SUBMISSION_SLOT))
  }
}

/// Parse TOML text; an analysis template missing a required slot is replaced by the default.
pub fn parse_app_config(text: &str) -> Result<AppConfig, toml::de::Error> {
  let mut cfg = toml::from_str::<AppConfig>(text)?;
  if !cfg.prompts.has_required_slots() {
    error!(target: "quizpath", "analysis_user_template must contain {{allowed_tags}} and {{submission}}; using default template");
    cfg.prompts.analysis_user_template = Prompts::default().analysis_user_template;
  }
  Ok(cfg)
}

/// Load `AppConfig` from QUIZPATH_CONFIG_PATH (defaults on any IO/parse error),
/// then apply the CONTENT_ROOT override.
pub fn load_app_config_from_env() -> AppConfig {
  let mut cfg = match std::env::var("QUIZPATH_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match parse_app_config(&s) {
        Ok(cfg) => {
          info!(target: "quizpath", %path, "Loaded config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "quizpath", %path, error = %e, "Failed to parse TOML config; using defaults");
          AppConfig::default()
        }
      },
      Err(e) => {
        error!(target: "quizpath", %path, error = %e, "Failed to read TOML config file; using defaults");
        AppConfig::default()
      }
    },
    Err(_) => AppConfig::default(),
  };

  if let Ok(root) = std::env::var("CONTENT_ROOT") {
    cfg.content_root = root;
  }
  cfg
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_toml_gives_defaults() {
    let cfg = parse_app_config("").unwrap();
    assert_eq!(cfg.content_root, "./data");
    assert_eq!(cfg.classifier_timeout(), Duration::from_secs(30));
    assert!((cfg.mastery_threshold - 0.8).abs() < f64::EPSILON);
    assert_eq!(cfg.session_idle_ttl(), Duration::from_secs(4 * 60 * 60));
    assert!(cfg.prompts.has_required_slots());
  }

  #[test]
  fn partial_toml_overrides_fields() {
    let cfg = parse_app_config(
      r#"
content_root = "/srv/content"
classifier_timeout_secs = 5
session_idle_secs = 1

[prompts]
analysis_system = "Be brief."
"#,
    )
    .unwrap();
    assert_eq!(cfg.content_root, "/srv/content");
    assert_eq!(cfg.classifier_timeout_secs, 5);
    // Floored so a typo cannot evict sessions mid-quiz.
    assert_eq!(cfg.session_idle_ttl(), Duration::from_secs(60));
    assert_eq!(cfg.prompts.analysis_system, "Be brief.");
    assert_eq!(cfg.prompts.analysis_user_template, Prompts::default().analysis_user_template);
  }

  #[test]
  fn template_without_vocabulary_slot_is_rejected() {
    let cfg = parse_app_config(
      r#"
[prompts]
analysis_user_template = "Grade this: {submission}"
"#,
    )
    .unwrap();
    assert_eq!(cfg.prompts.analysis_user_template, Prompts::default().analysis_user_template);
  }
}
