//! The external weak-concept classifier, seen by the pipeline as one opaque call.

use async_trait::async_trait;

use crate::error::ClassifierFailure;
use crate::prompt::AnalysisPrompt;

#[async_trait]
pub trait Classifier: Send + Sync {
  /// Short label for logs (e.g. the model name).
  fn name(&self) -> &str;

  /// Send the prompt and return the raw reply text. Transport errors map to
  /// `ClassifierFailure::Unavailable`; the reply itself is not interpreted here.
  async fn classify(&self, prompt: &AnalysisPrompt) -> Result<String, ClassifierFailure>;
}

#[cfg(test)]
pub mod testing {
  use std::sync::Mutex;
  use std::time::Duration;

  use super::*;

  /// Replays canned replies in order (the last one repeats) and records prompts.
  pub struct ScriptedClassifier {
    replies: Vec<Result<String, ClassifierFailure>>,
    delay: Option<Duration>,
    pub prompts: Mutex<Vec<AnalysisPrompt>>,
  }

  impl ScriptedClassifier {
    pub fn replying(reply: impl Into<String>) -> Self {
      Self { replies: vec![Ok(reply.into())], delay: None, prompts: Mutex::new(Vec::new()) }
    }

    pub fn failing(failure: ClassifierFailure) -> Self {
      Self { replies: vec![Err(failure)], delay: None, prompts: Mutex::new(Vec::new()) }
    }

    pub fn then(mut self, reply: impl Into<String>) -> Self {
      self.replies.push(Ok(reply.into()));
      self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
      self.delay = Some(delay);
      self
    }
  }

  #[async_trait]
  impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
      "scripted"
    }

    async fn classify(&self, prompt: &AnalysisPrompt) -> Result<String, ClassifierFailure> {
      let n = {
        let mut seen = self.prompts.lock().unwrap();
        seen.push(prompt.clone());
        seen.len()
      };
      if let Some(d) = self.delay {
        tokio::time::sleep(d).await;
      }
      let idx = (n - 1).min(self.replies.len() - 1);
      self.replies[idx].clone()
    }
  }
}
