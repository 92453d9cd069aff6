//! Minimal OpenAI client implementing `Classifier`.
//!
//! We only call chat.completions and ask for a JSON object when the model supports it.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::classifier::Classifier;
use crate::error::ClassifierFailure;
use crate::prompt::AnalysisPrompt;

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub max_tokens: u32,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env(timeout: Duration, max_tokens: u32) -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, model, max_tokens })
  }

  /// JSON mode is only offered by newer chat models.
  fn supports_json_mode(&self) -> bool {
    ["1106", "turbo-preview", "gpt-4o", "gpt-4-turbo"].iter().any(|m| self.model.contains(m))
  }

  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, user_len = user.len()))]
  async fn chat(&self, system: &str, user: &str) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: 0.2,
      response_format: self.supports_json_mode().then(|| ResponseFormat { r#type: "json_object".into() }),
      max_tokens: Some(self.max_tokens),
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "quizpath-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      return Err(format!("OpenAI HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "OpenAI usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    Ok(text)
  }
}

#[async_trait]
impl Classifier for OpenAI {
  fn name(&self) -> &str {
    &self.model
  }

  async fn classify(&self, prompt: &AnalysisPrompt) -> Result<String, ClassifierFailure> {
    let start = Instant::now();
    match self.chat(&prompt.system, &prompt.instruction).await {
      Ok(text) if text.is_empty() => {
        error!(target: "analysis", elapsed = ?start.elapsed(), "Model returned an empty reply");
        Err(ClassifierFailure::Unavailable("empty reply from model".into()))
      }
      Ok(text) => {
        info!(target: "analysis", elapsed = ?start.elapsed(), reply_len = text.len(), "Model response received");
        Ok(text)
      }
      Err(e) => {
        error!(target: "analysis", elapsed = ?start.elapsed(), error = %e, "Model call failed");
        Err(ClassifierFailure::Unavailable(e))
      }
    }
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
struct ResponseFormat { #[serde(rename = "type")] r#type: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from OpenAI error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(model: &str) -> OpenAI {
    OpenAI {
      client: reqwest::Client::new(),
      api_key: "test".into(),
      base_url: "http://127.0.0.1:9".into(),
      model: model.into(),
      max_tokens: 100,
    }
  }

  #[test]
  fn json_mode_only_for_capable_models() {
    assert!(client("gpt-4o").supports_json_mode());
    assert!(client("gpt-4-turbo").supports_json_mode());
    assert!(!client("gpt-4").supports_json_mode());
  }

  #[test]
  fn extracts_api_error_message() {
    let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
    assert_eq!(extract_openai_error(body).as_deref(), Some("Rate limit reached"));
    assert_eq!(extract_openai_error("<html>"), None);
  }

  #[tokio::test]
  async fn unreachable_endpoint_is_unavailable() {
    let prompt = AnalysisPrompt { system: "s".into(), instruction: "i".into() };
    let err = client("gpt-4o").classify(&prompt).await.unwrap_err();
    assert!(matches!(err, ClassifierFailure::Unavailable(_)));
  }
}
