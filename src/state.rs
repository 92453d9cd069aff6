//! Application state: content repository, classifier, session store and settings.
//!
//! This module owns:
//!   - the content repository (file-backed, or built-in seeds when the root is missing)
//!   - the optional classifier client
//!   - per-learner session scopes
//!   - prompts and pipeline limits (from TOML or defaults)

use std::{path::Path, sync::Arc, time::Duration};

use tracing::{info, instrument, warn};

use crate::classifier::Classifier;
use crate::config::{load_app_config_from_env, AppConfig, Prompts};
use crate::content::{ContentRepository, FsContent};
use crate::openai::OpenAI;
use crate::seeds::seed_content;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub content: Arc<dyn ContentRepository>,
    pub classifier: Option<Arc<dyn Classifier>>,
    pub sessions: SessionStore,
    pub prompts: Prompts,
    pub classifier_timeout: Duration,
    pub mastery_threshold: f64,
}

impl AppState {
    /// Build state from env: load config, pick the content source, init the classifier.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_app_config_from_env();

        let content: Arc<dyn ContentRepository> = if Path::new(&cfg.content_root).join("subjects").is_dir() {
            info!(target: "quizpath", root = %cfg.content_root, "Serving content from disk");
            Arc::new(FsContent::new(&cfg.content_root))
        } else {
            warn!(target: "quizpath", root = %cfg.content_root, "Content root has no subjects/ directory; serving built-in seed content");
            Arc::new(seed_content())
        };

        // Build optional classifier (if API key present).
        let classifier: Option<Arc<dyn Classifier>> =
            match OpenAI::from_env(cfg.classifier_timeout(), cfg.classifier_max_tokens) {
                Some(oa) => {
                    info!(target: "quizpath", base_url = %oa.base_url, model = %oa.model, "OpenAI classifier enabled.");
                    Some(Arc::new(oa))
                }
                None => {
                    warn!(target: "quizpath", "OpenAI disabled (no OPENAI_API_KEY). Quiz analysis will report the classifier as unavailable.");
                    None
                }
            };

        Self::with_parts(content, classifier, &cfg)
    }

    /// Assemble state from explicit parts (used by `new` and by tests).
    pub fn with_parts(
        content: Arc<dyn ContentRepository>,
        classifier: Option<Arc<dyn Classifier>>,
        cfg: &AppConfig,
    ) -> Self {
        Self {
            content,
            classifier,
            sessions: SessionStore::new(cfg.session_idle_ttl()),
            prompts: cfg.prompts.clone(),
            classifier_timeout: cfg.classifier_timeout(),
            mastery_threshold: cfg.mastery_threshold,
        }
    }
}
