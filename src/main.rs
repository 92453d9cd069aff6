//! QuizPath · Adaptive Quiz Remediation Backend
//!
//! - Axum JSON API: quizzes, weak-topic analysis, remedial quizzes, lessons
//! - OpenAI-compatible classifier for weak concept tags (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000)
//!   OPENAI_API_KEY        : enables the classifier if present
//!   OPENAI_BASE_URL       : default "https://api.openai.com/v1"
//!   OPENAI_MODEL          : default "gpt-4o"
//!   QUIZPATH_CONFIG_PATH  : path to TOML config (prompts, limits, content root)
//!   CONTENT_ROOT          : overrides `content_root` from the config
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod error;
mod config;
mod content;
mod grading;
mod prompt;
mod response;
mod remediation;
mod session;
mod classifier;
mod openai;
mod seeds;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (content repository, classifier, session store, prompts).
  let state = Arc::new(AppState::new());

  // Periodically drop quiz scopes and progress nobody has touched for a while.
  spawn_session_sweeper(state.clone());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "quizpath", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "quizpath", "Server stopped");
  Ok(())
}

/// Resolves on Ctrl+C; in-flight requests finish before the server exits.
async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "quizpath", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "quizpath", "Shutdown signal received");
}

fn spawn_session_sweeper(state: Arc<AppState>) {
  let period = state.sessions.idle_ttl() / 4;
  tokio::spawn(async move {
    let mut tick = tokio::time::interval(period);
    loop {
      tick.tick().await;
      state.sessions.evict_idle(Instant::now()).await;
    }
  });
}
