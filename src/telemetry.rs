//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! Behavior:
//! - LOG_LEVEL controls the filter (e.g. "debug" or detailed directives like
//!   "info,analysis=debug,remediation=debug,quizpath=debug,tower_http=info,axum=info").
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Notes:
//! - Pipeline stages log under their own targets (`analysis`, `remediation`,
//!   `content`, `quizpath`) so each can be turned up independently.
//! - Tower HTTP TraceLayer still adds per-request spans; this complements it.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str =
    "info,analysis=debug,remediation=debug,content=info,quizpath=debug,tower_http=info,axum=info";

/// Filter from a LOG_LEVEL value; unset or unparsable falls back to the default.
/// Returns whether the given value was rejected, to be reported once logging is up.
fn resolve_filter(raw: Option<&str>) -> (EnvFilter, bool) {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => match EnvFilter::try_new(directives) {
            Ok(f) => (f, false),
            Err(_) => (EnvFilter::new(DEFAULT_FILTER), true),
        },
        None => (EnvFilter::new(DEFAULT_FILTER), false),
    }
}

pub fn init_tracing() {
    let raw = std::env::var("LOG_LEVEL").ok();
    let (filter, rejected) = resolve_filter(raw.as_deref());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // Choose JSON vs pretty; don't try to store different layer types.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => {
            builder.json().init();
        }
        _ => {
            builder.init();
        }
    }

    if rejected {
        tracing::warn!(target: "quizpath", log_level = ?raw, default = DEFAULT_FILTER, "Invalid LOG_LEVEL; using default filter");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn blank_or_invalid_level_falls_back() {
        assert!(!resolve_filter(None).1);
        assert!(!resolve_filter(Some("  ")).1);
        assert!(!resolve_filter(Some("analysis=trace")).1);
        assert!(resolve_filter(Some("analysis=loudest")).1);
    }
}
