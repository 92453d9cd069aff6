//! Router assembly: quiz and lesson endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - JSON API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // Content listings
        .route("/api/v1/subjects", get(http::http_subjects))
        .route("/api/v1/subjects/:subject/tags", get(http::http_subject_tags))
        .route("/api/v1/subjects/:subject/subtopics", get(http::http_subtopics))
        // Quiz pipeline
        .route("/api/v1/quiz/:subject/:subtopic/start", post(http::http_start_quiz))
        .route("/api/v1/quiz/:subject/:subtopic/analyze", post(http::http_analyze))
        .route(
            "/api/v1/quiz/:subject/:subtopic/remedial",
            post(http::http_generate_remedial).get(http::http_take_remedial),
        )
        .route("/api/v1/quiz/:subject/:subtopic/results", get(http::http_results))
        // Lessons
        .route("/api/v1/lessons/find-by-tags", post(http::http_find_lessons))
        .route("/api/v1/lessons/:subject/:subtopic/:lesson_id", get(http::http_lesson))
        // Videos
        .route("/api/v1/videos/:subject/:subtopic", get(http::http_videos))
        .route("/api/v1/videos/:subject/:subtopic/:topic_key", get(http::http_video))
        // Learner progress
        .route("/api/v1/progress", get(http::http_progress))
        .route("/api/v1/progress/update", post(http::http_update_progress))
        // Content cache hook for whoever edits the content files
        .route("/api/v1/admin/cache/clear", post(http::http_clear_cache))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt; // for `oneshot`

    use crate::classifier::testing::ScriptedClassifier;
    use crate::classifier::Classifier;
    use crate::config::AppConfig;
    use crate::error::ClassifierFailure;
    use crate::seeds::seed_content;

    fn app_with(classifier: Option<ScriptedClassifier>) -> Router {
        let classifier = classifier.map(|c| Arc::new(c) as Arc<dyn Classifier>);
        let state = AppState::with_parts(Arc::new(seed_content()), classifier, &AppConfig::default());
        build_router(Arc::new(state))
    }

    fn app() -> Router {
        app_with(Some(ScriptedClassifier::replying(
            r#"{"detailed_feedback": "Revisit return.", "weak_concept_tags": ["return values"]}"#,
        )))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    #[tokio::test]
    async fn health_reports_classifier() {
        let (status, body) = send(&app_with(None), get_req("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["classifier"], false);
    }

    #[tokio::test]
    async fn quiz_round_trip_over_http() {
        let app = app();

        let (status, quiz) = send(&app, post_json("/api/v1/quiz/python/functions/start", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let sid = quiz["sessionId"].as_str().unwrap().to_string();
        assert!(!sid.is_empty());
        assert_eq!(quiz["quizType"], "initial");
        assert_eq!(quiz["questions"].as_array().unwrap().len(), 4);
        assert_eq!(quiz["questions"][0]["type"], "multiple_choice");
        for q in quiz["questions"].as_array().unwrap() {
            for key in ["answer_index", "correct_answer", "sample_solution"] {
                assert!(q.get(key).is_none(), "{key} served in {q}");
            }
        }

        let (status, analysis) = send(
            &app,
            post_json(
                "/api/v1/quiz/python/functions/analyze",
                json!({ "sessionId": sid, "answers": { "q0": "def", "q1": "yield", "q2": "None" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(analysis["score"]["correct"], 2);
        assert_eq!(analysis["score"]["total"], 4);
        assert_eq!(analysis["score"]["percentage"], 50);
        assert_eq!(analysis["weakTopics"], json!(["return values"]));
        assert_eq!(analysis["outcomes"][3]["status"], "incorrect");

        let (status, remedial) =
            send(&app, post_json("/api/v1/quiz/python/functions/remedial", json!({ "sessionId": sid }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(remedial["title"], "Remedial Quiz (Focusing on: return values)");
        assert_eq!(remedial["questions"].as_array().unwrap().len(), 1);
        assert_eq!(remedial["lessons"][0]["lesson"]["lessonId"], "return_values");
        assert!(remedial["questions"][0].get("answer_index").is_none());

        let (status, results) =
            send(&app, get_req(&format!("/api/v1/quiz/python/functions/results?sessionId={}", sid))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results["quizType"], "remedial");
        assert_eq!(results["feedback"], "Revisit return.");
        assert!(results["remedialQuestions"][0].get("answer_index").is_none());
        assert_eq!(results["videos"][0]["videoId"], "9Os0o3wzS_I");
        assert!(results["quizGenerationError"].is_null());
    }

    #[tokio::test]
    async fn caller_supplied_session_id_is_kept() {
        let (_, quiz) =
            send(&app(), post_json("/api/v1/quiz/python/loops/start", json!({ "sessionId": "learner-7" }))).await;
        assert_eq!(quiz["sessionId"], "learner-7");
    }

    #[tokio::test]
    async fn errors_are_json_with_stable_codes() {
        let app = app_with(Some(ScriptedClassifier::failing(ClassifierFailure::Unavailable("down".into()))));

        let (status, body) = send(&app, get_req("/api/v1/subjects/rust/tags")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "content_not_found");

        let (status, body) = send(
            &app,
            post_json("/api/v1/quiz/python/loops/analyze", json!({ "sessionId": "ghost", "answers": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "session_state_missing");

        send(&app, post_json("/api/v1/quiz/python/loops/start", json!({ "sessionId": "s" }))).await;
        let (status, body) = send(
            &app,
            post_json("/api/v1/quiz/python/loops/analyze", json!({ "sessionId": "s", "answers": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "classifier_unavailable");
        assert!(!body["message"].as_str().unwrap().contains("down"));

        let (status, body) =
            send(&app, get_req("/api/v1/quiz/python/loops/results?sessionId=s")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "session_state_missing");
    }

    #[tokio::test]
    async fn lesson_endpoints() {
        let app = app();

        let (status, body) = send(&app, get_req("/api/v1/subjects/python/subtopics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subtopics"][0]["id"], "functions");
        assert_eq!(body["subtopics"][1]["order"], 2);

        let (status, body) = send(
            &app,
            post_json("/api/v1/lessons/find-by-tags", json!({ "subject": "python", "tags": ["scope", "while loops"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["lessons"][0]["lessonId"], "scope");
        assert_eq!(body["lessons"][1]["matchingTags"], json!(["while loops"]));

        let (status, body) = send(&app, get_req("/api/v1/lessons/python/functions/parameters")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lesson"]["title"], "Parameters and Arguments");

        let (status, body) = send(&app, post_json("/api/v1/admin/cache/clear", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared"], "all");
    }

    #[tokio::test]
    async fn served_quiz_cannot_be_graded_client_side() {
        let (_, quiz) =
            send(&app(), post_json("/api/v1/quiz/python/loops/start", json!({ "sessionId": "s" }))).await;
        assert_eq!(quiz["questions"][1]["type"], "fill_in_the_blank");
        assert_eq!(
            quiz["questions"][1],
            json!({
                "type": "fill_in_the_blank",
                "question": "The keyword that exits a loop immediately is ____.",
                "tags": ["loop control"]
            })
        );
        assert!(quiz["questions"][0]["options"].is_array());
        assert!(!quiz.to_string().contains("answer_index"));
    }

    #[tokio::test]
    async fn duplicate_answer_keys_are_rejected() {
        let app = app();
        send(&app, post_json("/api/v1/quiz/python/functions/start", json!({ "sessionId": "s" }))).await;
        let (status, body) = send(
            &app,
            post_json(
                "/api/v1/quiz/python/functions/analyze",
                json!({ "sessionId": "s", "answers": { "q0": "def", "0": "func" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn subjects_and_videos_over_http() {
        let app = app();

        let (status, body) = send(&app, get_req("/api/v1/subjects")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subjects"][0]["id"], "python");
        assert_eq!(body["subjects"][0]["subtopicCount"], 2);
        assert_eq!(body["subjects"][0]["status"], "active");

        let (status, body) = send(&app, get_req("/api/v1/videos/python/loops")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["videos"][0]["key"], "loops");

        let (status, body) = send(&app, get_req("/api/v1/videos/python/loops/loops")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["embedUrl"], "https://www.youtube.com/embed/94UHCEmprCY?enablejsapi=1");

        let (status, body) = send(&app, get_req("/api/v1/videos/python/loops/arrays")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "content_not_found");
    }

    #[tokio::test]
    async fn progress_round_trip() {
        let app = app();

        let (status, body) = send(
            &app,
            post_json("/api/v1/progress/update", json!({ "sessionId": "s", "topic": "loops", "progress": 60 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["progress"], json!({ "loops": 60 }));

        let (status, body) =
            send(&app, post_json("/api/v1/progress/update", json!({ "sessionId": "s", "topic": "loops" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");

        let (status, body) = send(&app, get_req("/api/v1/progress?sessionId=s")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionId"], "s");
        assert_eq!(body["progress"]["loops"], 60);
    }
}
