//! Integration tests for the `/api/chat` proxy routes

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{result, started, status, thread, Call, FakeBackend, Step};
use delve_core::backend::JobStatus;
use delve_core::proxy;
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn send(
    backend: &Arc<FakeBackend>,
    request: Request<Body>,
) -> (StatusCode, serde_json::Value) {
    let app = proxy::router(backend.clone(), 3);
    let resp = app.oneshot(request).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

// --- POST /api/chat ---

#[tokio::test]
async fn test_search_message_returns_normalized_thread() {
    let backend = Arc::new(FakeBackend::new().on_query(Step::Ok(thread(
        "t-1",
        &[("human", "hello"), ("ai", "Hi there")],
    ))));

    let (status, json) = send(
        &backend,
        post("/api/chat", serde_json::json!({ "message": "hello", "threadId": null })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["thread_id"], "t-1");
    assert_eq!(json["messages"][0]["role"], "user");
    assert_eq!(json["messages"][1]["role"], "assistant");
    assert_eq!(json["messages"][1]["content"], "Hi there");
    assert_eq!(
        backend.calls(),
        vec![Call::Query {
            content: "hello".to_string(),
            thread_id: None,
        }]
    );
}

#[tokio::test]
async fn test_search_message_forwards_thread_id() {
    let backend = Arc::new(
        FakeBackend::new().on_query(Step::Ok(thread("t-7", &[("human", "more")]))),
    );

    send(
        &backend,
        post(
            "/api/chat",
            serde_json::json!({ "message": "more", "threadId": "t-7", "mode": "search" }),
        ),
    )
    .await;

    assert_eq!(
        backend.calls(),
        vec![Call::Query {
            content: "more".to_string(),
            thread_id: Some("t-7".to_string()),
        }]
    );
}

#[tokio::test]
async fn test_research_message_returns_job_envelope() {
    let backend = Arc::new(FakeBackend::new().on_start(Step::Ok(started("job-1"))));

    let (status, json) = send(
        &backend,
        post(
            "/api/chat",
            serde_json::json!({ "message": "printing press", "mode": "research" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["research_id"], "job-1");
    assert_eq!(json["thread_id"], "job-1");
    assert_eq!(json["status"], "in_progress");
    assert_eq!(json["progress"], 0);
    assert_eq!(json["total_iterations"], 3);
    assert_eq!(json["messages"][0]["tool_calls"][0]["name"], "deep_research");
    assert_eq!(
        json["messages"][0]["tool_calls"][0]["args"]["query"],
        "printing press"
    );
}

#[tokio::test]
async fn test_backend_failure_maps_to_500() {
    let backend = Arc::new(FakeBackend::new().on_query(Step::Fail(502, "upstream down")));

    let (status, json) = send(
        &backend,
        post("/api/chat", serde_json::json!({ "message": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "API error (502): upstream down");
}

#[tokio::test]
async fn test_unknown_mode_falls_back_to_search() {
    let backend = Arc::new(
        FakeBackend::new().on_query(Step::Ok(thread("t-1", &[("human", "hi")]))),
    );

    let (status, json) = send(
        &backend,
        post("/api/chat", serde_json::json!({ "message": "hi", "mode": "deep" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["thread_id"], "t-1");
    assert_eq!(
        backend.calls(),
        vec![Call::Query {
            content: "hi".to_string(),
            thread_id: None,
        }]
    );
}

#[tokio::test]
async fn test_malformed_body_is_json_error() {
    let backend = Arc::new(FakeBackend::new());
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, json) = send(&backend, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_non_json_content_type_is_json_error() {
    let backend = Arc::new(FakeBackend::new());
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "text/plain")
        .body(Body::from("hello"))
        .unwrap();

    let (status, json) = send(&backend, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_missing_message_is_json_error() {
    let backend = Arc::new(FakeBackend::new());

    let (status, json) = send(
        &backend,
        post("/api/chat", serde_json::json!({ "mode": "research" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].is_string());
    assert!(backend.calls().is_empty());
}

// --- GET /api/chat ---

#[tokio::test]
async fn test_missing_parameters_is_bad_request() {
    let backend = Arc::new(FakeBackend::new());

    let (status, json) = send(&backend, get("/api/chat")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing research_id or thread_id parameter");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_research_in_progress_reports_progress() {
    let backend = Arc::new(
        FakeBackend::new().on_status(Step::Ok(status(JobStatus::InProgress, 1, 3))),
    );

    let (status, json) = send(&backend, get("/api/chat?research_id=job-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "in_progress");
    assert_eq!(json["progress"], 1);
    assert_eq!(json["messages"][0]["content"], "Researching... (1/3)");
    assert_eq!(json["messages"][0]["isLoading"], true);
}

#[tokio::test]
async fn test_research_completed_returns_report_and_metadata() {
    let backend = Arc::new(
        FakeBackend::new()
            .on_status(Step::Ok(status(JobStatus::Completed, 3, 3)))
            .on_result(Step::Ok(result(Some("Final report")))),
    );

    let (status, json) = send(&backend, get("/api/chat?research_id=job-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["messages"][0]["content"], "Final report");
    assert_eq!(json["research_data"]["iterations"], 2);
    assert_eq!(json["research_data"]["search_queries"][1], "Gutenberg Bible");
}

#[tokio::test]
async fn test_research_without_report_is_error_envelope() {
    let backend = Arc::new(
        FakeBackend::new()
            .on_status(Step::Ok(status(JobStatus::Completed, 3, 3)))
            .on_result(Step::Ok(result(None))),
    );

    let (status, json) = send(&backend, get("/api/chat?research_id=job-1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "error");
    assert_eq!(
        json["error"],
        "Research completed but no report was generated"
    );
    assert_eq!(json["messages"][0]["isError"], true);
}

#[tokio::test]
async fn test_research_error_is_error_envelope() {
    let backend =
        Arc::new(FakeBackend::new().on_status(Step::Ok(status(JobStatus::Error, 1, 3))));

    let (_, json) = send(&backend, get("/api/chat?research_id=job-1")).await;

    assert_eq!(json["status"], "error");
    assert_eq!(json["error"], "Research failed to complete");
    assert_eq!(backend.result_calls(), 0);
}

#[tokio::test]
async fn test_thread_lookup_normalizes_roles() {
    let backend = Arc::new(FakeBackend::new().on_thread(Step::Ok(thread(
        "t-3",
        &[("human", "q"), ("ai", "a")],
    ))));

    let (status, json) = send(&backend, get("/api/chat?thread_id=t-3")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["thread_id"], "t-3");
    assert_eq!(json["messages"][1]["role"], "assistant");
}

#[tokio::test]
async fn test_health() {
    let backend = Arc::new(FakeBackend::new());

    let (status, json) = send(&backend, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}
