//! Integration tests for the HTTP surface, driven through the router with
//! `tower::ServiceExt::oneshot` and no real sockets.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use devmesh::{build_router, CoreOptions, ServerConfig, ServerState};

const DIM: usize = 32;

fn test_state(shared_secret: Option<&str>) -> Arc<ServerState> {
    let config = ServerConfig {
        shared_secret: shared_secret.map(String::from),
        ..Default::default()
    };
    let core = CoreOptions {
        embedder: devmesh::EmbedderConfig {
            dim: DIM,
            ..Default::default()
        },
        ..Default::default()
    };
    Arc::new(ServerState::new(config, core).expect("state builds"))
}

fn ingest_body() -> Value {
    json!([
        {
            "timestamp": "2026-02-01T00:00:00.000001Z",
            "service": "sshd",
            "host": "node-1",
            "level": "INFO",
            "message": "hello 1234"
        },
        {
            "timestamp": "2026-02-01T00:00:00.000002Z",
            "service": "sshd",
            "host": "node-1",
            "level": "INFO",
            "message": "hello 5678"
        }
    ])
}

async fn send_json(
    state: Arc<ServerState>,
    request: Request<Body>,
) -> (StatusCode, Value) {
    let response = build_router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn post_ingest(body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/ingest/logs")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("x-devmesh-token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn ingest_then_query_roundtrip() {
    let state = test_state(None);

    let (status, body) = send_json(state.clone(), post_ingest(&ingest_body(), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["duplicates"], 0);

    // Replay: all duplicates.
    let (status, body) = send_json(state.clone(), post_ingest(&ingest_body(), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 0);
    assert_eq!(body["duplicates"], 2);

    let (status, body) =
        send_json(state.clone(), get("/query/logs?service=sshd&limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn semantic_search_surface() {
    let state = test_state(None);
    send_json(state.clone(), post_ingest(&ingest_body(), None)).await;

    let (status, body) = send_json(
        state.clone(),
        get("/search/templates?q=hello%20%3CN%3E&limit=10&examples=2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degraded"], false);
    let hits = body["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["template"]["canonical_text"], "hello <N>");
    assert_eq!(hits[0]["examples"].as_array().unwrap().len(), 2);

    let (status, body) = send_json(state, get("/search/logs?q=hello&limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degraded"], false);
    assert!(body["count"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn per_record_errors_are_reported() {
    let state = test_state(None);
    let body = json!([
        {
            "timestamp": "2026-02-01T00:00:00Z",
            "service": "sshd",
            "host": "node-1",
            "level": "NOPE",
            "message": "bad level"
        },
        {
            "timestamp": "2026-02-01T00:00:01Z",
            "service": "sshd",
            "host": "node-1",
            "level": "WARN",
            "message": "fine"
        }
    ]);

    let (status, response) = send_json(state, post_ingest(&body, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["accepted"], 1);
    let errors = response["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["index"], 0);
}

#[tokio::test]
async fn empty_batch_is_accepted() {
    let state = test_state(None);
    let (status, body) = send_json(state, post_ingest(&json!([]), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 0);
    assert_eq!(body["duplicates"], 0);
}

#[tokio::test]
async fn shared_secret_gates_data_routes_not_system_routes() {
    let state = test_state(Some("hunter2"));

    let (status, body) = send_json(state.clone(), post_ingest(&ingest_body(), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_FAILED");

    let (status, _) =
        send_json(state.clone(), post_ingest(&ingest_body(), Some("hunter2"))).await;
    assert_eq!(status, StatusCode::OK);

    // System endpoints stay open.
    let (status, _) = send_json(state.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(state, get("/info")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn full_gate_answers_busy() {
    let state = test_state(None);

    // Drain every ingest permit.
    let mut held = Vec::new();
    for _ in 0..state.config.ingest_queue_depth {
        held.push(state.ingest_gate.clone().try_acquire_owned().unwrap());
    }

    let (status, body) = send_json(state.clone(), post_ingest(&ingest_body(), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "BUSY");
    assert_eq!(body["error"]["retryable"], true);

    // Releasing the permits makes the same submission succeed.
    drop(held);
    let (status, _) = send_json(state, post_ingest(&ingest_body(), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bad_filters_are_rejected_without_retry_hint() {
    let state = test_state(None);
    let (status, body) = send_json(state.clone(), get("/query/logs?level=NOPE")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["retryable"], false);

    let (status, _) = send_json(state, get("/search/templates?q=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_info_report_state() {
    let state = test_state(None);
    send_json(state.clone(), post_ingest(&ingest_body(), None)).await;

    let (status, body) = send_json(state.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send_json(state, get("/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"], 2);
    assert_eq!(body["templates"], 1);
    assert_eq!(body["canon_version"], 1);
    assert_eq!(body["stats"]["accepted"], 2);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let state = test_state(None);
    let (status, body) = send_json(state, get("/no/such/route")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}
