use std::time::Duration;

use errly_client::{ClientError, DeliveryClient, HttpClient, IngestEvent, IngestRequest};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "errly_ab12_0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

fn accepted() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "message": "Events processed",
        "processed_count": 1,
        "project_id": "6f1c2f0e-8a63-4c0b-9f6e-1f7f0c1c2d3e",
        "timestamp": 1704103200
    }))
}

fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::new(format!("{}/", server.uri()), API_KEY, Duration::from_secs(5)).unwrap()
}

fn request() -> IngestRequest {
    IngestRequest::single(
        IngestEvent::new("division by zero", "production")
            .with_stack_trace("  File \"handler.py\", line 42, in divide"),
    )
}

#[tokio::test]
async fn test_send_posts_events_with_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .and(header("Authorization", format!("Bearer {}", API_KEY).as_str()))
        .and(header("Content-Type", "application/json"))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server).send(&request()).await.unwrap();
    assert!(response.success);
    assert_eq!(response.processed_count, 1);

    let received = server.received_requests().await.unwrap();
    let user_agent = received[0].headers.get("user-agent").unwrap().to_str().unwrap();
    assert!(user_agent.starts_with("errly-rust/"));

    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    let event = &body["events"][0];
    assert_eq!(event["message"], "division by zero");
    assert_eq!(event["level"], "error");
    assert!(event["stack_trace"].as_str().unwrap().contains("handler.py"));
    assert!(event.get("release_version").is_none());
    assert!(event["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_unauthorized_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "invalid api key",
            "code": "unauthorized"
        })))
        .mount(&server)
        .await;

    let error = client_for(&server).send(&request()).await.unwrap_err();
    assert!(matches!(error, ClientError::Unauthorized));
}

#[tokio::test]
async fn test_rate_limit_reads_reset_header() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .respond_with(ResponseTemplate::new(429).insert_header("X-RateLimit-Reset", "1704103260"))
        .mount(&server)
        .await;

    let error = client_for(&server).send(&request()).await.unwrap_err();
    assert!(matches!(
        error,
        ClientError::RateLimited {
            reset: Some(1704103260)
        }
    ));
}

#[tokio::test]
async fn test_server_error_keeps_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "database unavailable",
            "code": "internal",
            "timestamp": 1704103200
        })))
        .mount(&server)
        .await;

    match client_for(&server).send(&request()).await.unwrap_err() {
        ClientError::Http { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "database unavailable");
        }
        other => panic!("Expected HTTP error, got {:?}", other),
    }
}

#[test]
fn test_deliver_from_plain_thread() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(MockServer::start());
    runtime.block_on(
        Mock::given(method("POST"))
            .and(path("/api/v1/ingest"))
            .respond_with(accepted())
            .expect(1)
            .mount(&server),
    );

    client_for(&server).deliver(request());

    let received = runtime.block_on(server.received_requests()).unwrap();
    assert_eq!(received.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deliver_inside_async_runtime() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/ingest"))
        .respond_with(accepted())
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server).deliver(request());

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[test]
fn test_deliver_swallows_unreachable_endpoint() {
    let client = HttpClient::new("http://127.0.0.1:9", API_KEY, Duration::from_millis(500)).unwrap();

    client.deliver(request());
}

#[test]
fn test_deliver_swallows_rejection() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(MockServer::start());
    runtime.block_on(
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server),
    );

    client_for(&server).deliver(request());

    assert_eq!(runtime.block_on(server.received_requests()).unwrap().len(), 1);
}
