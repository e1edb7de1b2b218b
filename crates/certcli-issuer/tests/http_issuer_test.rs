//! HttpIssuer against an in-process issuer

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use certcli_issuer::{bearer_token, HttpIssuer, Issuer, IssuerConfig, IssuerError, Url};
use chrono::{TimeZone, Utc};
use tokio::net::TcpListener;

const PASSPHRASE: &str = "correct horse";

#[derive(Clone, Default)]
struct IssuerState {
    state_hits: Arc<AtomicUsize>,
    flaky_hits: Arc<AtomicUsize>,
}

async fn state_handler(
    State(state): State<IssuerState>,
    Path(domain): Path<String>,
) -> (StatusCode, String) {
    state.state_hits.fetch_add(1, Ordering::SeqCst);
    if domain == "broken.example" {
        return (StatusCode::OK, "{\"serial\": ".to_string());
    }
    if domain == "missing.example" {
        return (StatusCode::NOT_FOUND, "not found".to_string());
    }
    (
        StatusCode::OK,
        format!(
            r#"{{"serial":"{}-serial","nextRenewTime":"2030-01-01T00:00:00Z"}}"#,
            domain
        ),
    )
}

async fn certificate_handler(Path(domain): Path<String>) -> String {
    format!("certificate for {}", domain)
}

async fn fullchain_handler(Path(domain): Path<String>) -> String {
    format!("fullchain for {}", domain)
}

async fn key_handler(headers: HeaderMap, Path(domain): Path<String>) -> (StatusCode, String) {
    let expected = format!("Bearer {}", bearer_token(PASSPHRASE));
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => (StatusCode::OK, format!("key for {}", domain)),
        _ => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
    }
}

async fn flaky_handler(
    State(state): State<IssuerState>,
    Path(domain): Path<String>,
) -> (StatusCode, String) {
    if state.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "try again".to_string());
    }
    (StatusCode::OK, format!("certificate for {}", domain))
}

async fn start_issuer() -> (Url, IssuerState) {
    let state = IssuerState::default();
    let app = Router::new()
        .route("/api/cert/{domain}", get(state_handler))
        .route("/api/cert/{domain}/certificate", get(certificate_handler))
        .route("/api/cert/{domain}/fullchain", get(fullchain_handler))
        .route("/api/cert/{domain}/key", get(key_handler))
        .route("/flaky/cert/{domain}/certificate", get(flaky_handler))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = Url::parse(&format!("http://{}/api/", local_addr)).unwrap();
    (url, state)
}

fn test_issuer() -> HttpIssuer {
    HttpIssuer::new(IssuerConfig {
        timeout: Duration::from_secs(5),
        retry_attempts: 2,
        retry_backoff: Duration::from_millis(10),
    })
    .unwrap()
}

#[tokio::test]
async fn test_fetch_state() {
    let (server, _state) = start_issuer().await;
    let issuer = test_issuer();

    let state = issuer.fetch_state(&server, "example.com").await.unwrap();
    assert_eq!(state.serial, "example.com-serial");
    assert_eq!(
        state.next_renew_time,
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_fetch_artifacts() {
    let (server, _state) = start_issuer().await;
    let issuer = test_issuer();

    let cert = issuer.fetch_certificate(&server, "example.com").await.unwrap();
    assert_eq!(cert, b"certificate for example.com");

    let chain = issuer.fetch_fullchain(&server, "example.com").await.unwrap();
    assert_eq!(chain, b"fullchain for example.com");
}

#[tokio::test]
async fn test_fetch_key_sends_bearer() {
    let (server, _state) = start_issuer().await;
    let issuer = test_issuer();

    let key = issuer
        .fetch_key(&server, "example.com", PASSPHRASE)
        .await
        .unwrap();
    assert_eq!(key, b"key for example.com");

    let err = issuer
        .fetch_key(&server, "example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, IssuerError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_decode_error() {
    let (server, _state) = start_issuer().await;
    let issuer = test_issuer();

    let err = issuer
        .fetch_state(&server, "broken.example")
        .await
        .unwrap_err();
    assert!(matches!(err, IssuerError::Decode { .. }));
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let (server, state) = start_issuer().await;
    let issuer = test_issuer();

    let err = issuer
        .fetch_state(&server, "missing.example")
        .await
        .unwrap_err();
    assert!(matches!(err, IssuerError::Status { status: 404, .. }));
    assert_eq!(state.state_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_server_error_retried() {
    let (server, state) = start_issuer().await;
    let flaky = server.join("/flaky/").unwrap();
    let issuer = test_issuer();

    let cert = issuer.fetch_certificate(&flaky, "example.com").await.unwrap();
    assert_eq!(cert, b"certificate for example.com");
    assert_eq!(state.flaky_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind and drop to get a port with nothing listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server = Url::parse(&format!("http://{}", addr)).unwrap();
    let issuer = test_issuer();

    let err = issuer.fetch_state(&server, "example.com").await.unwrap_err();
    assert!(matches!(err, IssuerError::Transport { .. }));
}
