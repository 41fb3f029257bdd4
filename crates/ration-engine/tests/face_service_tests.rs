//! # Integration Tests for the HTTP face service client
//!
//! Runs [`HttpFaceService`] against wiremock to check request shape,
//! bearer authentication and the mapping of every failure mode.

use std::time::Duration;

use ration_core::{FaceEmbedding, FaceSample};
use ration_engine::{ComparatorError, FaceComparator, FaceServiceConfig, HttpFaceService};
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service(server: &MockServer, token: Option<&str>, timeout_secs: u64) -> HttpFaceService {
    let mut config = FaceServiceConfig::new(Url::parse(&server.uri()).unwrap());
    config.token = token.map(str::to_string);
    config.timeout_secs = timeout_secs;
    HttpFaceService::new(config).expect("client build")
}

fn sample() -> FaceSample {
    FaceSample::new(b"jpeg-bytes".to_vec()).unwrap()
}

#[tokio::test]
async fn test_embed_posts_base64_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer face-token"))
        .and(body_json(serde_json::json!({ "image_base64": sample().to_base64() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "face_detected": true,
            "embedding": [0.6, 0.8]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let svc = service(&server, Some("face-token"), 5);
    let embedding = svc.embed(&sample()).await.unwrap();
    assert_eq!(embedding.dimensions(), 2);

    let reference = FaceEmbedding::new(vec![1.0, 0.0]).unwrap();
    let confidence = svc.compare(&reference, &embedding).await.unwrap();
    assert_eq!(confidence.value(), 60.0);
}

#[tokio::test]
async fn test_no_face_detected_is_reported_as_such() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "face_detected": false,
            "embedding": null
        })))
        .mount(&server)
        .await;

    let err = service(&server, None, 5).embed(&sample()).await.unwrap_err();
    assert_eq!(err, ComparatorError::NoFaceDetected);
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let err = service(&server, None, 5).embed(&sample()).await.unwrap_err();
    match err {
        ComparatorError::Unavailable { reason } => assert!(reason.contains("model loading")),
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_error_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let err = service(&server, None, 5).embed(&sample()).await.unwrap_err();
    assert!(matches!(err, ComparatorError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = service(&server, None, 5).embed(&sample()).await.unwrap_err();
    assert!(matches!(err, ComparatorError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(serde_json::json!({ "face_detected": true, "embedding": [1.0] })),
        )
        .mount(&server)
        .await;

    let err = service(&server, None, 1).embed(&sample()).await.unwrap_err();
    assert_eq!(err, ComparatorError::Timeout { elapsed_ms: 1000 });
}

#[tokio::test]
async fn test_unreachable_service_is_unavailable() {
    let server = MockServer::start().await;
    let svc = service(&server, None, 2);
    drop(server);

    let err = svc.embed(&sample()).await.unwrap_err();
    assert!(matches!(err, ComparatorError::Unavailable { .. }));
}
