//! Integration tests for the offer endpoint and the signaling client
//!
//! Endpoint tests drive the router in-process; client tests run against a
//! real listener on the loopback interface.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use framerelay_core::{
    h264_capability, EngineConfig, PeerConnectionHandle, RelayError, SdpType, SessionDescription,
};
use framerelay_signaling::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

fn local_server() -> SignalingServer {
    SignalingServer::new(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        EngineConfig::local_only(),
        framerelay_media::TransformKind::Grayscale.build(),
    )
}

async fn video_offer() -> (Arc<PeerConnectionHandle>, SessionDescription) {
    let handle = PeerConnectionHandle::new(&EngineConfig::local_only())
        .await
        .unwrap();
    let track: Arc<dyn TrackLocal + Send + Sync> = Arc::new(TrackLocalStaticSample::new(
        h264_capability(),
        "video".to_owned(),
        "test-camera".to_owned(),
    ));
    handle.add_local_track(track).await.unwrap();
    let offer = handle.create_local_offer().await.unwrap();
    (handle, offer)
}

fn offer_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(OFFER_PATH)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Serve `router` on an ephemeral loopback port
async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

// ============================================================================
// OFFER ENDPOINT
// ============================================================================

#[tokio::test]
async fn test_malformed_json_is_rejected_without_registering() {
    let server = local_server();
    let response = server
        .router()
        .oneshot(offer_request("{\"sdp\": \"v=0"))
        .await
        .unwrap();

    assert_ne!(response.status(), StatusCode::OK);
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn test_answer_type_is_rejected() {
    let server = local_server();
    let response = server
        .router()
        .oneshot(offer_request(r#"{"sdp": "v=0\r\n", "type": "answer"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("expected offer"));
    assert!(server.registry().is_empty());
}

#[tokio::test]
async fn test_get_is_not_allowed() {
    let server = local_server();
    let request = Request::builder()
        .method("GET")
        .uri(OFFER_PATH)
        .body(Body::empty())
        .unwrap();
    let response = server.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_valid_offer_gets_answer() {
    let server = local_server();
    let (client, offer) = video_offer().await;

    let response = server
        .router()
        .oneshot(offer_request(offer.to_json().unwrap()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(is_json_content_type(&content_type));

    let answer = SessionDescription::from_json(&body_bytes(response).await).unwrap();
    assert_eq!(answer.kind, SdpType::Answer);
    assert!(!answer.sdp.is_empty());
    assert!(answer.sdp.contains("H264"));
    assert_eq!(server.registry().len(), 1);

    assert_eq!(server.shutdown().await, 1);
    assert!(server.registry().is_empty());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_cancelled_offer_leaves_no_connection() {
    let server = local_server();
    let (client, offer) = video_offer().await;
    let body = offer.to_json().unwrap();

    let result =
        tokio::time::timeout(Duration::from_micros(1), server.handle_offer(body.as_bytes())).await;

    assert!(result.is_err());
    assert!(server.registry().is_empty());
    assert_eq!(server.shutdown().await, 0);
    client.close().await.unwrap();
}

// ============================================================================
// SIGNALING CLIENT
// ============================================================================

#[tokio::test]
async fn test_client_treats_server_error_as_failure() {
    let url = spawn_stub(Router::new().route(
        OFFER_PATH,
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "negotiation exploded") }),
    ))
    .await;
    let client = SignalingClient::new(&url, Duration::from_secs(5)).unwrap();

    let err = client
        .post_offer(&SessionDescription::offer("v=0\r\n"))
        .await
        .unwrap_err();
    match err {
        RelayError::SignalingStatus { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "negotiation exploded");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_client_rejects_non_json_answer() {
    let url = spawn_stub(Router::new().route(
        OFFER_PATH,
        post(|| async { r#"{"sdp": "v=0", "type": "answer"}"#.into_response() }),
    ))
    .await;
    let client = SignalingClient::new(&url, Duration::from_secs(5)).unwrap();

    let err = client
        .post_offer(&SessionDescription::offer("v=0\r\n"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::UnexpectedContentType { .. }));
    assert!(err.is_signaling());
}

#[tokio::test]
async fn test_client_times_out() {
    let url = spawn_stub(Router::new().route(
        OFFER_PATH,
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK
        }),
    ))
    .await;
    let client = SignalingClient::new(&url, Duration::from_millis(200)).unwrap();

    let err = client
        .post_offer(&SessionDescription::offer("v=0\r\n"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::SignalingTimeout { .. }));
    assert!(err.is_signaling());
}

#[tokio::test]
async fn test_client_rejects_malformed_json_answer() {
    let url = spawn_stub(Router::new().route(
        OFFER_PATH,
        post(|| async { ([(header::CONTENT_TYPE, "application/json")], r#"{"sdp": "#) }),
    ))
    .await;
    let client = SignalingClient::new(&url, Duration::from_secs(5)).unwrap();

    let err = client
        .post_offer(&SessionDescription::offer("v=0\r\n"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::InvalidSessionDescription { .. }));
    assert!(err.is_signaling());
}

#[tokio::test]
async fn test_client_against_real_server() {
    let server = local_server();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = {
        let server = server.clone();
        tokio::spawn(async move {
            server
                .serve(listener, async move {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    let (handle, offer) = video_offer().await;
    let client = SignalingClient::new(&url, Duration::from_secs(10)).unwrap();
    let answer = tokio_test::assert_ok!(client.post_offer(&offer).await);
    assert_eq!(answer.kind, SdpType::Answer);
    handle.apply_answer(&answer).await.unwrap();
    assert_eq!(server.registry().len(), 1);
    drop(client);

    stop_tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
    assert!(server.registry().is_empty());
    handle.close().await.unwrap();
}
