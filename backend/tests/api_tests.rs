//! Integration tests for the Minaret API.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use minaret::cast::discovery::{DeviceCandidate, EnumerationStrategy};
use minaret::cast::session::{MediaSession, SessionError, SessionFactory};
use minaret::config::Config;
use minaret::create_app_with_state;
use minaret::state::AppState;
use minaret_types::api::{BreakerListResponse, DeviceListResponse, DiscoverResponse};
use minaret_types::broadcast::{BroadcastOutcome, BroadcastStatus, StopOutcome};
use minaret_types::device::{Device, MediaSnapshot, PlayerState};
use parking_lot::Mutex;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt; // for `oneshot`

/// Enumeration strategy that reports a fixed candidate list.
struct FixedStrategy {
    candidates: Vec<DeviceCandidate>,
}

#[async_trait]
impl EnumerationStrategy for FixedStrategy {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn enumerate(&self, _timeout: Duration) -> anyhow::Result<Vec<DeviceCandidate>> {
        Ok(self.candidates.clone())
    }
}

/// Session that reports whatever was last loaded as playing.
#[derive(Default)]
struct EchoSession {
    loaded: Mutex<Option<String>>,
}

#[async_trait]
impl MediaSession for EchoSession {
    async fn load(&self, url: &str, _content_type: &str) -> Result<(), SessionError> {
        *self.loaded.lock() = Some(url.to_string());
        Ok(())
    }

    async fn stop(&self) -> Result<(), SessionError> {
        *self.loaded.lock() = None;
        Ok(())
    }

    async fn refresh_status(&self) -> Result<MediaSnapshot, SessionError> {
        Ok(match self.loaded.lock().clone() {
            Some(url) => MediaSnapshot {
                player_state: PlayerState::Playing,
                content_id: Some(url),
            },
            None => MediaSnapshot::idle(),
        })
    }

    async fn close(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

struct EchoFactory;

#[async_trait]
impl SessionFactory for EchoFactory {
    async fn open(
        &self,
        _device: &Device,
        _timeout: Duration,
    ) -> Result<Arc<dyn MediaSession>, SessionError> {
        Ok(Arc::new(EchoSession::default()))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.media_base_url = Some("http://127.0.0.1:5000".to_string());
    config.connection.retry_delay_secs = 0;
    config.playback.retry_delay_secs = 0;
    config.playback.initial_wait_ms = 0;
    config.playback.short_wait_secs = 0;
    config.playback.medium_wait_secs = 0;
    config.playback.long_wait_secs = 0;
    config.playback.stop_wait_ms = 0;
    config.playback.restart_wait_secs = 0;
    config
}

/// Build a test app backed by one fake device named "Adahn".
///
/// The returned listener keeps the device endpoint accepting TCP
/// connections so pool reachability probes pass.
async fn create_test_app() -> (Router, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let strategy = Arc::new(FixedStrategy {
        candidates: vec![DeviceCandidate {
            id: Some("test-adahn".to_string()),
            name: "Adahn".to_string(),
            address: addr.ip(),
            port: addr.port(),
            model: Some("Google Nest Mini".to_string()),
            manufacturer: Some("Google Inc.".to_string()),
        }],
    });
    let state = AppState::new(test_config(), vec![strategy], Arc::new(EchoFactory));
    (create_app_with_state(state).await, listener)
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .body(Body::empty())
        .unwrap()
}

fn play_request(kind: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/broadcast/play")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({ "kind": kind })).unwrap(),
        ))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _listener) = create_test_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_list_devices_empty_before_discovery() {
    let (app, _listener) = create_test_app().await;

    let response = app.oneshot(get("/api/devices")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let devices: DeviceListResponse = body_json(response).await;
    assert!(devices.devices.is_empty());
}

#[tokio::test]
async fn test_discover_populates_cache() {
    let (app, _listener) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(post("/api/devices/discover"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let discovered: DiscoverResponse = body_json(response).await;
    assert_eq!(discovered.devices.len(), 1);
    assert_eq!(discovered.devices[0].name, "Adahn");
    assert!(!discovered.from_cache);
    assert_eq!(discovered.strategy.as_deref(), Some("fixed"));

    // Second round inside the cooldown window is served from the cache
    let response = app.oneshot(post("/api/devices/discover")).await.unwrap();
    let cached: DiscoverResponse = body_json(response).await;
    assert!(cached.from_cache);
    assert!(cached.skipped);
}

#[tokio::test]
async fn test_get_device() {
    let (app, _listener) = create_test_app().await;

    app.clone()
        .oneshot(post("/api/devices/discover"))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/devices/Adahn"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let device: Device = body_json(response).await;
    assert_eq!(device.name, "Adahn");

    let response = app.oneshot(get("/api/devices/Kitchen")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: serde_json::Value = body_json(response).await;
    assert_eq!(error["code"], "device_not_found");
}

#[tokio::test]
async fn test_broadcast_round_trip() {
    let (app, _listener) = create_test_app().await;

    let response = app.clone().oneshot(play_request("fajr")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: BroadcastOutcome = body_json(response).await;
    assert!(outcome.success);
    assert_eq!(outcome.device.as_deref(), Some("Adahn"));
    assert!(outcome.error_code.is_none());

    let response = app
        .clone()
        .oneshot(get("/api/broadcast/status"))
        .await
        .unwrap();
    let status: BroadcastStatus = body_json(response).await;
    assert!(status.active);
    assert_eq!(status.device.as_deref(), Some("Adahn"));
    assert_eq!(
        status.media_url.as_deref(),
        Some("http://127.0.0.1:5000/media/azan_fajr.mp3")
    );

    let response = app
        .clone()
        .oneshot(post("/api/broadcast/stop"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stopped: StopOutcome = body_json(response).await;
    assert!(stopped.was_playing);

    let response = app.oneshot(get("/api/broadcast/status")).await.unwrap();
    let status: BroadcastStatus = body_json(response).await;
    assert!(!status.active);
}

#[tokio::test]
async fn test_concurrent_broadcast_conflicts() {
    let (app, _listener) = create_test_app().await;

    let response = app.clone().oneshot(play_request("regular")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(play_request("fajr")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let outcome: BroadcastOutcome = body_json(response).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("broadcast_collision"));
}

#[tokio::test]
async fn test_broadcast_fails_when_no_device_reachable() {
    // Device endpoint that refuses connections: bind then drop.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let strategy = Arc::new(FixedStrategy {
        candidates: vec![DeviceCandidate {
            id: None,
            name: "Adahn".to_string(),
            address: addr.ip(),
            port: addr.port(),
            model: Some("Google Nest Mini".to_string()),
            manufacturer: None,
        }],
    });
    let mut config = test_config();
    config.connection.max_retries = 1;
    config.playback.max_retries = 1;
    let state = AppState::new(config, vec![strategy], Arc::new(EchoFactory));
    let app = create_app_with_state(state).await;

    let response = app.oneshot(play_request("regular")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let outcome: BroadcastOutcome = body_json(response).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_code.as_deref(), Some("unreachable"));
}

#[tokio::test]
async fn test_breaker_endpoints() {
    let (app, _listener) = create_test_app().await;

    app.clone().oneshot(play_request("regular")).await.unwrap();

    let response = app.clone().oneshot(get("/api/breakers")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let breakers: BreakerListResponse = body_json(response).await;
    assert!(breakers.breakers.iter().any(|b| b.name == "Adahn"));

    let response = app
        .clone()
        .oneshot(get("/api/breakers/Adahn"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post("/api/breakers/Adahn/reset"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/breakers/Kitchen")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_pool_status_after_broadcast() {
    let (app, _listener) = create_test_app().await;

    app.clone().oneshot(play_request("regular")).await.unwrap();

    let response = app.oneshot(get("/api/pool")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let pool: serde_json::Value = body_json(response).await;
    let connections = pool["active_connections"].as_array().unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0]["device_name"], "Adahn");
}
