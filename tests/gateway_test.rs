// Gateway integration tests
//
// These tests drive the gateway through a scripted in-process transport so
// the 401/refresh coordination can be exercised deterministically, including
// the concurrent cases.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;

use nido_client::auth::{CredentialStore, TokenResponse};
use nido_client::config::Config;
use nido_client::error::TransportError;
use nido_client::gateway::Gateway;
use nido_client::transport::{ApiRequest, ApiResponse, Transport};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

/// Scripted backend standing in for the raw transport. Protected endpoints
/// accept exactly one bearer token; the refresh endpoint rotates it.
struct FakeBackend {
    /// Token currently accepted by protected endpoints
    valid_token: Mutex<String>,

    /// Whether the refresh endpoint succeeds or rejects the refresh token
    refresh_succeeds: bool,

    /// When set, protected endpoints return 401 regardless of bearer
    reject_all_data: bool,

    /// When set, protected endpoints return this status instead
    data_status_override: Option<u16>,

    /// When set, every call fails at the network level
    network_down: bool,

    /// Artificial latencies, to widen the race window in concurrent tests
    request_delay: Duration,
    refresh_delay: Duration,

    refresh_calls: AtomicUsize,
    data_calls: AtomicUsize,
}

impl FakeBackend {
    fn new(valid_token: &str) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh_succeeds: true,
            reject_all_data: false,
            data_status_override: None,
            network_down: false,
            request_delay: Duration::from_millis(0),
            refresh_delay: Duration::from_millis(0),
            refresh_calls: AtomicUsize::new(0),
            data_calls: AtomicUsize::new(0),
        }
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, TransportError> {
        if self.network_down {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        if request.path.contains("/auth/refresh") {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.refresh_delay).await;

            if !self.refresh_succeeds {
                return Ok(ApiResponse {
                    status: 401,
                    body: json!({"detail": "Invalid refresh token"}),
                });
            }

            *self.valid_token.lock().unwrap() = "access-fresh".to_string();
            return Ok(ApiResponse {
                status: 200,
                body: json!({
                    "access_token": "access-fresh",
                    "refresh_token": "refresh-fresh",
                    "token_type": "bearer",
                    "expires_in": 900
                }),
            });
        }

        if request.path.contains("/auth/login") {
            return Ok(ApiResponse {
                status: 401,
                body: json!({"detail": "Invalid email or password"}),
            });
        }

        self.data_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.request_delay).await;

        if let Some(status) = self.data_status_override {
            return Ok(ApiResponse {
                status,
                body: json!({"detail": "server error"}),
            });
        }

        let valid = self.valid_token.lock().unwrap().clone();
        if !self.reject_all_data && bearer == Some(valid.as_str()) {
            Ok(ApiResponse {
                status: 200,
                body: json!({"ok": true}),
            })
        } else {
            Ok(ApiResponse {
                status: 401,
                body: json!({"detail": "Token has expired"}),
            })
        }
    }
}

fn build_gateway(backend: Arc<FakeBackend>) -> (Arc<Gateway>, CredentialStore) {
    let config = Config::for_base_url("http://localhost:8000");
    let store = CredentialStore::new();
    let gateway = Arc::new(Gateway::new(backend, store.clone(), &config));
    (gateway, store)
}

async fn seed_session(store: &CredentialStore, access: &str, refresh: &str) {
    store
        .set(TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            token_type: "bearer".to_string(),
            expires_in: 900,
        })
        .await;
}

// ==================================================================================================
// Fast Path
// ==================================================================================================

#[tokio::test]
async fn test_valid_token_passes_through() {
    let backend = Arc::new(FakeBackend::new("access-1"));
    let (gateway, store) = build_gateway(backend.clone());
    seed_session(&store, "access-1", "refresh-1").await;

    let response = gateway
        .send(&ApiRequest::get("/api/v1/students"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(backend.data_calls(), 1);
}

#[tokio::test]
async fn test_non_401_error_passes_through() {
    let mut fake = FakeBackend::new("access-1");
    fake.data_status_override = Some(500);
    let backend = Arc::new(fake);
    let (gateway, store) = build_gateway(backend.clone());
    seed_session(&store, "access-1", "refresh-1").await;

    let response = gateway
        .send(&ApiRequest::get("/api/v1/students"))
        .await
        .unwrap();

    assert_eq!(response.status, 500);
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(backend.data_calls(), 1);
}

#[tokio::test]
async fn test_transport_error_passes_through() {
    let mut fake = FakeBackend::new("access-1");
    fake.network_down = true;
    let backend = Arc::new(fake);
    let (gateway, store) = build_gateway(backend.clone());
    seed_session(&store, "access-1", "refresh-1").await;

    let result = gateway.send(&ApiRequest::get("/api/v1/students")).await;

    assert!(matches!(result, Err(TransportError::Connect(_))));
    assert_eq!(backend.refresh_calls(), 0);
}

// ==================================================================================================
// Refresh and Replay
// ==================================================================================================

#[tokio::test]
async fn test_expired_token_is_refreshed_and_replayed() {
    let backend = Arc::new(FakeBackend::new("access-initial"));
    let (gateway, store) = build_gateway(backend.clone());
    seed_session(&store, "access-stale", "refresh-1").await;

    let response = gateway
        .send(&ApiRequest::get("/api/v1/students"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(backend.refresh_calls(), 1);
    // Original attempt plus one replay
    assert_eq!(backend.data_calls(), 2);

    // Store holds the rotated pair
    assert_eq!(store.access_token().await.as_deref(), Some("access-fresh"));
    assert_eq!(store.refresh_token().await.as_deref(), Some("refresh-fresh"));

    // Subsequent requests pay no refresh cost
    let response = gateway
        .send(&ApiRequest::get("/api/v1/classes"))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_second_401_after_replay_is_final() {
    let mut fake = FakeBackend::new("access-initial");
    fake.reject_all_data = true;
    let backend = Arc::new(fake);
    let (gateway, store) = build_gateway(backend.clone());
    seed_session(&store, "access-stale", "refresh-1").await;

    let response = gateway
        .send(&ApiRequest::get("/api/v1/students"))
        .await
        .unwrap();

    // Refresh succeeded, replay 401'd anyway: returned as-is, no second
    // recovery attempt, no loop.
    assert_eq!(response.status, 401);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.data_calls(), 2);
}

// ==================================================================================================
// Single-Flight
// ==================================================================================================

#[tokio::test]
async fn test_concurrent_401s_trigger_exactly_one_refresh() {
    let mut fake = FakeBackend::new("access-initial");
    fake.request_delay = Duration::from_millis(20);
    fake.refresh_delay = Duration::from_millis(50);
    let backend = Arc::new(fake);
    let (gateway, store) = build_gateway(backend.clone());
    seed_session(&store, "access-stale", "refresh-1").await;

    let paths = [
        "/api/v1/students",
        "/api/v1/classes",
        "/api/v1/teachers",
        "/api/v1/events",
        "/api/v1/meal-menus",
    ];
    let requests = paths.iter().map(|path| {
        let gateway = gateway.clone();
        async move { gateway.send(&ApiRequest::get(*path)).await }
    });

    let results = join_all(requests).await;

    for result in results {
        assert_eq!(result.unwrap().status, 200);
    }
    assert_eq!(backend.refresh_calls(), 1);
    // Five originals plus five replays
    assert_eq!(backend.data_calls(), 10);
}

#[tokio::test]
async fn test_followers_are_released_when_refresh_fails() {
    let mut fake = FakeBackend::new("access-initial");
    fake.refresh_succeeds = false;
    fake.request_delay = Duration::from_millis(20);
    fake.refresh_delay = Duration::from_millis(50);
    let backend = Arc::new(fake);
    let (gateway, store) = build_gateway(backend.clone());
    seed_session(&store, "access-stale", "refresh-1").await;

    let mut logout_rx = gateway.logout_signal();

    let requests = (0..5).map(|_| {
        let gateway = gateway.clone();
        async move { gateway.send(&ApiRequest::get("/api/v1/students")).await }
    });

    // The point of this test: nobody hangs waiting on the dead leader
    let results = tokio::time::timeout(Duration::from_secs(5), join_all(requests))
        .await
        .expect("followers deadlocked after leader refresh failure");

    for result in results {
        assert_eq!(result.unwrap().status, 401);
    }
    assert_eq!(backend.refresh_calls(), 1);

    // Session is over: credentials cleared, logout signaled
    assert!(!store.is_authenticated().await);
    logout_rx
        .changed()
        .await
        .expect("logout signal was never raised");
    assert!(*logout_rx.borrow());
}

// ==================================================================================================
// Exemptions and Missing Credentials
// ==================================================================================================

#[tokio::test]
async fn test_login_401_bypasses_refresh_protocol() {
    let backend = Arc::new(FakeBackend::new("access-1"));
    let (gateway, store) = build_gateway(backend.clone());
    seed_session(&store, "access-1", "refresh-1").await;

    let response = gateway
        .send(&ApiRequest::post("/api/v1/auth/login"))
        .await
        .unwrap();

    // Bad password comes straight back: no refresh call, no logout, the
    // session's credentials are untouched.
    assert_eq!(response.status, 401);
    assert_eq!(backend.refresh_calls(), 0);
    assert!(store.is_authenticated().await);
    assert!(!*gateway.logout_signal().borrow());
}

#[tokio::test]
async fn test_401_without_refresh_token_forces_logout() {
    let backend = Arc::new(FakeBackend::new("access-1"));
    let (gateway, store) = build_gateway(backend.clone());
    // Store deliberately left empty

    let mut logout_rx = gateway.logout_signal();

    let response = gateway
        .send(&ApiRequest::get("/api/v1/students"))
        .await
        .unwrap();

    assert_eq!(response.status, 401);
    assert_eq!(backend.refresh_calls(), 0);
    assert!(!store.is_authenticated().await);

    logout_rx
        .changed()
        .await
        .expect("logout signal was never raised");
    assert!(*logout_rx.borrow());
}
