// Authenticated request gateway
// Attaches the current access token to every outbound request, detects 401
// responses, and recovers through a single-flight refresh of the token pair.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::auth::{CredentialStore, RefreshRequest, TokenResponse};
use crate::config::Config;
use crate::error::{ClientError, TransportError};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Outcome of one pass through the refresh coordination protocol, from the
/// perspective of a single 401'd request.
enum RefreshOutcome {
    /// This request led the refresh and it succeeded
    Refreshed(String),
    /// Another request completed a refresh episode while this one waited for
    /// the lock; carry whatever the store holds now (possibly nothing, if
    /// that episode ended in logout)
    Superseded(Option<String>),
    /// This request led the refresh and it failed; the session is over
    LoggedOut,
}

/// Gateway wrapping a raw [`Transport`] with bearer authentication and
/// transparent token refresh.
///
/// When several in-flight requests observe a 401 at the same moment, exactly
/// one of them (the leader) calls the refresh endpoint; the rest block on the
/// refresh lock and replay with whatever credentials the leader committed.
/// The refresh endpoint is called at most once per episode, with no retry
/// and no backoff.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    store: CredentialStore,

    /// Refresh lock, scoped to this gateway instance. Held only for the
    /// duration of one refresh call; released on every exit path because the
    /// guard is scoped.
    refresh_lock: Mutex<()>,

    /// Paths exempt from the recovery protocol. Recursing through either
    /// would be meaningless: a 401 from login is a bad password, and a 401
    /// from refresh is already a failed recovery.
    login_path: String,
    refresh_path: String,

    logout_tx: watch::Sender<bool>,
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>, store: CredentialStore, config: &Config) -> Self {
        let (logout_tx, _) = watch::channel(false);

        Self {
            transport,
            store,
            refresh_lock: Mutex::new(()),
            login_path: config.login_path.clone(),
            refresh_path: config.refresh_path.clone(),
            logout_tx,
        }
    }

    /// The credential store this gateway reads from
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Receiver that flips to `true` when the session dies (refresh failure
    /// or missing refresh token). The surrounding application clears its
    /// cached state and navigates to the login surface.
    pub fn logout_signal(&self) -> watch::Receiver<bool> {
        self.logout_tx.subscribe()
    }

    /// Send a request, recovering from a single 401 via token refresh.
    ///
    /// Everything except a 401 on a non-exempt path passes through
    /// untouched: transport errors, other 4xx/5xx, and success. On a 401 the
    /// request is replayed exactly once after the refresh episode; the
    /// replay's result is final even if it is another 401.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let token = self.store.access_token().await;

        if self.is_exempt(&request.path) {
            return self.transport.send(request, token.as_deref()).await;
        }

        // Absent token: send unauthenticated and let the 401 flow below
        // handle it uniformly.
        let response = self.transport.send(request, token.as_deref()).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::debug!(path = %request.path, "Received 401, entering refresh protocol");

        match self.refresh_or_wait(token.as_deref()).await {
            RefreshOutcome::Refreshed(new_token) => {
                tracing::debug!(path = %request.path, "Replaying request with refreshed token");
                self.transport.send(request, Some(&new_token)).await
            }
            RefreshOutcome::Superseded(current) => {
                tracing::debug!(path = %request.path, "Replaying request after concurrent refresh");
                self.transport.send(request, current.as_deref()).await
            }
            RefreshOutcome::LoggedOut => Ok(response),
        }
    }

    fn is_exempt(&self, path: &str) -> bool {
        path.contains(&self.login_path) || path.contains(&self.refresh_path)
    }

    /// Refresh coordination. The caller that acquires the lock while the
    /// store still holds the token it failed with becomes the leader and
    /// performs the one refresh call for this episode. Everyone else finds
    /// the store changed and rides on the leader's outcome.
    ///
    /// Credentials are fully committed before the lock guard drops, so a
    /// follower never observes a half-updated store.
    async fn refresh_or_wait(&self, stale_token: Option<&str>) -> RefreshOutcome {
        let _guard = self.refresh_lock.lock().await;

        let current = self.store.access_token().await;
        if current.as_deref() != stale_token {
            return RefreshOutcome::Superseded(current);
        }

        let refresh_token = match self.store.refresh_token().await {
            Some(token) => token,
            None => {
                tracing::warn!("401 received but no refresh token is available");
                self.force_logout().await;
                return RefreshOutcome::LoggedOut;
            }
        };

        match self.call_refresh(&refresh_token).await {
            Ok(tokens) => {
                let access_token = tokens.access_token.clone();
                self.store.set(tokens).await;
                tracing::info!("Access token refreshed");
                RefreshOutcome::Refreshed(access_token)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                self.force_logout().await;
                RefreshOutcome::LoggedOut
            }
        }
    }

    /// One refresh call, no retry. Any non-success response or malformed
    /// body counts as refresh failure.
    async fn call_refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        let request = ApiRequest::post(&self.refresh_path).with_json(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        });

        let response = self.transport.send(&request, None).await?;
        if !response.is_success() {
            return Err(ClientError::Auth(response.error_message()));
        }

        serde_json::from_value(response.body)
            .map_err(|e| ClientError::Auth(format!("malformed refresh response: {}", e)))
    }

    /// Install a fresh token pair after a successful login and re-arm the
    /// logout signal for the new session.
    pub async fn install_session(&self, tokens: TokenResponse) {
        self.store.set(tokens).await;
        self.logout_tx.send_replace(false);
    }

    /// Clear credentials and raise the logout signal. The signal is gated on
    /// the watch flag, so it fires once per session no matter how many
    /// requests race into this path (including requests that never had
    /// credentials to begin with).
    async fn force_logout(&self) {
        self.store.clear().await;

        let signaled = self.logout_tx.send_if_modified(|flag| {
            if *flag {
                false
            } else {
                *flag = true;
                true
            }
        });
        if signaled {
            tracing::warn!("Session ended, signaling logout");
        }
    }

    // ===== Typed helpers over send() =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.expect_json(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.expect_json(ApiRequest::post(path).with_json(body))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        self.expect_json(ApiRequest::put(path).with_json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let response = self.send(&ApiRequest::delete(path)).await?;
        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                message: response.error_message(),
            });
        }
        Ok(())
    }

    async fn expect_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        let response = self.send(&request).await?;
        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                message: response.error_message(),
            });
        }

        serde_json::from_value(response.body)
            .map_err(|e| ClientError::Internal(anyhow::anyhow!("malformed response body: {}", e)))
    }
}
