// Credential store
// Single source of truth for the current token pair, safe for concurrent readers

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::types::{Credentials, TokenResponse};

/// In-memory credential store shared between the gateway and the rest of the
/// application. Cloning is cheap and all clones observe the same state.
///
/// The pair is replaced or cleared wholesale, so readers never see an access
/// token from one session alongside a refresh token from another.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<Credentials>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current access token, if any
    pub async fn access_token(&self) -> Option<String> {
        let creds = self.inner.read().await;
        creds.as_ref().map(|c| c.access_token.clone())
    }

    /// Current refresh token, if any
    pub async fn refresh_token(&self) -> Option<String> {
        let creds = self.inner.read().await;
        creds.as_ref().map(|c| c.refresh_token.clone())
    }

    /// Expiry of the current access token. Informational only: the gateway
    /// reacts to actual 401 responses rather than the clock, because clock
    /// skew and server-side revocation make proactive checks unreliable.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        let creds = self.inner.read().await;
        creds.as_ref().map(|c| c.expires_at)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Atomically replace the whole credential pair from a login or refresh
    /// response.
    pub async fn set(&self, tokens: TokenResponse) {
        let credentials = Credentials {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: Utc::now() + Duration::seconds(tokens.expires_in),
        };

        let mut creds = self.inner.write().await;
        *creds = Some(credentials);
    }

    /// Atomically clear all credentials. Returns whether credentials were
    /// present, so callers can act exactly once per session (e.g. fire the
    /// logout signal). Calling this repeatedly is safe.
    pub async fn clear(&self) -> bool {
        let mut creds = self.inner.write().await;
        creds.take().is_some()
    }
}
