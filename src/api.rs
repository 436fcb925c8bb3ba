// Typed auth endpoint surface
// Login, logout, and profile calls riding on the gateway

use std::sync::Arc;

use crate::auth::{LoginRequest, TokenResponse, UserProfile};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::gateway::Gateway;
use crate::transport::ApiRequest;

/// Client for the backend's auth endpoints (`/api/v1/auth/...`)
pub struct AuthApi {
    gateway: Arc<Gateway>,
    login_path: String,
    logout_path: String,
    me_path: String,
}

impl AuthApi {
    pub fn new(gateway: Arc<Gateway>, config: &Config) -> Self {
        Self {
            gateway,
            login_path: config.login_path.clone(),
            logout_path: config.logout_path.clone(),
            me_path: config.me_path.clone(),
        }
    }

    /// Authenticate and store the received token pair. The login path is
    /// exempt from the gateway's recovery protocol, so a 401 here means bad
    /// credentials and surfaces directly.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let request = ApiRequest::post(&self.login_path).with_json(&LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        });

        let response = self.gateway.send(&request).await?;

        if response.is_unauthorized() {
            return Err(ClientError::Auth(response.error_message()));
        }
        if !response.is_success() {
            return Err(ClientError::Api {
                status: response.status,
                message: response.error_message(),
            });
        }

        let tokens: TokenResponse = serde_json::from_value(response.body)
            .map_err(|e| ClientError::Auth(format!("malformed login response: {}", e)))?;

        self.gateway.install_session(tokens).await;
        tracing::info!(email = email, "Logged in");
        Ok(())
    }

    /// Revoke the session on the backend and drop local credentials. The
    /// local store is cleared even if the revocation call fails; the session
    /// is over either way.
    pub async fn logout(&self) -> Result<()> {
        let request = ApiRequest::post(&self.logout_path);
        let result = self.gateway.send(&request).await;

        self.gateway.store().clear().await;
        tracing::info!("Logged out");

        match result {
            Ok(response) if !response.is_success() && !response.is_unauthorized() => {
                Err(ClientError::Api {
                    status: response.status,
                    message: response.error_message(),
                })
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the current authenticated user's profile
    pub async fn me(&self) -> Result<UserProfile> {
        self.gateway.get(&self.me_path).await
    }
}
