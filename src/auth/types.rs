// Authentication types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complete credential set held by the store.
/// Access and refresh tokens are always populated together; a session either
/// has a full pair or nothing.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token pair returned by the login and refresh endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Login request body
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Refresh request body
#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// User roles for role-based dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Director,
    Teacher,
    Parent,
}

/// Current user's profile, as returned by the `me` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub school_id: Option<i64>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_date: String,
}
