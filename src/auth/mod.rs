// Authentication module
// Credential storage and token wire types

mod store;
mod types;

pub use store::CredentialStore;
pub use types::{
    Credentials, LoginRequest, RefreshRequest, TokenResponse, UserProfile, UserRole,
};
