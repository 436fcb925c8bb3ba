use anyhow::{Context, Result};
use std::sync::Arc;

use nido_client::{api, auth, config, gateway, transport};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, args) = config::Config::load()?;
    let base_url = config.validate()?;

    // Initialize logging with the configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    tracing::info!("Nido client starting, backend: {}", base_url);

    let email = args
        .email
        .context("NIDO_EMAIL is required (use -e or set NIDO_EMAIL env var)")?;
    let password = args
        .password
        .context("NIDO_PASSWORD is required (use -p or set NIDO_PASSWORD env var)")?;

    let transport = Arc::new(transport::HttpTransport::new(
        base_url,
        config.request_timeout_secs,
    )?);
    let store = auth::CredentialStore::new();
    let gateway = Arc::new(gateway::Gateway::new(transport, store, &config));
    let auth_api = api::AuthApi::new(gateway.clone(), &config);

    // Watch for forced logout in the background, the way the full app does
    let mut logout_rx = gateway.logout_signal();
    tokio::spawn(async move {
        while logout_rx.changed().await.is_ok() {
            if *logout_rx.borrow() {
                tracing::warn!("Session expired, please log in again");
            }
        }
    });

    auth_api
        .login(&email, &password)
        .await
        .context("Login failed")?;

    let profile = auth_api
        .me()
        .await
        .context("Failed to fetch current user profile")?;

    tracing::info!(
        "Logged in as {} {} ({:?})",
        profile.first_name,
        profile.last_name,
        profile.role
    );
    println!(
        "{} {} <{}> role={:?} school_id={:?}",
        profile.first_name, profile.last_name, profile.email, profile.role, profile.school_id
    );

    auth_api.logout().await.context("Logout failed")?;

    Ok(())
}
