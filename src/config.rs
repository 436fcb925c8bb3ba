use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

/// Nido Client - daycare management API client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend base URL
    #[arg(short = 'u', long, env = "NIDO_BASE_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Account email
    #[arg(short, long, env = "NIDO_EMAIL")]
    pub email: Option<String>,

    /// Account password
    #[arg(short, long, env = "NIDO_PASSWORD")]
    pub password: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub base_url: String,

    // Auth endpoint paths. Requests to the login and refresh paths bypass
    // the gateway's 401 recovery protocol.
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    pub me_path: String,

    // HTTP client
    pub request_timeout_secs: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Configuration for a given backend, with the standard auth paths
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Config {
            base_url: base_url.into(),
            login_path: "/api/v1/auth/login".to_string(),
            refresh_path: "/api/v1/auth/refresh".to_string(),
            logout_path: "/api/v1/auth/logout".to_string(),
            me_path: "/api/v1/auth/me".to_string(),
            request_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }

    /// Load configuration with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, CliArgs)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();

        let mut config = Config::for_base_url(args.base_url.clone());
        config.request_timeout_secs = args.http_timeout;
        config.log_level = args.log_level.clone();

        Ok((config, args))
    }

    /// Validate configuration and return the parsed base URL
    pub fn validate(&self) -> Result<Url> {
        let mut url: Url = self
            .base_url
            .parse()
            .with_context(|| format!("NIDO_BASE_URL is not a valid URL: {}", self.base_url))?;

        // reqwest path joining needs a trailing slash on the base
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }

        Ok(url)
    }
}
