//! Centralized portal configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating sections (`API__BASE_URL`, `OIDC__CLIENT_ID`, ...).
//!
//! See [`OidcConfig`] for identity provider configuration.

use carebridge_api::clamp_timeout;
use carebridge_identity::RefreshPolicy;
use carebridge_platform_access::OidcConfig;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    #[default]
    Production,
}

/// Portal configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct PortalConfig {
    /// Defaults to production so development conveniences stay opt-in.
    #[serde(default)]
    pub environment: Environment,

    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Externally visible base URL, used for post-logout redirects.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Backend REST API configuration.
    pub api: ApiConfig,

    /// Identity provider configuration.
    pub oidc: OidcConfig,

    /// Chat relay configuration.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Directory served under `/assets`.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
}

/// Backend REST API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL every API path is resolved against.
    pub base_url: String,

    /// Per-request timeout in seconds; clamped to 10..=30.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Refresh tokens with less than this many seconds left; clamped to 5..=30.
    #[serde(default = "default_refresh_margin_seconds")]
    pub refresh_margin_seconds: u64,

    /// Fixed bearer token for development against a local backend.
    #[serde(default)]
    pub static_token: Option<String>,
}

impl ApiConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        clamp_timeout(Duration::from_secs(self.timeout_seconds))
    }

    #[must_use]
    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy::new(self.refresh_margin_seconds)
    }
}

/// Chat relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Workflow-automation webhook; chat is disabled when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl ChatConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        clamp_timeout(Duration::from_secs(self.timeout_seconds))
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on an identity check, in seconds; clamped to 10..=30.
    #[serde(default = "default_timeout_seconds")]
    pub init_timeout_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Browser sessions unused for this long are dropped.
    #[serde(default = "default_idle_timeout_seconds")]
    pub idle_timeout_seconds: u64,

    /// How often expired browser sessions are pruned.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

impl SessionConfig {
    #[must_use]
    pub fn init_timeout(&self) -> Duration {
        clamp_timeout(Duration::from_secs(self.init_timeout_seconds))
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            init_timeout_seconds: default_timeout_seconds(),
            secure_cookies: default_secure_cookies(),
            idle_timeout_seconds: default_idle_timeout_seconds(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

fn default_idle_timeout_seconds() -> u64 {
    8 * 60 * 60
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_timeout_seconds() -> u64 {
    15
}

fn default_refresh_margin_seconds() -> u64 {
    30
}

fn default_secure_cookies() -> bool {
    true
}

/// Errors from loading the portal configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    Load { details: String },
    /// A static API token is configured in production.
    StaticTokenInProduction,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { details } => write!(f, "failed to load configuration: {details}"),
            Self::StaticTokenInProduction => {
                write!(f, "API__STATIC_TOKEN must not be set in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl PortalConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> carebridge_core::Result<Self, ConfigError> {
        let source = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Load {
                details: e.to_string(),
            })?;
        Self::from_config(source)
    }

    /// Deserializes and validates an already-built configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_config(source: config::Config) -> carebridge_core::Result<Self, ConfigError> {
        let config: Self = source.try_deserialize().map_err(|e| ConfigError::Load {
            details: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let has_static_token = self
            .api
            .static_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if has_static_token && self.environment == Environment::Production {
            return Err(ConfigError::StaticTokenInProduction);
        }
        Ok(())
    }

    /// Returns the static API token, if one is configured.
    #[must_use]
    pub fn static_token(&self) -> Option<&str> {
        self.api
            .static_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}
