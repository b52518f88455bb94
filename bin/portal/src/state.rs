//! Shared application state.

use carebridge_api::{ApiClient, AuthInterceptor, ReqwestTransport};
use carebridge_chat::{ChatBridge, WebhookRelay};
use carebridge_identity::OAuthProvider;
use rootcause::prelude::Report;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::{Environment, PortalConfig};
use crate::session::{ApiCredentials, SessionRegistry};

/// Lifetime assumed for access tokens that state no expiry.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

/// Shared state for every route.
pub struct AppState {
    /// Per-browser sessions.
    pub sessions: SessionRegistry,
    /// Chat bridge; `None` when no webhook is configured.
    pub chat: Option<ChatBridge>,
    /// Whether to set the Secure flag on cookies.
    pub secure_cookies: bool,
    /// Externally visible base URL.
    pub public_url: String,
}

/// Errors from assembling the application state.
#[derive(Debug)]
pub enum StartupError {
    Identity { details: String },
    Api { details: String },
    Chat { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity { details } => write!(f, "identity provider setup failed: {details}"),
            Self::Api { details } => write!(f, "API client setup failed: {details}"),
            Self::Chat { details } => write!(f, "chat relay setup failed: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl AppState {
    /// Builds the state from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be constructed.
    pub fn from_config(config: &PortalConfig) -> Result<Self, Report<StartupError>> {
        let provider = OAuthProvider::new(
            &config.oidc,
            config.session.init_timeout(),
            DEFAULT_TOKEN_LIFETIME,
        )
        .map_err(|e| StartupError::Identity {
            details: e.to_string(),
        })?;

        let (interceptor, credentials) = match config.static_token() {
            Some(token) => (AuthInterceptor::static_token(token), ApiCredentials::Shared),
            None => (
                AuthInterceptor::anonymous(),
                ApiCredentials::PerSession {
                    end_on_reauth: config.environment == Environment::Production,
                },
            ),
        };

        let transport = ReqwestTransport::new().map_err(|e| StartupError::Api {
            details: e.to_string(),
        })?;
        let api = ApiClient::new(
            &config.api.base_url,
            Arc::new(transport),
            interceptor,
            config.api.timeout(),
        )
        .map_err(|e| StartupError::Api {
            details: e.to_string(),
        })?;

        let sessions = SessionRegistry::new(
            Arc::new(provider),
            config.api.refresh_policy(),
            config.oidc.role_mapping(),
            config.session.init_timeout(),
            api,
        )
        .with_credentials(credentials)
        .with_idle_timeout(config.session.idle_timeout());

        let chat = match &config.chat.webhook_url {
            Some(url) => {
                let relay =
                    WebhookRelay::new(url, config.chat.timeout()).map_err(|e| StartupError::Chat {
                        details: e.to_string(),
                    })?;
                Some(ChatBridge::new(Arc::new(relay)))
            }
            None => {
                warn!("CHAT__WEBHOOK_URL not set; chat is disabled");
                None
            }
        };

        Ok(Self {
            sessions,
            chat,
            secure_cookies: config.session.secure_cookies,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }
}
