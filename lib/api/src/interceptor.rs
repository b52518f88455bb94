//! Bearer-token attachment with refresh-then-retry.
//!
//! Before a request is sent the session gets a chance to refresh a token that
//! is about to expire, and only a token that is still valid is attached. A
//! 401 answer triggers one refresh and one retry; a second 401, or a refresh
//! that fails, is surfaced to the caller and hands control to the
//! re-authentication hook.

use carebridge_identity::SessionContext;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

const UNAUTHORIZED: u16 = 401;

/// Called when the user has to sign in again.
pub trait ReauthHandler: Send + Sync {
    /// The session can no longer authorize requests.
    fn reauthenticate(&self, cause: &str);
}

enum Credentials {
    Session(Arc<SessionContext>),
    Static(String),
    None,
}

/// Attaches credentials to outbound requests.
pub struct AuthInterceptor {
    credentials: Credentials,
    margin_secs: u64,
    reauth: Option<Arc<dyn ReauthHandler>>,
}

impl AuthInterceptor {
    /// Attaches the session's access token.
    ///
    /// Tokens are refreshed when less than the store's safety margin is left.
    #[must_use]
    pub fn for_session(context: Arc<SessionContext>) -> Self {
        let margin_secs = context.store().policy().margin_secs();
        Self {
            credentials: Credentials::Session(context),
            margin_secs,
            reauth: None,
        }
    }

    /// Attaches a fixed token and never refreshes.
    ///
    /// For development and tests only; the portal refuses this in production.
    #[must_use]
    pub fn static_token(token: impl Into<String>) -> Self {
        warn!("API requests use a static bearer token");
        Self {
            credentials: Credentials::Static(token.into()),
            margin_secs: 0,
            reauth: None,
        }
    }

    /// Sends requests without credentials.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            credentials: Credentials::None,
            margin_secs: 0,
            reauth: None,
        }
    }

    /// Sets the hook that forces re-authentication.
    ///
    /// Without a hook, authorization failures are only surfaced to callers.
    #[must_use]
    pub fn with_reauth(mut self, handler: Arc<dyn ReauthHandler>) -> Self {
        self.reauth = Some(handler);
        self
    }

    /// Sends `request` with credentials attached.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the exchange itself failed.
    pub async fn execute(
        &self,
        transport: &dyn HttpTransport,
        request: HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let context = match &self.credentials {
            Credentials::Static(token) => {
                let mut request = request;
                request.set_header("Authorization", format!("Bearer {token}"));
                return transport.send(request).await;
            }
            Credentials::None => return transport.send(request).await,
            Credentials::Session(context) => context,
        };

        if let Err(err) = context.refresh(self.margin_secs).await {
            if err.is_terminal() {
                self.force_reauth(&err.to_string());
            } else {
                warn!(error = %err, "proactive refresh failed; using current token");
            }
        }

        let attached = context.store().valid_token();
        let mut first = request.clone();
        if let Some(token) = &attached {
            first.set_header("Authorization", token.bearer_header());
        } else {
            debug!(url = %request.url, "sending request without credentials");
        }

        let response = transport.send(first).await?;
        if response.status != UNAUTHORIZED {
            return Ok(response);
        }

        debug!(url = %request.url, "request unauthorized; refreshing once");
        match context.refresh_after_rejection(attached.as_ref()).await {
            Ok(true) => {}
            Ok(false) => {
                self.force_reauth("no session to refresh");
                return Ok(response);
            }
            Err(err) => {
                self.force_reauth(&err.to_string());
                return Ok(response);
            }
        }

        let Some(token) = context.store().valid_token() else {
            self.force_reauth("refresh produced no usable token");
            return Ok(response);
        };
        let mut retry = request;
        retry.set_header("Authorization", token.bearer_header());
        let response = transport.send(retry).await?;
        if response.status == UNAUTHORIZED {
            self.force_reauth("request still unauthorized after refresh");
        }
        Ok(response)
    }

    fn force_reauth(&self, cause: &str) {
        warn!(%cause, "re-authentication required");
        if let Some(handler) = &self.reauth {
            handler.reauthenticate(cause);
        }
    }
}
