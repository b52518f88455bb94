//! The identity provider seam.

use async_trait::async_trait;
use carebridge_platform_access::TokenPair;

use crate::error::IdentityError;

/// Everything needed to send a user to the provider and validate the callback.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Where to send the browser.
    pub authorization_url: String,
    /// CSRF state that the callback must echo back.
    pub csrf_state: String,
    /// PKCE verifier for the code exchange.
    pub pkce_verifier: String,
}

/// An OAuth2/OIDC identity provider.
///
/// Implementations only talk to the provider; session state and retries
/// belong to [`TokenStore`](crate::TokenStore) and
/// [`SessionContext`](crate::SessionContext).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Prepares an authorization-code login.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the authorization URL cannot be built.
    fn begin_login(&self) -> Result<LoginRequest, IdentityError>;

    /// Exchanges an authorization code (`grant_type=authorization_code`).
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenPair, IdentityError>;

    /// Exchanges a refresh token (`grant_type=refresh_token`).
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, IdentityError>;

    /// Returns the provider logout URL, if the provider supports one.
    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect: &str,
    ) -> Option<String>;
}
