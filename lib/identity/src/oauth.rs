//! OAuth2 authorization-code provider.
//!
//! Talks to the identity provider's authorization, token and end-session
//! endpoints. Logins use PKCE with a random CSRF state; refreshes use the
//! `refresh_token` grant. The ID token returned next to the access token is
//! passed through unverified for the portal to read claims from; the backend
//! API is what verifies bearer tokens.

use async_trait::async_trait;
use carebridge_platform_access::{OidcConfig, Token, TokenPair, claims::jwt_expiry};
use chrono::Utc;
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::url::Url;
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, ExtraTokenFields, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, StandardRevocableToken, StandardTokenResponse,
    TokenResponse, TokenUrl,
};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::IdentityError;
use crate::provider::{IdentityProvider, LoginRequest};

/// Token response fields beyond the OAuth2 standard ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

type IdpTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type IdpClient<HasAuthUrl = EndpointNotSet, HasTokenUrl = EndpointNotSet> = Client<
    BasicErrorResponse,
    IdpTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    HasAuthUrl,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    HasTokenUrl,
>;

/// Identity provider backed by the `oauth2` crate.
#[derive(Clone)]
pub struct OAuthProvider {
    client: IdpClient<EndpointSet, EndpointSet>,
    http: reqwest::Client,
    scopes: Vec<String>,
    client_id: String,
    end_session_endpoint: String,
    default_lifetime_secs: i64,
}

impl OAuthProvider {
    /// Creates a provider from configuration.
    ///
    /// `timeout` bounds every call to the token endpoint. Access tokens whose
    /// lifetime can be read neither from `expires_in` nor from the token itself
    /// are assumed to live `default_lifetime`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if an endpoint URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        config: &OidcConfig,
        timeout: Duration,
        default_lifetime: Duration,
    ) -> Result<Self, Report<IdentityError>> {
        let auth_url = AuthUrl::new(config.authorization_endpoint()).map_err(|e| {
            IdentityError::Configuration {
                reason: format!("invalid authorization endpoint: {e}"),
            }
        })?;
        let token_url =
            TokenUrl::new(config.token_endpoint()).map_err(|e| IdentityError::Configuration {
                reason: format!("invalid token endpoint: {e}"),
            })?;
        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string()).map_err(|e| {
            IdentityError::Configuration {
                reason: format!("invalid redirect URI: {e}"),
            }
        })?;
        let end_session_endpoint = config.end_session_endpoint();
        Url::parse(&end_session_endpoint).map_err(|e| IdentityError::Configuration {
            reason: format!("invalid end-session endpoint: {e}"),
        })?;

        let mut client = IdpClient::new(ClientId::new(config.client_id().to_string()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);
        if let Some(secret) = config.client_secret() {
            client = client.set_client_secret(ClientSecret::new(secret.to_string()));
        }

        // Token endpoints must not redirect; following one would leak the code.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Configuration {
                reason: format!("HTTP client error: {e}"),
            })?;

        Ok(Self {
            client,
            http,
            scopes: config.scopes().into_iter().map(str::to_string).collect(),
            client_id: config.client_id().to_string(),
            end_session_endpoint,
            default_lifetime_secs: i64::try_from(default_lifetime.as_secs()).unwrap_or(i64::MAX),
        })
    }

    fn token_pair(&self, response: &IdpTokenResponse) -> TokenPair {
        let secret = response.access_token().secret().clone();
        let issued_at = Utc::now();
        let expires_at = response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| issued_at + d)
            .or_else(|| jwt_expiry(&secret))
            .unwrap_or_else(|| issued_at + chrono::Duration::seconds(self.default_lifetime_secs));

        TokenPair::new(
            Token::new(secret, expires_at),
            response.refresh_token().map(|t| t.secret().clone()),
        )
        .with_id_token(response.extra_fields().id_token.clone())
    }
}

/// Sorts a token endpoint failure into the portal's error categories.
fn classify<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> IdentityError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => IdentityError::Rejected {
            reason: response.error().to_string(),
        },
        RequestTokenError::Request(e) => IdentityError::Unreachable {
            reason: e.to_string(),
        },
        RequestTokenError::Parse(e, _) => IdentityError::MalformedResponse {
            reason: e.to_string(),
        },
        RequestTokenError::Other(reason) => IdentityError::MalformedResponse { reason },
    }
}

#[async_trait]
impl IdentityProvider for OAuthProvider {
    fn begin_login(&self) -> Result<LoginRequest, IdentityError> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        Ok(LoginRequest {
            authorization_url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        })
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenPair, IdentityError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(classify)?;

        debug!("authorization code exchanged");
        Ok(self.token_pair(&response))
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, IdentityError> {
        let refresh_token = RefreshToken::new(refresh_token.to_string());
        let response = self
            .client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http)
            .await
            .map_err(classify)?;

        debug!("refresh token exchanged");
        Ok(self.token_pair(&response))
    }

    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect: &str,
    ) -> Option<String> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("post_logout_redirect_uri", post_logout_redirect),
        ];
        if let Some(hint) = id_token_hint {
            params.push(("id_token_hint", hint));
        }
        Url::parse_with_params(&self.end_session_endpoint, &params)
            .ok()
            .map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OidcConfig {
        OidcConfig::new(
            "https://id.example.com/realms/care/".to_string(),
            "portal".to_string(),
            "http://localhost:3000/auth/callback".to_string(),
        )
    }

    fn provider() -> OAuthProvider {
        OAuthProvider::new(
            &config(),
            Duration::from_secs(10),
            Duration::from_secs(300),
        )
        .expect("valid config")
    }

    #[test]
    fn login_url_carries_pkce_and_state() {
        let login = provider().begin_login().expect("login request");
        let url = Url::parse(&login.authorization_url).expect("url");

        assert_eq!(
            url.path(),
            "/realms/care/protocol/openid-connect/auth"
        );
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |key: &str| {
            query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("client_id").as_deref(), Some("portal"));
        assert_eq!(get("state"), Some(login.csrf_state.clone()));
        assert_eq!(get("code_challenge_method").as_deref(), Some("S256"));
        assert!(get("scope").expect("scope").contains("openid"));
        assert!(!login.pkce_verifier.is_empty());
    }

    #[test]
    fn each_login_gets_fresh_state() {
        let provider = provider();
        let a = provider.begin_login().expect("login");
        let b = provider.begin_login().expect("login");
        assert_ne!(a.csrf_state, b.csrf_state);
        assert_ne!(a.pkce_verifier, b.pkce_verifier);
    }

    #[test]
    fn end_session_url_includes_hint_and_redirect() {
        let url = provider()
            .end_session_url(Some("id.tok.en"), "http://localhost:3000/login")
            .expect("url");
        let parsed = Url::parse(&url).expect("url");
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with("https://id.example.com/realms/care/protocol/openid-connect/logout?"));
        assert!(pairs.contains(&("id_token_hint".to_string(), "id.tok.en".to_string())));
        assert!(pairs.contains(&(
            "post_logout_redirect_uri".to_string(),
            "http://localhost:3000/login".to_string()
        )));
    }

    #[test]
    fn invalid_redirect_uri_is_configuration_error() {
        let bad = OidcConfig::new(
            "https://id.example.com".to_string(),
            "portal".to_string(),
            "not a url".to_string(),
        );
        let err = OAuthProvider::new(&bad, Duration::from_secs(10), Duration::from_secs(300))
            .err()
            .expect("invalid redirect");
        assert!(err.to_string().contains("invalid redirect URI"));
    }

    #[test]
    fn server_rejection_is_classified_as_rejected() {
        let response = BasicErrorResponse::new(
            oauth2::basic::BasicErrorResponseType::InvalidGrant,
            Some("Token is not active".to_string()),
            None,
        );
        let err: RequestTokenError<std::io::Error, BasicErrorResponse> =
            RequestTokenError::ServerResponse(response);
        assert!(matches!(classify(err), IdentityError::Rejected { .. }));
    }

    #[test]
    fn transport_failure_is_classified_as_unreachable() {
        let err: RequestTokenError<std::io::Error, BasicErrorResponse> =
            RequestTokenError::Request(std::io::Error::other("connection refused"));
        assert!(matches!(classify(err), IdentityError::Unreachable { .. }));
    }
}
