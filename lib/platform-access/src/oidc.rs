//! Identity provider configuration.
//!
//! Endpoints default to the Keycloak layout under the issuer URL, so a
//! Keycloak realm only needs its issuer, client and redirect URI configured.
//! Any other provider sets the endpoints explicitly.

use serde::{Deserialize, Serialize};

use crate::claims::RoleMapping;
use crate::role::Role;

/// Configuration for the OAuth2/OIDC identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The issuer URL (e.g., "https://id.example.com/realms/care").
    issuer_url: String,
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// Client secret; public clients leave this unset and rely on PKCE.
    #[serde(default)]
    client_secret: Option<String>,
    /// The redirect URI for the authorization-code callback.
    redirect_uri: String,
    /// Authorization endpoint override.
    #[serde(default)]
    authorization_endpoint: Option<String>,
    /// Token endpoint override.
    #[serde(default)]
    token_endpoint: Option<String>,
    /// End-session endpoint override.
    #[serde(default)]
    end_session_endpoint: Option<String>,
    /// OAuth2 scopes to request as a comma-separated string.
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Comma-separated dotted claim paths holding role names.
    #[serde(default = "default_roles_claims")]
    roles_claims: String,
    /// Comma-separated `provider_name=role` aliases.
    #[serde(default = "default_role_aliases")]
    role_aliases: String,
    /// Role granted when a user has no recognized role; empty rejects them.
    #[serde(default = "default_role")]
    default_role: String,
}

fn default_scopes() -> String {
    "openid,email,profile".to_string()
}

fn default_roles_claims() -> String {
    "realm_access.roles,roles".to_string()
}

fn default_role_aliases() -> String {
    "doctor=practitioner".to_string()
}

fn default_role() -> String {
    "patient".to_string()
}

impl OidcConfig {
    /// Creates a configuration with defaults for optional fields.
    #[must_use]
    pub fn new(issuer_url: String, client_id: String, redirect_uri: String) -> Self {
        Self {
            issuer_url,
            client_id,
            client_secret: None,
            redirect_uri,
            authorization_endpoint: None,
            token_endpoint: None,
            end_session_endpoint: None,
            scopes: default_scopes(),
            roles_claims: default_roles_claims(),
            role_aliases: default_role_aliases(),
            default_role: default_role(),
        }
    }

    /// Sets the client secret for confidential clients.
    #[must_use]
    pub fn with_client_secret(mut self, secret: Option<String>) -> Self {
        self.client_secret = secret;
        self
    }

    /// Sets the role granted when no recognized role is present.
    #[must_use]
    pub fn with_default_role(mut self, role: Option<&str>) -> Self {
        self.default_role = role.unwrap_or_default().to_string();
        self
    }

    /// Returns the issuer URL without a trailing slash.
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        self.issuer_url.trim_end_matches('/')
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the client secret, if configured.
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the authorization endpoint.
    #[must_use]
    pub fn authorization_endpoint(&self) -> String {
        self.authorization_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/protocol/openid-connect/auth", self.issuer_url()))
    }

    /// Returns the token endpoint.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        self.token_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/protocol/openid-connect/token", self.issuer_url()))
    }

    /// Returns the end-session endpoint.
    #[must_use]
    pub fn end_session_endpoint(&self) -> String {
        self.end_session_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/protocol/openid-connect/logout", self.issuer_url()))
    }

    /// Returns the scopes, parsed from the comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        split_list(&self.scopes)
    }

    /// Builds the role mapping described by this configuration.
    ///
    /// Aliases that point at unknown roles are dropped.
    #[must_use]
    pub fn role_mapping(&self) -> RoleMapping {
        let paths = split_list(&self.roles_claims)
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut mapping = RoleMapping::new(paths);
        for alias in split_list(&self.role_aliases) {
            if let Some((name, target)) = alias.split_once('=') {
                let role = Role::parse(target);
                if role.is_known() {
                    mapping = mapping.with_alias(name, role);
                }
            }
        }

        let default = Some(self.default_role.trim())
            .filter(|r| !r.is_empty())
            .map(Role::parse);
        mapping.with_default_role(default)
    }
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
