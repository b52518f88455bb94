//! Session data and the session lifecycle states.
//!
//! A session is created when the identity provider callback succeeds and
//! ends on logout or when the refresh token is rejected. The identity part
//! is fixed for the life of the session; the token part rotates on refresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::IdTokenClaims;
use crate::error::AuthInitFailure;
use crate::role::RoleSet;
use crate::token::TokenPair;

/// Who the signed-in user is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identity provider subject.
    user_id: String,
    /// Name shown in the portal chrome.
    display_name: Option<String>,
    /// Contact email.
    email: Option<String>,
    /// Roles mapped at sign-in.
    roles: RoleSet,
}

impl Identity {
    /// Creates an identity.
    #[must_use]
    pub fn new(user_id: impl Into<String>, roles: RoleSet) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            email: None,
            roles,
        }
    }

    /// Creates an identity from decoded ID token claims and mapped roles.
    #[must_use]
    pub fn from_claims(claims: &IdTokenClaims, roles: RoleSet) -> Self {
        Self {
            user_id: claims.subject.clone(),
            display_name: claims.display_name.clone(),
            email: claims.email.clone(),
            roles,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Returns the identity provider subject.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the display name, falling back to email then subject.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.user_id)
    }

    /// Returns the email, if released by the provider.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the roles.
    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }
}

/// An authenticated session: identity plus the current credentials.
#[derive(Debug, Clone)]
pub struct Session {
    identity: Identity,
    tokens: TokenPair,
}

impl Session {
    /// Creates a session.
    #[must_use]
    pub fn new(identity: Identity, tokens: TokenPair) -> Self {
        Self { identity, tokens }
    }

    /// Returns the identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the roles.
    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        self.identity.roles()
    }

    /// Returns the access token value.
    #[must_use]
    pub fn access_token(&self) -> &str {
        self.tokens.access.secret()
    }

    /// Returns the refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.refresh_token.as_deref()
    }

    /// Returns when the access token expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.tokens.access.expires_at()
    }

    /// Returns the token pair.
    #[must_use]
    pub fn tokens(&self) -> &TokenPair {
        &self.tokens
    }
}

/// Lifecycle state of the session context.
///
/// `Uninitialized -> Loading -> {Authenticated, Anonymous, Error}`; the only
/// backwards edge is `Authenticated -> Anonymous` on logout or terminal
/// refresh failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// The identity provider has not been queried yet.
    Uninitialized,
    /// An identity check or callback exchange is in flight.
    Loading,
    /// A user is signed in.
    Authenticated(Identity),
    /// The identity provider reports no active session.
    Anonymous,
    /// Initialization failed irrecoverably.
    Error(AuthInitFailure),
}

impl SessionState {
    /// Returns the signed-in identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Returns true while identity-dependent content must stay suspended.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Loading)
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Authenticated(_) => "authenticated",
            Self::Anonymous => "anonymous",
            Self::Error(_) => "error",
        }
    }
}
