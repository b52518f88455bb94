//! ID token claims and role mapping.
//!
//! The ID token payload is decoded for display and role extraction only.
//! Signature verification is the backend's job: the backend re-validates the
//! access token on every call, so nothing here is an authorization boundary.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::debug;

use crate::error::AuthenticationError;
use crate::role::{Role, RoleSet};

/// Decodes the payload segment of a compact JWT without verifying it.
///
/// # Errors
///
/// Returns `InvalidToken` if the token is not three dot-separated segments or
/// the payload is not base64url-encoded JSON.
pub fn decode_payload(jwt: &str) -> Result<JsonValue, AuthenticationError> {
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthenticationError::InvalidToken {
            reason: "expected three JWT segments".to_string(),
        });
    }

    // Some providers pad the segments despite RFC 7515.
    let bytes = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("payload is not base64url: {e}"),
        })?;

    serde_json::from_slice(&bytes).map_err(|e| AuthenticationError::InvalidToken {
        reason: format!("payload is not JSON: {e}"),
    })
}

/// Reads the `exp` claim of a JWT access token, if it is one.
#[must_use]
pub fn jwt_expiry(jwt: &str) -> Option<DateTime<Utc>> {
    let payload = decode_payload(jwt).ok()?;
    let exp = payload.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

/// Claims extracted from an ID token.
#[derive(Debug, Clone)]
pub struct IdTokenClaims {
    /// The subject claim.
    pub subject: String,
    /// Email address, if released.
    pub email: Option<String>,
    /// Display name from `name`, falling back to `preferred_username`.
    pub display_name: Option<String>,
    payload: JsonValue,
}

impl IdTokenClaims {
    /// Decodes the claims of a raw ID token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be decoded or has no `sub`.
    pub fn decode(id_token: &str) -> Result<Self, AuthenticationError> {
        Self::from_payload(decode_payload(id_token)?)
    }

    /// Builds claims from an already decoded payload.
    ///
    /// # Errors
    ///
    /// Returns `MissingClaim` if `sub` is absent.
    pub fn from_payload(payload: JsonValue) -> Result<Self, AuthenticationError> {
        let string_claim = |name: &str| {
            payload
                .get(name)
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        };

        let subject = string_claim("sub").ok_or_else(|| AuthenticationError::MissingClaim {
            claim: "sub".to_string(),
        })?;
        let email = string_claim("email");
        let display_name = string_claim("name").or_else(|| string_claim("preferred_username"));

        Ok(Self {
            subject,
            email,
            display_name,
            payload,
        })
    }

    /// Returns the string entries of the array found at a dotted claim path.
    ///
    /// `realm_access.roles` walks into the `realm_access` object and reads its
    /// `roles` array. Missing paths and non-string entries are skipped.
    #[must_use]
    pub fn strings_at(&self, path: &str) -> Vec<String> {
        let mut node = &self.payload;
        for segment in path.split('.') {
            match node.get(segment) {
                Some(next) => node = next,
                None => return Vec::new(),
            }
        }

        match node {
            JsonValue::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            JsonValue::String(single) => vec![single.clone()],
            _ => Vec::new(),
        }
    }
}

/// Maps provider role strings onto portal roles.
#[derive(Debug, Clone)]
pub struct RoleMapping {
    claim_paths: Vec<String>,
    aliases: HashMap<String, Role>,
    default_role: Option<Role>,
}

impl RoleMapping {
    /// Creates a mapping that reads roles from the given claim paths.
    #[must_use]
    pub fn new(claim_paths: Vec<String>) -> Self {
        Self {
            claim_paths,
            aliases: HashMap::new(),
            default_role: None,
        }
    }

    /// Maps a provider-specific role name onto a portal role.
    #[must_use]
    pub fn with_alias(mut self, provider_name: &str, role: Role) -> Self {
        self.aliases
            .insert(provider_name.trim().to_ascii_lowercase(), role);
        self
    }

    /// Sets the role granted when no recognized role is present.
    #[must_use]
    pub fn with_default_role(mut self, role: Option<Role>) -> Self {
        self.default_role = role.filter(Role::is_known);
        self
    }

    /// Derives the portal role set for a user.
    ///
    /// Unrecognized names are kept as [`Role::Unknown`]. If no recognized role
    /// remains, the default role is granted, or the login is rejected when no
    /// default is configured.
    ///
    /// # Errors
    ///
    /// Returns `NoRecognizedRole` when the result would hold no known role.
    pub fn map(&self, claims: &IdTokenClaims) -> Result<RoleSet, AuthenticationError> {
        let mut roles = RoleSet::none();
        for path in &self.claim_paths {
            for raw in claims.strings_at(path) {
                let role = self
                    .aliases
                    .get(&raw.trim().to_ascii_lowercase())
                    .cloned()
                    .unwrap_or_else(|| Role::parse(&raw));
                if !role.is_known() {
                    debug!(role = %role, subject = %claims.subject, "ignoring unrecognized role");
                }
                roles.insert(role);
            }
        }

        if !roles.has_known_role() {
            match &self.default_role {
                Some(role) => roles.insert(role.clone()),
                None => {
                    return Err(AuthenticationError::NoRecognizedRole {
                        subject: claims.subject.clone(),
                    });
                }
            }
        }

        Ok(roles)
    }
}
