//! Route guarding.
//!
//! [`evaluate`] is a pure function of the session state and a route's role
//! requirement. It fails closed: a requirement that names anything outside
//! the closed role set never allows.

use crate::role::Role;
use crate::session::SessionState;

/// What the router should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteGuardDecision {
    /// Render the route.
    Allow,
    /// Send the user to the login page, then back to `return_to`.
    RedirectToLogin { return_to: String },
    /// Signed in but lacking a required role.
    RedirectToUnauthorized,
    /// Identity is still being established.
    ShowLoading,
}

/// Roles a route accepts; any one of them grants access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequirement {
    any_of: Vec<Role>,
    malformed: bool,
}

impl RouteRequirement {
    /// A route open to every signed-in user.
    #[must_use]
    pub fn authenticated() -> Self {
        Self {
            any_of: Vec::new(),
            malformed: false,
        }
    }

    /// A route open to holders of any of the given roles.
    #[must_use]
    pub fn any_of(roles: impl IntoIterator<Item = Role>) -> Self {
        let any_of: Vec<Role> = roles.into_iter().collect();
        let malformed = any_of.iter().any(|r| !r.is_known());
        Self { any_of, malformed }
    }

    /// Parses role identifiers as declared in a route table.
    ///
    /// Blank or unrecognized identifiers mark the requirement malformed, which
    /// makes it deny everyone.
    #[must_use]
    pub fn parse<'a>(identifiers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut blank = false;
        let mut roles = Vec::new();
        for raw in identifiers {
            if raw.trim().is_empty() {
                blank = true;
                continue;
            }
            let role = Role::parse(raw);
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        let mut requirement = Self::any_of(roles);
        requirement.malformed |= blank;
        requirement
    }

    /// Returns the accepted roles.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.any_of
    }

    /// Returns true if the declaration cannot be trusted.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }
}

/// Decides whether a navigation to `requested_path` may proceed.
#[must_use]
pub fn evaluate(
    state: &SessionState,
    requirement: &RouteRequirement,
    requested_path: &str,
) -> RouteGuardDecision {
    match state {
        SessionState::Uninitialized | SessionState::Loading => RouteGuardDecision::ShowLoading,
        SessionState::Anonymous | SessionState::Error(_) => RouteGuardDecision::RedirectToLogin {
            return_to: requested_path.to_string(),
        },
        SessionState::Authenticated(identity) => {
            if requirement.is_malformed() {
                return RouteGuardDecision::RedirectToUnauthorized;
            }
            if requirement.roles().is_empty() || identity.roles().intersects(requirement.roles()) {
                RouteGuardDecision::Allow
            } else {
                RouteGuardDecision::RedirectToUnauthorized
            }
        }
    }
}
