//! Role types for portal access control.
//!
//! Roles come from the identity provider's token claims and are mapped into a
//! closed set at the boundary. Anything the portal does not recognize is kept
//! as [`Role::Unknown`] so it can be logged, but it never grants access.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Portal role derived from identity provider claims.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Platform administrator.
    Admin,
    /// Doctor or other clinician seeing patients.
    Practitioner,
    /// Patient using the portal for their own care.
    Patient,
    /// A role identifier outside the closed set.
    Unknown(String),
}

impl Role {
    /// Parses a role identifier.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Unrecognized identifiers become [`Role::Unknown`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "practitioner" => Self::Practitioner,
            "patient" => Self::Patient,
            _ => Self::Unknown(raw.trim().to_string()),
        }
    }

    /// Returns true for members of the closed role set.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Returns the canonical identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Practitioner => "practitioner",
            Self::Patient => "patient",
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// The set of roles held by an authenticated user.
///
/// Duplicates are collapsed on insert. Unknown roles may be present but are
/// ignored by every access check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
    roles: Vec<Role>,
}

impl RoleSet {
    /// Creates an empty role set.
    #[must_use]
    pub fn none() -> Self {
        Self { roles: Vec::new() }
    }

    /// Creates a role set from any collection of roles.
    #[must_use]
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut set = Self::none();
        for role in roles {
            set.insert(role);
        }
        set
    }

    /// Adds a role if not already present.
    pub fn insert(&mut self, role: Role) {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
    }

    /// Returns true if the set holds the given role.
    #[must_use]
    pub fn contains(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Returns true if any known role in this set appears in `required`.
    #[must_use]
    pub fn intersects(&self, required: &[Role]) -> bool {
        self.roles
            .iter()
            .filter(|r| r.is_known())
            .any(|r| required.contains(r))
    }

    /// Returns true if at least one role from the closed set is held.
    #[must_use]
    pub fn has_known_role(&self) -> bool {
        self.roles.iter().any(Role::is_known)
    }

    /// Returns true if the user is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.contains(&Role::Admin)
    }

    /// Returns true if no roles are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the roles as a slice.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
