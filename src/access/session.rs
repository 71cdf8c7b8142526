//! Session value shared between the resolver (single writer) and every reader.
//!
//! A session is one of three explicit states. "Resolved without identity" and
//! "resolved with identity but unknown role" are distinct values, so callers never
//! have to infer intent from missing fields.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::role::Role;

/// Opaque external user reference issued by the auth service.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User record as reported by the auth service. Metadata is only used to seed a
/// default profile on first sign-in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthUser {
    pub identity: Identity,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub department: Option<String>,
}

impl AuthUser {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            email: None,
            display_name: None,
            department: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Progress of the role lookup for a known identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoleStatus {
    /// Identity is known, the profile lookup has not completed yet.
    Loading,
    Assigned(Role),
    /// Lookup failed or no profile exists; treated as lowest privilege.
    Unavailable,
}

impl RoleStatus {
    #[must_use]
    pub const fn role(self) -> Option<Role> {
        match self {
            Self::Assigned(role) => Some(role),
            Self::Loading | Self::Unavailable => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Assigned(_) => "assigned",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Visitor {
    pub identity: Identity,
    pub email: Option<String>,
    pub role: RoleStatus,
}

impl Visitor {
    pub fn new(user: &AuthUser) -> Self {
        Self {
            identity: user.identity.clone(),
            email: user.email.clone(),
            role: RoleStatus::Loading,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: RoleStatus) -> Self {
        self.role = role;
        self
    }
}

/// The visitor's authentication state.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Session {
    /// The first session check has not completed; no access decision may be made.
    #[default]
    Unresolved,
    /// Resolved, nobody is signed in.
    Anonymous,
    /// Resolved with an identity. The role may still be loading.
    Authenticated(Visitor),
}

impl Session {
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    #[must_use]
    pub const fn visitor(&self) -> Option<&Visitor> {
        match self {
            Self::Authenticated(visitor) => Some(visitor),
            Self::Unresolved | Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.visitor().map(|visitor| &visitor.identity)
    }

    /// Role status, present only when an identity is present.
    #[must_use]
    pub fn role_status(&self) -> Option<RoleStatus> {
        self.visitor().map(|visitor| visitor.role)
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role_status().and_then(RoleStatus::role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role().is_some_and(Role::is_admin)
    }
}
