//! Totally ordered set of roles used for access control.
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Role assigned to a user and embedded in the tokens issued to them.
///
/// Variants are declared from the least to the most privileged so the derived ordering
/// matches privilege: a role satisfies any requirement equal to or below itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Operators with access to day-to-day endpoints.
    Ops,

    /// Administrators with unrestricted access.
    Admin,
}

impl Role {
    /// All known roles, from the least to the most privileged.
    pub const ALL: [Role; 2] = [Role::Ops, Role::Admin];

    /// The most privileged role, which satisfies every requirement.
    pub fn highest() -> Role {
        Role::Admin
    }

    /// Check if this role is allowed access to resources that require `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self == Role::highest() || self >= required
    }

    /// Lower-case name of the role, as used in configuration and tokens.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Ops => "ops",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| UnknownRole(value.to_string()))
    }
}

/// The given name does not match any known role.
#[derive(Debug, thiserror::Error)]
#[error("role '{0}' is not recognised")]
pub struct UnknownRole(pub String);
