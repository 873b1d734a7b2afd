//! User account records.
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use super::Role;

/// A user account as persisted in the state store.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique name of the account.
    pub username: String,

    /// Salted password hash in PHC string format.
    pub password_hash: String,

    /// Role granted to the account.
    pub role: Role,

    /// Time the account was first created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Public view of a [`User`] with credentials removed.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserInfo {
    fn from(value: &User) -> Self {
        UserInfo {
            username: value.username.clone(),
            role: value.role,
            created_at: value.created_at,
        }
    }
}

impl From<User> for UserInfo {
    fn from(value: User) -> Self {
        UserInfo::from(&value)
    }
}

/// Changes to apply to an existing [`User`].
///
/// Fields left as `None` are not changed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UpdateUser {
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub role: Option<Role>,
}

impl UpdateUser {
    /// Check if the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.role.is_none()
    }
}
