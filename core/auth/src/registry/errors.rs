//! Errors reported by the user registry.

/// The username does not follow the allowed format.
#[derive(Debug, thiserror::Error)]
#[error("invalid username '{username}': use 1 to 64 letters, digits, '_', '.' or '-'")]
pub struct InvalidUsername {
    pub username: String,
}

/// Passwords can't be empty.
#[derive(Debug, thiserror::Error)]
#[error("passwords can't be empty")]
pub struct InvalidPassword;

/// A user with the same username already exists.
#[derive(Debug, thiserror::Error)]
#[error("user '{username}' already exists")]
pub struct UserExists {
    pub username: String,
}

/// The requested user does not exist.
#[derive(Debug, thiserror::Error)]
#[error("user '{username}' not found")]
pub struct UserNotFound {
    pub username: String,
}

/// An update kept conflicting with concurrent changes to the same user.
#[derive(Debug, thiserror::Error)]
#[error("update to user '{username}' conflicted with concurrent changes {attempts} times")]
pub struct UpdateConflict {
    pub attempts: u32,
    pub username: String,
}

/// Unable to hash or verify a password.
#[derive(Debug, thiserror::Error)]
#[error("unable to process password hash: {0}")]
pub struct PasswordHashing(pub String);
