//! Errors reported while verifying tokens.

/// A token was presented but it can't be accepted.
///
/// All variants are reported to clients as authentication failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AuthError {
    /// The token is not a well formed signed token.
    #[error("the token is malformed")]
    Malformed,

    /// The token expired.
    #[error("the token has expired")]
    Expired,

    /// The token signature does not match any accepted secret.
    #[error("the token signature is not valid")]
    SignatureMismatch,

    /// The token was explicitly revoked.
    #[error("the token has been revoked")]
    Revoked,

    /// The user the token was issued to no longer exists.
    #[error("the token subject is not a known user")]
    UnknownSubject,
}

impl AuthError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Malformed => "TOKEN_MALFORMED",
            AuthError::Expired => "TOKEN_EXPIRED",
            AuthError::SignatureMismatch => "TOKEN_SIGNATURE_MISMATCH",
            AuthError::Revoked => "TOKEN_REVOKED",
            AuthError::UnknownSubject => "TOKEN_UNKNOWN_SUBJECT",
        }
    }
}

/// Token identifiers can only contain letters, digits and dashes.
#[derive(Debug, thiserror::Error)]
#[error("invalid token identifier '{token_id}'")]
pub struct InvalidTokenId {
    pub token_id: String,
}

/// Unable to sign a new token.
#[derive(Debug, thiserror::Error)]
#[error("unable to sign token")]
pub struct SigningFailed;
