//! Token claims, revocation records and per-request authentication information.
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use super::Role;

/// Claims embedded in every bearer token issued by the proxy.
///
/// Tokens are immutable once issued: a change to the user's role only affects tokens
/// issued after the change.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Unique token identifier, used for revocation.
    pub jti: String,

    /// Username of the token owner.
    pub sub: String,

    /// Role of the owner at the time the token was issued.
    pub role: Role,

    /// Issue time, in seconds since the UNIX epoch.
    pub iat: i64,

    /// Expiry time, in seconds since the UNIX epoch.
    pub exp: i64,
}

impl TokenClaims {
    /// Time the token stops being valid.
    pub fn expires_at(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.exp).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// Check if the token expired at the given time.
    pub fn expired_at(&self, now: OffsetDateTime) -> bool {
        now.unix_timestamp() >= self.exp
    }
}

/// Durable marker that a token must be rejected before its natural expiry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RevocationEntry {
    /// Identifier (`jti`) of the revoked token.
    pub token_id: String,

    /// Time the revocation was requested.
    #[serde(with = "time::serde::rfc3339")]
    pub revoked_at: OffsetDateTime,

    /// Expiry of the revoked token, after which this entry is irrelevant.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl RevocationEntry {
    /// Check if the entry is still relevant at the given time.
    pub fn active_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

/// Resource a request is trying to access.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// HTTP method of the request, upper-case.
    pub method: String,

    /// Path of the request, without query string.
    pub path: String,
}

impl Resource {
    pub fn new<S1, S2>(method: S1, path: S2) -> Resource
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Resource {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Result of authenticating a request, attached to its context.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Verified claims of the token presented with the request.
    pub claims: TokenClaims,

    /// Resource the request is accessing.
    pub resource: Resource,
}
