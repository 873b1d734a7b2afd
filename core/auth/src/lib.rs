//! Authentication and Authorisation for the Auth Proxy.
//!
//! First of all:
//!
//! - Authentication: answers "who is asking for access?" (it is about identity).
//! - Authorisation: answers "can they do what they are asking to do?" (it is about access).
//!
//! The crate is split in three modules:
//!
//! - [`registry`]: user accounts, their roles and credentials, persisted in the state store.
//! - [`identity`]: issuing, verifying and revoking the bearer tokens that prove identity.
//! - [`access`]: mapping resources to the minimum role required and checking identities against it.
//!
//! ## Request flow
//!
//! 1. Clients exchange credentials validated by the [`AuthRegistry`](registry::AuthRegistry)
//!    for a token issued by the [`TokenService`](identity::TokenService).
//! 2. Every other request carries the token, which is verified to produce the
//!    [`TokenClaims`](authproxy_models::TokenClaims) of the caller.
//! 3. The [`Enforcer`](access::Enforcer) determines the role required by the request
//!    and allows or denies it based on the role in the claims.
pub mod access;
pub mod identity;
pub mod registry;

/// Ensure a store key prefix ends with a `/` so derived keys don't bleed into siblings.
pub(crate) fn normalise_prefix(prefix: &str) -> String {
    if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}
