//! Data model shared by the Auth Proxy components.
//!
//! The models here are plain data: they carry no storage or transport logic.
//! Persistent records ([`User`], [`RevocationEntry`]) are serialised as JSON into the state store
//! while [`TokenClaims`] are embedded in signed bearer tokens.
mod auth;
mod role;
mod user;

pub use self::auth::AuthContext;
pub use self::auth::Resource;
pub use self::auth::RevocationEntry;
pub use self::auth::TokenClaims;
pub use self::role::Role;
pub use self::role::UnknownRole;
pub use self::user::UpdateUser;
pub use self::user::User;
pub use self::user::UserInfo;
