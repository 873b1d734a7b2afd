//! Authentication and authorisation configuration.
use serde::Deserialize;
use serde::Serialize;

use authproxy_models::Role;

/// Authentication, token and default accounts configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConf {
    /// Capacity of the verified signatures cache.
    #[serde(default = "AuthConf::default_cache_capacity")]
    pub cache_capacity: u64,

    /// Accounts created at startup if they do not exist.
    #[serde(default = "AuthConf::default_users")]
    pub default_users: Vec<DefaultUser>,

    /// Prefix of all State Store keys owned by the proxy.
    #[serde(default = "AuthConf::default_key_prefix")]
    pub key_prefix: String,

    /// Signing secret replaced by `secret`, accepted for a grace period.
    #[serde(default)]
    pub previous_secret: Option<String>,

    /// Seconds from startup tokens signed with `previous_secret` remain valid for.
    #[serde(default = "AuthConf::default_previous_secret_grace")]
    pub previous_secret_grace_sec: u64,

    /// Interval, in seconds, between sweeps of expired revocations (0 disables sweeps).
    #[serde(default)]
    pub revocation_sweep_interval_sec: u64,

    /// Secret used to sign tokens.
    #[serde(default)]
    pub secret: Option<String>,

    /// File to read the secret used to sign tokens from.
    #[serde(default)]
    pub secret_file: Option<String>,

    /// Name of the request header carrying tokens.
    #[serde(default = "AuthConf::default_token_header")]
    pub token_header: String,

    /// Lifetime, in seconds, of issued tokens.
    #[serde(default = "AuthConf::default_token_ttl")]
    pub token_ttl_sec: u64,

    /// Attempts made by read-modify-write user updates before reporting a conflict.
    #[serde(default = "AuthConf::default_update_retries")]
    pub update_retries: u32,

    /// Reject tokens of users that no longer exist.
    #[serde(default = "AuthConf::default_verify_subject")]
    pub verify_subject: bool,
}

impl Default for AuthConf {
    fn default() -> Self {
        AuthConf {
            cache_capacity: Self::default_cache_capacity(),
            default_users: Self::default_users(),
            key_prefix: Self::default_key_prefix(),
            previous_secret: None,
            previous_secret_grace_sec: Self::default_previous_secret_grace(),
            revocation_sweep_interval_sec: 0,
            secret: None,
            secret_file: None,
            token_header: Self::default_token_header(),
            token_ttl_sec: Self::default_token_ttl(),
            update_retries: Self::default_update_retries(),
            verify_subject: Self::default_verify_subject(),
        }
    }
}

impl AuthConf {
    fn default_cache_capacity() -> u64 {
        4096
    }

    fn default_users() -> Vec<DefaultUser> {
        vec![
            DefaultUser::new("admin", "admin", Role::Admin),
            DefaultUser::new("ops", "ops", Role::Ops),
        ]
    }

    fn default_key_prefix() -> String {
        String::from("/auth_proxy/")
    }

    fn default_previous_secret_grace() -> u64 {
        3600
    }

    fn default_token_header() -> String {
        String::from("X-Auth-Token")
    }

    fn default_token_ttl() -> u64 {
        36000
    }

    fn default_update_retries() -> u32 {
        5
    }

    fn default_verify_subject() -> bool {
        true
    }
}

/// Account created at startup if it does not exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultUser {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl DefaultUser {
    pub fn new(username: &str, password: &str, role: Role) -> Self {
        DefaultUser {
            username: username.to_string(),
            password: password.to_string(),
            role,
        }
    }
}

/// Role requirements of protected resources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacConf {
    /// Minimum role required to access resources not matched by any rule.
    #[serde(default = "RbacConf::default_role")]
    pub default_role: Role,

    /// Rules evaluated in order, the first matching rule decides the required role.
    #[serde(default)]
    pub rules: Vec<RuleConf>,
}

impl Default for RbacConf {
    fn default() -> Self {
        RbacConf {
            default_role: Self::default_role(),
            rules: Vec::new(),
        }
    }
}

impl RbacConf {
    fn default_role() -> Role {
        Role::Admin
    }
}

/// Minimum role required to access matching resources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConf {
    /// HTTP method the rule applies to, all methods if unset or `*`.
    #[serde(default)]
    pub method: Option<String>,

    /// Path pattern: `*` matches one segment and a trailing `**` any remainder.
    pub path: String,

    pub role: Role,
}
