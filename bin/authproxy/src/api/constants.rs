//! Paths of the endpoints served by the proxy itself.

/// Exchange credentials for a token.
pub const LOGIN_PATH: &str = "/login";

/// Revoke the token presented with the request.
pub const LOGOUT_PATH: &str = "/logout";

/// Scope of the proxy management API.
pub const MANAGEMENT_SCOPE: &str = "/api/v1/auth_proxy";
