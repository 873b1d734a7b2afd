//! Render errors returned by request handlers and middlewares as JSON responses.
//!
//! Errors are classified by the kind of failure attached to the [`anyhow::Error`] chain.
//! Responses carry a stable machine-readable code and a message safe to show clients,
//! details of unrecognised errors are only logged.
use std::fmt;

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use actix_web::ResponseError;

use authproxy_auth::access::Forbidden;
use authproxy_auth::identity::AuthError;
use authproxy_auth::identity::InvalidTokenId;
use authproxy_auth::registry::errors::InvalidPassword;
use authproxy_auth::registry::errors::InvalidUsername;
use authproxy_auth::registry::errors::UpdateConflict;
use authproxy_auth::registry::errors::UserExists;
use authproxy_auth::registry::errors::UserNotFound;
use authproxy_store::errors::NotFound;
use authproxy_store::errors::Unavailable;
use authproxy_store::errors::VersionConflict;

use super::forward::BackendTimeout;
use super::forward::BackendUnreachable;
use super::path::InvalidPath;

/// The request did not include a bearer token.
#[derive(Debug, thiserror::Error)]
#[error("the request does not include an authentication token")]
pub struct MissingToken;

/// Login attempted with an unknown username or the wrong password.
#[derive(Debug, thiserror::Error)]
#[error("invalid username or password")]
pub struct LoginFailed;

/// The request payload could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("invalid request payload: {0}")]
pub struct BadRequest(pub String);

/// Error type returned by all API handlers.
#[derive(Debug)]
pub struct Error {
    code: &'static str,
    message: String,
    source: anyhow::Error,
    status: StatusCode,
}

impl Error {
    /// Wrap a typed error for handlers to return.
    pub fn new<E>(error: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::from(anyhow::Error::new(error))
    }

    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.source)
    }
}

impl From<anyhow::Error> for Error {
    fn from(source: anyhow::Error) -> Self {
        let (status, code, message) = classify(&source);
        Error {
            code,
            message,
            source,
            status,
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        let body = serde_json::json!({
            "error": true,
            "error_code": self.code,
            "error_msg": self.message,
        });
        HttpResponse::build(self.status).json(body)
    }
}

/// Find the status, code and client message for the kind of failure in the error.
fn classify(error: &anyhow::Error) -> (StatusCode, &'static str, String) {
    // Authentication and authorisation.
    if error.is::<MissingToken>() {
        return (StatusCode::UNAUTHORIZED, "TOKEN_MISSING", MissingToken.to_string());
    }
    if let Some(auth) = error.downcast_ref::<AuthError>() {
        return (StatusCode::UNAUTHORIZED, auth.code(), auth.to_string());
    }
    if error.is::<LoginFailed>() {
        return (StatusCode::UNAUTHORIZED, "LOGIN_FAILED", LoginFailed.to_string());
    }
    if let Some(forbidden) = error.downcast_ref::<Forbidden>() {
        return (StatusCode::FORBIDDEN, "FORBIDDEN", forbidden.to_string());
    }

    // Invalid requests.
    if let Some(invalid) = error.downcast_ref::<BadRequest>() {
        return (StatusCode::BAD_REQUEST, "BAD_REQUEST", invalid.to_string());
    }
    if let Some(invalid) = error.downcast_ref::<InvalidPath>() {
        return (StatusCode::BAD_REQUEST, "INVALID_PATH", invalid.to_string());
    }
    if let Some(invalid) = error.downcast_ref::<InvalidUsername>() {
        return (StatusCode::BAD_REQUEST, "INVALID_USERNAME", invalid.to_string());
    }
    if let Some(invalid) = error.downcast_ref::<InvalidPassword>() {
        return (StatusCode::BAD_REQUEST, "INVALID_PASSWORD", invalid.to_string());
    }
    if let Some(invalid) = error.downcast_ref::<InvalidTokenId>() {
        return (StatusCode::BAD_REQUEST, "INVALID_TOKEN_ID", invalid.to_string());
    }

    // Conflicts and missing entities.
    if let Some(exists) = error.downcast_ref::<UserExists>() {
        return (StatusCode::CONFLICT, "USER_EXISTS", exists.to_string());
    }
    if let Some(conflict) = error.downcast_ref::<UpdateConflict>() {
        return (StatusCode::CONFLICT, "UPDATE_CONFLICT", conflict.to_string());
    }
    if error.is::<VersionConflict>() {
        let message = "the resource was changed concurrently, retry the request";
        return (StatusCode::CONFLICT, "VERSION_CONFLICT", message.into());
    }
    if let Some(missing) = error.downcast_ref::<UserNotFound>() {
        return (StatusCode::NOT_FOUND, "USER_NOT_FOUND", missing.to_string());
    }
    if error.is::<NotFound>() {
        let message = "the requested resource was not found";
        return (StatusCode::NOT_FOUND, "NOT_FOUND", message.into());
    }

    // Dependencies failures.
    if error.is::<Unavailable>() {
        let message = "the state store is unavailable, retry later";
        return (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", message.into());
    }
    if error.is::<BackendTimeout>() {
        return (StatusCode::GATEWAY_TIMEOUT, "BACKEND_TIMEOUT", BackendTimeout.to_string());
    }
    if error.is::<BackendUnreachable>() {
        let message = BackendUnreachable.to_string();
        return (StatusCode::BAD_GATEWAY, "BACKEND_UNREACHABLE", message);
    }

    let message = "internal server error";
    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message.into())
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;
    use anyhow::Context;

    use authproxy_auth::access::Forbidden;
    use authproxy_auth::identity::AuthError;
    use authproxy_auth::registry::errors::UserExists;
    use authproxy_models::Role;
    use authproxy_store::errors::InvalidResponse;
    use authproxy_store::errors::NotFound;
    use authproxy_store::errors::Unavailable;
    use authproxy_store::errors::VersionConflict;

    use super::Error;
    use super::LoginFailed;
    use super::MissingToken;
    use crate::api::forward::BackendTimeout;
    use crate::api::forward::BackendUnreachable;
    use crate::api::path::InvalidPath;

    fn status(error: anyhow::Error) -> (StatusCode, &'static str) {
        let error = Error::from(error);
        (error.status_code(), error.code())
    }

    #[test]
    fn authentication_errors() {
        assert_eq!(
            status(anyhow::anyhow!(MissingToken)),
            (StatusCode::UNAUTHORIZED, "TOKEN_MISSING"),
        );
        assert_eq!(
            status(anyhow::anyhow!(AuthError::Expired)),
            (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
        );
        assert_eq!(
            status(anyhow::anyhow!(AuthError::Revoked)),
            (StatusCode::UNAUTHORIZED, "TOKEN_REVOKED"),
        );
        assert_eq!(
            status(anyhow::anyhow!(LoginFailed)),
            (StatusCode::UNAUTHORIZED, "LOGIN_FAILED"),
        );
    }

    #[test]
    fn authorisation_errors() {
        let forbidden = Forbidden::deny("ops", Role::Ops, Role::Admin);
        assert_eq!(
            status(anyhow::anyhow!(forbidden)),
            (StatusCode::FORBIDDEN, "FORBIDDEN"),
        );
    }

    #[test]
    fn store_errors() {
        assert_eq!(
            status(anyhow::anyhow!(VersionConflict::new("/k"))),
            (StatusCode::CONFLICT, "VERSION_CONFLICT"),
        );
        assert_eq!(
            status(anyhow::anyhow!(UserExists {
                username: "admin".into()
            })),
            (StatusCode::CONFLICT, "USER_EXISTS"),
        );
        assert_eq!(
            status(anyhow::anyhow!(NotFound::new("/k"))),
            (StatusCode::NOT_FOUND, "NOT_FOUND"),
        );
        assert_eq!(
            status(anyhow::anyhow!(Unavailable)),
            (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
        );
    }

    #[test]
    fn store_errors_found_in_context() {
        let error = anyhow::anyhow!(InvalidResponse("HTTP 503".into())).context(Unavailable);
        assert_eq!(
            status(error),
            (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
        );
    }

    #[test]
    fn backend_errors() {
        assert_eq!(
            status(anyhow::anyhow!(BackendUnreachable)),
            (StatusCode::BAD_GATEWAY, "BACKEND_UNREACHABLE"),
        );
        assert_eq!(
            status(anyhow::anyhow!(BackendTimeout)),
            (StatusCode::GATEWAY_TIMEOUT, "BACKEND_TIMEOUT"),
        );
    }

    #[test]
    fn invalid_paths() {
        let error = InvalidPath("/ops/../protected".into());
        assert_eq!(
            status(anyhow::anyhow!(error)),
            (StatusCode::BAD_REQUEST, "INVALID_PATH"),
        );
    }

    #[actix_web::test]
    async fn unknown_errors_hide_details() {
        let error: anyhow::Result<()> =
            Err(anyhow::anyhow!("secret internal detail")).context("while doing things");
        let error = Error::from(error.unwrap_err());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.to_string().contains("secret internal detail"));

        let response = error.error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "error": true,
                "error_code": "INTERNAL_ERROR",
                "error_msg": "internal server error",
            }),
        );
    }
}
