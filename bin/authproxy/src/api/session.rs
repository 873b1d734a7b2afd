//! API endpoints to start and end a session.
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::HttpResponse;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use authproxy_auth::access::MissingAuthContext;
use authproxy_context::Context;
use authproxy_injector::Injector;

use super::error::LoginFailed;
use super::metrics::Outcome;
use super::Error;

/// Credentials presented to login.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token issued on successful login.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Exchange a username and password for a token.
///
/// Unknown users and wrong passwords get the same response.
#[actix_web::post("/login")]
pub async fn login(
    context: Context,
    injector: Data<Injector>,
    request: Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    let user = injector
        .registry
        .check_credentials(&context, &request.username, &request.password)
        .await?;
    let user = match user {
        Some(user) => user,
        None => {
            super::metrics::observe(Outcome::LoginFailed);
            slog::info!(context.logger, "Login failed"; "username" => &request.username);
            return Err(Error::new(LoginFailed));
        }
    };

    let issued = injector.tokens.issue_token(&context, &user)?;
    super::metrics::observe(Outcome::LoginOk);
    slog::info!(
        context.logger, "Login succeeded";
        "username" => &user.username,
        "token_id" => &issued.claims.jti,
    );
    let response = LoginResponse {
        expires_at: issued.expires_at(),
        token: issued.token,
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Revoke the token used to make the request.
#[actix_web::post("/logout")]
pub async fn logout(context: Context, injector: Data<Injector>) -> Result<HttpResponse, Error> {
    let claims = match &context.auth {
        Some(auth) => &auth.claims,
        None => return Err(Error::new(MissingAuthContext)),
    };
    injector
        .tokens
        .revoke_token(&context, &claims.jti, Some(claims.expires_at()))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
