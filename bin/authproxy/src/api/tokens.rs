//! API endpoints to manage issued tokens.
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::HttpResponse;
use serde::Deserialize;

use authproxy_context::Context;
use authproxy_injector::Injector;

use super::Error;

/// Token to revoke.
#[derive(Clone, Deserialize)]
pub struct RevokeToken {
    pub token_id: String,
}

/// Revoke a token by ID.
///
/// The token expiry is not known here so the revocation lasts as long as any token
/// issued now would.
#[actix_web::post("/tokens/revoke")]
pub async fn revoke(
    context: Context,
    injector: Data<Injector>,
    request: Json<RevokeToken>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    let entry = injector
        .tokens
        .revoke_token(&context, &request.token_id, None)
        .await?;
    Ok(HttpResponse::Ok().json(entry))
}
