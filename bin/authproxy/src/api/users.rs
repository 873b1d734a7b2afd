//! API endpoints to manage the proxy's local user accounts.
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::web::Path;
use actix_web::HttpResponse;
use serde::Deserialize;

use authproxy_context::Context;
use authproxy_injector::Injector;
use authproxy_models::Role;
use authproxy_models::UpdateUser;

use super::Error;

/// Details of a new user account.
#[derive(Clone, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub role: Role,
}

/// Create a new user account.
#[actix_web::post("/local_users")]
pub async fn create(
    context: Context,
    injector: Data<Injector>,
    request: Json<CreateUser>,
) -> Result<HttpResponse, Error> {
    let request = request.into_inner();
    let user = injector
        .registry
        .create_user(&context, &request.username, &request.password, request.role)
        .await?;
    Ok(HttpResponse::Created().json(user))
}

/// Delete a user account.
#[actix_web::delete("/local_users/{username}")]
pub async fn delete(
    context: Context,
    injector: Data<Injector>,
    path: Path<String>,
) -> Result<HttpResponse, Error> {
    injector.registry.delete_user(&context, path.as_str()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Get a user account by username.
#[actix_web::get("/local_users/{username}")]
pub async fn get(
    context: Context,
    injector: Data<Injector>,
    path: Path<String>,
) -> Result<HttpResponse, Error> {
    let user = injector.registry.get_user(&context, path.as_str()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// List all user accounts, sorted by username.
#[actix_web::get("/local_users")]
pub async fn list(context: Context, injector: Data<Injector>) -> Result<HttpResponse, Error> {
    let users = injector.registry.list_users(&context).await?;
    Ok(HttpResponse::Ok().json(users))
}

/// Change the password and/or role of a user account.
#[actix_web::patch("/local_users/{username}")]
pub async fn update(
    context: Context,
    injector: Data<Injector>,
    path: Path<String>,
    request: Json<UpdateUser>,
) -> Result<HttpResponse, Error> {
    let update = request.into_inner();
    let user = if update.is_empty() {
        injector.registry.get_user(&context, path.as_str()).await?
    } else {
        injector
            .registry
            .update_user(&context, path.as_str(), update)
            .await?
    };
    Ok(HttpResponse::Ok().json(user))
}
