//! The proxy pipeline: authenticate, authorise and forward requests over HTTP.
//!
//! Requests are handled by actix-web as follows:
//!
//! 1. The [`ContextMiddleware`](context::ContextMiddleware) derives a request context,
//!    rejects paths that could resolve elsewhere and, for everything except login,
//!    verifies the request token and the role it grants.
//! 2. Requests for the proxy's own endpoints (login, logout and the management API)
//!    are handled by the proxy.
//! 3. Any other request is forwarded to the backend and its response relayed to the client.
use actix_web::body::MessageBody;
use actix_web::dev::ServiceFactory;
use actix_web::dev::ServiceRequest;
use actix_web::dev::ServiceResponse;
use actix_web::web::Data;
use actix_web::web::JsonConfig;
use actix_web::web::PayloadConfig;
use actix_web::web::ServiceConfig;
use actix_web::App;

use authproxy_injector::Injector;

pub mod constants;
pub mod context;
pub mod error;
pub mod forward;
pub mod metrics;
pub mod path;
pub mod session;
pub mod tokens;
pub mod users;

#[cfg(test)]
mod tests;

pub use self::error::Error;
pub use self::forward::Forwarder;

/// Register all the proxy endpoints and forward everything else to the backend.
pub fn configure(config: &mut ServiceConfig) {
    let management = actix_web::web::scope(constants::MANAGEMENT_SCOPE)
        .service(users::create)
        .service(users::delete)
        .service(users::get)
        .service(users::list)
        .service(users::update)
        .service(tokens::revoke);
    config
        .service(session::login)
        .service(session::logout)
        .service(management)
        .default_service(actix_web::web::to(forward::forward));
}

/// Build the proxy [`App`] around the process dependencies.
pub fn app(
    injector: &Injector,
    forwarder: &Forwarder,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let limit = injector.conf.http.payload_limit;
    let json = JsonConfig::default()
        .limit(limit)
        .error_handler(|error, _| Error::new(error::BadRequest(error.to_string())).into());
    App::new()
        .app_data(Data::new(injector.clone()))
        .app_data(Data::new(forwarder.clone()))
        .app_data(json)
        .app_data(PayloadConfig::new(limit))
        .configure(configure)
        .wrap(context::ContextMiddleware::new(injector))
}
