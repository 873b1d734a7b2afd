//! ActixWeb Middleware to authenticate and authorise requests, attaching [`Context`]s to them.
//!
//! Every request gets a derived [`Context`] with a logger decorated by a unique request ID.
//! Requests other than login must then carry a valid token for a role allowed to
//! access the requested resource, or they are rejected before reaching any handler.
use std::future::Ready;
use std::sync::Arc;

use actix_web::body::EitherBody;
use actix_web::dev::forward_ready;
use actix_web::dev::Service;
use actix_web::dev::ServiceRequest;
use actix_web::dev::ServiceResponse;
use actix_web::dev::Transform;
use actix_web::http::Method;
use actix_web::HttpMessage;
use actix_web::ResponseError;
use anyhow::Result;
use futures_util::future::LocalBoxFuture;

use authproxy_auth::access::Enforcer;
use authproxy_auth::access::Forbidden;
use authproxy_auth::identity::AuthError;
use authproxy_auth::identity::TokenService;
use authproxy_context::Context;
use authproxy_injector::Injector;
use authproxy_models::AuthContext;
use authproxy_models::Resource;

use super::constants::LOGIN_PATH;
use super::error::MissingToken;
use super::metrics::Outcome;
use super::Error;

/// Derive a per-request [`Context`] and attach it to requests before they are handled.
pub struct ContextService<S> {
    enforcer: Enforcer,
    root: Context,
    service: Arc<S>,
    token_header: String,
    tokens: TokenService,
}

impl<S, B> Service<ServiceRequest> for ContextService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, request: ServiceRequest) -> Self::Future {
        let resource = Resource::new(request.method().as_str(), request.path());
        let context = self
            .root
            .derive()
            .log_request_id()
            .log_values(slog::o!(
                "method" => resource.method.clone(),
                "path" => resource.path.clone(),
            ))
            .build();
        let path = super::path::check(request.path());
        let public = request.method() == Method::POST && request.path() == LOGIN_PATH;
        let token = request
            .headers()
            .get(&self.token_header)
            .map(|value| value.to_str().map(bearer).map_err(|_| AuthError::Malformed));

        // Delay invoking the service so we can authenticate the request asynchronously.
        let enforcer = self.enforcer.clone();
        let service = Arc::clone(&self.service);
        let tokens = self.tokens.clone();
        Box::pin(async move {
            let logger = context.logger.clone();
            if let Err(error) = path {
                let error = reject(&logger, anyhow::Error::new(error));
                return Ok(request.error_response(error).map_into_right_body());
            }
            let context = if public {
                context
            } else {
                let context = context_derive_auth(&tokens, context, token, resource).await;
                let context = context.and_then(|context| {
                    enforcer.authorise(&context)?;
                    Ok(context)
                });
                match context {
                    Ok(context) => context,
                    Err(error) => {
                        let error = reject(&logger, error);
                        return Ok(request.error_response(error).map_into_right_body());
                    }
                }
            };

            // Attach the derived context to the request.
            let logger = context.logger.clone();
            request.extensions_mut().insert(context);

            // Proceed to the wrapped service and handle the request.
            let response = service.call(request).await?;
            let status = response.status();
            if status.is_server_error() {
                let error = response
                    .response()
                    .error()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                slog::error!(
                    logger, "Request failed";
                    "status" => status.as_u16(),
                    "error" => error,
                );
            } else {
                slog::debug!(logger, "Request handled"; "status" => status.as_u16());
            }
            Ok(response.map_into_left_body())
        })
    }
}

/// Wrap an [`App`](actix_web::App) with a middleware that authenticates requests.
#[derive(Clone)]
pub struct ContextMiddleware {
    enforcer: Enforcer,
    root: Context,
    token_header: String,
    tokens: TokenService,
}

impl ContextMiddleware {
    /// Initialise a [`ContextMiddleware`] deriving contexts from the injector's root context.
    pub fn new(injector: &Injector) -> Self {
        Self {
            enforcer: injector.enforcer.clone(),
            root: injector.context.clone(),
            token_header: injector.conf.auth.token_header.to_ascii_lowercase(),
            tokens: injector.tokens.clone(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ContextMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = ContextService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let middleware = ContextService {
            enforcer: self.enforcer.clone(),
            root: self.root.clone(),
            service: Arc::new(service),
            token_header: self.token_header.clone(),
            tokens: self.tokens.clone(),
        };
        std::future::ready(Ok(middleware))
    }
}

/// Strip the optional `Bearer` scheme from the token header value.
fn bearer(value: &str) -> String {
    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim().to_string(),
        _ => value.to_string(),
    }
}

/// Verify the request token and derive an authenticated context from its claims.
async fn context_derive_auth(
    tokens: &TokenService,
    context: Context,
    token: Option<Result<String, AuthError>>,
    resource: Resource,
) -> Result<Context> {
    let token = match token {
        None => anyhow::bail!(MissingToken),
        Some(token) => token?,
    };
    let claims = tokens.verify_token(&context, &token).await?;
    let auth = AuthContext { claims, resource };
    Ok(context.derive().authenticated(auth).build())
}

/// Log and count a request rejected by the middleware.
fn reject(logger: &slog::Logger, error: anyhow::Error) -> Error {
    let outcome = if error.is::<Forbidden>() {
        Some(Outcome::Forbidden)
    } else if error.is::<MissingToken>() || error.is::<AuthError>() {
        Some(Outcome::Unauthenticated)
    } else {
        None
    };
    if let Some(outcome) = outcome {
        super::metrics::observe(outcome);
    }

    let error = Error::from(error);
    if error.status_code().is_server_error() {
        slog::error!(logger, "Unable to authenticate request"; "error" => %error);
    } else {
        slog::info!(logger, "Request rejected"; "error_code" => error.code());
    }
    error
}

#[cfg(test)]
mod tests {
    use actix_web::test::call_service;
    use actix_web::test::init_service;
    use actix_web::test::read_body_json;
    use actix_web::test::TestRequest;
    use actix_web::HttpResponse;

    use authproxy_context::Context;
    use authproxy_injector::Injector;
    use authproxy_models::Role;
    use authproxy_store::Store;
    use authproxy_store::StoreFixture;

    use super::ContextMiddleware;

    #[actix_web::get("/whoami")]
    async fn whoami(context: Context) -> HttpResponse {
        let user = context.auth.map(|auth| auth.claims.sub);
        HttpResponse::Ok().json(user)
    }

    #[actix_web::post("/login")]
    async fn login(context: Context) -> HttpResponse {
        HttpResponse::Ok().json(context.auth.is_some())
    }

    async fn token(injector: &Injector, username: &str, role: Role) -> String {
        let user = injector
            .registry
            .create_user(&injector.context, username, "pa55word", role)
            .await
            .unwrap();
        injector
            .tokens
            .issue_token(&injector.context, &user)
            .unwrap()
            .token
    }

    #[test]
    fn bearer_scheme_is_optional() {
        assert_eq!(super::bearer("abc"), "abc");
        assert_eq!(super::bearer("Bearer abc"), "abc");
        assert_eq!(super::bearer(" bearer  abc "), "abc");
    }

    #[actix_web::test]
    async fn login_skips_authentication() {
        let injector = Injector::fixture();
        let app = actix_web::App::new()
            .service(login)
            .wrap(ContextMiddleware::new(&injector));
        let app = init_service(app).await;

        let request = TestRequest::post().uri("/login").to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), 200);
        let authenticated: bool = read_body_json(response).await;
        assert!(!authenticated);
    }

    #[actix_web::test]
    async fn missing_token() {
        let injector = Injector::fixture();
        let app = actix_web::App::new()
            .service(whoami)
            .wrap(ContextMiddleware::new(&injector));
        let app = init_service(app).await;

        let request = TestRequest::get().uri("/whoami").to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), 401);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["error_code"], "TOKEN_MISSING");
    }

    #[actix_web::test]
    async fn invalid_token() {
        let injector = Injector::fixture();
        let app = actix_web::App::new()
            .service(whoami)
            .wrap(ContextMiddleware::new(&injector));
        let app = init_service(app).await;

        let request = TestRequest::get()
            .uri("/whoami")
            .insert_header(("X-Auth-Token", "not-a-token"))
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), 401);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["error_code"], "TOKEN_MALFORMED");
    }

    #[actix_web::test]
    async fn authenticated_context() {
        let injector = Injector::fixture();
        let token = token(&injector, "alice", Role::Admin).await;
        let app = actix_web::App::new()
            .service(whoami)
            .wrap(ContextMiddleware::new(&injector));
        let app = init_service(app).await;

        let request = TestRequest::get()
            .uri("/whoami")
            .insert_header(("X-Auth-Token", token))
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), 200);
        let user: Option<String> = read_body_json(response).await;
        assert_eq!(user.as_deref(), Some("alice"));
    }

    #[actix_web::test]
    async fn insufficient_role() {
        let injector = Injector::fixture();
        let token = token(&injector, "bob", Role::Ops).await;
        let app = actix_web::App::new()
            .service(whoami)
            .wrap(ContextMiddleware::new(&injector));
        let app = init_service(app).await;

        let request = TestRequest::get()
            .uri("/whoami")
            .insert_header(("X-Auth-Token", format!("Bearer {}", token)))
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), 403);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["error_code"], "FORBIDDEN");
    }

    #[actix_web::test]
    async fn store_unavailable() {
        let store = StoreFixture::default();
        let injector = Injector::fixture_with_store(Store::from(store.clone()));
        let token = token(&injector, "carol", Role::Admin).await;
        let app = actix_web::App::new()
            .service(whoami)
            .wrap(ContextMiddleware::new(&injector));
        let app = init_service(app).await;

        store.set_unavailable(true);
        let request = TestRequest::get()
            .uri("/whoami")
            .insert_header(("X-Auth-Token", token))
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), 503);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["error_code"], "STORE_UNAVAILABLE");
    }
}
