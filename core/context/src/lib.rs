//! The [`Context`] is a general purpose immutable container to carry scoped values around.
//!
//! Code executed as part of Auth Proxy processes can access operation scoped values.
//!
//! Contexts are organised into a tree structure:
//!
//! - A root context represents the general process wide scope.
//! - Derived contexts represents a narrower scope within their parent with additional
//!   or updated information attached to them.
//!
//! For example: [`Context`]s provide access to the current [`Logger`].
//! For the root context this is the process-wide logger with no additional attributes.
//! But for individual requests a derived context is provided with a [`Logger`] decorated
//! with the request ID and, once authenticated, the requesting user.
use std::future::Ready;

use actix_web::dev::Payload;
use actix_web::Error;
use actix_web::FromRequest;
use actix_web::HttpMessage;
use actix_web::HttpRequest;
use slog::Logger;
use slog::OwnedKV;
use slog::SendSyncRefUnwindSafeKV;

use authproxy_models::AuthContext;

/// The [`Context`] is a general purpose container to carry scoped values around.
///
/// Refer to the [crate level docs](crate) for details.
#[derive(Clone, Debug)]
pub struct Context {
    /// Result of the authentication process for the current request.
    ///
    /// The initial value of `None` indicates no authentication process was performed.
    pub auth: Option<AuthContext>,

    /// Logger with contextual attributes attached to it.
    pub logger: Logger,
}

impl Context {
    /// Derive a new [`Context`] by making changes to the current one.
    pub fn derive(&self) -> ContextBuilder {
        ContextBuilder {
            auth: self.auth.clone(),
            logger: self.logger.clone(),
        }
    }

    /// Derive a new [`Context`] by making changes to the current one using the provided callback.
    pub fn derive_with<F>(&self, callback: F) -> Context
    where
        F: FnOnce(ContextBuilder) -> ContextBuilder,
    {
        let builder = callback(self.derive());
        builder.build()
    }

    /// Initialise a new root context with no values attached.
    pub fn root(logger: Logger) -> ContextBuilder {
        ContextBuilder { auth: None, logger }
    }
}

impl FromRequest for Context {
    type Error = Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        let context = request
            .extensions()
            .get::<Context>()
            .cloned()
            .ok_or_else(|| actix_web::error::ErrorInternalServerError("request has no context"));
        std::future::ready(context)
    }
}

/// A builder for root and derived contexts.
pub struct ContextBuilder {
    auth: Option<AuthContext>,
    logger: Logger,
}

impl ContextBuilder {
    /// Mark the context to be created as authenticated by as specified.
    ///
    /// The logger is decorated with the authenticated user and their role.
    pub fn authenticated(mut self, auth: AuthContext) -> Self {
        self.logger = self.logger.new(slog::o!(
            "user" => auth.claims.sub.clone(),
            "role" => auth.claims.role.as_str(),
        ));
        self.auth = Some(auth);
        self
    }

    /// Finalise the build process and return a new [`Context`].
    pub fn build(self) -> Context {
        Context {
            auth: self.auth,
            logger: self.logger,
        }
    }

    /// Decorate the [`Context`]'s logger with a new random request ID.
    pub fn log_request_id(self) -> Self {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_values(slog::o!("request_id" => request_id))
    }

    /// Update the [`Context`] logger to attach new log key/pair values.
    pub fn log_values<T>(mut self, entries: OwnedKV<T>) -> Self
    where
        T: SendSyncRefUnwindSafeKV + 'static,
    {
        self.logger = self.logger.new(entries);
        self
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Context {
    /// Create an empty context useful for test.
    pub fn fixture() -> Context {
        let logger = Logger::root(slog::Discard, slog::o!());
        Context { auth: None, logger }
    }
}
