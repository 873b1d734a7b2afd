//! Module to deal with the Authorisation (what can be done) side of Auth.
//!
//! Every resource (an HTTP method and path) requires a minimum [`Role`].
//! Requirements are looked up in an ordered list of [`Rule`]s where the first match wins,
//! falling back to a default role for resources no rule matches.
//! A request is allowed if the role in its token satisfies the requirement.
use std::sync::Arc;

use anyhow::Result;

use authproxy_conf::RbacConf;
use authproxy_context::Context;
use authproxy_models::Resource;
use authproxy_models::Role;
use authproxy_models::TokenClaims;

mod audit;
mod pattern;

#[cfg(test)]
mod test;

pub use self::audit::Audit;
pub use self::audit::AuditDecision;
pub use self::pattern::InvalidPattern;
pub use self::pattern::PathPattern;

/// Requirements for the endpoints served by the proxy itself.
///
/// These are evaluated ahead of configured rules so they can't be overridden.
pub const BUILTIN_RULES: [(&str, Role); 3] = [
    ("/api/v1/auth_proxy/local_users/**", Role::Admin),
    ("/api/v1/auth_proxy/tokens/**", Role::Admin),
    ("/logout", Role::Ops),
];

/// Minimum role required to access the resources matching a method and path pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rule {
    /// Upper-case HTTP method the rule applies to, `None` for any method.
    method: Option<String>,
    pattern: PathPattern,
    role: Role,
}

impl Rule {
    /// Define a rule for the given method (`None` or `*` for any) and path pattern.
    pub fn new(method: Option<&str>, path: &str, role: Role) -> Result<Rule> {
        let method = match method {
            None | Some("*") => None,
            Some(method) => Some(method.to_ascii_uppercase()),
        };
        let pattern = PathPattern::parse(path)?;
        Ok(Rule {
            method,
            pattern,
            role,
        })
    }

    /// Check if the rule applies to a resource.
    pub fn matches(&self, resource: &Resource) -> bool {
        let method = self
            .method
            .as_ref()
            .map(|method| method.eq_ignore_ascii_case(&resource.method))
            .unwrap_or(true);
        method && self.pattern.matches(&resource.path)
    }
}

/// Decide which role is required to access resources and check requests against it.
#[derive(Clone, Debug)]
pub struct Enforcer {
    default_role: Role,
    rules: Arc<Vec<Rule>>,
}

impl Enforcer {
    /// Initialise an enforcer from the given rules, evaluated after the [`BUILTIN_RULES`].
    pub fn new(rules: Vec<Rule>, default_role: Role) -> Result<Enforcer> {
        let mut all = Vec::with_capacity(BUILTIN_RULES.len() + rules.len());
        for (path, role) in BUILTIN_RULES {
            all.push(Rule::new(None, path, role)?);
        }
        all.extend(rules);
        Ok(Enforcer {
            default_role,
            rules: Arc::new(all),
        })
    }

    /// Initialise an enforcer from the RBAC configuration.
    pub fn from_conf(conf: &RbacConf) -> Result<Enforcer> {
        let rules = conf
            .rules
            .iter()
            .map(|rule| Rule::new(rule.method.as_deref(), &rule.path, rule.role))
            .collect::<Result<Vec<_>>>()?;
        Enforcer::new(rules, conf.default_role)
    }

    /// Minimum role required to access a resource.
    pub fn required_role(&self, resource: &Resource) -> Role {
        self.rules
            .iter()
            .find(|rule| rule.matches(resource))
            .map(|rule| rule.role)
            .unwrap_or(self.default_role)
    }

    /// Check the claims of a token satisfy the required role.
    ///
    /// The highest role satisfies any requirement.
    pub fn authorize(&self, claims: &TokenClaims, required: Role) -> Result<()> {
        if claims.role.satisfies(required) {
            return Ok(());
        }
        anyhow::bail!(Forbidden::deny(&claims.sub, claims.role, required))
    }

    /// Verify a [`Context`] for correct authorisation.
    ///
    /// The [`Context::auth`] contains the verified claims and the resource accessed.
    /// If authorisation is denied the method returns a [`Forbidden`] error.
    ///
    /// Every decision is logged as an audit record for operators to troubleshoot
    /// access problems or verify past access.
    pub fn authorise(&self, context: &Context) -> Result<()> {
        let auth = match context.auth.as_ref() {
            Some(auth) => auth,
            None => anyhow::bail!(MissingAuthContext),
        };
        let required = self.required_role(&auth.resource);
        let result = self.authorize(&auth.claims, required);
        Audit::record(auth, required, &result).log(&context.logger);
        result
    }
}

/// A user is not allowed to access a resource with their role.
#[derive(Debug, thiserror::Error)]
#[error("user \"{entity}\" with role \"{role}\" is not allowed to access a resource requiring \"{required}\"")]
pub struct Forbidden {
    pub entity: String,
    pub required: Role,
    pub role: Role,
}

impl Forbidden {
    /// Deny a user from accessing a resource.
    pub fn deny<S>(entity: S, role: Role, required: Role) -> Self
    where
        S: Into<String>,
    {
        Self {
            entity: entity.into(),
            required,
            role,
        }
    }
}

/// Authorisation was attempted before the request was authenticated.
#[derive(Debug, thiserror::Error)]
#[error("cannot authorise a request without an auth context")]
pub struct MissingAuthContext;
