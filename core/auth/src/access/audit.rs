//! Audit records of authorisation decisions.
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use authproxy_models::AuthContext;
use authproxy_models::Role;

use super::Forbidden;

/// Information about an authorisation decision, logged for operators.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    /// Result of the authorisation process.
    pub decision: AuditDecision,

    /// User the request is performed by.
    pub entity: String,

    /// Role of the user at the time the token was issued.
    pub role: Role,

    /// Minimum role required by the resource.
    pub required_role: Role,

    /// Resource the request is accessing.
    pub resource: String,
}

impl Audit {
    /// Compose an authorisation audit record from authorisation information.
    pub fn record(context: &AuthContext, required_role: Role, result: &Result<()>) -> Audit {
        Audit {
            decision: AuditDecision::from(result),
            entity: context.claims.sub.clone(),
            role: context.claims.role,
            required_role,
            resource: context.resource.to_string(),
        }
    }

    /// Emit the audit record to the given logger.
    pub fn log(&self, logger: &slog::Logger) {
        slog::info!(
            logger, "Authorisation decision";
            "audit" => true,
            "decision" => ?self.decision,
            "entity" => &self.entity,
            "entity_role" => %self.role,
            "required_role" => %self.required_role,
            "resource" => &self.resource,
        );
    }
}

/// Decision of an authorisation request reported in an [`Audit`] record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AuditDecision {
    /// The request was authorised.
    Allow,

    /// The request was denied.
    Deny,

    /// There was an error performing the authorisation check (so the request was denied).
    Error,
}

impl From<&Result<()>> for AuditDecision {
    fn from(value: &Result<()>) -> Self {
        match value {
            Ok(()) => AuditDecision::Allow,
            Err(error) if error.is::<Forbidden>() => AuditDecision::Deny,
            Err(_) => AuditDecision::Error,
        }
    }
}
