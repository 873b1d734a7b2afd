use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;

use authproxy_conf::RbacConf;
use authproxy_conf::RuleConf;
use authproxy_context::Context;
use authproxy_models::AuthContext;
use authproxy_models::Resource;
use authproxy_models::Role;
use authproxy_models::TokenClaims;

use super::Enforcer;
use super::Forbidden;
use super::MissingAuthContext;
use super::Rule;

/// Drain capturing the key/value pairs of log records.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<Vec<(String, String)>>>>);

struct PairsSerializer(Vec<(String, String)>);

impl slog::Serializer for PairsSerializer {
    fn emit_arguments(&mut self, key: slog::Key, val: &fmt::Arguments) -> slog::Result {
        self.0.push((key.to_string(), val.to_string()));
        Ok(())
    }
}

impl slog::Drain for Capture {
    type Ok = ();
    type Err = slog::Never;

    fn log(&self, record: &slog::Record, _: &slog::OwnedKVList) -> Result<(), slog::Never> {
        let mut serializer = PairsSerializer(Vec::new());
        let _ = slog::KV::serialize(&record.kv(), record, &mut serializer);
        self.0.lock().unwrap().push(serializer.0);
        Ok(())
    }
}

impl Capture {
    fn value(&self, index: usize, key: &str) -> Option<String> {
        self.0.lock().unwrap()[index]
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
    }
}

fn claims(role: Role) -> TokenClaims {
    TokenClaims {
        jti: "token".into(),
        sub: "alice".into(),
        role,
        iat: 0,
        exp: i64::MAX,
    }
}

fn context(capture: &Capture, role: Role, method: &str, path: &str) -> Context {
    let logger = slog::Logger::root(capture.clone(), slog::o!());
    let auth = AuthContext {
        claims: claims(role),
        resource: Resource::new(method, path),
    };
    Context::root(logger).authenticated(auth).build()
}

fn enforcer() -> Enforcer {
    let conf = RbacConf {
        default_role: Role::Admin,
        rules: vec![
            RuleConf {
                method: Some("delete".into()),
                path: "/api/v1/clusters/*".into(),
                role: Role::Admin,
            },
            RuleConf {
                method: None,
                path: "/api/v1/clusters/**".into(),
                role: Role::Ops,
            },
            RuleConf {
                method: Some("*".into()),
                path: "/protected".into(),
                role: Role::Ops,
            },
        ],
    };
    Enforcer::from_conf(&conf).unwrap()
}

#[test]
fn first_matching_rule_wins() {
    let enforcer = enforcer();
    let delete = Resource::new("DELETE", "/api/v1/clusters/one");
    let get = Resource::new("GET", "/api/v1/clusters/one");
    assert_eq!(enforcer.required_role(&delete), Role::Admin);
    assert_eq!(enforcer.required_role(&get), Role::Ops);
}

#[test]
fn unmatched_resources_use_default_role() {
    let enforcer = enforcer();
    let resource = Resource::new("GET", "/api/v2/other");
    assert_eq!(enforcer.required_role(&resource), Role::Admin);
}

#[test]
fn builtin_rules_come_first() {
    let rule = Rule::new(None, "/**", Role::Ops).unwrap();
    let enforcer = Enforcer::new(vec![rule], Role::Ops).unwrap();
    let users = Resource::new("GET", "/api/v1/auth_proxy/local_users");
    let revoke = Resource::new("POST", "/api/v1/auth_proxy/tokens/revoke");
    let logout = Resource::new("POST", "/logout");
    assert_eq!(enforcer.required_role(&users), Role::Admin);
    assert_eq!(enforcer.required_role(&revoke), Role::Admin);
    assert_eq!(enforcer.required_role(&logout), Role::Ops);
}

#[test]
fn invalid_rules_are_rejected() {
    let conf = RbacConf {
        default_role: Role::Admin,
        rules: vec![RuleConf {
            method: None,
            path: "/a/**/b".into(),
            role: Role::Ops,
        }],
    };
    assert!(Enforcer::from_conf(&conf).is_err());
}

#[test]
fn higher_roles_satisfy_lower_requirements() {
    let enforcer = enforcer();
    enforcer.authorize(&claims(Role::Admin), Role::Ops).unwrap();
    enforcer.authorize(&claims(Role::Ops), Role::Ops).unwrap();
    let error = enforcer
        .authorize(&claims(Role::Ops), Role::Admin)
        .unwrap_err();
    let forbidden = error.downcast_ref::<Forbidden>().unwrap();
    assert_eq!(forbidden.entity, "alice");
    assert_eq!(forbidden.required, Role::Admin);
}

#[test]
fn highest_role_is_allowed_everywhere() {
    let enforcer = enforcer();
    for role in Role::ALL {
        enforcer.authorize(&claims(Role::highest()), role).unwrap();
    }
}

#[test]
fn authorise_logs_allow_audit() {
    let capture = Capture::default();
    let context = context(&capture, Role::Ops, "GET", "/protected");
    enforcer().authorise(&context).unwrap();
    assert_eq!(capture.value(0, "audit").as_deref(), Some("true"));
    assert_eq!(capture.value(0, "decision").as_deref(), Some("Allow"));
    assert_eq!(capture.value(0, "entity").as_deref(), Some("alice"));
    assert_eq!(capture.value(0, "resource").as_deref(), Some("GET /protected"));
}

#[test]
fn authorise_logs_deny_audit() {
    let capture = Capture::default();
    let context = context(&capture, Role::Ops, "DELETE", "/api/v1/clusters/one");
    let error = enforcer().authorise(&context).unwrap_err();
    assert!(error.is::<Forbidden>());
    assert_eq!(capture.value(0, "decision").as_deref(), Some("Deny"));
    assert_eq!(capture.value(0, "required_role").as_deref(), Some("admin"));
}

#[test]
fn authorise_requires_auth_context() {
    let error = enforcer().authorise(&Context::fixture()).unwrap_err();
    assert!(error.is::<MissingAuthContext>());
}
