//! Metrics about requests handled by the proxy.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::IntCounterVec;
use prometheus::Opts;

/// Number of requests handled by the proxy, by outcome.
pub static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "authproxy_requests",
            "Number of requests handled by the proxy, by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to initialise REQUESTS counter")
});

/// Ensure metrics are registered only once.
static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// Final outcome of a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    BackendError,
    Forbidden,
    Forwarded,
    LoginFailed,
    LoginOk,
    Unauthenticated,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::BackendError => "backend_error",
            Outcome::Forbidden => "forbidden",
            Outcome::Forwarded => "forwarded",
            Outcome::LoginFailed => "login_failed",
            Outcome::LoginOk => "login_ok",
            Outcome::Unauthenticated => "unauthenticated",
        }
    }
}

/// Count a request with the given outcome.
pub fn observe(outcome: Outcome) {
    REQUESTS.with_label_values(&[outcome.as_str()]).inc();
}

/// The first time this method is called it will register the request metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }
    reg.register(Box::new(REQUESTS.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Outcome;
    use super::REQUESTS;

    #[test]
    fn observe_outcome() {
        let before = REQUESTS.with_label_values(&["login_ok"]).get();
        super::observe(Outcome::LoginOk);
        let after = REQUESTS.with_label_values(&["login_ok"]).get();
        assert!(after > before);
    }

    #[test]
    fn register_once() {
        let registry = prometheus::Registry::new();
        super::register_metrics(&registry).unwrap();
        super::register_metrics(&registry).unwrap();
    }
}
