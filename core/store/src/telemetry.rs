//! Metrics shared by all state store backends.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::Counter;
use prometheus::CounterVec;
use prometheus::HistogramOpts;
use prometheus::HistogramTimer;
use prometheus::HistogramVec;
use prometheus::Opts;

use crate::errors::NotFound;
use crate::errors::VersionConflict;

/// Duration (in seconds) of state store operations.
pub static OPS_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "authproxy_store_ops_duration",
            "Duration (in seconds) of state store operations",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["backend", "op"],
    )
    .expect("failed to initialise OPS_DURATION histogram")
});

/// Number of state store operations that resulted in error.
pub static OPS_ERR: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "authproxy_store_ops_error",
            "Number of state store operations that resulted in error",
        ),
        &["backend", "op"],
    )
    .expect("failed to initialise OPS_ERR counter")
});

/// Ensure metrics are registered only once.
static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the state store metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    // Skip registration if already done before.
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    let collectors: [Box<dyn prometheus::core::Collector>; 2] =
        [Box::new(OPS_DURATION.clone()), Box::new(OPS_ERR.clone())];
    for collector in collectors {
        reg.register(collector)?;
    }
    Ok(())
}

/// Observe the execution of a state store operation.
///
/// ## Returns
///
/// - A [`Counter`] to increment in case of error.
/// - A started timer to observe the duration of the operation.
#[inline]
pub fn observe_op(backend: &str, op: &str) -> (Counter, HistogramTimer) {
    let err_count = OPS_ERR.with_label_values(&[backend, op]);
    let timer = OPS_DURATION.with_label_values(&[backend, op]).start_timer();
    (err_count, timer)
}

/// Count the error, if any, of an observed operation.
///
/// Missing keys and version conflicts are expected outcomes and are not counted.
pub fn count_error<T>(err_count: &Counter, result: &Result<T>) {
    if let Err(error) = result {
        if !error.is::<NotFound>() && !error.is::<VersionConflict>() {
            err_count.inc();
        }
    }
}
