//! Metrics collection and export module
//!
//! Components receive an `Arc<dyn Recorder>` at construction. The binary injects a
//! [`PrometheusRecorder`]; tests and embedders that do not care use [`noop`].

use once_cell::sync::Lazy;
use prometheus::{
    exponential_buckets, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const NAMESPACE: &str = "mev_sentry";

/// Sink for every metric the sentry emits
pub trait Recorder: Send + Sync {
    /// Latency of an inbound JSON-RPC call
    fn observe_api_latency(&self, method: &str, elapsed: Duration);

    /// Failed inbound call, keyed by the JSON-RPC error code returned
    fn inc_api_error(&self, method: &str, code: i64);

    /// Payment account problem such as `insufficient_balance`
    fn inc_account_error(&self, account: &str, reason: &str);

    /// Failed upstream call, from the request path or the refresh loop
    fn inc_chain_rpc_error(&self, peer: &str, operation: &str);

    /// Calls currently admitted
    fn add_in_flight(&self, delta: i64);
}

/// Recorder that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl Recorder for NoopRecorder {
    fn observe_api_latency(&self, _method: &str, _elapsed: Duration) {}
    fn inc_api_error(&self, _method: &str, _code: i64) {}
    fn inc_account_error(&self, _account: &str, _reason: &str) {}
    fn inc_chain_rpc_error(&self, _peer: &str, _operation: &str) {}
    fn add_in_flight(&self, _delta: i64) {}
}

/// Process-wide no-op recorder
pub fn noop() -> Arc<dyn Recorder> {
    static NOOP: Lazy<Arc<dyn Recorder>> = Lazy::new(|| Arc::new(NoopRecorder));
    Arc::clone(&NOOP)
}

/// Prometheus-backed recorder with its own registry
pub struct PrometheusRecorder {
    registry: Registry,
    api_latency: HistogramVec,
    api_errors: IntCounterVec,
    account_errors: IntCounterVec,
    chain_rpc_errors: IntCounterVec,
    in_flight: IntGauge,
}

impl PrometheusRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let api_latency = HistogramVec::new(
            HistogramOpts::new("latency_seconds", "Latency of inbound JSON-RPC calls")
                .namespace(NAMESPACE)
                .subsystem("api")
                .buckets(exponential_buckets(0.01, 3.0, 15)?),
            &["method"],
        )?;

        let api_errors = IntCounterVec::new(
            Opts::new("errors_total", "Failed inbound JSON-RPC calls")
                .namespace(NAMESPACE)
                .subsystem("api"),
            &["method", "code"],
        )?;

        let account_errors = IntCounterVec::new(
            Opts::new("errors_total", "Payment account errors")
                .namespace(NAMESPACE)
                .subsystem("account"),
            &["account", "reason"],
        )?;

        let chain_rpc_errors = IntCounterVec::new(
            Opts::new("errors_total", "Failed upstream chain RPC calls")
                .namespace(NAMESPACE)
                .subsystem("chain_rpc"),
            &["peer", "operation"],
        )?;

        let in_flight = IntGauge::with_opts(
            Opts::new("in_flight_requests", "Inbound calls currently admitted")
                .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(api_latency.clone()))?;
        registry.register(Box::new(api_errors.clone()))?;
        registry.register(Box::new(account_errors.clone()))?;
        registry.register(Box::new(chain_rpc_errors.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        Ok(Self {
            registry,
            api_latency,
            api_errors,
            account_errors,
            chain_rpc_errors,
            in_flight,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every registered family
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl Recorder for PrometheusRecorder {
    fn observe_api_latency(&self, method: &str, elapsed: Duration) {
        self.api_latency
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }

    fn inc_api_error(&self, method: &str, code: i64) {
        let code = code.to_string();
        self.api_errors
            .with_label_values(&[method, code.as_str()])
            .inc();
    }

    fn inc_account_error(&self, account: &str, reason: &str) {
        self.account_errors
            .with_label_values(&[account, reason])
            .inc();
    }

    fn inc_chain_rpc_error(&self, peer: &str, operation: &str) {
        self.chain_rpc_errors
            .with_label_values(&[peer, operation])
            .inc();
    }

    fn add_in_flight(&self, delta: i64) {
        self.in_flight.add(delta);
    }
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
