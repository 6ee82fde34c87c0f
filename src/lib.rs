//! mev-sentry: routing gateway between MEV builders and validators
//!
//! Inbound `mev_*` JSON-RPC calls are admitted through a bounded limiter, routed to a
//! configured validator by `Host` (or to a builder by address), checked against the
//! validator's bid economics, and forwarded with a payment transaction signed from the
//! validator's account.

pub mod account;
pub mod config;
pub mod endpoints;
pub mod errors;
pub mod gateway;
pub mod jsonrpc;
pub mod metrics;
pub mod observability;
pub mod peer;
pub mod types;
pub mod upstream;

pub use config::Config;
pub use errors::{GatewayError, GatewayResult, PeerBuildError};
pub use gateway::{AdmissionLimiter, Gateway};
pub use metrics::{NoopRecorder, PrometheusRecorder, Recorder};
pub use peer::{BuilderPeer, ValidatorPeer};
