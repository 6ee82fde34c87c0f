//! Dispatch layer
//!
//! Resolves every inbound call to a configured peer, applies the per-call deadline
//! and records latency and error metrics before handing the call to the peer.

mod limiter;
mod server;

pub use limiter::{admission, Admission, AdmissionLimiter};
pub use server::router;

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{GatewayError, GatewayResult, PeerKind};
use crate::metrics::{Recorder, Timer};
use crate::peer::{BuilderPeer, ValidatorPeer, PAY_BID_TX_GAS_LIMIT};
use crate::types::{BidArgs, BidIssue, MevParams};

pub const SEND_BID: &str = "mev_sendBid";
pub const BEST_BID_GAS_FEE: &str = "mev_bestBidGasFee";
pub const PARAMS: &str = "mev_params";
pub const RUNNING: &str = "mev_running";
pub const REPORT_ISSUE: &str = "mev_reportIssue";

/// Routing tables plus the per-call policy applied to every method
pub struct Gateway {
    validators: HashMap<String, Arc<ValidatorPeer>>,
    builders: HashMap<Address, Arc<BuilderPeer>>,
    timeout: Option<Duration>,
    recorder: Arc<dyn Recorder>,
}

impl Gateway {
    pub fn new(
        validators: Vec<ValidatorPeer>,
        builders: Vec<BuilderPeer>,
        timeout: Option<Duration>,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        let validators = validators
            .into_iter()
            .map(|peer| (peer.hostname().to_string(), Arc::new(peer)))
            .collect();
        let builders = builders
            .into_iter()
            .map(|peer| (peer.address(), Arc::new(peer)))
            .collect();

        Self {
            validators,
            builders,
            timeout,
            recorder,
        }
    }

    pub fn recorder(&self) -> &Arc<dyn Recorder> {
        &self.recorder
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    pub fn builder_count(&self) -> usize {
        self.builders.len()
    }

    /// Validator routed to by a `Host` value, port and case ignored
    pub fn validator(&self, host: &str) -> GatewayResult<Arc<ValidatorPeer>> {
        let hostname = strip_port(host).to_ascii_lowercase();
        self.validators
            .get(&hostname)
            .cloned()
            .ok_or_else(move || GatewayError::PeerNotFound {
                kind: PeerKind::Validator,
                key: hostname,
            })
    }

    pub fn builder(&self, address: Address) -> GatewayResult<Arc<BuilderPeer>> {
        self.builders
            .get(&address)
            .cloned()
            .ok_or_else(|| GatewayError::PeerNotFound {
                kind: PeerKind::Builder,
                key: address.to_string(),
            })
    }

    /// Validates a bid, attaches the payment transaction and forwards it
    pub async fn send_bid(&self, host: &str, bid: BidArgs) -> GatewayResult<B256> {
        self.instrument(SEND_BID, async move {
            let peer = self.validator(host)?;
            let payment = prepare_payment(&peer, &bid)?;

            let mut bid = bid;
            bid.pay_bid_tx = payment;
            bid.pay_bid_tx_gas_used = U64::from(PAY_BID_TX_GAS_LIMIT);

            peer.send_bid(&bid).await
        })
        .await
    }

    pub async fn best_bid_gas_fee(&self, host: &str, parent_hash: B256) -> GatewayResult<U256> {
        self.instrument(BEST_BID_GAS_FEE, async move {
            self.validator(host)?.best_bid_gas_fee(parent_hash).await
        })
        .await
    }

    pub async fn params(&self, host: &str) -> GatewayResult<MevParams> {
        self.instrument(PARAMS, async move { self.validator(host)?.mev_params() })
            .await
    }

    pub async fn running(&self, host: &str) -> GatewayResult<bool> {
        self.instrument(RUNNING, async move { Ok(self.validator(host)?.mev_running()) })
            .await
    }

    /// Routed by the issue's builder, not by the caller
    pub async fn report_issue(&self, issue: BidIssue) -> GatewayResult<()> {
        self.instrument(REPORT_ISSUE, async move {
            self.builder(issue.builder)?.report_issue(&issue).await
        })
        .await
    }

    /// Applies the deadline and records the outcome of one call
    async fn instrument<T, F>(&self, method: &'static str, fut: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        let timer = Timer::start();

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout {
                    method: method.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
            None => fut.await,
        };

        self.recorder.observe_api_latency(method, timer.elapsed());
        if let Err(err) = &result {
            self.recorder.inc_api_error(method, err.code());
            debug!(method, code = err.code(), error = %err, "Call failed");
        }

        result
    }
}

/// Checks the bid against the peer's economics and signs the payment
fn prepare_payment(peer: &ValidatorPeer, bid: &BidArgs) -> GatewayResult<Bytes> {
    let builder = bid.recover_builder().map_err(|reason| {
        warn!(hostname = peer.hostname(), error = %reason, "Rejected bid with bad signature");
        GatewayError::InvalidSignature(reason)
    })?;

    let fee = bid.builder_fee();
    let ceiling = peer.bid_fee_ceiling();
    if fee > ceiling {
        warn!(
            hostname = peer.hostname(),
            builder = %builder,
            fee = %fee,
            ceiling = %ceiling,
            "Rejected bid above fee ceiling"
        );
        return Err(GatewayError::FeeCeilingExceeded { fee, ceiling });
    }

    peer.generate_payment_tx(builder, bid.raw_bid.builder_fee)
}

/// Drops a trailing `:port` from a host value. Bracketed IPv6 literals lose their
/// brackets; bare IPv6 addresses are returned untouched.
pub fn strip_port(host: &str) -> &str {
    let host = host.trim();

    if let Some(rest) = host.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((addr, _)) => addr,
            None => host,
        };
    }

    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}
