//! Shared mocks for the integration tests

#![allow(dead_code)]

use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, B256, U256, U64};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use mev_sentry::account::{Account, AccountError, PrivateKeyAccount};
use mev_sentry::metrics::Recorder;
use mev_sentry::peer::{PeerStateCache, Refresher, ValidatorPeer};
use mev_sentry::types::{BidArgs, BidIssue, MevParams, RawBid};
use mev_sentry::upstream::{BuilderClient, RpcClientError, RpcClientResult, ValidatorClient};

pub const CHAIN_ID: u64 = 56;

/// Upstream validator state; `None` makes the matching call fail
#[derive(Debug, Clone)]
pub struct ValidatorState {
    pub running: Option<bool>,
    pub chain_id: Option<u64>,
    pub params: Option<MevParams>,
    pub balance: Option<U256>,
    pub nonce: Option<u64>,
    pub best_bid_gas_fee: U256,
    pub send_error: Option<RpcClientError>,
}

impl ValidatorState {
    pub fn funded(balance: u64, nonce: u64) -> Self {
        Self {
            running: Some(true),
            chain_id: Some(CHAIN_ID),
            params: Some(MevParams {
                builder_fee_ceil: U256::from(1_000_000u64),
                version: "v1.0.0".to_string(),
                ..Default::default()
            }),
            balance: Some(U256::from(balance)),
            nonce: Some(nonce),
            best_bid_gas_fee: U256::from(7),
            send_error: None,
        }
    }
}

pub fn transport_error() -> RpcClientError {
    RpcClientError::Transport {
        endpoint: "http://mock-validator".to_string(),
        message: "connection refused".to_string(),
    }
}

pub struct MockValidator {
    pub state: Mutex<ValidatorState>,
    pub sent: Mutex<Vec<BidArgs>>,
    /// When set, `mev_bestBidGasFee` and `mev_sendBid` wait for a permit
    pub gate: Mutex<Option<Arc<Semaphore>>>,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl MockValidator {
    pub fn new(state: ValidatorState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            sent: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn set_gate(&self, gate: Arc<Semaphore>) {
        *self.gate.lock() = Some(gate);
    }

    pub fn sent_bids(&self) -> Vec<BidArgs> {
        self.sent.lock().clone()
    }

    async fn pass_gate(&self) {
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ValidatorClient for MockValidator {
    async fn send_bid(&self, bid: &BidArgs) -> RpcClientResult<B256> {
        self.pass_gate().await;
        let error = self.state.lock().send_error.clone();
        if let Some(error) = error {
            return Err(error);
        }
        self.sent.lock().push(bid.clone());
        Ok(bid.raw_bid.hash())
    }

    async fn best_bid_gas_fee(&self, _parent_hash: B256) -> RpcClientResult<U256> {
        self.pass_gate().await;
        Ok(self.state.lock().best_bid_gas_fee)
    }

    async fn mev_params(&self) -> RpcClientResult<MevParams> {
        self.state.lock().params.clone().ok_or_else(transport_error)
    }

    async fn mev_running(&self) -> RpcClientResult<bool> {
        self.state.lock().running.ok_or_else(transport_error)
    }

    async fn chain_id(&self) -> RpcClientResult<u64> {
        self.state.lock().chain_id.ok_or_else(transport_error)
    }

    async fn balance(&self, _account: Address) -> RpcClientResult<U256> {
        self.state.lock().balance.ok_or_else(transport_error)
    }

    async fn pending_nonce(&self, _account: Address) -> RpcClientResult<u64> {
        self.state.lock().nonce.ok_or_else(transport_error)
    }
}

#[derive(Default)]
pub struct MockBuilder {
    pub issues: Mutex<Vec<BidIssue>>,
}

#[async_trait]
impl BuilderClient for MockBuilder {
    async fn report_issue(&self, issue: &BidIssue) -> RpcClientResult<()> {
        self.issues.lock().push(issue.clone());
        Ok(())
    }
}

/// Account that counts signing calls
pub struct CountingAccount {
    inner: PrivateKeyAccount,
    address: Address,
    pub signed: AtomicUsize,
}

impl CountingAccount {
    pub fn random() -> Arc<Self> {
        let signer = PrivateKeySigner::random();
        Arc::new(Self {
            address: signer.address(),
            inner: PrivateKeyAccount::from_signer(signer),
            signed: AtomicUsize::new(0),
        })
    }

    pub fn sign_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }
}

impl Account for CountingAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_transaction(&self, tx: TxLegacy, chain_id: u64) -> Result<Bytes, AccountError> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_transaction(tx, chain_id)
    }
}

/// Recorder keeping every emitted sample in memory
#[derive(Default)]
pub struct RecordingRecorder {
    pub latencies: Mutex<Vec<String>>,
    pub api_errors: Mutex<Vec<(String, i64)>>,
    pub account_errors: Mutex<Vec<(String, String)>>,
    pub chain_errors: Mutex<Vec<(String, String)>>,
}

impl RecordingRecorder {
    pub fn api_errors(&self) -> Vec<(String, i64)> {
        self.api_errors.lock().clone()
    }

    pub fn account_errors(&self) -> Vec<(String, String)> {
        self.account_errors.lock().clone()
    }

    pub fn chain_errors(&self) -> Vec<(String, String)> {
        self.chain_errors.lock().clone()
    }
}

impl Recorder for RecordingRecorder {
    fn observe_api_latency(&self, method: &str, _elapsed: Duration) {
        self.latencies.lock().push(method.to_string());
    }

    fn inc_api_error(&self, method: &str, code: i64) {
        self.api_errors.lock().push((method.to_string(), code));
    }

    fn inc_account_error(&self, account: &str, reason: &str) {
        self.account_errors
            .lock()
            .push((account.to_string(), reason.to_string()));
    }

    fn inc_chain_rpc_error(&self, peer: &str, operation: &str) {
        self.chain_errors
            .lock()
            .push((peer.to_string(), operation.to_string()));
    }

    fn add_in_flight(&self, _delta: i64) {}
}

/// Validator peer over mocks, with its refresher returned for manual ticks
pub fn validator_peer(
    hostname: &str,
    client: Arc<MockValidator>,
    account: Arc<CountingAccount>,
    fee_ceiling: Option<U256>,
    recorder: Arc<dyn Recorder>,
) -> (ValidatorPeer, Refresher) {
    let (cache, refresher) = PeerStateCache::new(
        hostname,
        client.clone(),
        account.address(),
        Duration::from_millis(200),
        Arc::clone(&recorder),
    );
    let peer = ValidatorPeer::new(hostname, client, account, cache, fee_ceiling, recorder);
    (peer, refresher)
}

pub fn raw_bid(builder_fee: Option<u64>) -> RawBid {
    RawBid {
        block_number: U64::from(1_000),
        parent_hash: B256::repeat_byte(0x42),
        txs: vec![Bytes::from(vec![0x02, 0xf8, 0x01])],
        un_revertible: Vec::new(),
        gas_used: U64::from(21_000),
        gas_fee: U256::from(5_000_000u64),
        builder_fee: builder_fee.map(U256::from),
    }
}

/// Bid signed by `builder`
pub fn signed_bid(builder: &PrivateKeySigner, builder_fee: Option<u64>) -> BidArgs {
    let raw_bid = raw_bid(builder_fee);
    let signature = builder
        .sign_hash_sync(&raw_bid.hash())
        .expect("signing a bid hash");
    BidArgs {
        raw_bid,
        signature: Bytes::from(signature.as_bytes().to_vec()),
        pay_bid_tx: Bytes::new(),
        pay_bid_tx_gas_used: U64::ZERO,
    }
}
