//! Per-validator view of upstream chain state
//!
//! A background task polls the validator and publishes an immutable [`PeerSnapshot`]
//! with a single pointer swap. Request handlers only ever read the latest snapshot,
//! so they never wait on the network.

use alloy::primitives::{Address, U256};
use arc_swap::ArcSwap;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::metrics::Recorder;
use crate::types::MevParams;
use crate::upstream::{RpcClientError, RpcClientResult, ValidatorClient};

/// Balance and pending nonce of the payment account, always fetched together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    pub balance: U256,
    pub nonce: u64,
}

/// Latest known state of one validator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub running: bool,
    pub chain_id: Option<u64>,
    pub params: Option<MevParams>,
    pub account: Option<AccountState>,
    pub last_refresh_error: Option<String>,
    /// Completed refresh ticks
    pub generation: u64,
}

/// Where the refresh loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RefreshPhase {
    Idle = 0,
    Fetching = 1,
    Updated = 2,
}

impl RefreshPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RefreshPhase::Fetching,
            2 => RefreshPhase::Updated,
            _ => RefreshPhase::Idle,
        }
    }
}

/// Cheap cloneable read handle on a cache
#[derive(Clone)]
pub struct SnapshotHandle {
    state: Arc<ArcSwap<PeerSnapshot>>,
}

impl SnapshotHandle {
    pub fn load(&self) -> Arc<PeerSnapshot> {
        self.state.load_full()
    }
}

/// Owner of a validator's snapshot and of the task refreshing it
///
/// Dropping the cache aborts the refresh task.
pub struct PeerStateCache {
    handle: SnapshotHandle,
    phase: Arc<AtomicU8>,
    task: Option<JoinHandle<()>>,
}

impl PeerStateCache {
    /// Creates an empty cache together with the refresher that writes to it.
    /// Nothing runs until [`PeerStateCache::start`] is called or the refresher is
    /// driven by hand.
    pub fn new(
        hostname: impl Into<String>,
        client: Arc<dyn ValidatorClient>,
        account: Address,
        fetch_timeout: Duration,
        recorder: Arc<dyn Recorder>,
    ) -> (Self, Refresher) {
        let cache = Self::from_snapshot(PeerSnapshot::default());
        let refresher = Refresher {
            hostname: hostname.into(),
            client,
            account,
            fetch_timeout,
            state: Arc::clone(&cache.handle.state),
            phase: Arc::clone(&cache.phase),
            recorder,
        };
        (cache, refresher)
    }

    /// Cache pinned to a fixed snapshot, with no refresher attached
    pub fn from_snapshot(snapshot: PeerSnapshot) -> Self {
        Self {
            handle: SnapshotHandle {
                state: Arc::new(ArcSwap::from_pointee(snapshot)),
            },
            phase: Arc::new(AtomicU8::new(RefreshPhase::Idle as u8)),
            task: None,
        }
    }

    /// Spawns the refresh loop. The first tick fires immediately.
    pub fn start(&mut self, refresher: Refresher, interval: Duration) {
        if let Some(previous) = self.task.take() {
            previous.abort();
        }

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                refresher.refresh_once().await;
                refresher.set_phase(RefreshPhase::Idle);
            }
        }));
    }

    pub fn snapshot(&self) -> Arc<PeerSnapshot> {
        self.handle.load()
    }

    pub fn handle(&self) -> SnapshotHandle {
        self.handle.clone()
    }

    pub fn phase(&self) -> RefreshPhase {
        RefreshPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_refreshing(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PeerStateCache {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// The only writer of a cache's snapshot
pub struct Refresher {
    hostname: String,
    client: Arc<dyn ValidatorClient>,
    account: Address,
    fetch_timeout: Duration,
    state: Arc<ArcSwap<PeerSnapshot>>,
    phase: Arc<AtomicU8>,
    recorder: Arc<dyn Recorder>,
}

impl Refresher {
    /// Runs one refresh tick and publishes the resulting snapshot.
    ///
    /// Every field is fetched concurrently and applied on its own; a failed fetch
    /// keeps the previous value of that field.
    pub async fn refresh_once(&self) -> Arc<PeerSnapshot> {
        self.set_phase(RefreshPhase::Fetching);

        let account = self.account;
        let (running, chain_id, params, account_state) = tokio::join!(
            self.fetch("mev_running", self.client.mev_running()),
            self.fetch("chain_id", self.client.chain_id()),
            self.fetch("mev_params", self.client.mev_params()),
            self.fetch("account", async {
                let (balance, nonce) = tokio::try_join!(
                    self.client.balance(account),
                    self.client.pending_nonce(account)
                )?;
                Ok::<_, RpcClientError>(AccountState { balance, nonce })
            }),
        );

        let current = self.state.load_full();
        let mut next = PeerSnapshot::clone(&current);
        let mut errors = Vec::new();

        match running {
            Ok(running) => next.running = running,
            Err(err) => errors.push(err),
        }
        match chain_id {
            Ok(chain_id) => next.chain_id = Some(chain_id),
            Err(err) => errors.push(err),
        }
        match params {
            Ok(params) => next.params = Some(params),
            Err(err) => errors.push(err),
        }
        match account_state {
            Ok(state) => next.account = Some(state),
            Err(err) => errors.push(err),
        }

        next.last_refresh_error = (!errors.is_empty()).then(|| errors.join("; "));
        next.generation = current.generation.wrapping_add(1);

        let next = Arc::new(next);
        self.state.store(Arc::clone(&next));
        self.set_phase(RefreshPhase::Updated);

        debug!(
            hostname = %self.hostname,
            generation = next.generation,
            running = next.running,
            failed = errors.len(),
            "Peer state refreshed"
        );

        next
    }

    async fn fetch<T, F>(&self, operation: &'static str, fut: F) -> Result<T, String>
    where
        F: Future<Output = RpcClientResult<T>>,
    {
        let outcome = match tokio::time::timeout(self.fetch_timeout, fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("timed out after {}ms", self.fetch_timeout.as_millis()),
        };

        warn!(
            hostname = %self.hostname,
            operation,
            error = %outcome,
            "Failed to refresh peer state"
        );
        self.recorder.inc_chain_rpc_error(&self.hostname, operation);

        Err(format!("{operation}: {outcome}"))
    }

    fn set_phase(&self, phase: RefreshPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}
