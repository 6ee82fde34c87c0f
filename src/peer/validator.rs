use alloy::primitives::{Address, Bytes, B256, U256};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::payment::PaymentTxGenerator;
use super::snapshot::{PeerSnapshot, PeerStateCache};
use crate::account::{new_account, Account};
use crate::config::{RefreshConfig, UpstreamConfig, ValidatorConfig};
use crate::errors::{GatewayError, GatewayResult, PeerBuildError};
use crate::metrics::Recorder;
use crate::types::{BidArgs, MevParams};
use crate::upstream::{JsonRpcHttpClient, RpcClientError, ValidatorClient};

/// Facade over one upstream validator
pub struct ValidatorPeer {
    hostname: String,
    client: Arc<dyn ValidatorClient>,
    cache: PeerStateCache,
    fee_ceiling: Option<U256>,
    generator: PaymentTxGenerator,
    recorder: Arc<dyn Recorder>,
}

impl ValidatorPeer {
    /// Assembles a peer from parts. `cache` should be fed by a refresher over the same
    /// `client` and `account`.
    pub fn new(
        hostname: impl Into<String>,
        client: Arc<dyn ValidatorClient>,
        account: Arc<dyn Account>,
        cache: PeerStateCache,
        fee_ceiling: Option<U256>,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        let generator = PaymentTxGenerator::new(account, cache.handle(), Arc::clone(&recorder));
        Self {
            hostname: hostname.into().to_ascii_lowercase(),
            client,
            cache,
            fee_ceiling,
            generator,
            recorder,
        }
    }

    /// Builds the peer described by `config` and starts its refresh loop.
    ///
    /// The account is unlocked before the upstream URL is checked so that a keystore
    /// problem is always reported.
    pub fn build(
        config: &ValidatorConfig,
        upstream: &UpstreamConfig,
        refresh: &RefreshConfig,
        recorder: Arc<dyn Recorder>,
    ) -> Result<Self, PeerBuildError> {
        let hostname = config.hostname.to_ascii_lowercase();
        let account = new_account(&config.account)?;
        let client: Arc<dyn ValidatorClient> =
            Arc::new(JsonRpcHttpClient::new(&config.url, upstream)?);

        let (mut cache, refresher) = PeerStateCache::new(
            hostname.clone(),
            Arc::clone(&client),
            account.address(),
            refresh.fetch_timeout(),
            Arc::clone(&recorder),
        );
        cache.start(refresher, refresh.interval());

        info!(
            hostname = %hostname,
            url = %config.url,
            account = %account.address(),
            "Validator peer ready"
        );

        Ok(Self::new(
            hostname,
            client,
            account,
            cache,
            config.fee_ceiling,
            recorder,
        ))
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn account(&self) -> Address {
        self.generator.account()
    }

    pub fn snapshot(&self) -> Arc<PeerSnapshot> {
        self.cache.snapshot()
    }

    /// Forwards a bid whose payment transaction is already attached
    pub async fn send_bid(&self, bid: &BidArgs) -> GatewayResult<B256> {
        self.client.send_bid(bid).await.map_err(|err| {
            self.upstream_failure("send_bid", &err);
            if err.is_timeout() {
                GatewayError::SendTimeout
            } else {
                GatewayError::Upstream(err)
            }
        })
    }

    pub async fn best_bid_gas_fee(&self, parent_hash: B256) -> GatewayResult<U256> {
        self.client
            .best_bid_gas_fee(parent_hash)
            .await
            .map_err(|err| {
                self.upstream_failure("best_bid_gas_fee", &err);
                GatewayError::Upstream(err)
            })
    }

    /// Auction parameters from the last successful refresh
    pub fn mev_params(&self) -> GatewayResult<MevParams> {
        self.cache
            .snapshot()
            .params
            .clone()
            .ok_or(GatewayError::PeerStateUnavailable { field: "params" })
    }

    pub fn mev_running(&self) -> bool {
        self.cache.snapshot().running
    }

    /// Highest builder fee this validator accepts
    pub fn bid_fee_ceiling(&self) -> U256 {
        if let Some(ceiling) = self.fee_ceiling {
            return ceiling;
        }

        match &self.cache.snapshot().params {
            Some(params) => params.builder_fee_ceil,
            None => {
                error!(
                    hostname = %self.hostname,
                    "Builder fee ceiling unknown, auction params not fetched yet"
                );
                U256::ZERO
            }
        }
    }

    pub fn generate_payment_tx(&self, recipient: Address, fee: Option<U256>) -> GatewayResult<Bytes> {
        self.generator.generate(recipient, fee)
    }

    fn upstream_failure(&self, operation: &str, err: &RpcClientError) {
        warn!(
            hostname = %self.hostname,
            operation,
            kind = err.kind(),
            error = %err,
            "Validator call failed"
        );
        self.recorder.inc_chain_rpc_error(&self.hostname, operation);
    }
}
