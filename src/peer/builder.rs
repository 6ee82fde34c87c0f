use alloy::primitives::Address;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{BuilderConfig, UpstreamConfig};
use crate::errors::{GatewayResult, PeerBuildError};
use crate::metrics::Recorder;
use crate::types::BidIssue;
use crate::upstream::{BuilderClient, JsonRpcHttpClient};

/// Pass-through to one upstream builder
pub struct BuilderPeer {
    address: Address,
    client: Arc<dyn BuilderClient>,
    recorder: Arc<dyn Recorder>,
}

impl BuilderPeer {
    pub fn new(address: Address, client: Arc<dyn BuilderClient>, recorder: Arc<dyn Recorder>) -> Self {
        Self {
            address,
            client,
            recorder,
        }
    }

    pub fn build(
        config: &BuilderConfig,
        upstream: &UpstreamConfig,
        recorder: Arc<dyn Recorder>,
    ) -> Result<Self, PeerBuildError> {
        let address = config
            .address
            .parse::<Address>()
            .map_err(|e| PeerBuildError::InvalidAddress {
                address: config.address.clone(),
                message: e.to_string(),
            })?;
        let client = JsonRpcHttpClient::new(&config.url, upstream)?;

        info!(builder = %address, url = %config.url, "Builder peer ready");

        Ok(Self::new(address, Arc::new(client), recorder))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn report_issue(&self, issue: &BidIssue) -> GatewayResult<()> {
        self.client.report_issue(issue).await.map_err(|err| {
            warn!(
                builder = %self.address,
                bid_hash = %issue.bid_hash,
                error = %err,
                "Failed to report issue to builder"
            );
            self.recorder
                .inc_chain_rpc_error(&self.address.to_string(), "report_issue");
            err.into()
        })
    }
}
