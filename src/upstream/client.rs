use alloy::primitives::{Address, B256, U256, U64};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

use super::{BuilderClient, RpcClientError, RpcClientResult, ValidatorClient};
use crate::config::UpstreamConfig;
use crate::errors::PeerBuildError;
use crate::jsonrpc::{JsonRpcErrorObject, JsonRpcRequest};
use crate::types::{BidArgs, BidIssue, MevParams};

/// Upstream reply with `result` kept as source text, so quantities wider than `u64` are
/// decoded exactly by the target type
#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    result: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

/// HTTP JSON-RPC client for one upstream peer
#[derive(Debug)]
pub struct JsonRpcHttpClient {
    endpoint: Url,
    http: Client,
    next_id: AtomicU64,
}

impl JsonRpcHttpClient {
    /// Parses `url` and builds a pooled HTTP client tuned by `config`
    pub fn new(url: &str, config: &UpstreamConfig) -> Result<Self, PeerBuildError> {
        let endpoint = Url::parse(url).map_err(|e| PeerBuildError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(PeerBuildError::InvalidUrl {
                url: url.to_string(),
                message: format!("unsupported scheme {}", endpoint.scheme()),
            });
        }

        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .tcp_keepalive(Duration::from_secs(config.tcp_keepalive_secs))
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| PeerBuildError::Client(e.to_string()))?;

        Ok(Self {
            endpoint,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    /// Issues one JSON-RPC call and decodes its `result`
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> RpcClientResult<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let endpoint = self.endpoint.as_str();

        trace!(endpoint, method, id, "Upstream JSON-RPC call");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcClientError::from_reqwest(e, endpoint))?
            .error_for_status()
            .map_err(|e| RpcClientError::from_reqwest(e, endpoint))?;

        let body: RawResponse = response
            .json()
            .await
            .map_err(|e| RpcClientError::from_reqwest(e, endpoint))?;

        if let Some(error) = body.error {
            return Err(RpcClientError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        let result = body.result.as_deref().map_or("null", RawValue::get);
        serde_json::from_str(result).map_err(|e| {
            RpcClientError::Decode {
                endpoint: endpoint.to_string(),
                message: format!("{method}: {e}"),
            }
        })
    }
}

#[async_trait]
impl ValidatorClient for JsonRpcHttpClient {
    async fn send_bid(&self, bid: &BidArgs) -> RpcClientResult<B256> {
        self.call("mev_sendBid", json!([bid])).await
    }

    async fn best_bid_gas_fee(&self, parent_hash: B256) -> RpcClientResult<U256> {
        self.call("mev_bestBidGasFee", json!([parent_hash])).await
    }

    async fn mev_params(&self) -> RpcClientResult<MevParams> {
        self.call("mev_params", json!([])).await
    }

    async fn mev_running(&self) -> RpcClientResult<bool> {
        self.call("mev_running", json!([])).await
    }

    async fn chain_id(&self) -> RpcClientResult<u64> {
        let id: U64 = self.call("eth_chainId", json!([])).await?;
        Ok(id.to::<u64>())
    }

    async fn balance(&self, account: Address) -> RpcClientResult<U256> {
        self.call("eth_getBalance", json!([account, "latest"])).await
    }

    async fn pending_nonce(&self, account: Address) -> RpcClientResult<u64> {
        let nonce: U64 = self
            .call("eth_getTransactionCount", json!([account, "pending"]))
            .await?;
        Ok(nonce.to::<u64>())
    }
}

#[async_trait]
impl BuilderClient for JsonRpcHttpClient {
    async fn report_issue(&self, issue: &BidIssue) -> RpcClientResult<()> {
        self.call("mev_reportIssue", json!([issue])).await
    }
}
