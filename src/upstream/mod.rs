//! Upstream peer clients
//!
//! The proxies talk to validators and builders through the [`ValidatorClient`] and
//! [`BuilderClient`] traits so that the transport can be swapped in tests.
//! [`JsonRpcHttpClient`] is the production implementation over HTTP JSON-RPC.

mod client;
mod errors;

pub use client::JsonRpcHttpClient;
pub use errors::RpcClientError;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::types::{BidArgs, BidIssue, MevParams};

pub type RpcClientResult<T> = Result<T, RpcClientError>;

/// Calls the sentry issues against a validator node
#[async_trait]
pub trait ValidatorClient: Send + Sync {
    /// `mev_sendBid`
    async fn send_bid(&self, bid: &BidArgs) -> RpcClientResult<B256>;

    /// `mev_bestBidGasFee`
    async fn best_bid_gas_fee(&self, parent_hash: B256) -> RpcClientResult<U256>;

    /// `mev_params`
    async fn mev_params(&self) -> RpcClientResult<MevParams>;

    /// `mev_running`
    async fn mev_running(&self) -> RpcClientResult<bool>;

    /// `eth_chainId`
    async fn chain_id(&self) -> RpcClientResult<u64>;

    /// `eth_getBalance` at the latest block
    async fn balance(&self, account: Address) -> RpcClientResult<U256>;

    /// `eth_getTransactionCount` at the pending block
    async fn pending_nonce(&self, account: Address) -> RpcClientResult<u64>;
}

/// Calls the sentry issues against a builder
#[async_trait]
pub trait BuilderClient: Send + Sync {
    /// `mev_reportIssue`
    async fn report_issue(&self, issue: &BidIssue) -> RpcClientResult<()>;
}
