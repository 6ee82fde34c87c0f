//! Gateway error taxonomy and its JSON-RPC error surface.

use alloy::primitives::U256;
use std::fmt;
use thiserror::Error;

use crate::account::AccountError;
use crate::upstream::RpcClientError;

/// Bid rejected for validation reasons (routing, signature, fee ceiling).
pub const INVALID_BID_CODE: i64 = -38001;

/// The gateway itself failed to prepare the bid (payment transaction).
pub const GATEWAY_ERROR_CODE: i64 = -38006;

/// Deadline elapsed, the outcome upstream is unknown.
pub const TIMEOUT_CODE: i64 = -38007;

/// Server error without a more specific classification.
pub const GENERIC_ERROR_CODE: i64 = -32000;

pub const PARSE_ERROR_CODE: i64 = -32700;
pub const INVALID_REQUEST_CODE: i64 = -32600;
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;
pub const INVALID_PARAMS_CODE: i64 = -32602;

/// Which routing table a lookup was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerKind {
    Validator,
    Builder,
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerKind::Validator => write!(f, "validator"),
            PeerKind::Builder => write!(f, "builder"),
        }
    }
}

/// Errors surfaced by the dispatch layer and the peer proxies
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No peer is configured for the routing key
    #[error("{kind} not found: {key}")]
    PeerNotFound { kind: PeerKind, key: String },

    /// Builder address could not be recovered from the bid signature
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("builder fee {fee} exceeds fee ceiling {ceiling}")]
    FeeCeilingExceeded { fee: U256, ceiling: U256 },

    #[error("insufficient balance: balance {balance}, required {amount}")]
    InsufficientBalance { balance: U256, amount: U256 },

    /// The refresh loop has not fetched this field yet
    #[error("peer state unavailable: {field} not fetched yet")]
    PeerStateUnavailable { field: &'static str },

    #[error("failed to sign payment transaction: {0}")]
    Signing(String),

    /// Upstream validator timed out while receiving a bid
    #[error("timeout when send bid to validator")]
    SendTimeout,

    /// Per-call deadline elapsed
    #[error("{method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error(transparent)]
    Upstream(#[from] RpcClientError),
}

impl GatewayError {
    /// JSON-RPC error code reported to the caller
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::PeerNotFound {
                kind: PeerKind::Validator,
                ..
            } => INVALID_BID_CODE,
            GatewayError::PeerNotFound {
                kind: PeerKind::Builder,
                ..
            } => GENERIC_ERROR_CODE,
            GatewayError::InvalidSignature(_) => INVALID_BID_CODE,
            GatewayError::FeeCeilingExceeded { .. } => INVALID_BID_CODE,

            GatewayError::InsufficientBalance { .. } => GATEWAY_ERROR_CODE,
            GatewayError::PeerStateUnavailable { .. } => GATEWAY_ERROR_CODE,
            GatewayError::Signing(_) => GATEWAY_ERROR_CODE,

            GatewayError::SendTimeout => TIMEOUT_CODE,
            GatewayError::Timeout { .. } => TIMEOUT_CODE,

            GatewayError::Upstream(err) => match err {
                RpcClientError::Rpc { code, .. } => *code,
                RpcClientError::Timeout { .. } => TIMEOUT_CODE,
                _ => GENERIC_ERROR_CODE,
            },
        }
    }

    /// Economic or validation rejection, the caller should not resend as-is
    pub fn is_invalid_bid(&self) -> bool {
        self.code() == INVALID_BID_CODE
    }

    /// Outcome unknown, the bid may or may not have landed upstream
    pub fn is_timeout(&self) -> bool {
        match self {
            GatewayError::SendTimeout | GatewayError::Timeout { .. } => true,
            GatewayError::Upstream(err) => err.is_timeout(),
            _ => false,
        }
    }

    /// Payment transaction generation failures are reported under one code
    pub fn is_payment_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::InsufficientBalance { .. }
                | GatewayError::PeerStateUnavailable { .. }
                | GatewayError::Signing(_)
        )
    }

    /// Optional `data` member of the JSON-RPC error object
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            GatewayError::Upstream(RpcClientError::Rpc { data, .. }) => data.clone(),
            _ => None,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure to construct a peer from its static configuration
#[derive(Debug, Clone, Error)]
pub enum PeerBuildError {
    #[error("invalid upstream url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("invalid builder address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("failed to build http client: {0}")]
    Client(String),

    #[error(transparent)]
    Account(#[from] AccountError),
}

impl PeerBuildError {
    /// A validator whose signer cannot be unlocked stops the process; every other
    /// failure only removes that peer from the routing table
    pub fn is_fatal(&self) -> bool {
        matches!(self, PeerBuildError::Account(AccountError::UnlockFailure(_)))
    }
}
