use thiserror::Error;

/// Failures of a JSON-RPC call to an upstream validator or builder
#[derive(Debug, Clone, Error)]
pub enum RpcClientError {
    /// Network-level failure (connect, TLS, broken stream, non-2xx status)
    #[error("transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// HTTP client deadline elapsed
    #[error("request timed out (endpoint: {endpoint})")]
    Timeout { endpoint: String },

    /// The upstream answered with a JSON-RPC error object
    #[error("{message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Response body was not the expected JSON-RPC shape
    #[error("invalid response: {message} (endpoint: {endpoint})")]
    Decode { endpoint: String, message: String },
}

impl RpcClientError {
    /// Classify a reqwest failure for `endpoint`
    pub fn from_reqwest(err: reqwest::Error, endpoint: &str) -> Self {
        if err.is_timeout() {
            RpcClientError::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else if err.is_decode() {
            RpcClientError::Decode {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        } else {
            RpcClientError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// Timeouts on either side of the connection; upstream nodes report their own
    /// deadline expiry as error messages mentioning "timeout"
    pub fn is_timeout(&self) -> bool {
        match self {
            RpcClientError::Timeout { .. } => true,
            RpcClientError::Rpc { message, .. } => message.to_lowercase().contains("timeout"),
            _ => false,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RpcClientError::Transport { .. } => "transport",
            RpcClientError::Timeout { .. } => "timeout",
            RpcClientError::Rpc { .. } => "rpc",
            RpcClientError::Decode { .. } => "decode",
        }
    }
}
