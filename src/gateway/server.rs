use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Uri};
use axum::routing::post;
use axum::{middleware, Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

use super::limiter::{admission, AdmissionLimiter};
use super::{Gateway, BEST_BID_GAS_FEE, PARAMS, REPORT_ISSUE, RUNNING, SEND_BID};
use crate::errors::{
    GatewayError, GENERIC_ERROR_CODE, INVALID_PARAMS_CODE, INVALID_REQUEST_CODE,
    METHOD_NOT_FOUND_CODE, PARSE_ERROR_CODE,
};
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::observability::RequestId;

/// Largest batch served in one request, matching geth's default batch item limit
pub const MAX_BATCH_SIZE: usize = 1_000;

/// JSON-RPC router. Every request on `/` passes the admission limiter first.
pub fn router(gateway: Arc<Gateway>, limiter: AdmissionLimiter) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route_layer(middleware::from_fn_with_state(limiter, admission))
        .with_state(gateway)
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RpcReply {
    Single(JsonRpcResponse),
    Batch(Vec<JsonRpcResponse>),
}

/// The `mev` methods served by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    SendBid,
    BestBidGasFee,
    Params,
    Running,
    ReportIssue,
}

impl Method {
    fn resolve(name: &str) -> Option<Self> {
        match name {
            SEND_BID => Some(Method::SendBid),
            BEST_BID_GAS_FEE => Some(Method::BestBidGasFee),
            PARAMS => Some(Method::Params),
            RUNNING => Some(Method::Running),
            REPORT_ISSUE => Some(Method::ReportIssue),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Method::SendBid => SEND_BID,
            Method::BestBidGasFee => BEST_BID_GAS_FEE,
            Method::Params => PARAMS,
            Method::Running => RUNNING,
            Method::ReportIssue => REPORT_ISSUE,
        }
    }
}

enum CallError {
    InvalidParams(String),
    Encode(String),
    Gateway(GatewayError),
}

async fn handle_rpc(
    State(gateway): State<Arc<Gateway>>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Json<RpcReply> {
    let host = caller_host(&headers, &uri);

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return Json(RpcReply::Single(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR_CODE,
                format!("parse error: {e}"),
                None,
            )))
        }
    };

    match payload {
        Value::Array(calls) if calls.is_empty() => Json(RpcReply::Single(
            JsonRpcResponse::error(Value::Null, INVALID_REQUEST_CODE, "empty batch", None),
        )),
        Value::Array(calls) if calls.len() > MAX_BATCH_SIZE => {
            Json(RpcReply::Single(JsonRpcResponse::error(
                Value::Null,
                INVALID_REQUEST_CODE,
                format!("batch of {} exceeds limit of {MAX_BATCH_SIZE}", calls.len()),
                None,
            )))
        }
        // One admission slot covers the whole request, so entries run one at a time
        Value::Array(calls) => {
            let mut replies = Vec::with_capacity(calls.len());
            for call in calls {
                replies.push(dispatch(&gateway, &host, call).await);
            }
            Json(RpcReply::Batch(replies))
        }
        call => Json(RpcReply::Single(dispatch(&gateway, &host, call).await)),
    }
}

/// Routing key for validator-bound calls: the `Host` header, else the URI authority
fn caller_host(headers: &HeaderMap, uri: &Uri) -> String {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or_default()
        .to_string()
}

async fn dispatch(gateway: &Gateway, host: &str, call: Value) -> JsonRpcResponse {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(call) {
        Ok(request) => request,
        Err(e) => {
            return JsonRpcResponse::error(id, INVALID_REQUEST_CODE, format!("invalid request: {e}"), None)
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return JsonRpcResponse::error(
            request.id,
            INVALID_REQUEST_CODE,
            format!("unsupported jsonrpc version {:?}", request.jsonrpc),
            None,
        );
    }

    // Unknown names are answered before anything is recorded under their label
    let Some(method) = Method::resolve(&request.method) else {
        return JsonRpcResponse::error(
            request.id,
            METHOD_NOT_FOUND_CODE,
            format!("the method {} does not exist/is not available", request.method),
            None,
        );
    };

    let request_id = RequestId::new();
    let span = info_span!("rpc", method = method.name(), request_id = %request_id);

    async move {
        match call_method(gateway, host, method, &request).await {
            Ok(result) => {
                debug!(host, "Call completed");
                JsonRpcResponse::result(request.id, result)
            }
            Err(CallError::Gateway(err)) => {
                JsonRpcResponse::error(request.id, err.code(), err.to_string(), err.data())
            }
            Err(CallError::InvalidParams(message)) => {
                gateway
                    .recorder()
                    .inc_api_error(method.name(), INVALID_PARAMS_CODE);
                JsonRpcResponse::error(request.id, INVALID_PARAMS_CODE, message, None)
            }
            Err(CallError::Encode(message)) => {
                JsonRpcResponse::error(request.id, GENERIC_ERROR_CODE, message, None)
            }
        }
    }
    .instrument(span)
    .await
}

async fn call_method(
    gateway: &Gateway,
    host: &str,
    method: Method,
    request: &JsonRpcRequest,
) -> Result<Value, CallError> {
    let params = request
        .positional_params()
        .ok_or_else(|| CallError::InvalidParams("params must be an array".to_string()))?;

    match method {
        Method::SendBid => {
            let bid = param(&params, 0)?;
            encode(gateway.send_bid(host, bid).await)
        }
        Method::BestBidGasFee => {
            let parent_hash = param(&params, 0)?;
            encode(gateway.best_bid_gas_fee(host, parent_hash).await)
        }
        Method::Params => encode(gateway.params(host).await),
        Method::Running => encode(gateway.running(host).await),
        Method::ReportIssue => {
            let issue = param(&params, 0)?;
            encode(gateway.report_issue(issue).await)
        }
    }
}

fn param<T: DeserializeOwned>(params: &[Value], index: usize) -> Result<T, CallError> {
    let value = params.get(index).cloned().ok_or_else(|| {
        CallError::InvalidParams(format!("missing value for required argument {index}"))
    })?;
    serde_json::from_value(value)
        .map_err(|e| CallError::InvalidParams(format!("invalid argument {index}: {e}")))
}

fn encode<T: Serialize>(result: Result<T, GatewayError>) -> Result<Value, CallError> {
    let value = result.map_err(CallError::Gateway)?;
    serde_json::to_value(value).map_err(|e| CallError::Encode(e.to_string()))
}
