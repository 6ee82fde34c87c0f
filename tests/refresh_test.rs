//! Integration tests for the peer state refresh loop
//!
//! This test validates:
//! - Field-level partial failure handling
//! - Snapshot stability between ticks
//! - The background loop against an HTTP validator

mod common;

use alloy::primitives::U256;
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use mev_sentry::config::{AccountConfig, RefreshConfig, UpstreamConfig, ValidatorConfig};
use mev_sentry::metrics::noop;
use mev_sentry::peer::ValidatorPeer;

#[tokio::test]
async fn test_liveness_failure_does_not_block_balance() {
    let upstream = MockValidator::new(ValidatorState::funded(100, 3));
    let recorder = Arc::new(RecordingRecorder::default());
    let (peer, refresher) = validator_peer(
        "v1",
        upstream.clone(),
        CountingAccount::random(),
        None,
        recorder.clone(),
    );
    refresher.refresh_once().await;
    assert!(peer.mev_running());

    // Liveness fails, balance moves
    {
        let mut state = upstream.state.lock();
        state.running = None;
        state.balance = Some(U256::from(900));
        state.nonce = Some(4);
    }
    refresher.refresh_once().await;

    let snapshot = peer.snapshot();
    assert!(snapshot.running);
    let account = snapshot.account.unwrap();
    assert_eq!(account.balance, U256::from(900));
    assert_eq!(account.nonce, 4);
    assert_eq!(snapshot.generation, 2);
    assert!(snapshot.last_refresh_error.is_some());
    assert_eq!(
        recorder.chain_errors(),
        vec![("v1".to_string(), "mev_running".to_string())]
    );
}

#[tokio::test]
async fn test_recovered_refresh_clears_error() {
    let mut state = ValidatorState::funded(100, 3);
    state.chain_id = None;
    let upstream = MockValidator::new(state);
    let (peer, refresher) = validator_peer("v1", upstream.clone(), CountingAccount::random(), None, noop());

    refresher.refresh_once().await;
    assert!(peer.snapshot().chain_id.is_none());
    assert!(peer.snapshot().last_refresh_error.is_some());

    upstream.state.lock().chain_id = Some(CHAIN_ID);
    refresher.refresh_once().await;
    assert_eq!(peer.snapshot().chain_id, Some(CHAIN_ID));
    assert!(peer.snapshot().last_refresh_error.is_none());
}

#[tokio::test]
async fn test_snapshot_reads_between_ticks_are_identical() {
    let upstream = MockValidator::new(ValidatorState::funded(100, 3));
    let (peer, refresher) = validator_peer("v1", upstream, CountingAccount::random(), None, noop());
    refresher.refresh_once().await;

    let first = peer.snapshot();
    for _ in 0..10 {
        let again = peer.snapshot();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(*first, *again);
    }
}

#[tokio::test]
async fn test_background_refresh_over_http() {
    let mut server = mockito::Server::new_async().await;
    let _running = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "mev_running"})))
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":true}"#)
        .expect_at_least(1)
        .create_async()
        .await;
    let _chain = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "eth_chainId"})))
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x38"}"#)
        .create_async()
        .await;
    let _params = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "mev_params"})))
        .with_body(
            r#"{"jsonrpc":"2.0","id":1,"result":{"ValidatorCommission":100,"BidSimulationLeftOver":50000000,"NoInterruptLeftOver":400000000,"MaxBidsPerBuilder":3,"GasCeil":140000000,"GasPrice":1000000000,"BuilderFeeCeil":100000000000000000,"Version":"v1.1.0"}}"#,
        )
        .create_async()
        .await;
    let _balance = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "eth_getBalance"})))
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0xde0b6b3a7640000"}"#)
        .create_async()
        .await;
    let _nonce = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({"method": "eth_getTransactionCount"})))
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x5"}"#)
        .create_async()
        .await;

    let config = ValidatorConfig {
        url: server.url(),
        hostname: "validator.example".to_string(),
        fee_ceiling: None,
        account: AccountConfig {
            mode: "privateKey".to_string(),
            private_key: Some(
                "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".to_string(),
            ),
            keystore_path: None,
            password_file_path: None,
            address: None,
        },
    };
    let refresh = RefreshConfig {
        interval_ms: 200,
        fetch_timeout_ms: 150,
    };
    let peer = ValidatorPeer::build(&config, &UpstreamConfig::default(), &refresh, noop()).unwrap();

    // The first tick fires right away
    let mut snapshot = peer.snapshot();
    for _ in 0..100 {
        if snapshot.account.is_some() && snapshot.params.is_some() && snapshot.chain_id.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        snapshot = peer.snapshot();
    }

    assert!(snapshot.generation > 0);
    assert!(snapshot.running);
    assert_eq!(snapshot.chain_id, Some(56));
    let account = snapshot.account.unwrap();
    assert_eq!(account.balance, U256::from(1_000_000_000_000_000_000u64));
    assert_eq!(account.nonce, 5);
    assert_eq!(
        peer.bid_fee_ceiling(),
        U256::from(100_000_000_000_000_000u64)
    );
    assert_eq!(peer.mev_params().unwrap().version, "v1.1.0");
}
