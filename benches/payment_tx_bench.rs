//! Benchmarks for the bid request path
//!
//! Benchmarks:
//! - Payment transaction generation from a cached snapshot
//! - Builder recovery from a bid signature

use alloy::primitives::{Address, Bytes, B256, U256, U64};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use mev_sentry::account::PrivateKeyAccount;
use mev_sentry::metrics::noop;
use mev_sentry::peer::{AccountState, PaymentTxGenerator, PeerSnapshot, PeerStateCache};
use mev_sentry::types::{BidArgs, RawBid};

fn funded_cache() -> PeerStateCache {
    PeerStateCache::from_snapshot(PeerSnapshot {
        running: true,
        chain_id: Some(56),
        account: Some(AccountState {
            balance: U256::from(10u64).pow(U256::from(18)),
            nonce: 42,
        }),
        ..Default::default()
    })
}

fn bench_generate(c: &mut Criterion) {
    let cache = funded_cache();
    let account = Arc::new(PrivateKeyAccount::from_signer(PrivateKeySigner::random()));
    let generator = PaymentTxGenerator::new(account, cache.handle(), noop());
    let recipient = Address::repeat_byte(0xbb);

    let mut group = c.benchmark_group("payment_tx");
    for fee in [0u64, 1_000_000_000] {
        group.bench_with_input(BenchmarkId::new("generate", fee), &fee, |b, &fee| {
            b.iter(|| {
                generator
                    .generate(black_box(recipient), black_box(Some(U256::from(fee))))
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_recover_builder(c: &mut Criterion) {
    let signer = PrivateKeySigner::random();
    let raw_bid = RawBid {
        block_number: U64::from(1_000),
        parent_hash: B256::repeat_byte(0x42),
        txs: vec![Bytes::from(vec![0u8; 256]); 8],
        un_revertible: Vec::new(),
        gas_used: U64::from(1_000_000),
        gas_fee: U256::from(5_000_000u64),
        builder_fee: Some(U256::from(100u64)),
    };
    let signature = signer.sign_hash_sync(&raw_bid.hash()).unwrap();
    let bid = BidArgs {
        raw_bid,
        signature: Bytes::from(signature.as_bytes().to_vec()),
        pay_bid_tx: Bytes::new(),
        pay_bid_tx_gas_used: U64::ZERO,
    };

    c.bench_function("recover_builder", |b| {
        b.iter(|| black_box(&bid).recover_builder().unwrap())
    });
}

criterion_group!(benches, bench_generate, bench_recover_builder);
criterion_main!(benches);
