//! Payment transaction generation
//!
//! The gateway pays the builder fee on the validator's behalf with a zero gas price
//! value transfer, signed from the validator's payment account against the latest
//! cached balance and nonce.

use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use std::sync::Arc;
use tracing::{error, trace};

use super::snapshot::SnapshotHandle;
use crate::account::Account;
use crate::errors::{GatewayError, GatewayResult};
use crate::metrics::Recorder;

/// Gas limit of a payment transaction, also reported as `payBidTxGasUsed`
pub const PAY_BID_TX_GAS_LIMIT: u64 = 25_000;

pub struct PaymentTxGenerator {
    account: Arc<dyn Account>,
    snapshots: SnapshotHandle,
    recorder: Arc<dyn Recorder>,
}

impl PaymentTxGenerator {
    pub fn new(
        account: Arc<dyn Account>,
        snapshots: SnapshotHandle,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        Self {
            account,
            snapshots,
            recorder,
        }
    }

    /// Builds and signs the transfer of `fee` (zero when absent) to `recipient`.
    ///
    /// Reads exactly one snapshot, so balance, nonce and chain id always come from the
    /// same refresh tick.
    pub fn generate(&self, recipient: Address, fee: Option<U256>) -> GatewayResult<Bytes> {
        let amount = fee.unwrap_or(U256::ZERO);
        let snapshot = self.snapshots.load();

        let state = snapshot
            .account
            .ok_or(GatewayError::PeerStateUnavailable { field: "account" })?;
        let chain_id = snapshot
            .chain_id
            .ok_or(GatewayError::PeerStateUnavailable { field: "chain_id" })?;

        if state.balance < amount {
            let account = self.account.address().to_string();
            error!(
                account = %account,
                balance = %state.balance,
                amount = %amount,
                "Insufficient balance for payment transaction"
            );
            self.recorder
                .inc_account_error(&account, "insufficient_balance");
            return Err(GatewayError::InsufficientBalance {
                balance: state.balance,
                amount,
            });
        }

        let tx = TxLegacy {
            chain_id: None,
            nonce: state.nonce,
            gas_price: 0,
            gas_limit: PAY_BID_TX_GAS_LIMIT,
            to: TxKind::Call(recipient),
            value: amount,
            input: Bytes::new(),
        };

        let signed = self
            .account
            .sign_transaction(tx, chain_id)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;

        trace!(
            recipient = %recipient,
            amount = %amount,
            nonce = state.nonce,
            "Payment transaction signed"
        );

        Ok(signed)
    }

    pub fn account(&self) -> Address {
        self.account.address()
    }
}
