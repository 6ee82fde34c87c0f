//! Payment account custody
//!
//! An [`Account`] owns the key that signs payment transactions for one validator.
//! Two custody modes are supported:
//!
//! - **privateKey**: a hex private key carried in the configuration
//! - **keystore**: an encrypted JSON keystore unlocked once at startup with a password
//!   read from a file that is removed right after it has been read
//!
//! Accounts are immutable after construction and safe to share between tasks.

mod keystore;

pub use keystore::KeystoreAccount;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::AccountConfig;

/// Account construction and signing errors
#[derive(Debug, Clone, Error)]
pub enum AccountError {
    #[error("invalid account mode: {0}")]
    InvalidAccountMode(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Keystore could not be located or decrypted
    #[error("failed to unlock keystore: {0}")]
    UnlockFailure(String),

    #[error("failed to sign transaction: {0}")]
    Signing(String),
}

/// Key custody mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountMode {
    PrivateKey,
    Keystore,
}

impl FromStr for AccountMode {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("privateKey") {
            Ok(AccountMode::PrivateKey)
        } else if s.eq_ignore_ascii_case("keystore") {
            Ok(AccountMode::Keystore)
        } else {
            Err(AccountError::InvalidAccountMode(s.to_string()))
        }
    }
}

/// Signing capability shared by every custody mode
pub trait Account: Send + Sync {
    /// Address payment transactions are sent from
    fn address(&self) -> Address;

    /// Signs `tx` for `chain_id` (EIP-155) and returns its EIP-2718 encoding
    fn sign_transaction(&self, tx: TxLegacy, chain_id: u64) -> Result<Bytes, AccountError>;
}

/// Builds the account described by `config`
pub fn new_account(config: &AccountConfig) -> Result<Arc<dyn Account>, AccountError> {
    match config.mode.parse::<AccountMode>()? {
        AccountMode::PrivateKey => {
            let key = config.private_key.as_deref().unwrap_or_default();
            Ok(Arc::new(PrivateKeyAccount::from_hex(key)?))
        }
        AccountMode::Keystore => {
            let keystore_path = config.keystore_path.as_ref().ok_or_else(|| {
                AccountError::UnlockFailure("keystore_path is not configured".to_string())
            })?;
            let password_file = config.password_file_path.as_ref().ok_or_else(|| {
                AccountError::UnlockFailure("password_file_path is not configured".to_string())
            })?;
            let expected = config
                .address
                .as_deref()
                .map(|raw| {
                    Address::from_str(raw).map_err(|e| {
                        AccountError::UnlockFailure(format!("invalid account address {raw}: {e}"))
                    })
                })
                .transpose()?;

            Ok(Arc::new(KeystoreAccount::unlock(
                keystore_path,
                password_file,
                expected,
            )?))
        }
    }
}

/// Account backed by a private key held in process memory
pub struct PrivateKeyAccount {
    signer: PrivateKeySigner,
}

impl PrivateKeyAccount {
    /// Parses a hex private key, with or without `0x`
    pub fn from_hex(key: &str) -> Result<Self, AccountError> {
        let key = Zeroizing::new(key.trim().to_string());
        if key.is_empty() {
            return Err(AccountError::InvalidPrivateKey(
                "private_key is not configured".to_string(),
            ));
        }

        let signer = PrivateKeySigner::from_str(&key)
            .map_err(|e| AccountError::InvalidPrivateKey(e.to_string()))?;

        Ok(Self { signer })
    }

    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }
}

impl Account for PrivateKeyAccount {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign_transaction(&self, tx: TxLegacy, chain_id: u64) -> Result<Bytes, AccountError> {
        sign_legacy(&self.signer, tx, chain_id)
    }
}

/// EIP-155 signs a legacy transaction and encodes the signed envelope
pub(crate) fn sign_legacy(
    signer: &PrivateKeySigner,
    mut tx: TxLegacy,
    chain_id: u64,
) -> Result<Bytes, AccountError> {
    tx.chain_id = Some(chain_id);

    let signature = signer
        .sign_hash_sync(&tx.signature_hash())
        .map_err(|e| AccountError::Signing(e.to_string()))?;

    let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
    Ok(Bytes::from(envelope.encoded_2718()))
}
