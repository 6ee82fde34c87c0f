use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes};
use alloy::signers::local::PrivateKeySigner;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::{sign_legacy, Account, AccountError};

/// Account unlocked from an encrypted JSON keystore
pub struct KeystoreAccount {
    signer: PrivateKeySigner,
    key_file: PathBuf,
}

impl KeystoreAccount {
    /// Reads the password file, removes it, then decrypts the key for `expected`.
    ///
    /// `keystore_path` may point at a single key file or at a keystore directory, in which
    /// case the file whose `address` matches `expected` is used.
    pub fn unlock(
        keystore_path: &Path,
        password_file: &Path,
        expected: Option<Address>,
    ) -> Result<Self, AccountError> {
        let password = read_password(password_file)?;

        let key_file = if keystore_path.is_dir() {
            let address = expected.ok_or_else(|| {
                AccountError::UnlockFailure(
                    "account address is required to search a keystore directory".to_string(),
                )
            })?;
            find_key_file(keystore_path, address)?
        } else {
            keystore_path.to_path_buf()
        };

        let signer = PrivateKeySigner::decrypt_keystore(&key_file, password.as_bytes())
            .map_err(|e| {
                AccountError::UnlockFailure(format!("{}: {}", key_file.display(), e))
            })?;

        if let Some(address) = expected {
            if signer.address() != address {
                return Err(AccountError::UnlockFailure(format!(
                    "keystore {} holds {} instead of {}",
                    key_file.display(),
                    signer.address(),
                    address
                )));
            }
        }

        info!(
            address = %signer.address(),
            key_file = %key_file.display(),
            "Keystore account unlocked"
        );

        Ok(Self { signer, key_file })
    }

    pub fn key_file(&self) -> &Path {
        &self.key_file
    }
}

impl Account for KeystoreAccount {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign_transaction(&self, tx: TxLegacy, chain_id: u64) -> Result<Bytes, AccountError> {
        sign_legacy(&self.signer, tx, chain_id)
    }
}

fn read_password(path: &Path) -> Result<Zeroizing<String>, AccountError> {
    let raw = std::fs::read_to_string(path).map(Zeroizing::new).map_err(|e| {
        AccountError::UnlockFailure(format!(
            "failed to read password file {}: {}",
            path.display(),
            e
        ))
    })?;

    if let Err(e) = std::fs::remove_file(path) {
        warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove password file"
        );
    }

    Ok(Zeroizing::new(raw.trim_end_matches(['\r', '\n']).to_string()))
}

/// Scans `dir` for the keystore file holding `address`
fn find_key_file(dir: &Path, address: Address) -> Result<PathBuf, AccountError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AccountError::UnlockFailure(format!("failed to read {}: {}", dir.display(), e))
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    candidates.sort();

    candidates
        .into_iter()
        .find(|path| keystore_address(path) == Some(address))
        .ok_or_else(|| {
            AccountError::UnlockFailure(format!(
                "no key for {} in {}",
                address,
                dir.display()
            ))
        })
}

fn keystore_address(path: &Path) -> Option<Address> {
    let content = std::fs::read_to_string(path).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    let raw = json.get("address")?.as_str()?;
    Address::from_str(raw).ok()
}
