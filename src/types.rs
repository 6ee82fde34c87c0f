//! Wire types of the `mev` JSON-RPC namespace.

use alloy::primitives::{keccak256, Address, Bytes, Signature, B256, U256, U64};
use alloy::rlp::{Encodable, Header};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::str::FromStr;

/// Bid payload signed by the builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBid {
    pub block_number: U64,
    pub parent_hash: B256,
    pub txs: Vec<Bytes>,
    #[serde(default)]
    pub un_revertible: Vec<B256>,
    pub gas_used: U64,
    pub gas_fee: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_fee: Option<U256>,
}

impl RawBid {
    /// Keccak of the RLP list `[blockNumber, parentHash, txs, unRevertible, gasUsed, gasFee,
    /// builderFee]`, with a missing builder fee encoded as zero.
    pub fn hash(&self) -> B256 {
        let builder_fee = self.builder_fee.unwrap_or(U256::ZERO);

        let payload_length = self.block_number.length()
            + self.parent_hash.length()
            + self.txs.length()
            + self.un_revertible.length()
            + self.gas_used.length()
            + self.gas_fee.length()
            + builder_fee.length();

        let mut out = Vec::with_capacity(payload_length + 8);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.block_number.encode(&mut out);
        self.parent_hash.encode(&mut out);
        self.txs.encode(&mut out);
        self.un_revertible.encode(&mut out);
        self.gas_used.encode(&mut out);
        self.gas_fee.encode(&mut out);
        builder_fee.encode(&mut out);

        keccak256(&out)
    }
}

/// Arguments of `mev_sendBid`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidArgs {
    #[serde(alias = "RawBid")]
    pub raw_bid: RawBid,
    /// 65-byte `r || s || v` signature over [`RawBid::hash`]
    pub signature: Bytes,
    /// Payment transaction attached by the gateway
    #[serde(default)]
    pub pay_bid_tx: Bytes,
    #[serde(default)]
    pub pay_bid_tx_gas_used: U64,
}

impl BidArgs {
    /// Recovers the builder that signed the raw bid
    pub fn recover_builder(&self) -> Result<Address, String> {
        if self.signature.len() != 65 {
            return Err(format!(
                "signature must be 65 bytes, got {}",
                self.signature.len()
            ));
        }

        let signature = Signature::from_raw(&self.signature).map_err(|e| e.to_string())?;
        signature
            .recover_address_from_prehash(&self.raw_bid.hash())
            .map_err(|e| e.to_string())
    }

    /// Builder fee, absent meaning zero
    pub fn builder_fee(&self) -> U256 {
        self.raw_bid.builder_fee.unwrap_or(U256::ZERO)
    }
}

/// Auction parameters published by a validator.
///
/// Durations are nanoseconds and amounts are wei, encoded as JSON numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MevParams {
    #[serde(rename = "ValidatorCommission", default)]
    pub validator_commission: u64,
    #[serde(rename = "BidSimulationLeftOver", default)]
    pub bid_simulation_left_over: u64,
    #[serde(rename = "NoInterruptLeftOver", default)]
    pub no_interrupt_left_over: u64,
    #[serde(rename = "MaxBidsPerBuilder", default)]
    pub max_bids_per_builder: u32,
    #[serde(rename = "GasCeil", default)]
    pub gas_ceil: u64,
    #[serde(
        rename = "GasPrice",
        default,
        serialize_with = "serialize_u256_as_number",
        deserialize_with = "deserialize_u256_number"
    )]
    pub gas_price: U256,
    #[serde(
        rename = "BuilderFeeCeil",
        default,
        serialize_with = "serialize_u256_as_number",
        deserialize_with = "deserialize_u256_number"
    )]
    pub builder_fee_ceil: U256,
    #[serde(rename = "Version", default)]
    pub version: String,
}

fn serialize_u256_as_number<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if let Ok(num) = u64::try_from(*value) {
        serializer.serialize_u64(num)
    } else if let Ok(num) = u128::try_from(*value) {
        serializer.serialize_u128(num)
    } else {
        serializer.serialize_str(&value.to_string())
    }
}

/// Reads a JSON number of any width, or a decimal or `0x` string, from its source text.
///
/// Numbers above `u64::MAX` would otherwise reach the visitor as a lossy `f64`. The raw
/// text is only available when decoding from JSON text, not from a `serde_json::Value`.
fn deserialize_u256_number<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Box::<RawValue>::deserialize(deserializer)?;
    let text = raw.get().trim();
    let digits = text
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text);

    U256::from_str(digits)
        .map_err(|e| serde::de::Error::custom(format!("invalid quantity {text}: {e}")))
}

/// Issue reported by a validator about a builder's bid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidIssue {
    #[serde(rename = "Validator")]
    pub validator: Address,
    #[serde(rename = "Builder")]
    pub builder: Address,
    #[serde(rename = "BidHash")]
    pub bid_hash: B256,
    #[serde(rename = "Message", default)]
    pub message: String,
}
