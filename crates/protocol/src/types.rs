use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A confirmed block as pushed under `block` and returned by `/v1/blocks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub height: u64,
    pub timestamp: i64,
    #[serde(default)]
    pub tx_count: u32,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub weight: u64,
    #[serde(default, rename = "previousblockhash", skip_serializing_if = "Option::is_none")]
    pub previous_block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<BlockExtras>,
}

/// Fee and pool details mempool.space attaches to a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockExtras {
    #[serde(default)]
    pub total_fees: u64,
    #[serde(default)]
    pub median_fee: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fee_range: Vec<f64>,
    #[serde(default)]
    pub reward: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<MiningPool>,
}

/// Pool credited with mining a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningPool {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

/// A projected block built from the current mempool (`mempool-blocks`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedBlock {
    pub block_size: u64,
    #[serde(rename = "blockVSize")]
    pub block_vsize: f64,
    #[serde(rename = "nTx")]
    pub n_tx: u32,
    pub total_fees: u64,
    pub median_fee: f64,
    #[serde(default)]
    pub fee_range: Vec<f64>,
}

/// Price map pushed under `conversions` and returned by `/v1/prices`.
///
/// Currency codes are kept open-ended; only `time` is special-cased.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(flatten)]
    pub rates: BTreeMap<String, f64>,
}

impl Conversions {
    /// Rate for a currency code, e.g. `"USD"`.
    pub fn rate(&self, currency: &str) -> Option<f64> {
        self.rates.get(currency).copied()
    }
}
