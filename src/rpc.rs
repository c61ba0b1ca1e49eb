//! The mempool-RPC port (SPEC_FULL.md §6): a narrow trait over whatever
//! delivers `getrawmempool true`, plus the one concrete adapter wired in
//! `App` — a real `bitcoincore_rpc::Client`.

use std::collections::HashMap;
use std::str::FromStr;

use bitcoincore_rpc::{Client, RpcApi};
use serde_json::json;

use bitcoin::Txid;

use crate::error::{OptionExt, Result};
use crate::types::RawMempoolEntry;

/// A source of the node's current raw mempool. Abstracted so the estimator
/// can be driven by a fake in tests without a live bitcoind.
pub trait MempoolRpc: Send + Sync {
    fn get_raw_mempool(&self) -> Result<(HashMap<Txid, RawMempoolEntry>, u64)>;
}

impl MempoolRpc for Client {
    /// Fetches `getrawmempool true` and parses it leniently: entries that
    /// don't deserialize as `RawMempoolEntry` (missing fields, wrong types)
    /// are dropped and counted rather than failing the whole poll — a parse
    /// error per SPEC_FULL.md §7 is local, not a transport failure.
    fn get_raw_mempool(&self) -> Result<(HashMap<Txid, RawMempoolEntry>, u64)> {
        let raw: serde_json::Value = self.call("getrawmempool", &[json!(true)])?;
        let obj = raw.as_object().or_err("invalid getrawmempool reply")?;

        let mut out = HashMap::with_capacity(obj.len());
        let mut skipped = 0u64;
        for (txid_str, entry) in obj {
            let txid = match Txid::from_str(txid_str) {
                Ok(txid) => txid,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            match serde_json::from_value::<RawMempoolEntry>(entry.clone()) {
                Ok(parsed) => {
                    out.insert(txid, parsed);
                }
                Err(_) => skipped += 1,
            }
        }

        Ok((out, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_descendant_spellings() {
        let entry: RawMempoolEntry = serde_json::from_value(json!({
            "size": 250,
            "fee": 0.00001,
            "descendantsize": 250,
            "descendantfees": 0.00001,
        }))
        .unwrap();
        assert_eq!(entry.descendantsize, 250);

        let entry: RawMempoolEntry = serde_json::from_value(json!({
            "size": 250,
            "fee": 0.00001,
            "descendentsize": 250,
            "descendentfees": 0.00001,
        }))
        .unwrap();
        assert_eq!(entry.descendantsize, 250);
    }

    #[test]
    fn ignores_unknown_fields() {
        let entry: RawMempoolEntry = serde_json::from_value(json!({
            "size": 250,
            "fee": 0.00001,
            "descendantsize": 250,
            "descendantfees": 0.00001,
            "wtxid": "deadbeef",
            "ancestorcount": 1,
        }))
        .unwrap();
        assert_eq!(entry.size, 250);
    }
}
