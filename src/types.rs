use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use bitcoin::Txid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The wire shape of a single `getrawmempool true` entry.
///
/// Accepts both the `descendantsize`/`descendantfees` spelling used by real
/// bitcoind releases and the `descendentsize`/`descendentfees` spelling some
/// nodes in the wild still emit (see the Open Questions in SPEC_FULL.md).
/// Unknown fields are ignored rather than rejected.
#[derive(Clone, Debug, Deserialize)]
pub struct RawMempoolEntry {
    pub size: u64,
    pub fee: f64,
    #[serde(alias = "descendentsize")]
    pub descendantsize: u64,
    #[serde(alias = "descendentfees")]
    pub descendantfees: f64,
}

/// A mempool transaction as projected from the node's raw mempool entry,
/// enriched with the fields the packing step derives.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MempoolTx {
    pub txid: Txid,
    pub size: u64,
    pub fee: f64,
    pub descendant_size: u64,
    pub descendant_fees: f64,

    /// `descendant_fees / descendant_size`, the package fee rate used for ordering.
    pub fee_rate: f64,
    /// Cumulative size of all transactions up to and including this one, in
    /// descending-feerate order.
    pub cum_size: u64,
    /// Which hypothetical block this tx lands in given the effective block size.
    pub target_block: u32,
}

impl MempoolTx {
    fn from_raw(txid: Txid, raw: &RawMempoolEntry) -> Option<Self> {
        if raw.descendantsize == 0 {
            return None;
        }
        let fee_rate = raw.descendantfees / raw.descendantsize as f64;
        if !fee_rate.is_finite() {
            return None;
        }
        Some(MempoolTx {
            txid,
            size: raw.size,
            fee: raw.fee,
            descendant_size: raw.descendantsize,
            descendant_fees: raw.descendantfees,
            fee_rate,
            cum_size: 0,
            target_block: 0,
        })
    }
}

/// An ordered, packed view of the mempool: `MempoolTx` entries sorted by
/// descending `fee_rate`, with `cum_size`/`target_block` assigned.
///
/// Invariants (checked in tests, not at runtime): `cum_size` is
/// non-decreasing and matches the prefix sum of `size`; `target_block` is
/// non-decreasing and never jumps by more than one; `fee_rate` is
/// non-increasing.
#[derive(Clone, Debug)]
pub struct SortedMempoolSnapshot {
    pub txs: Vec<MempoolTx>,
    index: HashMap<Txid, usize>,
    content_hash: u64,
}

impl SortedMempoolSnapshot {
    /// Packs a raw mempool mapping into a fee-ordered, target-block-assigned
    /// snapshot. Malformed entries (missing/non-finite fee rate) are skipped;
    /// `skipped` is incremented once per dropped entry so the caller can log
    /// a count without this function needing a logging dependency.
    pub fn pack(
        raw: &HashMap<Txid, RawMempoolEntry>,
        block_effective_size: u64,
        skipped: &mut u64,
    ) -> Self {
        let mut txs: Vec<MempoolTx> = Vec::with_capacity(raw.len());
        for (txid, entry) in raw {
            match MempoolTx::from_raw(*txid, entry) {
                Some(tx) => txs.push(tx),
                None => *skipped += 1,
            }
        }

        // Descending fee_rate; ties broken by txid so snapshots are reproducible.
        txs.sort_unstable_by(|a, b| {
            b.fee_rate
                .partial_cmp(&a.fee_rate)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.txid.cmp(&b.txid))
        });

        let block_effective_size = block_effective_size.max(1);
        let mut cum_size: u64 = 0;
        let mut target_block: u32 = 1;
        let mut n: u64 = 1;
        for tx in &mut txs {
            cum_size += tx.size;
            if cum_size > n * block_effective_size {
                target_block += 1;
                n += 1;
            }
            tx.cum_size = cum_size;
            tx.target_block = target_block;
        }

        let index = txs
            .iter()
            .enumerate()
            .map(|(i, tx)| (tx.txid, i))
            .collect();

        let content_hash = content_hash(&txs);

        SortedMempoolSnapshot {
            txs,
            index,
            content_hash,
        }
    }

    pub fn empty() -> Self {
        SortedMempoolSnapshot {
            txs: Vec::new(),
            index: HashMap::new(),
            content_hash: 0,
        }
    }

    pub fn get(&self, txid: &Txid) -> Option<&MempoolTx> {
        self.index.get(txid).map(|&i| &self.txs[i])
    }

    pub fn contains(&self, txid: &Txid) -> bool {
        self.index.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Structural-equality short-circuit used to suppress redundant
    /// recomputation during quiet periods (§9, Snapshot equality).
    pub fn same_as(&self, other: &SortedMempoolSnapshot) -> bool {
        self.content_hash == other.content_hash
    }

    /// `cum_size` of the first tx assigned to `target + 1`, i.e. the boundary
    /// between `target` and the next hypothetical block. `None` if no tx has
    /// reached that target yet.
    pub fn final_position(&self, target: u32) -> Option<u64> {
        self.txs
            .iter()
            .find(|tx| tx.target_block == target + 1)
            .map(|tx| tx.cum_size)
    }

    /// The tx minimizing `|cum_size - x0|`, ties broken by higher fee_rate
    /// then lexicographic txid.
    pub fn closest_to(&self, x0: f64) -> Option<&MempoolTx> {
        self.txs.iter().min_by(|a, b| {
            let da = (a.cum_size as f64 - x0).abs();
            let db = (b.cum_size as f64 - x0).abs();
            da.partial_cmp(&db)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.fee_rate.partial_cmp(&a.fee_rate).unwrap_or(Ordering::Equal))
                .then_with(|| a.txid.cmp(&b.txid))
        })
    }
}

fn content_hash(txs: &[MempoolTx]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for tx in txs {
        tx.txid.hash(&mut hasher);
        tx.size.hash(&mut hasher);
        tx.descendant_fees.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// Set-difference of two snapshots by `txid`.
pub struct SnapshotDiff {
    pub added: Vec<MempoolTx>,
    pub removed: Vec<MempoolTx>,
}

/// A block is classified as "mined" when more than this many transactions
/// disappear between successive snapshots. Tolerates ordinary mempool
/// eviction churn, which is typically far smaller.
pub const MINED_THRESHOLD: usize = 500;

impl SnapshotDiff {
    pub fn between(prev: &SortedMempoolSnapshot, new: &SortedMempoolSnapshot) -> Self {
        let added = new
            .txs
            .iter()
            .filter(|tx| !prev.contains(&tx.txid))
            .cloned()
            .collect();
        let removed = prev
            .txs
            .iter()
            .filter(|tx| !new.contains(&tx.txid))
            .cloned()
            .collect();
        SnapshotDiff { added, removed }
    }

    pub fn is_mined_event(&self) -> bool {
        self.removed.len() > MINED_THRESHOLD
    }
}

/// The fixed set of tail quantiles a `MinedSummary` reports a mean fee rate
/// for ("minimum fee paid to make the block", at progressively finer slices).
pub const MINED_QUANTILES: [f64; 7] = [0.4, 0.2, 0.1, 0.05, 0.01, 0.005, 0.001];

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedSummary {
    pub timestamp: DateTime<Utc>,
    /// Calendar date the block was mined (YYYY-MM-DD), duplicating
    /// `timestamp` to match the wire payload shape in SPEC_FULL.md §6.
    pub date: String,
    pub txs: usize,
    /// Aggregate size of the removed block, in megabytes.
    #[serde(rename = "blockSize")]
    pub block_size_mb: f64,
    /// Inter-block interval, in minutes.
    pub ibi: f64,
    pub min_fee_tx: MempoolTx,
    /// Quantile (as its string key, matching the pub/sub payload shape) to
    /// mean fee rate of the lowest-feerate tail slice.
    pub fee: HashMap<String, f64>,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    pub target_block: u32,
    pub fee_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// Deliberate undershoot applied to the naively-computed fee rate, to avoid
/// pathological minima under heavy competitive use.
pub const FEE_SAFETY_FACTOR: f64 = 0.999;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeDiffEntry {
    pub target_block: u32,
    pub fee_rate: f64,
    pub timestamp: DateTime<Utc>,
    pub diff: f64,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub target_block: u32,
    pub fee_rate: f64,
    pub timestamp: DateTime<Utc>,
    pub diff: f64,
    pub cum_diff: f64,
    pub valid: bool,
}
