//! Wires the snapshot differ, the per-target pipelines and the
//! recommendation ranker into the single `Estimator` the app loop drives
//! once per tick (SPEC_FULL.md §2, the full DAG from `SortedMempoolSnapshot`
//! down to the recommendation sink).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bitcoin::Txid;

use crate::config::Constants;
use crate::diff::{summarize_mined, PairwiseDiff};
use crate::pipeline::PipelineRegistry;
use crate::recommend::{fee_diff, rank_recommendations, TARGET_RANGE};
use crate::types::{
    FeeDiffEntry, FeeEstimate, MinedSummary, RawMempoolEntry, Recommendation, SortedMempoolSnapshot,
};

/// Everything the app loop needs to publish after one tick.
#[derive(Default)]
pub struct Update {
    pub mined_summary: Option<MinedSummary>,
    pub fee_diff: Vec<FeeDiffEntry>,
    pub recommendations: Vec<Recommendation>,
}

pub struct Estimator {
    block_effective_size: u64,
    differ: PairwiseDiff,
    pipelines: PipelineRegistry,
    last_ibi: Option<Duration>,
    skipped: u64,
}

impl Estimator {
    pub fn new(constants: &Constants) -> Self {
        let block_effective_size = constants.block_effective_size();
        Estimator {
            block_effective_size,
            differ: PairwiseDiff::new(),
            pipelines: PipelineRegistry::new(
                block_effective_size,
                constants.int_time_added,
                constants.int_blocks_removed,
            ),
            last_ibi: None,
            skipped: 0,
        }
    }

    pub fn skipped_entries(&self) -> u64 {
        self.skipped
    }

    /// Records a new inter-block interval observed on the block-hash feed.
    pub fn observe_ibi(&mut self, ibi: Duration) {
        self.last_ibi = Some(ibi);
    }

    /// Feeds a freshly-fetched raw mempool mapping through the whole DAG and
    /// returns whatever changed as a result. `now` is injected so the added
    /// window's eviction is testable without real sleeps.
    pub fn tick(&mut self, raw: &HashMap<Txid, RawMempoolEntry>, now: Instant, min_savings_rate: f64) -> Update {
        let snapshot = SortedMempoolSnapshot::pack(raw, self.block_effective_size, &mut self.skipped);

        let diff = match self.differ.push(snapshot) {
            Some(diff) => diff,
            None => return Update::default(),
        };

        self.pipelines.on_added(now, &TARGET_RANGE, &diff.added);

        let mut mined_summary = None;
        if diff.is_mined_event() {
            if let Some(ibi) = self.last_ibi {
                self.pipelines.on_removed(&TARGET_RANGE, &diff.removed, ibi);
                mined_summary = Some(summarize_mined(&diff.removed, ibi));
            }
        }

        let snapshot = self
            .differ
            .latest()
            .expect("differ always holds the snapshot just pushed");

        let estimates: Vec<FeeEstimate> = TARGET_RANGE
            .iter()
            .filter_map(|&target| self.pipelines.fee_estimate(target, snapshot))
            .collect();

        let diffs = fee_diff(&estimates);
        let recommendations = rank_recommendations(&diffs, min_savings_rate);

        Update {
            mined_summary,
            fee_diff: diffs,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawMempoolEntry;
    use bitcoin::hashes::Hash;

    fn config() -> Constants {
        Constants {
            block_size: 1_000_000,
            miners_reserved_block_ratio: 0.0,
            time_res: Duration::from_secs(1),
            int_time_added: Duration::from_secs(600),
            int_blocks_removed: 2,
            min_savings_rate: 0.02,
        }
    }

    fn raw_map(n: usize, size: u64, fee_rate_start: f64) -> HashMap<Txid, RawMempoolEntry> {
        (0..n)
            .map(|i| {
                let fee_rate = fee_rate_start - i as f64 * 0.001;
                (
                    Txid::from_slice(&[(i % 256) as u8; 32]).unwrap_or_else(|_| {
                        Txid::from_slice(&[0u8; 32]).unwrap()
                    }),
                    RawMempoolEntry {
                        size,
                        fee: fee_rate * size as f64 / 100_000_000.0,
                        descendantsize: size,
                        descendantfees: fee_rate * size as f64 / 100_000_000.0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn empty_mempool_yields_no_estimate() {
        let constants = config();
        let mut est = Estimator::new(&constants);
        let update = est.tick(&HashMap::new(), Instant::now(), constants.min_savings_rate);
        assert!(update.fee_diff.is_empty());
        assert!(update.recommendations.is_empty());
        assert!(update.mined_summary.is_none());
    }

    #[test]
    fn first_tick_never_emits_a_diff() {
        let constants = config();
        let mut est = Estimator::new(&constants);
        let raw = raw_map(10, 1000, 50.0);
        let update = est.tick(&raw, Instant::now(), constants.min_savings_rate);
        // with no velocity/acceleration history yet, no fee estimate can be formed
        assert!(update.fee_diff.is_empty());
    }
}
