//! FeeDiff and recommendation ranking across the fixed target range
//! (SPEC_FULL.md §4.7).

use crate::types::{FeeDiffEntry, FeeEstimate, Recommendation};

/// The fixed target range the recommendation pipeline ranks over.
pub const TARGET_RANGE: [u32; 4] = [1, 2, 3, 4];

/// Combines the four latest `FeeEstimate` values (one per target in
/// `TARGET_RANGE`, in order) into their marginal slopes, keeping only the
/// entries where the fee rate decreases with longer wait as expected.
pub fn fee_diff(estimates: &[FeeEstimate]) -> Vec<FeeDiffEntry> {
    let mut out = Vec::with_capacity(estimates.len());
    let mut prev: Option<&FeeEstimate> = None;

    for est in estimates {
        let diff = match prev {
            None => 0.0,
            Some(p) => {
                let dt = est.target_block as f64 - p.target_block as f64;
                if dt == 0.0 {
                    0.0
                } else {
                    (est.fee_rate - p.fee_rate) / dt
                }
            }
        };
        if diff <= 0.0 {
            out.push(FeeDiffEntry {
                target_block: est.target_block,
                fee_rate: est.fee_rate,
                timestamp: est.timestamp,
                diff,
            });
        }
        prev = Some(est);
    }
    out
}

/// Ranks the retained `FeeDiff` series by the cost function
/// `sqrt(diff * cum_diff) / target_block`, ascending (best first). The first
/// entry is the no-wait baseline (its `diff` is always the `0.0` sentinel
/// `fee_diff` seeds it with, not a real marginal comparison) and is never a
/// candidate, regardless of its `diff`. Among the rest, entries whose
/// marginal discount doesn't clear `min_savings_rate` relative to the
/// previous fee rate are dropped, except for a genuine zero-diff entry,
/// which is always valid.
pub fn rank_recommendations(entries: &[FeeDiffEntry], min_savings_rate: f64) -> Vec<Recommendation> {
    let mut cum_diff = 0.0;
    let mut prev_fee_rate: Option<f64> = None;
    let mut candidates = Vec::with_capacity(entries.len());

    for e in entries {
        cum_diff += e.diff;

        let valid = match prev_fee_rate {
            None => false,
            Some(_) if e.diff == 0.0 => true,
            Some(prev) if prev != 0.0 => (-e.diff / prev) >= min_savings_rate,
            Some(_) => false,
        };

        if valid {
            candidates.push(Recommendation {
                target_block: e.target_block,
                fee_rate: e.fee_rate,
                timestamp: e.timestamp,
                diff: e.diff,
                cum_diff,
                valid: true,
            });
        }

        prev_fee_rate = Some(e.fee_rate);
    }

    candidates.sort_by(|a, b| cost(a).partial_cmp(&cost(b)).unwrap());
    candidates
}

fn cost(r: &Recommendation) -> f64 {
    (r.diff * r.cum_diff).sqrt() / r.target_block as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn est(target_block: u32, fee_rate: f64) -> FeeEstimate {
        FeeEstimate {
            target_block,
            fee_rate,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn recommendation_filter_worked_example() {
        let estimates = vec![est(1, 100.0), est(2, 95.0), est(3, 94.0), est(4, 94.0)];
        let diffs = fee_diff(&estimates);
        assert_eq!(diffs.len(), 4);
        assert_eq!(diffs[0].diff, 0.0);
        assert_eq!(diffs[1].diff, -5.0);
        assert_eq!(diffs[2].diff, -1.0);
        assert_eq!(diffs[3].diff, 0.0);

        let ranked = rank_recommendations(&diffs, 0.02);
        let targets: Vec<u32> = ranked.iter().map(|r| r.target_block).collect();
        // target 1 is the no-wait baseline (diff=0 sentinel, no real
        // predecessor) -> never a candidate, even though its diff is 0.0
        assert!(!targets.contains(&1));
        // target 3: |diff|/prev = 1/95 ~= 0.0105 < 0.02 -> invalid, excluded
        assert!(!targets.contains(&3));
        assert!(targets.contains(&2));
        assert!(targets.contains(&4));
        assert_eq!(targets.len(), 2);
        // ranked ascending by cost -> best first
        for pair in ranked.windows(2) {
            assert!(cost(&pair[0]) <= cost(&pair[1]));
        }
    }

    #[test]
    fn degenerate_fee_curve_filtered_out_of_diff() {
        let estimates = vec![est(1, 90.0), est(2, 95.0), est(3, 80.0), est(4, 70.0)];
        let diffs = fee_diff(&estimates);
        // target 2's diff is +5 (fee increases) -> filtered out of FeeDiff entirely
        assert!(!diffs.iter().any(|d| d.target_block == 2));
    }
}
