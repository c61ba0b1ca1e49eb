//! Kinematic inversion from (position, velocity, acceleration) ahead of a
//! target block to a recommended fee rate (SPEC_FULL.md §4.6).

use chrono::Utc;

use crate::types::{FeeEstimate, MempoolTx, SortedMempoolSnapshot, FEE_SAFETY_FACTOR};

/// Back-projects the queue position: the `cum_size` coordinate *today* at
/// which a tx must sit so that, under expected mempool growth, it will be
/// inside the next `target` blocks when they are mined.
///
/// `x0 = xFinal - (v * target + 0.5 * a * target^2)`, with time measured in
/// blocks. Defined ahead of its use (unlike the source this was distilled
/// from, which relies on hoisting — see SPEC_FULL.md §9).
pub fn initial_position(x_final: f64, v: f64, a: f64, target: u32) -> f64 {
    let target = target as f64;
    x_final - (v * target + 0.5 * a * square(target))
}

fn square(x: f64) -> f64 {
    x * x
}

/// Selects the fee estimate transaction for the given target: the tx in
/// `snapshot` whose `cum_size` is closest to `x0`.
pub fn fee_estimate_tx(snapshot: &SortedMempoolSnapshot, x0: f64) -> Option<&MempoolTx> {
    snapshot.closest_to(x0)
}

/// Wraps the selected tx's fee rate with the safety-factor undershoot and a
/// timestamp, ready for publication.
pub fn fee_estimate(tx: &MempoolTx, target_block: u32) -> FeeEstimate {
    FeeEstimate {
        target_block,
        fee_rate: tx.fee_rate * FEE_SAFETY_FACTOR,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinematic_inversion_matches_worked_example() {
        // Velocity(2) = 200_000, Acceleration(2) = 10_000, FinalPosition(2) = 2_000_000
        let x0 = initial_position(2_000_000.0, 200_000.0, 10_000.0, 2);
        assert_eq!(x0, 1_580_000.0);
    }

    #[test]
    fn final_position_is_boundary_of_next_target() {
        use crate::types::RawMempoolEntry;
        use bitcoin::hashes::Hash;
        use bitcoin::Txid;
        use std::collections::HashMap;

        // Three txs of descending feerate, sizes 600k/500k/100k, block_effective_size=1_000_000
        let mut raw = HashMap::new();
        for (i, size) in [600_000u64, 500_000, 100_000].iter().enumerate() {
            let fee_rate = 50.0 - i as f64;
            raw.insert(
                Txid::from_slice(&[i as u8 + 1; 32]).unwrap(),
                RawMempoolEntry {
                    size: *size,
                    fee: 0.0,
                    descendantsize: *size,
                    descendantfees: fee_rate * *size as f64,
                },
            );
        }
        let mut skipped = 0;
        let snap = SortedMempoolSnapshot::pack(&raw, 1_000_000, &mut skipped);
        assert_eq!(
            snap.txs.iter().map(|t| t.target_block).collect::<Vec<_>>(),
            vec![1, 2, 2]
        );
        assert_eq!(
            snap.txs.iter().map(|t| t.cum_size).collect::<Vec<_>>(),
            vec![600_000, 1_100_000, 1_200_000]
        );
        // target=1's boundary is the first tx assigned to target_block 2
        assert_eq!(snap.final_position(1), Some(1_100_000));
        // no tx reaches target_block 3
        assert_eq!(snap.final_position(2), None);
    }
}
