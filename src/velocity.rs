//! Velocity/acceleration estimation ahead of a single target block
//! (SPEC_FULL.md §4.5). One `TargetPipeline` per target is kept alive for
//! the lifetime of the process; see `pipeline.rs` for the per-target
//! memoization that owns these.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::types::MempoolTx;

/// Bytes-per-10-minutes is the common unit both windows rescale into.
const TEN_MINUTES_MS: f64 = 600_000.0;

/// Trailing wall-clock window of Added-tx sizes ahead of a target.
pub struct AddedWindow {
    window: Duration,
    entries: VecDeque<(Instant, u64)>,
    last_emit: Option<f64>,
}

impl AddedWindow {
    pub fn new(window: Duration) -> Self {
        AddedWindow {
            window,
            entries: VecDeque::new(),
            last_emit: None,
        }
    }

    /// Buffers `added` (already filtered to this target's horizon) under
    /// `now`, evicts anything older than the window, and returns the
    /// rescaled bytes/10min figure iff it changed since the last call.
    pub fn push(&mut self, now: Instant, added: &[&MempoolTx]) -> Option<f64> {
        for tx in added {
            self.entries.push_back((now, tx.size));
        }
        while let Some(&(t, _)) = self.entries.front() {
            if now.saturating_duration_since(t) > self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }

        let sum: u64 = self.entries.iter().map(|(_, size)| size).sum();
        let rescaled = (sum as f64 / self.window.as_millis() as f64) * TEN_MINUTES_MS;

        if self.last_emit == Some(rescaled) {
            None
        } else {
            self.last_emit = Some(rescaled);
            Some(rescaled)
        }
    }
}

/// Coalesces the last `depth` block-removal events ahead of a target into a
/// single rescaled bytes/10min velocity figure.
pub struct RemovedWindow {
    depth: usize,
    events: VecDeque<(u64, Duration)>, // (sum_size, ibi)
    last_emit: Option<f64>,
}

impl RemovedWindow {
    pub fn new(depth: usize) -> Self {
        RemovedWindow {
            depth: depth.max(1),
            events: VecDeque::new(),
            last_emit: None,
        }
    }

    /// Records one block-event's removed txs (already filtered to this
    /// target's horizon) paired with that block's inter-block interval.
    pub fn push(&mut self, removed: &[&MempoolTx], ibi: Duration) -> Option<f64> {
        let sum_size: u64 = removed.iter().map(|tx| tx.size).sum();
        self.events.push_back((sum_size, ibi));
        while self.events.len() > self.depth {
            self.events.pop_front();
        }

        let sum_size_total: u64 = self.events.iter().map(|(s, _)| s).sum();
        let sum_ibi: Duration = self.events.iter().map(|(_, d)| *d).sum();
        let sum_ibi_minutes = sum_ibi.as_secs_f64() / 60.0;

        let rescaled = if sum_ibi_minutes > 0.0 {
            sum_size_total as f64 / sum_ibi_minutes * 10.0
        } else {
            0.0
        };

        if self.last_emit == Some(rescaled) {
            None
        } else {
            self.last_emit = Some(rescaled);
            Some(rescaled)
        }
    }
}

/// `Velocity(target) = addV - rmV`, sampled on the latest value of each
/// independent source (combine-latest, not a synchronous pair).
#[derive(Default)]
pub struct Velocity {
    add_v: Option<f64>,
    rm_v: Option<f64>,
    last_emit: Option<f64>,
}

impl Velocity {
    pub fn new() -> Self {
        Self::default()
    }

    fn combine(&mut self) -> Option<f64> {
        let (a, r) = (self.add_v?, self.rm_v?);
        let v = a - r;
        if self.last_emit == Some(v) {
            None
        } else {
            self.last_emit = Some(v);
            Some(v)
        }
    }

    pub fn update_added(&mut self, add_v: f64) -> Option<f64> {
        self.add_v = Some(add_v);
        self.combine()
    }

    pub fn update_removed(&mut self, rm_v: f64) -> Option<f64> {
        self.rm_v = Some(rm_v);
        self.combine()
    }
}

/// First discrete difference of a `Velocity` stream. The first sample seeds
/// `v0` and is emitted as-is (SPEC_FULL.md §4.5) rather than as a delta.
#[derive(Default)]
pub struct Acceleration {
    prev: Option<f64>,
}

impl Acceleration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, v: f64) -> f64 {
        match self.prev {
            None => {
                self.prev = Some(v);
                v
            }
            Some(v0) => {
                self.prev = Some(v);
                v - v0
            }
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.prev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceleration_seeds_then_diffs() {
        let mut acc = Acceleration::new();
        assert_eq!(acc.push(100.0), 100.0);
        assert_eq!(acc.push(150.0), 50.0);
        assert_eq!(acc.push(120.0), -30.0);
    }

    #[test]
    fn velocity_waits_for_both_sources() {
        let mut v = Velocity::new();
        assert_eq!(v.update_added(200_000.0), None);
        assert_eq!(v.update_removed(50_000.0), Some(150_000.0));
        // no change -> no re-emission
        assert_eq!(v.update_removed(50_000.0), None);
        assert_eq!(v.update_added(210_000.0), Some(160_000.0));
    }

    fn tx(size: u64) -> MempoolTx {
        use bitcoin::hashes::Hash;
        MempoolTx {
            txid: bitcoin::Txid::from_slice(&[7u8; 32]).unwrap(),
            size,
            fee: 0.0,
            descendant_size: size,
            descendant_fees: 0.0,
            fee_rate: 0.0,
            cum_size: 0,
            target_block: 1,
        }
    }

    #[test]
    fn removed_window_coalesces_last_n_events() {
        let mut w = RemovedWindow::new(2);
        let a = tx(300_000);
        let b = tx(300_000);
        let c = tx(300_000);

        // 300_000 bytes over 10 minutes -> 300_000 bytes/10min
        assert_eq!(w.push(&[&a], Duration::from_secs(600)), Some(300_000.0));
        // coalesced over last 2 events: 600_000 bytes over 20 minutes -> 300_000 bytes/10min (unchanged)
        assert_eq!(w.push(&[&b], Duration::from_secs(600)), None);
        // a third event evicts the first: 600_000 bytes over 20 minutes, same rate, no re-emit
        assert_eq!(w.push(&[&c], Duration::from_secs(600)), None);
    }
}
