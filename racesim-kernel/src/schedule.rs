//! Checkpoints at which partial comparison results are reported.
//!
//! The first checkpoint is `min(20, target)`; each later one multiplies the
//! previous count by a factor that starts at 6 and shrinks by one per step
//! down to 2, capped at the target. The last checkpoint is always the target.

const FIRST_CHECKPOINT: u64 = 20;
const FIRST_MULTIPLIER: u64 = 6;
const MIN_MULTIPLIER: u64 = 2;

/// Restartable iterator over checkpoint sample counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoints {
    target: u64,
    last: u64,
    multiplier: u64,
}

impl Checkpoints {
    #[must_use]
    pub const fn new(target: u64) -> Self {
        Self {
            target,
            last: 0,
            multiplier: FIRST_MULTIPLIER,
        }
    }

    #[must_use]
    pub const fn target(&self) -> u64 {
        self.target
    }
}

impl Iterator for Checkpoints {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.last >= self.target {
            return None;
        }
        let next = if self.last == 0 {
            FIRST_CHECKPOINT.min(self.target)
        } else {
            let grown = self.last.saturating_mul(self.multiplier).min(self.target);
            self.multiplier = (self.multiplier - 1).max(MIN_MULTIPLIER);
            grown
        };
        self.last = next;
        Some(next)
    }
}

/// Every checkpoint for `target` samples, in order.
#[must_use]
pub fn schedule(target: u64) -> Vec<u64> {
    Checkpoints::new(target).collect()
}

/// Sample counts between consecutive checkpoints.
#[must_use]
pub fn deltas(target: u64) -> Vec<u64> {
    let mut previous = 0;
    schedule(target)
        .into_iter()
        .map(|checkpoint| {
            let delta = checkpoint - previous;
            previous = checkpoint;
            delta
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_targets() {
        assert_eq!(schedule(100), vec![20, 100]);
        assert_eq!(schedule(20), vec![20]);
        assert_eq!(schedule(5), vec![5]);
        assert_eq!(schedule(1000), vec![20, 120, 600, 1000]);
        assert_eq!(schedule(100_000), vec![20, 120, 600, 2400, 7200, 14_400, 28_800, 57_600, 100_000]);
        assert!(schedule(0).is_empty());
    }

    #[test]
    fn last_is_target_and_sequence_increases() {
        for target in 1..2_000 {
            let checkpoints = schedule(target);
            assert_eq!(checkpoints.last(), Some(&target));
            assert!(checkpoints.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn restart_by_clone() {
        let checkpoints = Checkpoints::new(500);
        let first: Vec<u64> = checkpoints.clone().collect();
        let second: Vec<u64> = checkpoints.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn deltas_sum_to_target() {
        assert_eq!(deltas(100), vec![20, 80]);
        assert_eq!(deltas(1000).iter().sum::<u64>(), 1000);
    }
}
