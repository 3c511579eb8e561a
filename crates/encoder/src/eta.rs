use std::time::{Duration, Instant};
use crate::engine::ProgressSample;

/// Smallest progress value used in the ETA division. Guards the zero case only.
pub const PROGRESS_FLOOR: f64 = 0.001;

/// Remaining time split into whole minutes and fractional seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eta {
    pub minutes: u64,
    pub seconds: f64,
}

impl Eta {
    pub fn total_seconds(&self) -> f64 {
        self.minutes as f64 * 60.0 + self.seconds
    }
}

/// Remaining-time estimator for one job.
///
/// Progress is tracked as a running maximum, so a sample that regresses
/// neither lengthens the ETA nor moves the displayed percentage backwards.
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    start: Instant,
    last_progress: f64,
}

impl EtaEstimator {
    /// Start the clock. Call at dispatch.
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(start: Instant) -> Self {
        Self { start, last_progress: PROGRESS_FLOOR }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// Monotone progress fraction fed to the renderer
    pub fn progress(&self) -> f64 {
        self.last_progress
    }

    /// Fold in a sample and estimate the time left.
    pub fn update(&mut self, sample: &ProgressSample, elapsed_secs: f64) -> Eta {
        let observed = f64::from(sample.progress);
        if observed.is_finite() && observed > self.last_progress {
            self.last_progress = observed.min(1.0);
        }
        remaining(self.last_progress, elapsed_secs)
    }
}

impl Default for EtaEstimator {
    fn default() -> Self {
        Self::new()
    }
}

fn remaining(progress: f64, elapsed_secs: f64) -> Eta {
    let p = progress.max(PROGRESS_FLOOR);
    let elapsed = if elapsed_secs.is_finite() { elapsed_secs.max(0.0) } else { 0.0 };
    let total_estimated = elapsed / p;
    let left = (total_estimated - elapsed).max(0.0);
    let minutes = (left / 60.0).floor();
    Eta {
        minutes: minutes as u64,
        seconds: left - minutes * 60.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_half_done_after_a_minute_leaves_a_minute() {
        let mut est = EtaEstimator::new();
        let eta = est.update(&ProgressSample::active(0.5), 60.0);
        assert_eq!(eta.minutes, 1);
        assert!(eta.seconds.abs() < 1e-9);
    }

    #[test]
    fn test_splits_minutes_and_seconds() {
        let mut est = EtaEstimator::new();
        // 20s elapsed at 12.5% => 140s left
        let eta = est.update(&ProgressSample::active(0.125), 20.0);
        assert_eq!(eta.minutes, 2);
        assert!((eta.seconds - 20.0).abs() < 1e-9);

        let mut est = EtaEstimator::new();
        // 30s elapsed at 25% => 90s left
        let eta = est.update(&ProgressSample::active(0.25), 30.0);
        assert_eq!(eta.minutes, 1);
        assert!((eta.seconds - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_regressing_sample_is_ignored() {
        let mut est = EtaEstimator::new();
        let before = est.update(&ProgressSample::active(0.5), 20.0);
        let after = est.update(&ProgressSample::active(0.25), 20.0);
        assert_eq!(before, after);
        assert_eq!(est.progress(), 0.5);
    }

    #[test]
    fn test_elapsed_counts_from_start() {
        let Some(start) = Instant::now().checked_sub(Duration::from_secs(5)) else {
            return;
        };
        let est = EtaEstimator::started_at(start);
        assert!(est.elapsed() >= Duration::from_secs(5));
        assert!(est.elapsed_secs() >= 5.0);
    }

    #[test]
    fn test_complete_leaves_nothing() {
        let mut est = EtaEstimator::new();
        let eta = est.update(&ProgressSample::complete(), 500.0);
        assert_eq!(eta.total_seconds(), 0.0);
        assert_eq!(est.progress(), 1.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Zero progress never divides by zero and never goes negative
        #[test]
        fn test_zero_progress_is_finite(elapsed in 0.0f64..1_000_000.0) {
            let mut est = EtaEstimator::new();
            let eta = est.update(&ProgressSample::active(0.0), elapsed);
            prop_assert!(eta.total_seconds().is_finite());
            prop_assert!(eta.total_seconds() >= 0.0);
            prop_assert!(eta.seconds >= 0.0 && eta.seconds < 60.0);
        }

        /// More progress in the same elapsed time means less time left
        #[test]
        fn test_remaining_decreases_with_progress(
            p1 in 0.001f32..0.99,
            step in 0.001f32..0.5,
            elapsed in 1.0f64..100_000.0,
        ) {
            let p2 = (p1 + step).min(1.0);
            let first = EtaEstimator::new().update(&ProgressSample::active(p1), elapsed);
            let second = EtaEstimator::new().update(&ProgressSample::active(p2), elapsed);
            prop_assert!(first.total_seconds() >= 0.0);
            prop_assert!(second.total_seconds() >= 0.0);
            prop_assert!(
                second.total_seconds() < first.total_seconds(),
                "progress {} -> {} gave {} -> {}",
                p1, p2, first.total_seconds(), second.total_seconds()
            );
        }
    }
}
