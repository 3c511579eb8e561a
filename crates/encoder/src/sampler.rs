use log::debug;
use crate::engine::{Engine, JobHandle, OperationResult, ProgressSample};

/// Query the engine for a job's current progress.
///
/// Stateless; the only normalization is forcing `progress` into [0, 1]
/// (non-finite values become 0).
pub fn sample<E: Engine + ?Sized>(engine: &mut E, job: &JobHandle) -> (OperationResult, ProgressSample) {
    let (result, mut sample) = engine.poll_progress(job);
    sample.progress = normalize_progress(sample.progress);
    debug!(
        "Sampled job {}: ok={} status={:?} progress={:.4}",
        job, result.ok, sample.status, sample.progress
    );
    (result, sample)
}

pub(crate) fn normalize_progress(progress: f32) -> f32 {
    if progress.is_finite() {
        progress.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CreateInfo, EncoderStatus};

    struct FixedEngine(f32);

    impl Engine for FixedEngine {
        fn create_encoder(&mut self, _info: &CreateInfo) -> Option<JobHandle> {
            Some(JobHandle::new())
        }
        fn dispatch(&mut self, _job: &JobHandle) -> OperationResult {
            OperationResult::success()
        }
        fn poll_progress(&mut self, _job: &JobHandle) -> (OperationResult, ProgressSample) {
            (OperationResult::success(), ProgressSample::active(self.0))
        }
        fn interrupt(&mut self, _job: &JobHandle) -> OperationResult {
            OperationResult::success()
        }
    }

    #[test]
    fn test_sample_passes_through_in_range_progress() {
        let mut engine = FixedEngine(0.42);
        let (result, sample) = sample(&mut engine, &JobHandle::new());
        assert!(result.ok);
        assert_eq!(sample.status, EncoderStatus::Active);
        assert_eq!(sample.progress, 0.42);
    }

    #[test]
    fn test_sample_clamps_out_of_range_progress() {
        assert_eq!(sample(&mut FixedEngine(1.7), &JobHandle::new()).1.progress, 1.0);
        assert_eq!(sample(&mut FixedEngine(-0.2), &JobHandle::new()).1.progress, 0.0);
        assert_eq!(sample(&mut FixedEngine(f32::NAN), &JobHandle::new()).1.progress, 0.0);
    }
}
