use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use crate::config::SupervisorConfig;
use crate::engine::{CreateInfo, EncoderStatus, Encoding, Engine, JobHandle, OperationResult, PixelFormat, ProgressSample};
use crate::error::{EncodeError, EncodeResult};
use crate::eta::EtaEstimator;
use crate::paths::{self, ResolvedOutputDir};
use crate::render::{render, ProgressSink};
use crate::sampler;

/// One slide to encode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    pub source: PathBuf,
    /// Output directory; the source's directory is used when missing or invalid
    pub output_dir: Option<PathBuf>,
    pub encoding: Encoding,
    pub pixel_format: PixelFormat,
    pub strip_metadata: bool,
}

impl EncodeRequest {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_dir: None,
            encoding: Encoding::default(),
            pixel_format: PixelFormat::default(),
            strip_metadata: false,
        }
    }
}

/// Informational events raised during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    OutputDirectorySubstituted {
        requested: Option<PathBuf>,
        resolved: PathBuf,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::OutputDirectorySubstituted { resolved, .. } => write!(
                f,
                "No destination or invalid directory provided. Selecting source directory instead: {}",
                resolved.display()
            ),
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeReport {
    pub output_path: PathBuf,
    pub output_dir: PathBuf,
    pub notices: Vec<Notice>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Owns the lifecycle of one encode job at a time.
///
/// Creates the job, dispatches it, samples it every `poll_interval` while it is
/// active, and interrupts it on every failure path before reporting.
pub struct JobSupervisor<E: Engine, S: ProgressSink> {
    engine: E,
    sink: S,
    config: SupervisorConfig,
}

impl<E: Engine, S: ProgressSink> JobSupervisor<E, S> {
    pub fn new(engine: E, sink: S, config: SupervisorConfig) -> Self {
        Self { engine, sink, config }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Encode one slide, with no way to cancel other than dropping the future.
    pub async fn run(&mut self, request: &EncodeRequest) -> EncodeResult<EncodeReport> {
        self.run_until(request, std::future::pending::<()>()).await
    }

    /// Encode one slide; if `cancel` resolves first the job is interrupted and
    /// the run fails with [`EncodeError::Cancelled`].
    pub async fn run_until<F>(&mut self, request: &EncodeRequest, cancel: F) -> EncodeResult<EncodeReport>
    where
        F: Future<Output = ()>,
    {
        let outcome = encode(&mut self.engine, &mut self.sink, &self.config, request, cancel).await;
        match &outcome {
            Ok(report) => {
                info!(
                    "✅ Slide encoded in {:.1}s: {}",
                    report.elapsed.as_secs_f64(),
                    report.output_path.display()
                );
                self.sink.message(&format!(
                    "Iris Encoder completed successfully\nSlide written to {}",
                    report.output_path.display()
                ));
            }
            Err(e) => {
                error!("❌ Encoding {} failed ({:?}): {}", request.source.display(), e.kind(), e);
                self.sink.message(&format!("Encoder raised exception: {}", e));
            }
        }
        outcome
    }
}

async fn encode<E, S, F>(
    engine: &mut E,
    sink: &mut S,
    config: &SupervisorConfig,
    request: &EncodeRequest,
    cancel: F,
) -> EncodeResult<EncodeReport>
where
    E: Engine,
    S: ProgressSink,
    F: Future<Output = ()>,
{
    paths::check_source(&request.source)?;

    let mut notices = Vec::new();
    let resolved = paths::resolve_output_dir(&request.source, request.output_dir.as_deref());
    if let ResolvedOutputDir::Substituted { requested, .. } = &resolved {
        let notice = Notice::OutputDirectorySubstituted {
            requested: requested.clone(),
            resolved: resolved.path().to_path_buf(),
        };
        info!("{}", notice);
        sink.message(&notice.to_string());
        notices.push(notice);
    }
    let output_dir = resolved.path().to_path_buf();
    let output_path = paths::slide_output_path(&request.source, &output_dir);

    let info = CreateInfo {
        source: request.source.clone(),
        output_dir: output_dir.clone(),
        encoding: request.encoding,
        pixel_format: request.pixel_format,
        strip_metadata: request.strip_metadata,
    };
    // no handle means no job: nothing to interrupt
    let handle = engine.create_encoder(&info).ok_or_else(|| EncodeError::CreationFailed {
        source_path: request.source.clone(),
    })?;
    let mut job = ActiveJob::new(engine, handle);

    let dispatched = job.dispatch();
    if !dispatched.ok {
        job.abort();
        return Err(EncodeError::DispatchFailed { message: dispatched.message });
    }
    info!(
        "Dispatched job {}: {} -> {} ({}, {})",
        job.handle, request.source.display(), output_path.display(), request.encoding, request.pixel_format
    );
    sink.message(&format!("Encoding slide file: {}", output_path.display()));

    let started_at = Utc::now();
    let mut estimator = EtaEstimator::new();
    tokio::pin!(cancel);

    loop {
        let (result, sample) = job.sample();
        if !result.ok {
            sink.finish_line();
            job.abort();
            return Err(EncodeError::PollFailed { message: result.message });
        }

        let eta = estimator.update(&sample, estimator.elapsed_secs());
        debug!(
            "Job {} at {:.1}%, about {:.0}s left",
            job.handle,
            estimator.progress() * 100.0,
            eta.total_seconds()
        );
        sink.redraw(&render(estimator.progress(), eta.minutes, eta.seconds, config.bar_width));

        if sample.status != EncoderStatus::Active {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = &mut cancel => {
                sink.finish_line();
                info!("Cancellation requested for job {}", job.handle);
                job.abort();
                return Err(EncodeError::Cancelled);
            }
        }
    }
    sink.finish_line();

    let (result, last) = job.sample();
    if !result.ok {
        job.abort();
        return Err(EncodeError::FinalCheckFailed { message: result.message });
    }
    match last.status {
        EncoderStatus::Complete => {
            job.release();
            Ok(EncodeReport {
                output_path,
                output_dir,
                notices,
                started_at,
                elapsed: estimator.elapsed(),
            })
        }
        EncoderStatus::Error => {
            job.abort();
            Err(EncodeError::EncodingFailed { message: error_message(last) })
        }
        EncoderStatus::Active => {
            job.abort();
            Err(EncodeError::FinalCheckFailed {
                message: "encoder reported active after it had stopped".to_string(),
            })
        }
    }
}

fn error_message(sample: ProgressSample) -> String {
    sample
        .error_message
        .unwrap_or_else(|| "encoder reported an error without a message".to_string())
}

/// Exclusive owner of a live job handle.
///
/// Dropping it while still armed interrupts the job, so abandoning a run
/// (including dropping the run future mid-await) never leaks an active job.
struct ActiveJob<'e, E: Engine> {
    engine: &'e mut E,
    handle: JobHandle,
    armed: bool,
}

impl<'e, E: Engine> ActiveJob<'e, E> {
    fn new(engine: &'e mut E, handle: JobHandle) -> Self {
        Self { engine, handle, armed: true }
    }

    fn dispatch(&mut self) -> OperationResult {
        self.engine.dispatch(&self.handle)
    }

    fn sample(&mut self) -> (OperationResult, ProgressSample) {
        sampler::sample(&mut *self.engine, &self.handle)
    }

    /// Interrupt the job and give up the handle. Interrupt failures are logged, not returned.
    fn abort(mut self) {
        self.interrupt();
    }

    /// Job finished normally; give up the handle without interrupting.
    fn release(mut self) {
        debug!("Releasing job {}", self.handle);
        self.armed = false;
        self.engine.release(&self.handle);
    }

    fn interrupt(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let result = self.engine.interrupt(&self.handle);
        if result.ok {
            info!("Interrupted job {}", self.handle);
        } else {
            warn!("Failed to interrupt job {}: {}", self.handle, result.message);
        }
        self.engine.release(&self.handle);
    }
}

impl<'e, E: Engine> Drop for ActiveJob<'e, E> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Job {} abandoned while active, interrupting", self.handle);
            self.interrupt();
        }
    }
}
