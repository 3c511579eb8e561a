use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use uuid::Uuid;
use crate::config::EncoderConfig;
use crate::engine::{CreateInfo, Engine, JobHandle, OperationResult, ProgressSample};
use crate::sampler::normalize_progress;

/// Number of stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// How long output readers may keep draining after the encoder exits
const READER_GRACE: Duration = Duration::from_secs(2);

/// Longest unterminated stdout segment kept for progress parsing
const MAX_SEGMENT_BYTES: usize = 4096;

/// Engine that runs each job as a standalone encoder process.
///
/// Progress is scraped from the `NN.N%` figures the encoder prints on stdout;
/// the exit status decides between complete and error. Must be used from
/// inside a tokio runtime. Jobs are forgotten once released.
pub struct ProcessEngine {
    encoder_bin: PathBuf,
    launcher: Vec<String>,
    pixel_format_arg: Option<String>,
    jobs: HashMap<Uuid, ProcessJob>,
}

struct ProcessJob {
    args: Vec<String>,
    state: JobState,
    progress: Arc<Mutex<f32>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    readers: Vec<JoinHandle<()>>,
}

impl ProcessJob {
    fn readers_done(&self) -> bool {
        self.readers.iter().all(|r| r.is_finished())
    }
}

enum JobState {
    Created,
    Running(Child),
    /// Process gone, output readers still draining
    Exited { status: ExitStatus, at: Instant },
    Finished(ProgressSample),
}

impl ProcessEngine {
    pub fn new(encoder_bin: impl Into<PathBuf>) -> Self {
        Self {
            encoder_bin: encoder_bin.into(),
            launcher: Vec::new(),
            pixel_format_arg: None,
            jobs: HashMap::new(),
        }
    }

    pub fn from_config(cfg: &EncoderConfig) -> Self {
        let mut engine = Self::new(cfg.encoder_bin.clone()).with_launcher(cfg.launcher.clone());
        engine.pixel_format_arg = cfg.pixel_format_arg.clone();
        engine
    }

    /// Run the encoder through another program, e.g. `["nice", "-n", "10"]`
    pub fn with_launcher<I, A>(mut self, launcher: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.launcher = launcher.into_iter().map(Into::into).collect();
        self
    }

    /// Command-line arguments for a job
    pub fn build_args(&self, info: &CreateInfo) -> Vec<String> {
        let mut args = vec![
            "--source".to_string(),
            info.source.display().to_string(),
            "--outdir".to_string(),
            info.output_dir.display().to_string(),
            "--encoding".to_string(),
            info.encoding.to_string(),
        ];
        if info.strip_metadata {
            args.push("--strip_metadata".to_string());
        }
        if let Some(flag) = &self.pixel_format_arg {
            args.push(flag.clone());
            args.push(info.pixel_format.to_string());
        }
        args
    }

    fn spawn(&self, job: &ProcessJob) -> std::io::Result<(Child, Vec<JoinHandle<()>>)> {
        let mut cmd = match self.launcher.split_first() {
            Some((program, prefix)) => {
                let mut cmd = Command::new(program);
                cmd.args(prefix).arg(&self.encoder_bin);
                cmd
            }
            None => Command::new(&self.encoder_bin),
        };
        let mut child = cmd
            .args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(track_progress(stdout, job.progress.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(keep_stderr_tail(stderr, job.stderr_tail.clone())));
        }
        Ok((child, readers))
    }
}

impl Engine for ProcessEngine {
    fn create_encoder(&mut self, info: &CreateInfo) -> Option<JobHandle> {
        if self.encoder_bin.as_os_str().is_empty() {
            warn!("No encoder executable configured");
            return None;
        }
        let handle = JobHandle::new();
        let args = self.build_args(info);
        debug!("Created job {}: {} {}", handle, self.encoder_bin.display(), args.join(" "));
        self.jobs.insert(
            handle.id(),
            ProcessJob {
                args,
                state: JobState::Created,
                progress: Arc::new(Mutex::new(0.0)),
                stderr_tail: Arc::new(Mutex::new(VecDeque::new())),
                readers: Vec::new(),
            },
        );
        Some(handle)
    }

    fn dispatch(&mut self, job: &JobHandle) -> OperationResult {
        let Some(entry) = self.jobs.get(&job.id()) else {
            return OperationResult::failure(format!("unknown job {}", job));
        };
        if !matches!(entry.state, JobState::Created) {
            return OperationResult::failure(format!("job {} was already dispatched", job));
        }
        match self.spawn(entry) {
            Ok((child, readers)) => {
                info!("Started {} for job {} (pid {:?})", self.encoder_bin.display(), job, child.id());
                if let Some(entry) = self.jobs.get_mut(&job.id()) {
                    entry.state = JobState::Running(child);
                    entry.readers = readers;
                }
                OperationResult::success()
            }
            Err(e) => OperationResult::failure(format!(
                "Failed to start encoder at {}: {}",
                self.encoder_bin.display(),
                e
            )),
        }
    }

    fn poll_progress(&mut self, job: &JobHandle) -> (OperationResult, ProgressSample) {
        let Some(entry) = self.jobs.get_mut(&job.id()) else {
            return (
                OperationResult::failure(format!("unknown job {}", job)),
                ProgressSample::active(0.0),
            );
        };
        let progress = read_progress(&entry.progress);
        let drained = entry.readers_done();

        let (exit, exited_at) = match &mut entry.state {
            JobState::Created => {
                return (
                    OperationResult::failure(format!("job {} has not been dispatched", job)),
                    ProgressSample::active(0.0),
                )
            }
            JobState::Finished(sample) => return (OperationResult::success(), sample.clone()),
            JobState::Exited { status, at } => (*status, Some(*at)),
            JobState::Running(child) => match child.try_wait() {
                Ok(None) => return (OperationResult::success(), ProgressSample::active(progress)),
                Ok(Some(status)) => (status, None),
                Err(e) => {
                    return (
                        OperationResult::failure(format!("Failed to query encoder process: {}", e)),
                        ProgressSample::active(progress),
                    )
                }
            },
        };

        // the exit message needs everything the encoder wrote to stderr
        match exited_at {
            None if !drained => {
                entry.state = JobState::Exited { status: exit, at: Instant::now() };
                return (OperationResult::success(), ProgressSample::active(progress));
            }
            Some(at) if !drained && at.elapsed() < READER_GRACE => {
                return (OperationResult::success(), ProgressSample::active(progress));
            }
            Some(_) if !drained => {
                warn!("Output of job {} still open {:?} after exit", job, READER_GRACE);
            }
            _ => {}
        }

        let sample = if exit.success() {
            ProgressSample::complete()
        } else {
            let tail = entry
                .stderr_tail
                .lock()
                .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
                .unwrap_or_default();
            let code = exit.code().map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string());
            if tail.is_empty() {
                ProgressSample::error(progress, format!("encoder exited with status {}", code))
            } else {
                ProgressSample::error(progress, format!("encoder exited with status {}: {}", code, tail))
            }
        };
        debug!("Job {} finished: {:?}", job, sample.status);
        entry.state = JobState::Finished(sample.clone());
        (OperationResult::success(), sample)
    }

    fn interrupt(&mut self, job: &JobHandle) -> OperationResult {
        let Some(entry) = self.jobs.get_mut(&job.id()) else {
            return OperationResult::failure(format!("unknown job {}", job));
        };
        let progress = read_progress(&entry.progress);
        match &mut entry.state {
            JobState::Finished(_) => return OperationResult::success(),
            JobState::Running(child) => {
                if let Err(e) = child.start_kill() {
                    // already exited is fine; anything else is reported
                    if e.kind() != std::io::ErrorKind::InvalidInput {
                        return OperationResult::failure(format!("Failed to kill encoder process: {}", e));
                    }
                }
            }
            JobState::Created | JobState::Exited { .. } => {}
        }
        for reader in &entry.readers {
            reader.abort();
        }
        entry.state = JobState::Finished(ProgressSample::error(progress, "encoder interrupted"));
        OperationResult::success()
    }

    fn release(&mut self, job: &JobHandle) {
        if let Some(entry) = self.jobs.remove(&job.id()) {
            if matches!(entry.state, JobState::Running(_)) {
                warn!("Released job {} while its encoder was still running", job);
            }
            debug!("Forgot job {}", job);
        }
    }
}

fn read_progress(progress: &Mutex<f32>) -> f32 {
    progress.lock().map(|p| *p).unwrap_or(0.0)
}

/// Last `NN.N%` figure in a chunk of encoder output, as a fraction
pub fn parse_progress(text: &str) -> Option<f32> {
    let mut found = None;
    for (idx, _) in text.match_indices('%') {
        let head = &text[..idx];
        let start = head
            .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
            .map(|i| i + 1)
            .unwrap_or(0);
        if let Ok(percent) = head[start..].parse::<f32>() {
            found = Some(normalize_progress(percent / 100.0));
        }
    }
    found
}

async fn track_progress<R: AsyncRead + Unpin>(mut stdout: R, progress: Arc<Mutex<f32>>) {
    // a terminal redraw ends in '\r', a piped or line-buffered one in '\n'
    let mut chunk = [0u8; 1024];
    let mut segment = Vec::new();
    loop {
        let read = match stdout.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &chunk[..read] {
            if byte == b'\r' || byte == b'\n' {
                record_progress(&segment, &progress);
                segment.clear();
            } else {
                segment.push(byte);
            }
        }
        // the current bar stays unterminated until the next redraw
        record_progress(&segment, &progress);
        if segment.len() > MAX_SEGMENT_BYTES {
            let cut = segment.len() - MAX_SEGMENT_BYTES / 2;
            segment.drain(..cut);
        }
    }
}

fn record_progress(segment: &[u8], progress: &Mutex<f32>) {
    if segment.is_empty() {
        return;
    }
    if let Some(p) = parse_progress(&String::from_utf8_lossy(segment)) {
        if let Ok(mut current) = progress.lock() {
            *current = p;
        }
    }
}

async fn keep_stderr_tail<R: AsyncRead + Unpin>(stderr: R, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if let Ok(mut kept) = tail.lock() {
            if kept.len() == STDERR_TAIL_LINES {
                kept.pop_front();
            }
            kept.push_back(line);
        }
    }
}
