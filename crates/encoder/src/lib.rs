pub mod config;
pub mod engine;
pub mod error;
pub mod eta;
pub mod paths;
pub mod process;
pub mod render;
pub mod sampler;
pub mod supervisor;

pub use config::{EncoderConfig, SupervisorConfig};
pub use engine::{CreateInfo, EncoderStatus, Encoding, Engine, JobHandle, OperationResult, PixelFormat, ProgressSample};
pub use error::{EncodeError, EncodeResult, ErrorKind};
pub use process::ProcessEngine;
pub use render::{ProgressSink, TerminalSink};
pub use supervisor::{EncodeReport, EncodeRequest, JobSupervisor, Notice};
