use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::{bail, Context, Result};
use clap::Parser;
use encoder::{
    EncodeRequest, EncoderConfig, Encoding, JobSupervisor, PixelFormat, ProcessEngine, TerminalSink,
};
use log::{debug, info, warn};

/// Encode whole slide image files into the Iris file format (.iris)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source slide file (same as --source)
    #[arg(value_name = "SOURCE", conflicts_with = "source")]
    source_positional: Option<PathBuf>,

    /// File path to the source WSI file
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Output directory; <outdir>/<slide name>.iris is written. Defaults to the source's directory
    #[arg(short, long)]
    outdir: Option<PathBuf>,

    /// Tile encoding: IRIS, JPEG or AVIF
    #[arg(short, long)]
    encoding: Option<Encoding>,

    /// Pixel format: B8G8R8, R8G8B8, B8G8R8A8 or R8G8B8A8
    #[arg(short, long)]
    format: Option<PixelFormat>,

    /// Strip patient identifiers from the encoded metadata
    #[arg(long, visible_alias = "strip_metadata")]
    strip_metadata: bool,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise warnings only, so logs stay out of the progress line
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();

    let cfg = EncoderConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    debug!("Configuration loaded: {:?}", cfg);

    let Some(source) = args.source_positional.or(args.source) else {
        bail!("Encoder requires at least an input file path of source slide file");
    };

    let columns = match crossterm::terminal::size() {
        Ok((cols, _rows)) => Some(cols),
        Err(e) => {
            debug!("Terminal width unavailable ({}), using fallback bar width", e);
            None
        }
    };
    let supervisor_cfg = cfg.supervisor_config(columns);

    let request = EncodeRequest {
        source,
        output_dir: args.outdir,
        encoding: args.encoding.unwrap_or(cfg.default_encoding),
        pixel_format: args.format.unwrap_or(cfg.default_pixel_format),
        strip_metadata: args.strip_metadata,
    };
    info!(
        "Encoding {} with {} / {} using {}",
        request.source.display(),
        request.encoding,
        request.pixel_format,
        cfg.encoder_bin.display()
    );

    let mut supervisor = JobSupervisor::new(
        ProcessEngine::from_config(&cfg),
        TerminalSink::stdout(),
        supervisor_cfg,
    );
    let outcome = supervisor.run_until(&request, interrupted()).await;

    // the supervisor has already printed the outcome
    Ok(match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    })
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
