use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use video_engine::{
    EditTimeline, Engine, EngineConfig, EngineError, EngineErrorKind, ExportOutcome,
    ExportRequest, MediaReference, OutputTarget,
};

#[derive(Parser)]
#[command(
    name = "video-cli",
    version,
    about = "Extract cover frames and export edited videos"
)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract a cover frame as PNG
    Cover {
        path: String,
        /// Frame time in seconds; non-positive selects the default
        #[arg(short, long, default_value_t = 0.0)]
        seconds: f64,
        /// Where to move the generated PNG
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render an edit timeline to MP4
    Export {
        path: String,
        /// Timeline JSON, or @file to read it from disk
        #[arg(short, long)]
        timeline: String,
        /// Target video bitrate in bits per second
        #[arg(short, long)]
        bitrate: i64,
        /// Destination MP4; must not exist yet
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the normalized timeline and dropped sections
    Plan {
        /// Timeline JSON, or @file to read it from disk
        timeline: String,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Engine(err)) => {
            eprintln!("error [{}]: {err}", err.code());
            match err.kind() {
                EngineErrorKind::Cancelled => ExitCode::from(130),
                EngineErrorKind::InvalidArgument => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
        Err(CliError::Input(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

enum CliError {
    Engine(EngineError),
    Input(String),
}

impl From<EngineError> for CliError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Command::Plan { timeline } = &cli.command {
        let parsed = EditTimeline::from_json(&read_timeline(timeline)?);
        let rendered = serde_json::to_string_pretty(&parsed)
            .map_err(|err| CliError::Input(format!("failed to render plan: {err}")))?;
        println!("{rendered}");
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "loading engine configuration");
            EngineConfig::load(path)?
        }
        None => EngineConfig::default(),
    };
    let engine = Arc::new(Engine::with_ffmpeg(config)?);
    install_cancel_handler(&engine);

    let result = match cli.command {
        Command::Cover {
            path,
            seconds,
            output,
        } => cover(&engine, &path, seconds, output.as_deref()),
        Command::Export {
            path,
            timeline,
            bitrate,
            output,
        } => export(&engine, &path, &timeline, bitrate, output),
        Command::Plan { .. } => Ok(()),
    };
    engine.dispose();
    result
}

fn install_cancel_handler(engine: &Arc<Engine>) {
    let engine = Arc::clone(engine);
    let installed = ctrlc::set_handler(move || {
        eprintln!("interrupt received; cancelling export");
        if let Err(err) = engine.cancel_export() {
            warn!(error = %err, "failed to cancel export");
        }
    });
    if let Err(err) = installed {
        warn!(error = %err, "failed to install Ctrl-C handler");
    }
}

fn cover(engine: &Engine, path: &str, seconds: f64, output: Option<&Path>) -> Result<(), CliError> {
    let generated = engine.generate_cover_image(path, seconds)?;
    let final_path = match output {
        Some(target) => move_file(&generated, target)?,
        None => generated,
    };
    println!("{}", final_path.display());
    Ok(())
}

fn export(
    engine: &Engine,
    path: &str,
    timeline: &str,
    bitrate: i64,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let timeline_json = read_timeline(timeline)?;
    let ticket = match output {
        None => engine.start_export(path, &timeline_json, bitrate)?,
        Some(target) => {
            let target_bitrate_bps = u32::try_from(bitrate)
                .ok()
                .filter(|bps| *bps > 0)
                .ok_or_else(|| CliError::Input("bitrate must be a positive 32-bit value".into()))?;
            let parsed = EditTimeline::from_json(&timeline_json);
            for diagnostic in &parsed.diagnostics {
                eprintln!("ignored {}: {}", diagnostic.field, diagnostic.reason);
            }
            engine.submit_export(ExportRequest {
                source: MediaReference::parse(path),
                timeline: parsed.timeline,
                target_bitrate_bps,
                output: OutputTarget::Path(target),
            })?
        }
    };
    for diagnostic in ticket.diagnostics() {
        eprintln!("ignored {}: {}", diagnostic.field, diagnostic.reason);
    }
    info!(job_id = ticket.handle().id(), "export running");

    match ticket.wait_outcome() {
        ExportOutcome::Completed(path) => {
            println!("{}", path.display());
            Ok(())
        }
        ExportOutcome::Failed(err) => Err(err.into()),
        ExportOutcome::Cancelled => Err(EngineError::Cancelled.into()),
    }
}

fn read_timeline(argument: &str) -> Result<Value, CliError> {
    let raw = match argument.strip_prefix('@') {
        Some(file) => fs::read_to_string(file)
            .map_err(|err| CliError::Input(format!("failed to read {file}: {err}")))?,
        None => argument.to_string(),
    };
    serde_json::from_str(&raw).map_err(|err| CliError::Input(format!("invalid timeline JSON: {err}")))
}

fn move_file(from: &Path, to: &Path) -> Result<PathBuf, CliError> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)
            .and_then(|_| fs::remove_file(from))
            .map_err(|err| CliError::Input(format!("failed to write {}: {err}", to.display())))?;
    }
    Ok(to.to_path_buf())
}
