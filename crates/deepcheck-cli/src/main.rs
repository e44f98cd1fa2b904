use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use deepcheck_core::{shared_detector, DetectionReport, DetectorConfig, Device, SessionOptions, DEFAULT_MAX_FRAMES};
use std::path::{Path, PathBuf};

// D-Bus proxy for deepcheckd. `#[zbus::proxy]` generates `DeepcheckProxy`.
#[zbus::proxy(
    interface = "org.deepcheck.Detector1",
    default_service = "org.deepcheck.Detector1",
    default_path = "/org/deepcheck/Detector1"
)]
trait Deepcheck {
    async fn detect_image(&self, path: &str) -> zbus::Result<String>;
    async fn detect_video(&self, path: &str, max_frames: u32) -> zbus::Result<String>;
    async fn history(&self, limit: u32) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "deepcheck", about = "Deepfake detection for images and videos")]
struct Cli {
    /// Run detection in-process instead of asking deepcheckd
    #[arg(long, global = true)]
    local: bool,

    /// Model directory for --local (default: $XDG_DATA_HOME/deepcheck/models)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Execution device for --local: cpu or cuda
    #[arg(long, global = true, default_value = "cpu")]
    device: Device,

    /// Classify whole images without face localization (--local only)
    #[arg(long, global = true)]
    no_face_detection: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an image file
    Image {
        /// Path to the image
        path: PathBuf,
    },
    /// Classify a video (mp4/mov/webm/..., animated GIF or directory of frames)
    Video {
        /// Path to the video
        path: PathBuf,
        /// Number of frames to sample
        #[arg(short, long, default_value_t = DEFAULT_MAX_FRAMES)]
        max_frames: usize,
    },
    /// Show recent scans recorded by the daemon
    History {
        /// Number of scans to show
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let output = if cli.local {
        run_local(&cli)?
    } else {
        run_remote(&cli).await?
    };

    println!("{output}");
    Ok(())
}

/// Run the pipeline inside this process.
fn run_local(cli: &Cli) -> Result<String> {
    let config = DetectorConfig {
        model_dir: cli
            .model_dir
            .clone()
            .unwrap_or_else(deepcheck_core::default_model_dir),
        session: SessionOptions {
            device: cli.device,
            ..SessionOptions::default()
        },
        face_detection: !cli.no_face_detection,
    };

    let report: DetectionReport = match &cli.command {
        Commands::Image { path } => {
            let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            shared_detector(&config)?.detect_image(&bytes)?
        }
        Commands::Video { path, max_frames } => {
            let mut source = deepcheck_media::open_video(path)?;
            shared_detector(&config)?.detect_video(source.as_mut(), *max_frames)?
        }
        Commands::History { .. } | Commands::Status => {
            bail!("history and status need the daemon; drop --local")
        }
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

/// Forward the command to deepcheckd over the session bus.
async fn run_remote(cli: &Cli) -> Result<String> {
    let conn = zbus::Connection::session()
        .await
        .context("connecting to the D-Bus session bus")?;
    let proxy = DeepcheckProxy::new(&conn).await?;

    let reply = match &cli.command {
        Commands::Image { path } => proxy.detect_image(&absolute(path)?).await?,
        Commands::Video { path, max_frames } => {
            let max_frames = u32::try_from(*max_frames).context("--max-frames is too large")?;
            proxy.detect_video(&absolute(path)?, max_frames).await?
        }
        Commands::History { limit } => proxy.history(*limit).await?,
        Commands::Status => proxy.status().await?,
    };

    pretty(&reply)
}

/// The daemon resolves paths against its own working directory.
fn absolute(path: &Path) -> Result<String> {
    let path = std::fs::canonicalize(path).with_context(|| format!("cannot open {}", path.display()))?;
    Ok(path.to_string_lossy().into_owned())
}

fn pretty(json: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(json).context("daemon returned invalid JSON")?;
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_video_defaults() {
        let cli = Cli::parse_from(["deepcheck", "video", "clip.gif"]);
        match cli.command {
            Commands::Video { max_frames, .. } => assert_eq!(max_frames, DEFAULT_MAX_FRAMES),
            _ => panic!("expected video command"),
        }
        assert!(!cli.local);
        assert_eq!(cli.device, Device::Cpu);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["deepcheck", "image", "a.png", "--local", "--device", "cuda"]);
        assert!(cli.local);
        assert_eq!(cli.device, Device::Cuda);
    }

    #[test]
    fn test_local_history_rejected() {
        let cli = Cli::parse_from(["deepcheck", "--local", "history"]);
        assert!(run_local(&cli).is_err());
    }

    #[test]
    fn test_pretty_rejects_garbage() {
        assert!(pretty("{\"label\":\"REAL\"}").is_ok());
        assert!(pretty("not json").is_err());
    }
}
