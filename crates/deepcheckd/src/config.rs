use anyhow::Context;
use deepcheck_core::{DetectorConfig, Device, SessionOptions, DEFAULT_MAX_FRAMES};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration.
///
/// Values come from an optional TOML file named by `DEEPCHECK_CONFIG`,
/// overridden by `DEEPCHECK_*` environment variables, then defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite scan history database.
    pub db_path: PathBuf,
    /// Execution device for both models.
    pub device: Device,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    /// Frames sampled per video when the caller passes 0.
    pub max_frames: usize,
    /// Whether to localize faces before classification.
    pub face_detection: bool,
}

/// On-disk shape of the TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub model_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub device: Option<Device>,
    pub intra_threads: Option<usize>,
    pub max_frames: Option<usize>,
    pub face_detection: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let file = match std::env::var("DEEPCHECK_CONFIG") {
            Ok(path) => FileConfig::read(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    /// Merge file values and environment lookups over the defaults.
    pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = env("DEEPCHECK_MODEL_DIR")
            .map(PathBuf::from)
            .or(file.model_dir)
            .unwrap_or_else(deepcheck_core::default_model_dir);

        let db_path = env("DEEPCHECK_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| default_data_dir(&env).join("history.db"));

        let device = match env("DEEPCHECK_DEVICE").map(|v| v.parse::<Device>()) {
            Some(Ok(device)) => device,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring DEEPCHECK_DEVICE");
                file.device.unwrap_or_default()
            }
            None => file.device.unwrap_or_default(),
        };

        Self {
            model_dir,
            db_path,
            device,
            intra_threads: parsed(&env, "DEEPCHECK_INTRA_THREADS")
                .or(file.intra_threads)
                .unwrap_or(2),
            max_frames: parsed(&env, "DEEPCHECK_MAX_FRAMES")
                .or(file.max_frames)
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_FRAMES),
            face_detection: env("DEEPCHECK_FACE_DETECTION")
                .map(|v| v != "0")
                .or(file.face_detection)
                .unwrap_or(true),
        }
    }

    /// Settings handed to the core when the shared detector is built.
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            model_dir: self.model_dir.clone(),
            session: SessionOptions {
                device: self.device,
                intra_threads: self.intra_threads,
            },
            face_detection: self.face_detection,
        }
    }
}

fn default_data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("deepcheck")
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.parse().ok())
}
