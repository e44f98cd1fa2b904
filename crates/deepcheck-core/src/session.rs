//! ONNX Runtime session construction shared by the locator and classifier.

use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution device, chosen once at startup and never changed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!("unknown device '{other}' (expected cpu or cuda)")),
        }
    }
}

/// Options applied to every session the pipeline loads.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub device: Device,
    pub intra_threads: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            intra_threads: 2,
        }
    }
}

/// Build a session for `model_path`. CUDA falls back to CPU inside ONNX
/// Runtime when the provider is unavailable.
pub(crate) fn build_session(model_path: &str, options: &SessionOptions) -> Result<Session, ort::Error> {
    let builder = Session::builder()?.with_intra_threads(options.intra_threads)?;
    let builder = match options.device {
        Device::Cpu => builder,
        Device::Cuda => builder.with_execution_providers([CUDAExecutionProvider::default().build()])?,
    };
    builder.commit_from_file(model_path)
}
