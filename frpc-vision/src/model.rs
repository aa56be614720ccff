use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};

pub const DETECTOR_MODEL_FILE: &str = "face_detection_yunet_2023mar.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "face_recognition_sface_2021dec.onnx";

/// Locations of the two ONNX models the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    /// Default file names resolved inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::with_names(dir, DETECTOR_MODEL_FILE, RECOGNIZER_MODEL_FILE)
    }

    pub fn with_names(dir: &Path, detector: &str, recognizer: &str) -> Self {
        Self {
            detector: dir.join(detector),
            recognizer: dir.join(recognizer),
        }
    }

    /// First model file that is not present on disk.
    pub fn first_missing(&self) -> Option<&Path> {
        [&self.detector, &self.recognizer]
            .into_iter()
            .find(|p| !p.is_file())
            .map(PathBuf::as_path)
    }
}

/// Session builder bound to `device`. Without an accelerator feature every
/// device index runs on the CPU provider.
pub fn session_builder(device: u8) -> Result<SessionBuilder> {
    #[allow(unused_mut)]
    let mut builder =
        Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort::Error::<()>::from)?;
    log::debug!("building onnx session for device {}", device);

    #[cfg(feature = "openvino")]
    {
        use ort::ep::{self, ExecutionProvider};
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        use ort::ep::{self, ExecutionProvider};
        let ep = ep::CUDA::default().with_device_id(i32::from(device));
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

fn load_session(path: &Path, device: u8, kind: &str) -> Result<Session> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading {} model {}", kind, path.display()))?;
    session_builder(device)?
        .commit_from_memory(&bytes)
        .with_context(|| format!("load {} model", kind))
}

pub fn detector_session(paths: &ModelPaths, device: u8) -> Result<Session> {
    load_session(&paths.detector, device, "detector")
}

pub fn recog_session(paths: &ModelPaths, device: u8) -> Result<Session> {
    load_session(&paths.recognizer, device, "recognition")
}
