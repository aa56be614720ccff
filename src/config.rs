use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::status::{EngineError, EngineResult};
use crate::types::TemplateRole;
use frpc_vision::model::{DETECTOR_MODEL_FILE, RECOGNIZER_MODEL_FILE};
use frpc_vision::{ModelPaths, PipelineOptions};

/// Name of the engine settings file inside the configuration directory.
pub static CONFIG_FILE_NAME: Lazy<&'static str> =
    Lazy::new(|| option_env!("FRPC_CONFIG_FILE").unwrap_or("frpc.toml"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Detector model file name, relative to the configuration directory.
    pub detector_model: String,
    /// Recognition model file name, relative to the configuration directory.
    pub recognizer_model: String,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub enrollment_min_score: f32,
    pub verification_min_score: f32,
    /// Images with a shorter side are refused.
    pub min_image_side: u16,
    /// Number of logical devices `set_gpu` accepts.
    pub gpu_devices: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detector_model: DETECTOR_MODEL_FILE.to_string(),
            recognizer_model: RECOGNIZER_MODEL_FILE.to_string(),
            score_threshold: 0.6,
            nms_threshold: 0.3,
            enrollment_min_score: 0.8,
            verification_min_score: 0.6,
            min_image_side: 32,
            gpu_devices: 1,
        }
    }
}

impl EngineConfig {
    pub fn model_paths(&self, config_dir: &Path) -> ModelPaths {
        ModelPaths::with_names(config_dir, &self.detector_model, &self.recognizer_model)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
        }
    }

    /// Minimum detection score a template of `role` must reach.
    pub fn quality_gate(&self, role: TemplateRole) -> f32 {
        match role {
            TemplateRole::Enrollment => self.enrollment_min_score,
            TemplateRole::Verification => self.verification_min_score,
        }
    }

    fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("score_threshold", self.score_threshold),
            ("nms_threshold", self.nms_threshold),
            ("enrollment_min_score", self.enrollment_min_score),
            ("verification_min_score", self.verification_min_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.gpu_devices == 0 {
            return Err("gpu_devices must be at least 1".to_string());
        }
        if self.detector_model.is_empty() || self.recognizer_model.is_empty() {
            return Err("model file names must not be empty".to_string());
        }
        Ok(())
    }
}

/// Check that `config_dir` is a readable directory.
pub fn check_config_dir(config_dir: &Path) -> EngineResult<()> {
    let meta = std::fs::metadata(config_dir).map_err(|source| EngineError::ConfigDir {
        path: config_dir.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(EngineError::ConfigNotDir(config_dir.to_path_buf()));
    }
    std::fs::read_dir(config_dir).map_err(|source| EngineError::ConfigDir {
        path: config_dir.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Load the engine settings from `config_dir`. A missing settings file means
/// defaults.
pub fn load_config(config_dir: &Path) -> EngineResult<EngineConfig> {
    check_config_dir(config_dir)?;
    let path = config_dir.join(*CONFIG_FILE_NAME);
    if !path.exists() {
        log::debug!("no {} in {}, using defaults", *CONFIG_FILE_NAME, config_dir.display());
        return Ok(EngineConfig::default());
    }
    let raw = std::fs::read_to_string(&path).map_err(|source| EngineError::ConfigRead {
        path: path.clone(),
        source,
    })?;
    let cfg: EngineConfig = toml::from_str(&raw).map_err(|e| EngineError::ConfigParse {
        path: path.clone(),
        message: e.to_string(),
    })?;
    cfg.validate()
        .map_err(|message| EngineError::ConfigParse { path, message })?;
    Ok(cfg)
}

/// Write `cfg` into `config_dir`, used by the driver to scaffold a directory.
pub fn save_config(cfg: &EngineConfig, config_dir: &Path) -> anyhow::Result<()> {
    let data = toml::to_string_pretty(cfg)?;
    std::fs::create_dir_all(config_dir)?;
    std::fs::write(config_dir.join(*CONFIG_FILE_NAME), data)?;
    Ok(())
}
