//! Face engine: YuNet detection, eye alignment and SFace embeddings, matched
//! by cosine similarity.
//!
//! Models are read from the configuration directory handed to
//! `initialize` (see [`EngineConfig`] for the file names). Inference sessions
//! need exclusive access, so the backend sits behind a mutex; template
//! creation is serialised per engine while matching runs lock-free.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, RwLock};

use image::DynamicImage;

use crate::config::{self, EngineConfig};
use crate::interface::{MatchOutcome, TemplateOutcome, VerifInterface};
use crate::status::{EngineError, EngineResult, ReturnStatus};
use crate::template::{self, TemplateBody, TemplateRecord};
use crate::types::{EyePair, Image, TemplateRole};
use frpc_vision::face::{self, Detection, Embedding};
use frpc_vision::raster::{self, PixelLayout};
use frpc_vision::{Pipeline, PipelineOptions};

/// Detection and encoding backend bound to one device.
pub trait FaceBackend: Send {
    fn device(&self) -> u8;

    fn detect(&mut self, img: &DynamicImage, opts: PipelineOptions) -> anyhow::Result<Vec<Detection>>;

    fn embed(&mut self, img: &DynamicImage, detection: &Detection) -> anyhow::Result<Embedding>;
}

impl FaceBackend for Pipeline {
    fn device(&self) -> u8 {
        Pipeline::device(self)
    }

    fn detect(&mut self, img: &DynamicImage, opts: PipelineOptions) -> anyhow::Result<Vec<Detection>> {
        Pipeline::detect(self, img, opts)
    }

    fn embed(&mut self, img: &DynamicImage, detection: &Detection) -> anyhow::Result<Embedding> {
        Pipeline::embed(self, img, detection)
    }
}

/// Builds a backend for a configuration directory and device.
pub trait BackendLoader: Send + Sync {
    fn load(
        &self,
        config_dir: &Path,
        config: &EngineConfig,
        device: u8,
    ) -> EngineResult<Box<dyn FaceBackend>>;
}

/// Loads the ONNX pipeline from the model files named in the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxLoader;

impl BackendLoader for OnnxLoader {
    fn load(
        &self,
        config_dir: &Path,
        config: &EngineConfig,
        device: u8,
    ) -> EngineResult<Box<dyn FaceBackend>> {
        let models = config.model_paths(config_dir);
        if let Some(missing) = models.first_missing() {
            return Err(EngineError::MissingModel(missing.to_path_buf()));
        }
        let pipeline =
            Pipeline::load(&models, device).map_err(|e| EngineError::ModelLoad(format!("{:#}", e)))?;
        Ok(Box::new(pipeline))
    }
}

#[derive(Debug, Clone)]
struct Ready {
    config_dir: PathBuf,
    config: EngineConfig,
}

/// Map cosine similarity in [-1, 1] onto a score in [0, 1].
pub fn similarity_from_cosine(cosine: f32) -> f64 {
    ((f64::from(cosine) + 1.0) / 2.0).clamp(0.0, 1.0)
}

pub struct FaceEngine {
    loader: Box<dyn BackendLoader>,
    state: RwLock<Option<Ready>>,
    backend: Mutex<Option<Box<dyn FaceBackend>>>,
    selected_gpu: AtomicU8,
}

impl FaceEngine {
    pub fn new() -> Self {
        Self::with_loader(OnnxLoader)
    }

    pub fn with_loader(loader: impl BackendLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            state: RwLock::new(None),
            backend: Mutex::new(None),
            selected_gpu: AtomicU8::new(0),
        }
    }

    pub fn selected_gpu(&self) -> u8 {
        self.selected_gpu.load(Ordering::Acquire)
    }

    /// Devices `set_gpu` accepts: the configured count once initialized.
    pub fn device_count(&self) -> u8 {
        self.state
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|r| r.config.gpu_devices))
            .unwrap_or_else(|| EngineConfig::default().gpu_devices)
    }

    fn ready(&self) -> EngineResult<Ready> {
        let state = self.state.read().map_err(|_| poisoned("state"))?;
        state.clone().ok_or(EngineError::NotInitialized)
    }

    fn try_initialize(&self, config_dir: &Path) -> EngineResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned("state"))?;
        if let Some(ready) = state.as_ref() {
            return Err(EngineError::AlreadyInitialized(ready.config_dir.clone()));
        }

        let config = config::load_config(config_dir)?;
        let device = self.selected_gpu();
        if device >= config.gpu_devices {
            return Err(EngineError::GpuOutOfRange {
                requested: device,
                available: config.gpu_devices,
            });
        }
        let backend = self.loader.load(config_dir, &config, device)?;

        *self.backend.lock().map_err(|_| poisoned("backend"))? = Some(backend);
        *state = Some(Ready {
            config_dir: config_dir.to_path_buf(),
            config,
        });
        Ok(())
    }

    fn try_create(&self, face: &Image, role: TemplateRole) -> EngineResult<(Vec<u8>, EyePair)> {
        face.validate()?;
        let ready = self.ready()?;
        let cfg = &ready.config;

        if face.width.min(face.height) < cfg.min_image_side {
            return Err(EngineError::ImageTooSmall {
                width: face.width,
                height: face.height,
                min_side: cfg.min_image_side,
            });
        }
        let layout = PixelLayout::from_depth(face.depth)
            .ok_or_else(|| EngineError::MalformedImage(format!("depth {}", face.depth)))?;
        let img = raster::to_rgb_image(face.width.into(), face.height.into(), layout, &face.data)
            .map_err(|e| EngineError::MalformedImage(format!("{:#}", e)))?;

        let mut guard = self.backend.lock().map_err(|_| poisoned("backend"))?;
        let backend = guard.as_mut().ok_or(EngineError::NotInitialized)?;

        let detections = backend
            .detect(&img, cfg.pipeline_options())
            .map_err(|e| EngineError::Extraction(format!("{:#}", e)))?;
        let best = face::best_detection(&detections)
            .cloned()
            .ok_or(EngineError::NoFace)?;

        let gate = cfg.quality_gate(role);
        if best.score < gate {
            return Err(EngineError::QualityGate {
                role,
                score: best.score,
                gate,
            });
        }

        let embedding = backend
            .embed(&img, &best)
            .map_err(|e| EngineError::Extraction(format!("{:#}", e)))?;
        drop(guard);

        if embedding.is_empty() || embedding.vector.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::Extraction("degenerate embedding".into()));
        }

        let eyes = EyePair::from_estimates(
            Some(best.left_eye()),
            Some(best.right_eye()),
            face.width,
            face.height,
        );
        log::debug!(
            "{} template: detection score {:.3}, {} features",
            role,
            best.score,
            embedding.len()
        );
        let record = TemplateRecord::new(role, TemplateBody::Features(embedding.to_vec()));
        Ok((record.encode(), eyes))
    }

    fn try_match(&self, verif: &[u8], enroll: &[u8]) -> EngineResult<f64> {
        self.ready()?;
        let inputs = template::decode_pair(verif, enroll)?;

        let probe = features(&inputs.verification.body, "verification")?;
        let reference = features(&inputs.enrollment.body, "enrollment")?;
        if probe.len() != reference.len() {
            return Err(EngineError::TemplateFormat {
                which: "enrollment",
                message: format!(
                    "feature length mismatch: verification has {}, enrollment has {}",
                    probe.len(),
                    reference.len()
                ),
            });
        }

        let cosine = face::match_embedding(
            &Embedding::from_vec(probe.to_vec()),
            &Embedding::from_vec(reference.to_vec()),
        );
        if !cosine.is_finite() {
            return Err(EngineError::TemplateFormat {
                which: "verification",
                message: "non-finite features".into(),
            });
        }
        Ok(similarity_from_cosine(cosine))
    }

    fn try_set_gpu(&self, gpu_num: u8) -> EngineResult<()> {
        let state = self.state.read().map_err(|_| poisoned("state"))?;
        let available = state
            .as_ref()
            .map(|r| r.config.gpu_devices)
            .unwrap_or_else(|| EngineConfig::default().gpu_devices);
        if gpu_num >= available {
            return Err(EngineError::GpuOutOfRange {
                requested: gpu_num,
                available,
            });
        }

        if let Some(ready) = state.as_ref() {
            let mut backend = self.backend.lock().map_err(|_| poisoned("backend"))?;
            let bound = backend.as_ref().map(|b| b.device());
            if bound != Some(gpu_num) {
                let fresh = self
                    .loader
                    .load(&ready.config_dir, &ready.config, gpu_num)
                    .map_err(|e| EngineError::GpuBind {
                        device: gpu_num,
                        message: e.to_string(),
                    })?;
                *backend = Some(fresh);
                log::info!("face engine rebound to device {}", gpu_num);
            }
        }
        self.selected_gpu.store(gpu_num, Ordering::Release);
        Ok(())
    }
}

impl Default for FaceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FaceEngine {
    fn drop(&mut self) {
        log::debug!("releasing face engine on device {}", self.selected_gpu());
    }
}

fn poisoned(what: &str) -> EngineError {
    EngineError::Internal(format!("{} lock poisoned", what))
}

fn features<'a>(body: &'a TemplateBody, which: &'static str) -> EngineResult<&'a [f32]> {
    match body {
        TemplateBody::Features(values) if !values.is_empty() => Ok(values),
        TemplateBody::Features(_) => Err(EngineError::TemplateFormat {
            which,
            message: "empty feature vector".into(),
        }),
        _ => Err(EngineError::TemplateFormat {
            which,
            message: "not a face engine template".into(),
        }),
    }
}

impl VerifInterface for FaceEngine {
    fn initialize(&self, config_dir: &Path) -> ReturnStatus {
        match self.try_initialize(config_dir) {
            Ok(()) => {
                log::info!("face engine initialized from {}", config_dir.display());
                ReturnStatus::success()
            }
            Err(err) => {
                log::warn!("face engine initialize failed: {}", err);
                err.into()
            }
        }
    }

    fn create_template(&self, face: &Image, role: TemplateRole) -> TemplateOutcome {
        match self.try_create(face, role) {
            Ok((template, eyes)) => TemplateOutcome::success(template, eyes),
            Err(err) => TemplateOutcome::failed(role, err),
        }
    }

    fn match_templates(&self, verif_template: &[u8], enroll_template: &[u8]) -> MatchOutcome {
        MatchOutcome::from_result(self.try_match(verif_template, enroll_template))
    }

    fn set_gpu(&self, gpu_num: u8) -> ReturnStatus {
        match self.try_set_gpu(gpu_num) {
            Ok(()) => ReturnStatus::success(),
            Err(err) => {
                log::warn!("set_gpu({}) failed: {}", gpu_num, err);
                err.into()
            }
        }
    }
}
