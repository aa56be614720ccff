use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, Detection, Embedding};
use crate::model::{self, ModelPaths};

/// Detector thresholds used by [`Pipeline::detect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    detector: Session,
    encoder: Session,
    device: u8,
}

impl Pipeline {
    /// Load both models bound to `device`.
    pub fn load(paths: &ModelPaths, device: u8) -> Result<Self> {
        Ok(Self {
            detector: model::detector_session(paths, device)?,
            encoder: model::recog_session(paths, device)?,
            device,
        })
    }

    /// Device the sessions were built for.
    pub fn device(&self) -> u8 {
        self.device
    }

    pub fn detect(&mut self, img: &DynamicImage, opts: PipelineOptions) -> Result<Vec<Detection>> {
        face::detect_faces(
            &mut self.detector,
            img,
            opts.score_threshold,
            opts.nms_threshold,
        )
        .context("detecting faces")
    }

    /// Align the face described by `detection` and encode it.
    pub fn embed(&mut self, img: &DynamicImage, detection: &Detection) -> Result<Embedding> {
        let face_img =
            face::align_face(img, detection, face::ALIGNED_SIZE).context("aligning face")?;
        face::encode_face(&mut self.encoder, &face_img).context("encoding face")
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
