//! Model-free backend: detects a face in any image that is not completely
//! black and derives features from per-quadrant colour means.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use frpc::config::EngineConfig;
use frpc::engine::{BackendLoader, FaceBackend};
use frpc::status::{EngineError, EngineResult};
use frpc::{FaceEngine, Image};
use frpc_vision::face::{Detection, Embedding};
use frpc_vision::PipelineOptions;
use image::{DynamicImage, GenericImageView};

#[derive(Clone, Default)]
pub struct FakeLoader {
    pub loads: Arc<Mutex<Vec<u8>>>,
    pub fail_on: Option<u8>,
    pub score: f32,
}

impl FakeLoader {
    pub fn with_score(score: f32) -> Self {
        Self {
            score,
            ..Self::default()
        }
    }

    pub fn loaded_devices(&self) -> Vec<u8> {
        self.loads.lock().unwrap().clone()
    }
}

impl BackendLoader for FakeLoader {
    fn load(
        &self,
        _config_dir: &Path,
        _config: &EngineConfig,
        device: u8,
    ) -> EngineResult<Box<dyn FaceBackend>> {
        if self.fail_on == Some(device) {
            return Err(EngineError::ModelLoad(format!("device {} unavailable", device)));
        }
        self.loads.lock().unwrap().push(device);
        Ok(Box::new(FakeBackend {
            device,
            score: self.score,
        }))
    }
}

struct FakeBackend {
    device: u8,
    score: f32,
}

impl FaceBackend for FakeBackend {
    fn device(&self) -> u8 {
        self.device
    }

    fn detect(&mut self, img: &DynamicImage, _opts: PipelineOptions) -> Result<Vec<Detection>> {
        let rgb = img.to_rgb8();
        if rgb.pixels().all(|p| p.0 == [0, 0, 0]) {
            return Ok(Vec::new());
        }
        let (w, h) = (img.width() as f32, img.height() as f32);
        let mut landmarks = [0.0f32; 10];
        landmarks[0] = w * 0.3;
        landmarks[1] = h * 0.4;
        landmarks[2] = w * 0.7;
        landmarks[3] = h * 0.4;
        Ok(vec![Detection {
            bbox: [w * 0.1, h * 0.1, w * 0.8, h * 0.8],
            score: self.score,
            landmarks,
        }])
    }

    fn embed(&mut self, img: &DynamicImage, _detection: &Detection) -> Result<Embedding> {
        let (w, h) = img.dimensions();
        let mut sums = [0f32; 12];
        let mut counts = [0f32; 4];
        for (x, y, px) in img.to_rgb8().enumerate_pixels() {
            let q = usize::from(x >= w / 2) + 2 * usize::from(y >= h / 2);
            counts[q] += 1.0;
            for c in 0..3 {
                sums[q * 3 + c] += f32::from(px.0[c]) + 1.0;
            }
        }
        let mut values: Vec<f32> = sums
            .iter()
            .enumerate()
            .map(|(i, s)| s / counts[i / 3].max(1.0))
            .collect();
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        values.iter_mut().for_each(|v| *v /= norm);
        Ok(Embedding::from_vec(values))
    }
}

pub fn engine(loader: &FakeLoader) -> FaceEngine {
    env_logger::builder().is_test(true).try_init().ok();
    FaceEngine::with_loader(loader.clone())
}

pub fn gradient(width: u16, height: u16) -> Image {
    let mut data = Vec::with_capacity(usize::from(width) * usize::from(height) * 3);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
        }
    }
    Image::new(width, height, 24, data)
}

pub fn flat(width: u16, height: u16, value: u8) -> Image {
    Image::new(
        width,
        height,
        24,
        vec![value; usize::from(width) * usize::from(height) * 3],
    )
}
