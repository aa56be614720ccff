//! Reference engine: conforms to the interface without doing any face work.
//!
//! Every well-formed image yields the same opaque template and every
//! comparison a random score. Malformed images still produce a sentinel so
//! that the failure paths of a harness can be exercised.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

use rand::Rng;

use crate::config;
use crate::interface::{MatchOutcome, TemplateOutcome, VerifInterface};
use crate::status::{EngineError, EngineResult, ReturnStatus};
use crate::template::{self, TemplateBody, TemplateRecord};
use crate::types::{EyePair, Image, TemplateRole};

/// Logical devices the null engine accepts in `set_gpu`.
pub const NULL_DEVICE_COUNT: u8 = 1;

const BLURB: &[u8] = b"frpc null implementation\n";

#[derive(Debug, Default)]
pub struct NullImpl {
    config_dir: RwLock<Option<PathBuf>>,
    which_gpu: AtomicU8,
}

impl NullImpl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_gpu(&self) -> u8 {
        self.which_gpu.load(Ordering::Acquire)
    }

    fn is_initialized(&self) -> bool {
        self.config_dir
            .read()
            .map(|dir| dir.is_some())
            .unwrap_or(false)
    }

    fn try_initialize(&self, config_dir: &Path) -> EngineResult<()> {
        config::check_config_dir(config_dir)?;
        let mut slot = self
            .config_dir
            .write()
            .map_err(|_| EngineError::Internal("configuration lock poisoned".into()))?;
        if let Some(existing) = slot.as_ref() {
            return Err(EngineError::AlreadyInitialized(existing.clone()));
        }
        *slot = Some(config_dir.to_path_buf());
        self.which_gpu.store(0, Ordering::Release);
        Ok(())
    }

    fn try_match(&self, verif: &[u8], enroll: &[u8]) -> EngineResult<f64> {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        template::decode_pair(verif, enroll)?;
        Ok(rand::thread_rng().gen::<f64>())
    }
}

impl VerifInterface for NullImpl {
    fn initialize(&self, config_dir: &Path) -> ReturnStatus {
        match self.try_initialize(config_dir) {
            Ok(()) => {
                log::info!("null engine initialized from {}", config_dir.display());
                ReturnStatus::success()
            }
            Err(err) => {
                log::warn!("null engine initialize failed: {}", err);
                err.into()
            }
        }
    }

    fn create_template(&self, face: &Image, role: TemplateRole) -> TemplateOutcome {
        if let Err(err) = face.validate() {
            return TemplateOutcome::failed(role, err);
        }
        if !self.is_initialized() {
            return TemplateOutcome::failed(role, EngineError::NotInitialized);
        }
        let record = TemplateRecord::new(role, TemplateBody::Opaque(BLURB.to_vec()));
        TemplateOutcome::success(record.encode(), EyePair::default())
    }

    fn match_templates(&self, verif_template: &[u8], enroll_template: &[u8]) -> MatchOutcome {
        MatchOutcome::from_result(self.try_match(verif_template, enroll_template))
    }

    fn set_gpu(&self, gpu_num: u8) -> ReturnStatus {
        if gpu_num >= NULL_DEVICE_COUNT {
            return EngineError::GpuOutOfRange {
                requested: gpu_num,
                available: NULL_DEVICE_COUNT,
            }
            .into();
        }
        self.which_gpu.store(gpu_num, Ordering::Release);
        ReturnStatus::success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ReturnCode;
    use tempfile::TempDir;

    fn ready() -> (TempDir, NullImpl) {
        let tmp = TempDir::new().unwrap();
        let engine = NullImpl::new();
        assert!(engine.initialize(tmp.path()).is_success());
        (tmp, engine)
    }

    #[test]
    fn templates_are_fixed_for_valid_images() {
        let (_tmp, engine) = ready();
        let face = Image::new(2, 2, 8, vec![1u8, 2, 3, 4]);
        let a = engine.create_template(&face, TemplateRole::Enrollment);
        let b = engine.create_template(&face, TemplateRole::Enrollment);
        assert!(a.status.is_success());
        assert_eq!(a.template, b.template);
        assert_eq!(a.eyes.left(), None);
    }

    #[test]
    fn calls_before_initialize_are_vendor_errors() {
        let engine = NullImpl::new();
        let face = Image::new(1, 1, 8, vec![0u8]);
        let outcome = engine.create_template(&face, TemplateRole::Verification);
        assert_eq!(outcome.status.code, ReturnCode::VendorError);
        assert!(!outcome.template.is_empty());

        let outcome = engine.match_templates(&outcome.template, &outcome.template);
        assert_eq!(outcome.status.code, ReturnCode::VendorError);
    }

    #[test]
    fn out_of_range_gpu_keeps_selection() {
        let (_tmp, engine) = ready();
        assert!(engine.set_gpu(0).is_success());
        assert_eq!(engine.set_gpu(1).code, ReturnCode::GPUError);
        assert_eq!(engine.selected_gpu(), 0);
    }
}
