//! The 1:1 verification interface every engine implements.

use std::path::Path;

use crate::status::{EngineError, EngineResult, ReturnCode, ReturnStatus};
use crate::template;
use crate::types::{EyePair, Image, TemplateRole};

/// Similarity reported when either input is a failed-extraction sentinel.
pub const FAILED_SIMILARITY: f64 = -1.0;

/// Result of [`VerifInterface::create_template`]. `template` is always
/// populated, including when `status` is not `Success`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateOutcome {
    pub status: ReturnStatus,
    pub template: Vec<u8>,
    pub eyes: EyePair,
}

impl TemplateOutcome {
    pub fn success(template: Vec<u8>, eyes: EyePair) -> Self {
        Self {
            status: ReturnStatus::success(),
            template,
            eyes,
        }
    }

    /// Sentinel template carrying the failure code, eyes unassigned.
    pub fn failed(role: TemplateRole, err: EngineError) -> Self {
        let code = err.code();
        log::debug!("{} template creation failed: {}", role, err);
        Self {
            status: ReturnStatus::from(err),
            template: template::failed_template(role, code),
            eyes: EyePair::default(),
        }
    }
}

/// Result of [`VerifInterface::match_templates`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub status: ReturnStatus,
    pub similarity: f64,
}

impl MatchOutcome {
    /// Map an engine comparison into an outcome. Sentinel inputs give
    /// `-1`; any other failure reports a similarity of 0.
    pub fn from_result(result: EngineResult<f64>) -> Self {
        match result {
            Ok(similarity) => Self::scored(similarity),
            Err(err @ EngineError::FailedTemplate(_)) => Self::failed_template(err.to_string()),
            Err(err) => {
                log::debug!("match failed: {}", err);
                Self {
                    status: ReturnStatus::from(err),
                    similarity: 0.0,
                }
            }
        }
    }

    pub fn scored(similarity: f64) -> Self {
        Self {
            status: ReturnStatus::success(),
            similarity,
        }
    }

    /// At least one input came from a failed extraction.
    pub fn failed_template(info: impl Into<String>) -> Self {
        Self {
            status: ReturnStatus::new(ReturnCode::VerifTemplateError, info),
            similarity: FAILED_SIMILARITY,
        }
    }
}

/// Verification (1:1) engine driven by an external harness.
///
/// Lifecycle: [`initialize`](Self::initialize) exactly once, then any
/// interleaving of the other methods, possibly from several threads at once.
/// Dropping the engine releases everything it holds.
pub trait VerifInterface: Send + Sync {
    /// Prepare the engine. `config_dir` is a read-only directory chosen by the
    /// harness; the names of the files inside it belong to the engine.
    ///
    /// Calling this a second time is outside the contract. The engines in
    /// this crate refuse it with `VendorError` and keep their state.
    fn initialize(&self, config_dir: &Path) -> ReturnStatus;

    /// Produce a template and, best effort, eye coordinates for `face`.
    ///
    /// Must not panic. Whatever the status, the returned template is valid
    /// input to [`match_templates`](Self::match_templates); when extraction
    /// fails the template encodes that failure.
    fn create_template(&self, face: &Image, role: TemplateRole) -> TemplateOutcome;

    /// Compare a verification template with an enrollment template, in that
    /// order. If either is a failed-extraction sentinel the outcome is
    /// `VerifTemplateError` with similarity `-1`; otherwise a non-negative
    /// score.
    fn match_templates(&self, verif_template: &[u8], enroll_template: &[u8]) -> MatchOutcome;

    /// Select the zero-based device used by subsequent calls issued from the
    /// calling thread. An out-of-range index returns `GPUError` and keeps
    /// the previous selection. Engines without a GPU treat this as a no-op
    /// for index 0.
    fn set_gpu(&self, gpu_num: u8) -> ReturnStatus;
}
