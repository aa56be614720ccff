pub mod config;
pub mod conformance;
pub mod engine;
pub mod interface;
pub mod null_impl;
pub mod status;
pub mod template;
pub mod types;

// C ABI for the cdylib
pub mod ffi;

use std::sync::Arc;

use once_cell::sync::Lazy;

pub use engine::FaceEngine;
pub use interface::{MatchOutcome, TemplateOutcome, VerifInterface, FAILED_SIMILARITY};
pub use null_impl::NullImpl;
pub use status::{EngineError, ReturnCode, ReturnStatus};
pub use types::{EyePair, Image, TemplateRole};

static IMPLEMENTATION: Lazy<Arc<dyn VerifInterface>> = Lazy::new(|| {
    log::debug!("binding {} engine", bound_engine_name());
    bind_engine()
});

#[cfg(feature = "face-engine")]
fn bind_engine() -> Arc<dyn VerifInterface> {
    Arc::new(FaceEngine::new())
}

#[cfg(not(feature = "face-engine"))]
fn bind_engine() -> Arc<dyn VerifInterface> {
    Arc::new(NullImpl::new())
}

/// Name of the engine type this build binds.
pub fn bound_engine_name() -> &'static str {
    if cfg!(feature = "face-engine") {
        "face"
    } else {
        "null"
    }
}

/// The process-wide engine. Every call returns the same instance.
pub fn get_implementation() -> Arc<dyn VerifInterface> {
    Arc::clone(&IMPLEMENTATION)
}
