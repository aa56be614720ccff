//! Return codes, the status attached to every call, and the internal error
//! type engines classify their failures with.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of outcomes for every interface call. Discriminants are stable
/// and exported through the C ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ReturnCode {
    Success = 0,
    /// Error reading configuration files
    ConfigError = 1,
    /// Elective refusal to process the input
    RefuseInput = 2,
    /// Involuntary failure to process the image
    ExtractError = 3,
    /// Cannot parse the input data
    ParseError = 4,
    /// Elective refusal to produce a template
    TemplateCreationError = 5,
    /// Either or both input templates came from failed feature extraction
    VerifTemplateError = 6,
    /// Number of input images not supported
    NumDataError = 7,
    /// Template bytes are in an incorrect format or defective
    TemplateFormatError = 8,
    /// An operation on the enrollment directory failed
    EnrollDirError = 9,
    /// Input data cannot be located
    InputLocationError = 10,
    /// Problem setting or accessing the GPU
    GPUError = 11,
    /// Vendor-defined failure
    VendorError = 12,
}

impl ReturnCode {
    pub const ALL: [ReturnCode; 13] = [
        ReturnCode::Success,
        ReturnCode::ConfigError,
        ReturnCode::RefuseInput,
        ReturnCode::ExtractError,
        ReturnCode::ParseError,
        ReturnCode::TemplateCreationError,
        ReturnCode::VerifTemplateError,
        ReturnCode::NumDataError,
        ReturnCode::TemplateFormatError,
        ReturnCode::EnrollDirError,
        ReturnCode::InputLocationError,
        ReturnCode::GPUError,
        ReturnCode::VendorError,
    ];

    pub fn from_u32(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn message(self) -> &'static str {
        match self {
            ReturnCode::Success => "Success",
            ReturnCode::ConfigError => "Error reading configuration files",
            ReturnCode::RefuseInput => "Elective refusal to process the input",
            ReturnCode::ExtractError => "Involuntary failure to process the image",
            ReturnCode::ParseError => "Cannot parse the input data",
            ReturnCode::TemplateCreationError => "Elective refusal to produce a template",
            ReturnCode::VerifTemplateError => {
                "Either/both input templates were result of failed feature extraction"
            }
            ReturnCode::NumDataError => "Number of input images not supported",
            ReturnCode::TemplateFormatError => "Template file is an incorrect format or defective",
            ReturnCode::EnrollDirError => "An operation on the enrollment directory failed",
            ReturnCode::InputLocationError => {
                "Cannot locate the input data - the input file or names seem incorrect"
            }
            ReturnCode::GPUError => "Problem setting or accessing the GPU",
            ReturnCode::VendorError => "Vendor-defined error",
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of an interface call. `info` is for humans only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnStatus {
    pub code: ReturnCode,
    pub info: String,
}

impl ReturnStatus {
    pub fn new(code: ReturnCode, info: impl Into<String>) -> Self {
        Self {
            code,
            info: info.into(),
        }
    }

    pub fn success() -> Self {
        Self::from(ReturnCode::Success)
    }

    pub fn is_success(&self) -> bool {
        self.code == ReturnCode::Success
    }
}

impl Default for ReturnStatus {
    fn default() -> Self {
        Self::success()
    }
}

impl From<ReturnCode> for ReturnStatus {
    fn from(code: ReturnCode) -> Self {
        Self {
            code,
            info: String::new(),
        }
    }
}

impl From<EngineError> for ReturnStatus {
    fn from(err: EngineError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.info.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.info)
        }
    }
}

/// Failures raised inside an engine. Each variant maps to exactly one
/// [`ReturnCode`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration directory {path} is not readable: {source}")]
    ConfigDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration path {0} is not a directory")]
    ConfigNotDir(PathBuf),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("model file {0} not found in configuration directory")]
    MissingModel(PathBuf),

    #[error("failed to load models: {0}")]
    ModelLoad(String),

    #[error("malformed image: {0}")]
    MalformedImage(String),

    #[error("image {width}x{height} is below the minimum side of {min_side} pixels")]
    ImageTooSmall {
        width: u16,
        height: u16,
        min_side: u16,
    },

    #[error("no face detected")]
    NoFace,

    #[error("feature extraction failed: {0}")]
    Extraction(String),

    #[error("best detection score {score:.3} below the {role} gate {gate:.3}")]
    QualityGate {
        role: crate::types::TemplateRole,
        score: f32,
        gate: f32,
    },

    #[error("{0} template is a failed-extraction sentinel")]
    FailedTemplate(&'static str),

    #[error("{which} template is not readable: {message}")]
    TemplateFormat { which: &'static str, message: String },

    #[error("GPU {requested} out of range, {available} device(s) available")]
    GpuOutOfRange { requested: u8, available: u8 },

    #[error("failed to bind GPU {device}: {message}")]
    GpuBind { device: u8, message: String },

    #[error("engine not initialized")]
    NotInitialized,

    #[error("engine already initialized from {0}")]
    AlreadyInitialized(PathBuf),

    #[error("internal engine failure: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn code(&self) -> ReturnCode {
        match self {
            EngineError::ConfigDir { .. }
            | EngineError::ConfigNotDir(_)
            | EngineError::ConfigRead { .. }
            | EngineError::ConfigParse { .. }
            | EngineError::MissingModel(_)
            | EngineError::ModelLoad(_) => ReturnCode::ConfigError,
            EngineError::MalformedImage(_) => ReturnCode::ParseError,
            EngineError::ImageTooSmall { .. } => ReturnCode::RefuseInput,
            EngineError::NoFace | EngineError::Extraction(_) => ReturnCode::ExtractError,
            EngineError::QualityGate { .. } => ReturnCode::TemplateCreationError,
            EngineError::FailedTemplate(_) => ReturnCode::VerifTemplateError,
            EngineError::TemplateFormat { .. } => ReturnCode::TemplateFormatError,
            EngineError::GpuOutOfRange { .. } | EngineError::GpuBind { .. } => ReturnCode::GPUError,
            EngineError::NotInitialized
            | EngineError::AlreadyInitialized(_)
            | EngineError::Internal(_) => ReturnCode::VendorError,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
