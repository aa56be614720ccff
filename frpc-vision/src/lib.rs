pub mod face;
pub mod model;
pub mod pipeline;
pub mod raster;
pub mod yunet;

// Re-export commonly used types
pub use face::{Detection, Embedding};
pub use model::ModelPaths;
pub use pipeline::{Pipeline, PipelineOptions};
pub use raster::PixelLayout;
