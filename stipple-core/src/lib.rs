pub mod device_map;
pub mod handler;
pub mod loader;
pub mod request;
pub mod response;
pub mod token;
mod util;

mod sdxl;

pub use device_map::*;
pub use handler::JobHandler;
use image::DynamicImage;
pub use loader::*;
pub use request::{GenerationParams, GenerationRequest, ValidationError};
pub use response::{GenerationResult, HealthReport, HealthStatus, Usage};
pub use sdxl::{SdxlLoader, SdxlModel, DEFAULT_ATTENTION_SLICE_SIZE, DEFAULT_MODEL_ID};
pub(crate) use util::{select_best_device, tensor_to_image};
pub use util::{image_to_data_uri, PNG_DATA_URI_PREFIX};

/// A loaded, ready-to-run image generation pipeline.
pub trait ModelLike: Send + Sync {
    /// Runs one generation synchronously. Expects normalized parameters.
    fn run(&self, params: &GenerationParams) -> anyhow::Result<DynamicImage>;
}
