//! Image capture and normalization
//!
//! Picked or captured photos are validated, bounded to a per-category size,
//! re-encoded as JPEG and copied into the app-owned image directory before
//! they are referenced from form data.

mod pipeline;
mod types;

pub use pipeline::{attach_image, ImagePipeline};
pub use types::{
    ImageCategory, ImageError, ProcessedImage, QualityProfile, MAX_SOURCE_BYTES, MIN_OUTPUT_BYTES,
    MIN_SOURCE_BYTES,
};
