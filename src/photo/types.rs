//! Image pipeline types

use serde::{Deserialize, Serialize};

/// Sources smaller than this are treated as corrupt
pub const MIN_SOURCE_BYTES: u64 = 100;

/// Largest accepted source: 50MB
pub const MAX_SOURCE_BYTES: u64 = 50 * 1024 * 1024;

/// Smallest acceptable persisted output
pub const MIN_OUTPUT_BYTES: u64 = 1000;

/// Quality profile chosen per image field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    #[default]
    Main,
    Detail,
    Process,
    Compact,
}

impl ImageCategory {
    pub fn profile(&self) -> QualityProfile {
        match self {
            ImageCategory::Main => QualityProfile::new(1200, 900, 0.9),
            ImageCategory::Detail => QualityProfile::new(1000, 750, 0.8),
            ImageCategory::Process => QualityProfile::new(800, 600, 0.7),
            ImageCategory::Compact => QualityProfile::new(600, 450, 0.6),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageCategory::Main => "main",
            ImageCategory::Detail => "detail",
            ImageCategory::Process => "process",
            ImageCategory::Compact => "compact",
        }
    }
}

/// Bounds and re-encode quality for one category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityProfile {
    pub max_width: u32,
    pub max_height: u32,
    /// 0.0..=1.0
    pub quality: f32,
}

impl QualityProfile {
    pub const fn new(max_width: u32, max_height: u32, quality: f32) -> Self {
        Self {
            max_width,
            max_height,
            quality,
        }
    }

    /// JPEG quality on the 1..=100 scale
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }

    /// Target size preserving aspect ratio: clamp width first, then clamp
    /// the resulting height (which may shrink the width again).
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let mut w = width as f64;
        let mut h = height as f64;

        if w > self.max_width as f64 {
            h = h * self.max_width as f64 / w;
            w = self.max_width as f64;
        }

        if h > self.max_height as f64 {
            w = w * self.max_height as f64 / h;
            h = self.max_height as f64;
        }

        ((w.round() as u32).max(1), (h.round() as u32).max(1))
    }
}

/// Result of processing one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    pub is_valid: bool,
    #[serde(rename = "processedForPDF")]
    pub processed_for_pdf: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessedImage {
    pub fn failed(source_uri: &str, error: &ImageError) -> Self {
        Self {
            uri: source_uri.to_string(),
            width: 0,
            height: 0,
            size_bytes: 0,
            is_valid: false,
            processed_for_pdf: false,
            error: Some(error.to_string()),
        }
    }
}

/// Capture and processing failures
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid image: {0}")]
    Invalid(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Failed to save image: {0}")]
    SaveFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
