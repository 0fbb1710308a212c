//! Photo normalization pipeline
//!
//! Validates a picked image, resizes it to the category's bounds, re-encodes
//! it as JPEG, and persists it under the app-owned image directory.
//!
//! Steps, in order:
//! 1. Validate the source (exists, non-empty, 100 B..=50 MB)
//! 2. Measure and compute the two-step clamped target size
//! 3. Resize only if the target differs from the natural size
//! 4. Re-encode as JPEG at the category quality (always)
//! 5. Persist under a generated name and verify it (>= 1000 B)
//! 6. Remove the intermediate temp file (best-effort)

use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;
use uuid::Uuid;

use super::types::{
    ImageCategory, ImageError, ProcessedImage, QualityProfile, MAX_SOURCE_BYTES, MIN_OUTPUT_BYTES,
    MIN_SOURCE_BYTES,
};
use crate::form::{FieldValue, FormData};

/// Output of the blocking decode/resize/encode step
struct Normalized {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    resized: bool,
}

/// Image pipeline bound to an image directory and a scratch directory
#[derive(Debug, Clone)]
pub struct ImagePipeline {
    image_dir: PathBuf,
    temp_dir: PathBuf,
}

impl ImagePipeline {
    pub fn new(image_dir: PathBuf, temp_dir: PathBuf) -> Self {
        Self { image_dir, temp_dir }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Process one image. Failures come back as `is_valid: false`.
    pub async fn process(
        &self,
        source_uri: &str,
        field_id: &str,
        form_type: &str,
        category: ImageCategory,
    ) -> ProcessedImage {
        match self.try_process(source_uri, field_id, form_type, category).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(
                    field_id = %field_id,
                    source = %source_uri,
                    error = %e,
                    "Image processing failed"
                );
                ProcessedImage::failed(source_uri, &e)
            }
        }
    }

    /// Process one image, surfacing the failure as an error
    pub async fn try_process(
        &self,
        source_uri: &str,
        field_id: &str,
        form_type: &str,
        category: ImageCategory,
    ) -> Result<ProcessedImage, ImageError> {
        let source = validate_source(source_uri).await?;
        let profile = category.profile();

        let normalized = tokio::task::spawn_blocking(move || normalize(&source, profile))
            .await
            .map_err(|e| ImageError::Encode(format!("processing task failed: {}", e)))??;

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let temp_path = self
            .temp_dir
            .join(format!("normalize_{}.jpg", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, &normalized.jpeg).await?;

        let persisted = self.persist(&temp_path, field_id, form_type, category).await;

        if let Err(e) = tokio::fs::remove_file(&temp_path).await {
            tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove temp image");
        }

        let (path, size_bytes) = persisted?;

        tracing::info!(
            field_id = %field_id,
            category = category.as_str(),
            width = normalized.width,
            height = normalized.height,
            resized = normalized.resized,
            size_bytes,
            "Processed image"
        );

        Ok(ProcessedImage {
            uri: path.to_string_lossy().to_string(),
            width: normalized.width,
            height: normalized.height,
            size_bytes,
            is_valid: true,
            processed_for_pdf: true,
            error: None,
        })
    }

    /// Process several sources one at a time, stopping once the field holds
    /// `max_images` images.
    pub async fn process_batch(
        &self,
        sources: &[String],
        field_id: &str,
        form_type: &str,
        category: ImageCategory,
        existing: usize,
        max_images: u32,
    ) -> Vec<ProcessedImage> {
        let mut results = Vec::new();
        let mut held = existing;

        for source in sources {
            if held >= max_images as usize {
                tracing::debug!(field_id = %field_id, max_images, "Image limit reached, skipping rest");
                break;
            }
            let image = self.process(source, field_id, form_type, category).await;
            if image.is_valid {
                held += 1;
            }
            results.push(image);
        }

        results
    }

    async fn persist(
        &self,
        temp_path: &Path,
        field_id: &str,
        form_type: &str,
        category: ImageCategory,
    ) -> Result<(PathBuf, u64), ImageError> {
        tokio::fs::create_dir_all(&self.image_dir)
            .await
            .map_err(|e| ImageError::SaveFailed(format!("cannot create image directory: {}", e)))?;

        let dest = self
            .image_dir
            .join(generate_image_filename(field_id, form_type, category));

        tokio::fs::copy(temp_path, &dest)
            .await
            .map_err(|e| ImageError::SaveFailed(e.to_string()))?;

        let size = match tokio::fs::metadata(&dest).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(ImageError::SaveFailed(
                    "image missing after save".to_string(),
                ))
            }
        };

        if size < MIN_OUTPUT_BYTES {
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(ImageError::SaveFailed(format!(
                "saved image is only {} bytes",
                size
            )));
        }

        Ok((dest, size))
    }

    /// Remove an image from a field: delete the file first, then the
    /// reference. Returns whether a reference was removed. URIs the field
    /// does not hold are ignored without touching the disk.
    pub async fn remove_image(&self, data: &mut FormData, field_id: &str, uri: &str) -> bool {
        let held = match data.get(field_id) {
            Some(FieldValue::Text(current)) => current == uri,
            Some(FieldValue::List(items)) => items.iter().any(|i| i == uri),
            _ => false,
        };
        if !held {
            return false;
        }

        self.delete_file(uri).await;

        match data.get(field_id) {
            Some(FieldValue::List(items)) => {
                let remaining: Vec<String> = items.iter().filter(|i| *i != uri).cloned().collect();
                data.set(field_id, FieldValue::List(remaining));
            }
            _ => {
                data.remove(field_id);
            }
        }
        true
    }

    /// Best-effort delete of pipeline-owned files. Returns how many were removed.
    pub async fn delete_files(&self, uris: &[String]) -> usize {
        let mut deleted = 0;
        for uri in uris {
            if self.delete_file(uri).await {
                deleted += 1;
            }
        }
        deleted
    }

    /// Whether `path` names a file directly inside the image directory
    fn owns(&self, path: &Path) -> bool {
        if path.components().any(|c| c == Component::ParentDir) {
            return false;
        }
        path.parent() == Some(self.image_dir.as_path())
    }

    async fn delete_file(&self, uri: &str) -> bool {
        let path = source_path(uri);
        if !self.owns(&path) {
            tracing::debug!(uri = %uri, "Not a pipeline image, leaving file in place");
            return false;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete image file");
                false
            }
        }
    }
}

/// Append a processed image to a field. Invalid images are never attached.
pub fn attach_image(data: &mut FormData, field_id: &str, image: &ProcessedImage) -> bool {
    if !image.is_valid {
        return false;
    }
    let mut uris = data.get(field_id).map(FieldValue::uris).unwrap_or_default();
    uris.push(image.uri.clone());
    data.set(field_id, FieldValue::List(uris));
    true
}

fn source_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

async fn validate_source(uri: &str) -> Result<PathBuf, ImageError> {
    if uri.trim().is_empty() {
        return Err(ImageError::Invalid("no image selected".to_string()));
    }

    let path = source_path(uri);
    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|_| ImageError::Invalid(format!("file does not exist: {}", uri)))?;

    if !meta.is_file() {
        return Err(ImageError::Invalid(format!("not a file: {}", uri)));
    }

    let size = meta.len();
    if size == 0 {
        return Err(ImageError::Invalid("file is empty".to_string()));
    }
    if size < MIN_SOURCE_BYTES {
        return Err(ImageError::Invalid(format!(
            "file size {} bytes is below the {} byte minimum, the image may be corrupted",
            size, MIN_SOURCE_BYTES
        )));
    }
    if size > MAX_SOURCE_BYTES {
        return Err(ImageError::Invalid(format!(
            "file size {} bytes exceeds the {} MB limit",
            size,
            MAX_SOURCE_BYTES / (1024 * 1024)
        )));
    }

    Ok(path)
}

fn normalize(path: &Path, profile: QualityProfile) -> Result<Normalized, ImageError> {
    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    let (natural_width, natural_height) = (img.width(), img.height());
    let (width, height) = profile.target_dimensions(natural_width, natural_height);
    let resized = (width, height) != (natural_width, natural_height);

    tracing::debug!(
        natural_width,
        natural_height,
        width,
        height,
        "Normalizing image"
    );

    let img = if resized {
        img.resize_exact(width, height, FilterType::CatmullRom)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, profile.jpeg_quality());
        encoder
            .encode_image(&rgb)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
    }

    Ok(Normalized {
        jpeg,
        width,
        height,
        resized,
    })
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// `{field}_{form}_{category}_{millis}_{random}.jpg`
fn generate_image_filename(field_id: &str, form_type: &str, category: ImageCategory) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}_{}.jpg",
        sanitize_segment(field_id),
        sanitize_segment(form_type),
        category.as_str(),
        Utc::now().timestamp_millis(),
        &random[..8]
    )
}

// ============================================================================
// Tests
// ============================================================================
