//! Inspection workflow
//!
//! `InspectionService` ties the form catalog, record store, image pipeline
//! and fill engine together: drafts are saved without validation, export is
//! gated on validation, runs at most once at a time per record, and moves
//! the record from draft to exported only when the PDF was written.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::form::{
    compute_stats, AutoSaveScheduler, DraftSink, EngineError, FieldType, FormCatalog, FormData,
    FormSchema, FormSession, FormStats, FormValidator, ValidationError, ValidationReport,
    DEFAULT_MAX_IMAGES,
};
use crate::pdf::{ExportResult, PdfFillEngine};
use crate::photo::{attach_image, ImageCategory, ImagePipeline, ProcessedImage};
use crate::records::{InspectionRecord, RecordStore, StorageError};

/// Workflow errors
#[derive(Debug, thiserror::Error)]
pub enum InspectionError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unknown form: {0}")]
    UnknownForm(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Field {0} does not take images")]
    NotAnImageField(String),

    #[error("Field {field} already holds {max} images")]
    ImageLimit { field: String, max: u32 },

    #[error("Form has {} validation errors", errors.len())]
    Validation {
        missing_labels: Vec<String>,
        errors: Vec<ValidationError>,
    },

    #[error("Export already running for record {0}")]
    ExportInFlight(String),

    #[error("Form {0} has no PDF template")]
    NoTemplate(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Removes the record from the in-flight set when the export ends
struct ExportGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    record_id: String,
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.record_id);
    }
}

/// Per-record write locks. Every read-modify-write of a stored record runs
/// under its record's lock, so a background save never writes back a copy
/// read before an export landed.
#[derive(Default)]
pub struct RecordLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, record_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.locks
                .lock()
                .entry(record_id.to_string())
                .or_default(),
        );
        lock.lock_owned().await
    }

    fn forget(&self, record_id: &str) {
        self.locks.lock().remove(record_id);
    }
}

/// Inspection operations over injected collaborators
pub struct InspectionService {
    catalog: Arc<FormCatalog>,
    store: Arc<dyn RecordStore>,
    fill: Arc<PdfFillEngine>,
    images: ImagePipeline,
    exports_in_flight: Arc<Mutex<HashSet<String>>>,
    record_locks: Arc<RecordLocks>,
}

impl InspectionService {
    pub fn new(
        catalog: Arc<FormCatalog>,
        store: Arc<dyn RecordStore>,
        fill: Arc<PdfFillEngine>,
        images: ImagePipeline,
    ) -> Self {
        Self {
            catalog,
            store,
            fill,
            images,
            exports_in_flight: Arc::new(Mutex::new(HashSet::new())),
            record_locks: Arc::new(RecordLocks::new()),
        }
    }

    pub fn catalog(&self) -> &FormCatalog {
        &self.catalog
    }

    pub fn images(&self) -> &ImagePipeline {
        &self.images
    }

    fn schema(&self, form_id: &str) -> Result<Arc<FormSchema>, InspectionError> {
        self.catalog
            .get(form_id)
            .ok_or_else(|| InspectionError::UnknownForm(form_id.to_string()))
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Create and persist an empty draft for a form
    pub async fn create_draft(
        &self,
        form_id: &str,
        title: Option<&str>,
    ) -> Result<InspectionRecord, InspectionError> {
        let schema = self.schema(form_id)?;
        let record = InspectionRecord::new(&schema, title);
        self.store.put(&record).await?;

        tracing::info!(record_id = %record.id, form_id = %form_id, "Created draft");
        Ok(record)
    }

    pub async fn get(&self, record_id: &str) -> Result<InspectionRecord, InspectionError> {
        self.store
            .get(record_id)
            .await?
            .ok_or_else(|| InspectionError::NotFound(record_id.to_string()))
    }

    /// All records, most recently updated first
    pub async fn list(&self) -> Result<Vec<InspectionRecord>, InspectionError> {
        Ok(self.store.list().await?)
    }

    /// Replace a record's form data. Saving a draft never validates.
    pub async fn save_draft(
        &self,
        record_id: &str,
        data: FormData,
    ) -> Result<InspectionRecord, InspectionError> {
        let _write = self.record_locks.lock(record_id).await;
        let mut record = self.get(record_id).await?;
        let schema = self.schema(&record.form_id)?;

        if let Some(unknown) = data.keys().find(|k| schema.field(k).is_none()) {
            return Err(InspectionError::UnknownField(unknown.clone()));
        }

        record.apply_data(&schema, data);
        self.store.put(&record).await?;

        tracing::info!(record_id = %record_id, "Saved draft");
        Ok(record)
    }

    /// Delete a record and, best-effort, the images it references
    pub async fn delete_record(&self, record_id: &str) -> Result<(), InspectionError> {
        let write = self.record_locks.lock(record_id).await;
        let record = self.get(record_id).await?;

        if !self.store.delete(record_id).await? {
            return Err(InspectionError::NotFound(record_id.to_string()));
        }
        drop(write);
        self.record_locks.forget(record_id);

        let removed = self.images.delete_files(&record.photos).await;
        tracing::info!(record_id = %record_id, images_removed = removed, "Deleted record");
        Ok(())
    }

    pub fn stats(&self, record: &InspectionRecord) -> Result<FormStats, InspectionError> {
        let schema = self.schema(&record.form_id)?;
        Ok(compute_stats(&schema, &record.data))
    }

    pub async fn validate_record(
        &self,
        record_id: &str,
    ) -> Result<ValidationReport, InspectionError> {
        let record = self.get(record_id).await?;
        let schema = self.schema(&record.form_id)?;
        let validator = FormValidator::new(&schema).map_err(EngineError::from)?;
        Ok(validator.validate(&record.data))
    }

    // ========================================================================
    // Export
    // ========================================================================

    fn begin_export(&self, record_id: &str) -> Result<ExportGuard, InspectionError> {
        let mut in_flight = self.exports_in_flight.lock();
        if !in_flight.insert(record_id.to_string()) {
            return Err(InspectionError::ExportInFlight(record_id.to_string()));
        }
        Ok(ExportGuard {
            in_flight: Arc::clone(&self.exports_in_flight),
            record_id: record_id.to_string(),
        })
    }

    /// Validate, fill the form's template, and mark the record exported on
    /// success. A failed fill comes back as `success: false` with the record
    /// left as it was.
    pub async fn export_record(&self, record_id: &str) -> Result<ExportResult, InspectionError> {
        let _guard = self.begin_export(record_id)?;
        let _write = self.record_locks.lock(record_id).await;

        let mut record = self.get(record_id).await?;
        let schema = self.schema(&record.form_id)?;
        let template_id = schema
            .pdf_template_ref
            .clone()
            .ok_or_else(|| InspectionError::NoTemplate(schema.id.clone()))?;

        let validator = FormValidator::new(&schema).map_err(EngineError::from)?;
        let report = validator.validate(&record.data);
        if !report.is_valid() {
            tracing::info!(
                record_id = %record_id,
                errors = report.errors.len(),
                "Export blocked by validation"
            );
            return Err(InspectionError::Validation {
                missing_labels: report.missing_required,
                errors: report.errors,
            });
        }

        let result = self.fill.fill_template(&record.data, &template_id).await;

        match (result.success, &result.file_path) {
            (true, Some(path)) => {
                record.mark_exported(path);
                self.store.put(&record).await?;
                tracing::info!(record_id = %record_id, file = %path, "Exported inspection report");
            }
            _ => {
                tracing::warn!(
                    record_id = %record_id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Export failed, record left as draft"
                );
            }
        }

        Ok(result)
    }

    // ========================================================================
    // Images
    // ========================================================================

    /// Process an image on the device and append it to an image field.
    /// A failed image is returned with `is_valid: false` and nothing stored.
    pub async fn attach_image(
        &self,
        record_id: &str,
        field_id: &str,
        source_uri: &str,
        category: ImageCategory,
    ) -> Result<(ProcessedImage, InspectionRecord), InspectionError> {
        let _write = self.record_locks.lock(record_id).await;
        let mut record = self.get(record_id).await?;
        let schema = self.schema(&record.form_id)?;
        let field = schema
            .field(field_id)
            .ok_or_else(|| InspectionError::UnknownField(field_id.to_string()))?;

        if field.field_type != FieldType::Image {
            return Err(InspectionError::NotAnImageField(field_id.to_string()));
        }

        let max = field.max_images.unwrap_or(DEFAULT_MAX_IMAGES);
        let held = record
            .data
            .get(field_id)
            .map(|v| v.uris().len())
            .unwrap_or(0);
        if held >= max as usize {
            return Err(InspectionError::ImageLimit {
                field: field_id.to_string(),
                max,
            });
        }

        let image = self
            .images
            .process(source_uri, field_id, &schema.id, category)
            .await;

        let mut data = record.data.clone();
        if attach_image(&mut data, field_id, &image) {
            record.apply_data(&schema, data);
            self.store.put(&record).await?;
        }

        Ok((image, record))
    }

    /// Delete an image file and drop its reference from the record
    pub async fn remove_image(
        &self,
        record_id: &str,
        field_id: &str,
        uri: &str,
    ) -> Result<InspectionRecord, InspectionError> {
        let _write = self.record_locks.lock(record_id).await;
        let mut record = self.get(record_id).await?;
        let schema = self.schema(&record.form_id)?;

        let mut data = record.data.clone();
        if self.images.remove_image(&mut data, field_id, uri).await {
            record.apply_data(&schema, data);
            self.store.put(&record).await?;
        }

        Ok(record)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Open an editing session over a stored record. Empty date and time
    /// fields are pre-filled with the current local time.
    pub async fn open_session(
        &self,
        record_id: &str,
        autosave: Option<AutoSaveScheduler>,
    ) -> Result<FormSession, InspectionError> {
        let record = self.get(record_id).await?;
        let schema = self.schema(&record.form_id)?;

        let sink = Arc::new(StoreDraftSink::new(
            Arc::clone(&self.store),
            Arc::clone(&self.catalog),
            Arc::clone(&self.record_locks),
        ));
        let mut session = FormSession::new(schema, record_id, record.data, sink)?;
        session.prefill_defaults(Local::now().naive_local());

        if let Some(scheduler) = autosave {
            session = session.with_autosave(scheduler);
        }

        Ok(session)
    }
}

/// Draft sink writing session data back into the record store. Only the
/// data, photos and update time change; status and PDF path are left as
/// stored.
pub struct StoreDraftSink {
    store: Arc<dyn RecordStore>,
    catalog: Arc<FormCatalog>,
    locks: Arc<RecordLocks>,
}

impl StoreDraftSink {
    pub fn new(
        store: Arc<dyn RecordStore>,
        catalog: Arc<FormCatalog>,
        locks: Arc<RecordLocks>,
    ) -> Self {
        Self {
            store,
            catalog,
            locks,
        }
    }
}

#[async_trait]
impl DraftSink for StoreDraftSink {
    async fn save_draft(&self, record_id: &str, data: &FormData) -> Result<(), StorageError> {
        let _write = self.locks.lock(record_id).await;
        let mut record = self
            .store
            .get(record_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(record_id.to_string()))?;

        let Some(schema) = self.catalog.get(&record.form_id) else {
            return Err(StorageError::NotFound(record.form_id.clone()));
        };

        record.apply_data(&schema, data.clone());
        self.store.put(&record).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::form::{FieldSpec, FieldValue};
    use crate::pdf::{build_template, FieldMapping, LogShareTarget, MappingRegistry};
    use crate::records::{MemoryRecordStore, RecordStatus};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn pump_form() -> FormSchema {
        FormSchema {
            id: "pump_check".to_string(),
            name: "Pump Check".to_string(),
            category_id: "equipment".to_string(),
            description: None,
            fields: vec![
                FieldSpec::new("report_number", FieldType::Text, "Report Number").required(),
                FieldSpec::new("inspection_date", FieldType::Date, "Inspection Date").required(),
                FieldSpec::new("all_clear", FieldType::Boolean, "All Clear"),
                FieldSpec::new("photos", FieldType::Image, "Photos").with_max_images(1),
            ],
            pdf_template_ref: Some("pump_v1".to_string()),
            estimated_minutes: 5,
        }
    }

    struct Fixture {
        dir: TempDir,
        service: InspectionService,
    }

    fn fixture(write_template: bool) -> Fixture {
        fixture_with_store(write_template, Arc::new(MemoryRecordStore::new()))
    }

    fn fixture_with_store(write_template: bool, store: Arc<dyn RecordStore>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        if write_template {
            std::fs::write(
                templates.join("pump_v1.pdf"),
                build_template(&["Report", "Date"], &["Clear"]),
            )
            .unwrap();
        }

        let mut catalog = FormCatalog::new();
        catalog.register(pump_form()).unwrap();

        let mut mappings = MappingRegistry::new();
        mappings
            .register(
                FieldMapping::new("pump_v1")
                    .text("report_number", "Report")
                    .checkbox("all_clear", "Clear")
                    .date("inspection_date", "Date"),
            )
            .unwrap();

        let fill = PdfFillEngine::new(
            templates,
            dir.path().join("reports"),
            Arc::new(mappings),
            Arc::new(LogShareTarget),
        );
        let images = ImagePipeline::new(dir.path().join("images"), dir.path().join("tmp"));

        let service = InspectionService::new(
            Arc::new(catalog),
            store,
            Arc::new(fill),
            images,
        );

        Fixture { dir, service }
    }

    /// Memory store whose next `get` waits until released
    struct GatedStore {
        inner: MemoryRecordStore,
        gate: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryRecordStore::new(),
                gate: Mutex::new(None),
            }
        }

        fn hold_next_get(&self) -> tokio::sync::oneshot::Sender<()> {
            let (tx, rx) = tokio::sync::oneshot::channel();
            *self.gate.lock() = Some(rx);
            tx
        }
    }

    #[async_trait]
    impl RecordStore for GatedStore {
        async fn put(&self, record: &InspectionRecord) -> Result<(), StorageError> {
            self.inner.put(record).await
        }

        async fn get(&self, id: &str) -> Result<Option<InspectionRecord>, StorageError> {
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.inner.get(id).await
        }

        async fn delete(&self, id: &str) -> Result<bool, StorageError> {
            self.inner.delete(id).await
        }

        async fn list(&self) -> Result<Vec<InspectionRecord>, StorageError> {
            self.inner.list().await
        }
    }

    fn complete_data() -> FormData {
        let mut data = FormData::new();
        data.set("report_number", "P-17");
        data.set("inspection_date", "2026-05-04");
        data.set("all_clear", true);
        data
    }

    #[tokio::test]
    async fn test_export_blocked_by_validation() {
        let fx = fixture(true);
        let record = fx.service.create_draft("pump_check", None).await.unwrap();

        let mut data = FormData::new();
        data.set("report_number", "P-17");
        fx.service.save_draft(&record.id, data).await.unwrap();

        match fx.service.export_record(&record.id).await {
            Err(InspectionError::Validation { missing_labels, errors }) => {
                assert_eq!(missing_labels, vec!["Inspection Date"]);
                assert_eq!(errors.len(), 1);
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let stored = fx.service.get(&record.id).await.unwrap();
        assert_eq!(stored.status, RecordStatus::Draft);
        assert!(!fx.dir.path().join("reports").exists());
    }

    #[tokio::test]
    async fn test_export_marks_record_exported() {
        let fx = fixture(true);
        let record = fx.service.create_draft("pump_check", Some("Pump 3")).await.unwrap();
        fx.service.save_draft(&record.id, complete_data()).await.unwrap();

        let result = fx.service.export_record(&record.id).await.unwrap();
        assert!(result.success, "{:?}", result.error);

        let stored = fx.service.get(&record.id).await.unwrap();
        assert_eq!(stored.status, RecordStatus::Exported);
        assert_eq!(stored.pdf_path, result.file_path);
        assert!(stored.completed_at.is_some());
        assert!(Path::new(stored.pdf_path.as_deref().unwrap()).exists());

        // The guard is released once the export ends
        assert!(fx.service.begin_export(&record.id).is_ok());
    }

    #[tokio::test]
    async fn test_failed_fill_leaves_draft() {
        let fx = fixture(false);
        let record = fx.service.create_draft("pump_check", None).await.unwrap();
        fx.service.save_draft(&record.id, complete_data()).await.unwrap();

        let result = fx.service.export_record(&record.id).await.unwrap();
        assert!(!result.success);
        assert!(result.error.is_some());

        let stored = fx.service.get(&record.id).await.unwrap();
        assert_eq!(stored.status, RecordStatus::Draft);
        assert!(stored.pdf_path.is_none());
    }

    #[tokio::test]
    async fn test_single_flight_export() {
        let fx = fixture(true);
        let record = fx.service.create_draft("pump_check", None).await.unwrap();
        fx.service.save_draft(&record.id, complete_data()).await.unwrap();

        let guard = fx.service.begin_export(&record.id).unwrap();
        assert!(matches!(
            fx.service.export_record(&record.id).await,
            Err(InspectionError::ExportInFlight(_))
        ));

        drop(guard);
        assert!(fx.service.export_record(&record.id).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_save_draft_rejects_unknown_fields() {
        let fx = fixture(true);
        let record = fx.service.create_draft("pump_check", None).await.unwrap();

        let mut data = FormData::new();
        data.set("colour", "red");
        assert!(matches!(
            fx.service.save_draft(&record.id, data).await,
            Err(InspectionError::UnknownField(f)) if f == "colour"
        ));
        assert!(matches!(
            fx.service.create_draft("nope", None).await,
            Err(InspectionError::UnknownForm(_))
        ));
    }

    #[tokio::test]
    async fn test_attach_image_and_delete_record() {
        let fx = fixture(true);
        let record = fx.service.create_draft("pump_check", None).await.unwrap();

        let source = fx.dir.path().join("camera.png");
        RgbImage::from_fn(640, 480, |x, y| Rgb([(x % 251) as u8, (y % 241) as u8, ((x * y) % 239) as u8]))
            .save(&source)
            .unwrap();
        let source = source.to_string_lossy().to_string();

        let (image, updated) = fx
            .service
            .attach_image(&record.id, "photos", &source, ImageCategory::Detail)
            .await
            .unwrap();
        assert!(image.is_valid, "{:?}", image.error);
        assert_eq!(updated.photos, vec![image.uri.clone()]);
        assert_eq!(
            updated.data.get("photos"),
            Some(&FieldValue::List(vec![image.uri.clone()]))
        );

        // max_images is 1
        assert!(matches!(
            fx.service
                .attach_image(&record.id, "photos", &source, ImageCategory::Detail)
                .await,
            Err(InspectionError::ImageLimit { max: 1, .. })
        ));
        assert!(matches!(
            fx.service
                .attach_image(&record.id, "all_clear", &source, ImageCategory::Detail)
                .await,
            Err(InspectionError::NotAnImageField(_))
        ));

        fx.service.delete_record(&record.id).await.unwrap();
        assert!(!Path::new(&image.uri).exists());
        assert!(matches!(
            fx.service.get(&record.id).await,
            Err(InspectionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_image_is_not_attached() {
        let fx = fixture(true);
        let record = fx.service.create_draft("pump_check", None).await.unwrap();
        let bad = fx.dir.path().join("bad.jpg");
        std::fs::write(&bad, [7u8; 50]).unwrap();

        let (image, updated) = fx
            .service
            .attach_image(&record.id, "photos", &bad.to_string_lossy(), ImageCategory::Main)
            .await
            .unwrap();
        assert!(!image.is_valid);
        assert!(updated.data.get("photos").is_none());
    }

    #[tokio::test]
    async fn test_background_save_cannot_undo_export() {
        let store = Arc::new(GatedStore::new());
        let fx = fixture_with_store(true, store.clone());
        let service = Arc::new(fx.service);
        let record = service.create_draft("pump_check", None).await.unwrap();
        service.save_draft(&record.id, complete_data()).await.unwrap();

        let sink = StoreDraftSink::new(
            store.clone(),
            Arc::clone(&service.catalog),
            Arc::clone(&service.record_locks),
        );

        // The background save reads the draft, then stalls before writing
        let release = store.hold_next_get();
        let mut edited = complete_data();
        edited.set("report_number", "P-18");
        let id = record.id.clone();
        let save = tokio::spawn(async move { sink.save_draft(&id, &edited).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let exporter = Arc::clone(&service);
        let id = record.id.clone();
        let export = tokio::spawn(async move { exporter.export_record(&id).await });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        release.send(()).unwrap();
        save.await.unwrap().unwrap();
        let result = export.await.unwrap().unwrap();
        assert!(result.success, "{:?}", result.error);

        let stored = service.get(&record.id).await.unwrap();
        assert_eq!(stored.status, RecordStatus::Exported);
        assert_eq!(stored.pdf_path, result.file_path);
        assert_eq!(stored.data.get("report_number"), Some(&FieldValue::text("P-18")));

        // A later save keeps the exported status
        let sink = StoreDraftSink::new(
            store.clone(),
            Arc::clone(&service.catalog),
            Arc::clone(&service.record_locks),
        );
        sink.save_draft(&record.id, &complete_data()).await.unwrap();
        assert_eq!(service.get(&record.id).await.unwrap().status, RecordStatus::Exported);
    }

    #[tokio::test]
    async fn test_session_save_writes_through_store() {
        let fx = fixture(true);
        let record = fx.service.create_draft("pump_check", None).await.unwrap();

        let mut session = fx.service.open_session(&record.id, None).await.unwrap();
        // Date pre-filled, not an edit
        assert!(session.value("inspection_date").is_some());
        assert!(!session.is_dirty());

        session.set_value("report_number", "P-99").unwrap();
        assert!(session.is_dirty());
        session.handle_save().await.unwrap();
        assert!(!session.is_dirty());

        let stored = fx.service.get(&record.id).await.unwrap();
        assert_eq!(stored.data.get("report_number"), Some(&FieldValue::text("P-99")));
        assert!(stored.data.get("inspection_date").is_some());

        let stats = fx.service.stats(&stored).unwrap();
        assert_eq!((stats.completed, stats.total), (2, 4));
    }
}
