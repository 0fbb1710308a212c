//! Form session controller
//!
//! A `FormSession` owns the `FormData` of one record while it is being
//! edited: section navigation, completion stats, validation, manual save,
//! and debounced auto-save after edits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::autosave::{AutoSaveScheduler, DraftSink};
use super::render::{render_field, RenderedField};
use super::types::{FieldType, FieldValue, FormData, FormSchema, SchemaError};
use super::validation::{FormValidator, ValidationError, ValidationReport};
use crate::records::StorageError;

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Completion of one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStats {
    pub section: String,
    pub completed: usize,
    pub total: usize,
    pub progress: u8,
}

/// Completion of the whole form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormStats {
    pub completed: usize,
    pub total: usize,
    pub progress: u8,
    pub sections: Vec<SectionStats>,
}

/// `round(100 * completed / total)`, 0 for an empty form
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// Compute overall and per-section completion
pub fn compute_stats(schema: &FormSchema, data: &FormData) -> FormStats {
    let sections: Vec<SectionStats> = schema
        .sections()
        .into_iter()
        .map(|section| {
            let (completed, total) = schema
                .fields_in_section(&section)
                .fold((0, 0), |(done, all), f| {
                    (done + usize::from(data.is_present(&f.id)), all + 1)
                });
            SectionStats {
                progress: progress_percent(completed, total),
                section,
                completed,
                total,
            }
        })
        .collect();

    let completed = schema.fields.iter().filter(|f| data.is_present(&f.id)).count();
    let total = schema.fields.len();

    FormStats {
        completed,
        total,
        progress: progress_percent(completed, total),
        sections,
    }
}

/// Editing session for one record
pub struct FormSession {
    schema: Arc<FormSchema>,
    record_id: String,
    sections: Vec<String>,
    current: usize,
    data: FormData,
    validator: FormValidator,
    revision: u64,
    saved_revision: Arc<AtomicU64>,
    sink: Arc<dyn DraftSink>,
    autosave: Option<AutoSaveScheduler>,
}

impl FormSession {
    /// Open a session over existing data. Unknown field ids are rejected.
    pub fn new(
        schema: Arc<FormSchema>,
        record_id: &str,
        data: FormData,
        sink: Arc<dyn DraftSink>,
    ) -> Result<Self, EngineError> {
        if let Some(unknown) = data.keys().find(|k| schema.field(k).is_none()) {
            return Err(EngineError::UnknownField(unknown.clone()));
        }

        let validator = FormValidator::new(&schema)?;
        let sections = schema.sections();

        Ok(Self {
            schema,
            record_id: record_id.to_string(),
            sections,
            current: 0,
            data,
            validator,
            revision: 0,
            saved_revision: Arc::new(AtomicU64::new(0)),
            sink,
            autosave: None,
        })
    }

    /// Enable debounced auto-save through `scheduler`
    pub fn with_autosave(mut self, scheduler: AutoSaveScheduler) -> Self {
        self.autosave = Some(scheduler);
        self
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn data(&self) -> &FormData {
        &self.data
    }

    pub fn value(&self, field_id: &str) -> Option<&FieldValue> {
        self.data.get(field_id)
    }

    // ========================================================================
    // Sections
    // ========================================================================

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    pub fn current_section(&self) -> &str {
        &self.sections[self.current]
    }

    pub fn current_section_index(&self) -> usize {
        self.current
    }

    pub fn is_first_section(&self) -> bool {
        self.current == 0
    }

    pub fn is_last_section(&self) -> bool {
        self.current + 1 == self.sections.len()
    }

    /// Move forward; no-op on the last section. Returns whether it moved.
    pub fn go_next(&mut self) -> bool {
        if self.is_last_section() {
            return false;
        }
        self.current += 1;
        true
    }

    /// Move back; no-op on the first section. Returns whether it moved.
    pub fn go_previous(&mut self) -> bool {
        if self.is_first_section() {
            return false;
        }
        self.current -= 1;
        true
    }

    /// Jump to a named section; unknown names are ignored
    pub fn go_to(&mut self, section: &str) -> bool {
        match self.sections.iter().position(|s| s == section) {
            Some(index) => {
                self.current = index;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Set one field's value and schedule an auto-save
    pub fn set_value(&mut self, field_id: &str, value: impl Into<FieldValue>) -> Result<(), EngineError> {
        if self.schema.field(field_id).is_none() {
            return Err(EngineError::UnknownField(field_id.to_string()));
        }
        self.data.set(field_id, value);
        self.mark_changed();
        Ok(())
    }

    /// Clear one field's value
    pub fn clear_value(&mut self, field_id: &str) -> Result<(), EngineError> {
        if self.schema.field(field_id).is_none() {
            return Err(EngineError::UnknownField(field_id.to_string()));
        }
        if self.data.remove(field_id).is_some() {
            self.mark_changed();
        }
        Ok(())
    }

    /// Replace the whole data bag
    pub fn replace_data(&mut self, data: FormData) -> Result<(), EngineError> {
        if let Some(unknown) = data.keys().find(|k| self.schema.field(k).is_none()) {
            return Err(EngineError::UnknownField(unknown.clone()));
        }
        self.data = data;
        self.mark_changed();
        Ok(())
    }

    /// Fill empty date/time fields with `now`. Not counted as an edit.
    pub fn prefill_defaults(&mut self, now: NaiveDateTime) -> usize {
        let mut filled = 0;
        for field in &self.schema.fields {
            if self.data.is_present(&field.id) {
                continue;
            }
            let value = match field.field_type {
                FieldType::Date => now.format("%Y-%m-%d").to_string(),
                FieldType::Datetime => now.format("%Y-%m-%dT%H:%M").to_string(),
                FieldType::Time => now.format("%H:%M").to_string(),
                _ => continue,
            };
            self.data.set(&field.id, value);
            filled += 1;
        }
        filled
    }

    fn mark_changed(&mut self) {
        self.revision += 1;

        let Some(scheduler) = &self.autosave else {
            return;
        };

        let sink = Arc::clone(&self.sink);
        let saved_revision = Arc::clone(&self.saved_revision);
        let record_id = self.record_id.clone();
        let snapshot = self.data.clone();
        let revision = self.revision;

        scheduler.schedule(&self.record_id, async move {
            if saved_revision.load(Ordering::SeqCst) >= revision {
                return;
            }
            match sink.save_draft(&record_id, &snapshot).await {
                Ok(()) => {
                    saved_revision.fetch_max(revision, Ordering::SeqCst);
                    tracing::info!(record_id = %record_id, revision, "Auto-saved draft");
                }
                Err(e) => {
                    tracing::warn!(record_id = %record_id, error = %e, "Auto-save failed");
                }
            }
        });
    }

    /// Whether there are edits not yet saved
    pub fn is_dirty(&self) -> bool {
        self.revision > self.saved_revision.load(Ordering::SeqCst)
    }

    /// Save now, bypassing the debounce. Does not validate. An auto-save
    /// already under way finishes first so this write lands last.
    pub async fn handle_save(&mut self) -> Result<(), StorageError> {
        if let Some(scheduler) = &self.autosave {
            scheduler.settle(&self.record_id).await;
        }

        self.sink.save_draft(&self.record_id, &self.data).await?;
        self.saved_revision.fetch_max(self.revision, Ordering::SeqCst);

        tracing::info!(record_id = %self.record_id, "Saved draft");
        Ok(())
    }

    /// Tear down the session, dropping any pending auto-save
    pub fn close(&mut self) {
        if let Some(scheduler) = self.autosave.take() {
            if scheduler.cancel(&self.record_id) {
                tracing::debug!(record_id = %self.record_id, "Dropped pending auto-save on close");
            }
        }
    }

    // ========================================================================
    // Stats, validation, rendering
    // ========================================================================

    pub fn stats(&self) -> FormStats {
        compute_stats(&self.schema, &self.data)
    }

    pub fn section_stats(&self, section: &str) -> Option<SectionStats> {
        self.stats().sections.into_iter().find(|s| s.section == section)
    }

    pub fn validate(&self) -> ValidationReport {
        self.validator.validate(&self.data)
    }

    pub fn validate_field(&self, field_id: &str) -> Option<ValidationError> {
        self.validator.validate_field(field_id, &self.data)
    }

    /// Render the fields of the current section. Errors from `report`, if
    /// given, are shown next to their fields.
    pub fn render_current_section(&self, report: Option<&ValidationReport>) -> Vec<RenderedField> {
        self.render_section(self.current_section(), report)
    }

    pub fn render_section(&self, section: &str, report: Option<&ValidationReport>) -> Vec<RenderedField> {
        self.schema
            .fields_in_section(section)
            .filter_map(|field| {
                let error = report.and_then(|r| r.error_for(&field.id));
                render_field(field, self.data.get(&field.id), error)
            })
            .collect()
    }
}

impl Drop for FormSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Tests
// ============================================================================
