//! PDF template fill engine
//!
//! `fill_template` loads a template, writes mapped form values into its
//! AcroForm fields, saves the result under the reports directory, and hands
//! the file to the share target. It always returns an `ExportResult`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lopdf::Document;
use serde::Serialize;

use super::acroform::{self, PdfFieldKind};
use super::mapping::{FieldMapping, MappingRegistry};
use super::share::{ShareTarget, PDF_MIME};
use crate::form::{FieldValue, FormData};

/// Display format for date fields
pub const PDF_DATE_FORMAT: &str = "%m/%d/%Y";

/// Outcome of one export, returned to the caller as a value
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<FieldMappingWarning>,
}

impl ExportResult {
    fn failed(error: &FillError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

/// A mapped field that could not be written. Never fails the export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingWarning {
    pub form_field_id: String,
    pub pdf_field: String,
    pub message: String,
}

impl FieldMappingWarning {
    fn new(form_field_id: &str, pdf_field: &str, message: impl Into<String>) -> Self {
        Self {
            form_field_id: form_field_id.to_string(),
            pdf_field: pdf_field.to_string(),
            message: message.into(),
        }
    }
}

/// Fatal export failures
#[derive(Debug, thiserror::Error)]
pub enum FillError {
    #[error("No field mapping for template: {0}")]
    UnknownTemplate(String),

    #[error("Failed to load PDF template: {0}")]
    TemplateLoad(String),

    #[error("Failed to serialize filled PDF: {0}")]
    Serialization(String),

    #[error("Failed to write PDF: {0}")]
    OutputWrite(String),
}

/// Filled bytes plus the per-field warnings collected on the way
#[derive(Debug)]
pub struct FilledDocument {
    pub bytes: Vec<u8>,
    pub warnings: Vec<FieldMappingWarning>,
}

/// Fills templates from `<template_dir>/<template_id>.pdf` into `output_dir`
pub struct PdfFillEngine {
    template_dir: PathBuf,
    output_dir: PathBuf,
    mappings: Arc<MappingRegistry>,
    share: Arc<dyn ShareTarget>,
}

impl PdfFillEngine {
    pub fn new(
        template_dir: PathBuf,
        output_dir: PathBuf,
        mappings: Arc<MappingRegistry>,
        share: Arc<dyn ShareTarget>,
    ) -> Self {
        Self {
            template_dir,
            output_dir,
            mappings,
            share,
        }
    }

    pub fn mappings(&self) -> &MappingRegistry {
        &self.mappings
    }

    pub fn template_path(&self, template_id: &str) -> PathBuf {
        self.template_dir.join(format!("{}.pdf", template_id))
    }

    /// Fill a template with form data. Failures come back as
    /// `success: false`; missing optional data never fails the call.
    pub async fn fill_template(&self, data: &FormData, template_id: &str) -> ExportResult {
        match self.try_fill(data, template_id).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(template_id = %template_id, error = %e, "PDF export failed");
                ExportResult::failed(&e)
            }
        }
    }

    async fn try_fill(&self, data: &FormData, template_id: &str) -> Result<ExportResult, FillError> {
        let mapping = self
            .mappings
            .get(template_id)
            .ok_or_else(|| FillError::UnknownTemplate(template_id.to_string()))?;

        let template_path = self.template_path(template_id);
        let template = tokio::fs::read(&template_path).await.map_err(|e| {
            FillError::TemplateLoad(format!("{}: {}", template_path.display(), e))
        })?;

        let fill_data = data.clone();
        let fill_mapping = mapping.clone();
        let filled = tokio::task::spawn_blocking(move || {
            fill_bytes(&template, &fill_mapping, &fill_data)
        })
        .await
        .map_err(|e| FillError::Serialization(format!("fill task failed: {}", e)))??;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| FillError::OutputWrite(e.to_string()))?;

        let report_number = data
            .get(&mapping.report_number_field)
            .map(FieldValue::to_display_string);
        let file_name = output_file_name(template_id, report_number.as_deref(), Utc::now());
        let output_path = self.output_dir.join(file_name);

        tokio::fs::write(&output_path, &filled.bytes)
            .await
            .map_err(|e| FillError::OutputWrite(format!("{}: {}", output_path.display(), e)))?;

        let file_size = filled.bytes.len() as u64;
        tracing::info!(
            template_id = %template_id,
            file = %output_path.display(),
            file_size,
            warnings = filled.warnings.len(),
            "Filled PDF template"
        );

        self.hand_off(&output_path).await;

        Ok(ExportResult {
            success: true,
            file_path: Some(output_path.to_string_lossy().to_string()),
            file_size: Some(file_size),
            error: None,
            warnings: filled.warnings,
        })
    }

    /// Share failures are logged and do not affect the export result
    async fn hand_off(&self, path: &Path) {
        if let Err(e) = self.share.share(path, PDF_MIME).await {
            tracing::warn!(file = %path.display(), error = %e, "Failed to share exported PDF");
        }
    }
}

/// Fill a template held in memory.
///
/// Text fields take the value's display form; checkboxes are checked when
/// the value is truthy and otherwise left alone; dates are reformatted to
/// `MM/dd/yyyy`. Absent values are skipped. Missing PDF fields produce
/// warnings.
pub fn fill_bytes(
    template: &[u8],
    mapping: &FieldMapping,
    data: &FormData,
) -> Result<FilledDocument, FillError> {
    let mut doc =
        Document::load_mem(template).map_err(|e| FillError::TemplateLoad(e.to_string()))?;
    let fields = acroform::discover_fields(&doc);
    let mut warnings = Vec::new();
    let mut written = 0usize;

    for (form_field, pdf_field) in &mapping.text_fields {
        let Some(text) = data.get(form_field).and_then(text_for_pdf) else {
            tracing::debug!(form_field = %form_field, "No value, skipping text field");
            continue;
        };
        let Some(&field_id) = fields.get(pdf_field) else {
            warn(&mut warnings, form_field, pdf_field, "PDF field not found in template");
            continue;
        };
        if acroform::field_kind(&doc, field_id) != PdfFieldKind::Text {
            warn(&mut warnings, form_field, pdf_field, "PDF field is not a text field");
            continue;
        }
        match acroform::set_text(&mut doc, field_id, &text) {
            Ok(()) => written += 1,
            Err(e) => warn(&mut warnings, form_field, pdf_field, e.to_string()),
        }
    }

    for (form_field, pdf_field) in &mapping.checkbox_fields {
        let checked = data.get(form_field).map(FieldValue::is_truthy).unwrap_or(false);
        if !checked {
            tracing::debug!(form_field = %form_field, "Falsy value, leaving checkbox unchecked");
            continue;
        }
        let Some(&field_id) = fields.get(pdf_field) else {
            warn(&mut warnings, form_field, pdf_field, "PDF field not found in template");
            continue;
        };
        match acroform::check_box(&mut doc, field_id) {
            Ok(state) => {
                tracing::debug!(pdf_field = %pdf_field, state = %state, "Checked box");
                written += 1;
            }
            Err(e) => warn(&mut warnings, form_field, pdf_field, e.to_string()),
        }
    }

    for (form_field, pdf_field) in &mapping.date_fields {
        let Some(raw) = data
            .get(form_field)
            .and_then(text_for_pdf)
            .filter(|raw| !raw.trim().is_empty())
        else {
            continue;
        };
        let Some(date) = parse_date(&raw) else {
            let message = format!("Unrecognized date: {}", raw);
            warn(&mut warnings, form_field, pdf_field, message);
            continue;
        };
        let Some(&field_id) = fields.get(pdf_field) else {
            warn(&mut warnings, form_field, pdf_field, "PDF field not found in template");
            continue;
        };
        let formatted = date.format(PDF_DATE_FORMAT).to_string();
        match acroform::set_text(&mut doc, field_id, &formatted) {
            Ok(()) => written += 1,
            Err(e) => warn(&mut warnings, form_field, pdf_field, e.to_string()),
        }
    }

    if written > 0 {
        acroform::set_need_appearances(&mut doc)
            .map_err(|e| FillError::Serialization(e.to_string()))?;
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| FillError::Serialization(e.to_string()))?;

    Ok(FilledDocument { bytes, warnings })
}

fn warn(
    warnings: &mut Vec<FieldMappingWarning>,
    form_field: &str,
    pdf_field: &str,
    message: impl Into<String>,
) {
    let warning = FieldMappingWarning::new(form_field, pdf_field, message);
    tracing::warn!(
        form_field = %warning.form_field_id,
        pdf_field = %warning.pdf_field,
        "{}",
        warning.message
    );
    warnings.push(warning);
}

/// Text written for a value, `None` when there is nothing to write
fn text_for_pdf(value: &FieldValue) -> Option<String> {
    let text = value.to_display_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS[.fff]]` and RFC 3339
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
}

/// `{template}_{report number|Unknown}_{yyyyMMdd_HHmmss_SSS}.pdf`
pub fn output_file_name(template_id: &str, report_number: Option<&str>, at: DateTime<Utc>) -> String {
    let report = report_number
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("Unknown");

    format!(
        "{}_{}_{}.pdf",
        sanitize(template_id),
        sanitize(report),
        at.format("%Y%m%d_%H%M%S_%3f")
    )
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::acroform::build_template;
    use crate::pdf::share::OutboxShareTarget;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn mapping() -> FieldMapping {
        FieldMapping::new("site_v1")
            .text("report_number", "ReportNumber")
            .text("site_name", "SiteName")
            .text("hazard_types", "HazardTypes")
            .text("temperature", "Temperature")
            .checkbox("hazards_found", "HazardsFound")
            .checkbox("follow_up", "FollowUp")
            .date("inspection_date", "InspectionDate")
    }

    fn full_template() -> Vec<u8> {
        build_template(
            &["ReportNumber", "SiteName", "HazardTypes", "Temperature", "InspectionDate"],
            &["HazardsFound", "FollowUp"],
        )
    }

    fn read(bytes: &[u8]) -> (Document, std::collections::BTreeMap<String, lopdf::ObjectId>) {
        let doc = Document::load_mem(bytes).unwrap();
        let fields = acroform::discover_fields(&doc);
        (doc, fields)
    }

    #[test]
    fn test_text_round_trip() {
        let mut data = FormData::new();
        data.set("report_number", "RPT-0042");
        data.set("site_name", "North Yard, Gate 3 (east)");

        let filled = fill_bytes(&full_template(), &mapping(), &data).unwrap();
        assert!(filled.warnings.is_empty());

        let (doc, fields) = read(&filled.bytes);
        assert_eq!(acroform::text_value(&doc, fields["ReportNumber"]).as_deref(), Some("RPT-0042"));
        assert_eq!(
            acroform::text_value(&doc, fields["SiteName"]).as_deref(),
            Some("North Yard, Gate 3 (east)")
        );
    }

    #[test]
    fn test_empty_sequence_leaves_checkbox_unchecked() {
        let mut data = FormData::new();
        data.set("hazards_found", FieldValue::List(vec![]));

        let filled = fill_bytes(&full_template(), &mapping(), &data).unwrap();
        let (doc, fields) = read(&filled.bytes);
        assert!(!acroform::is_checked(&doc, fields["HazardsFound"]));
    }

    #[test]
    fn test_non_empty_sequence_checks_checkbox() {
        let mut data = FormData::new();
        data.set("hazards_found", FieldValue::list(&["yes"]));
        data.set("follow_up", "   ");

        let filled = fill_bytes(&full_template(), &mapping(), &data).unwrap();
        let (doc, fields) = read(&filled.bytes);
        assert!(acroform::is_checked(&doc, fields["HazardsFound"]));
        assert!(!acroform::is_checked(&doc, fields["FollowUp"]));
    }

    #[test]
    fn test_missing_pdf_field_is_a_warning() {
        let template = build_template(&["ReportNumber", "HazardTypes"], &["HazardsFound"]);
        let mut data = FormData::new();
        data.set("report_number", "R-1");
        data.set("site_name", "Depot");
        data.set("hazards_found", true);

        let filled = fill_bytes(&template, &mapping(), &data).unwrap();

        assert_eq!(filled.warnings.len(), 1);
        assert_eq!(filled.warnings[0].form_field_id, "site_name");
        assert_eq!(filled.warnings[0].pdf_field, "SiteName");

        let (doc, fields) = read(&filled.bytes);
        assert_eq!(acroform::text_value(&doc, fields["ReportNumber"]).as_deref(), Some("R-1"));
        assert!(acroform::is_checked(&doc, fields["HazardsFound"]));
    }

    #[test]
    fn test_value_encodings() {
        let mut data = FormData::new();
        data.set("hazard_types", FieldValue::list(&["Fire", "Trip"]));
        data.set("temperature", 21.0);
        data.set("inspection_date", "2026-03-09");

        let filled = fill_bytes(&full_template(), &mapping(), &data).unwrap();
        let (doc, fields) = read(&filled.bytes);

        assert_eq!(acroform::text_value(&doc, fields["HazardTypes"]).as_deref(), Some("Fire, Trip"));
        assert_eq!(acroform::text_value(&doc, fields["Temperature"]).as_deref(), Some("21"));
        assert_eq!(
            acroform::text_value(&doc, fields["InspectionDate"]).as_deref(),
            Some("03/09/2026")
        );
    }

    #[test]
    fn test_bad_date_warns_and_absent_date_skips() {
        let mut data = FormData::new();
        data.set("inspection_date", "next tuesday");
        let filled = fill_bytes(&full_template(), &mapping(), &data).unwrap();
        assert_eq!(filled.warnings.len(), 1);
        assert!(filled.warnings[0].message.contains("next tuesday"));

        let filled = fill_bytes(&full_template(), &mapping(), &FormData::new()).unwrap();
        assert!(filled.warnings.is_empty());
        let (doc, fields) = read(&filled.bytes);
        assert!(acroform::text_value(&doc, fields["InspectionDate"]).is_none());
    }

    #[test]
    fn test_whitespace_text_is_written_but_blank_date_skipped() {
        let mut data = FormData::new();
        data.set("site_name", "   ");
        data.set("inspection_date", "  ");

        let filled = fill_bytes(&full_template(), &mapping(), &data).unwrap();
        assert!(filled.warnings.is_empty());

        let (doc, fields) = read(&filled.bytes);
        assert_eq!(acroform::text_value(&doc, fields["SiteName"]).as_deref(), Some("   "));
        assert!(acroform::text_value(&doc, fields["InspectionDate"]).is_none());
    }

    #[test]
    fn test_unreadable_template() {
        let result = fill_bytes(b"not a pdf", &mapping(), &FormData::new());
        assert!(matches!(result, Err(FillError::TemplateLoad(_))));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(parse_date("2026-03-09"), Some(expected));
        assert_eq!(parse_date("2026-03-09T14:30"), Some(expected));
        assert_eq!(parse_date("2026-03-09T14:30:15"), Some(expected));
        assert_eq!(parse_date("2026-03-09T14:30:15.250"), Some(expected));
        assert_eq!(parse_date("2026-03-09T14:30:15Z"), Some(expected));
        assert_eq!(parse_date("09/03/2026"), None);
    }

    #[test]
    fn test_output_file_name() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            output_file_name("site_v1", Some("RPT/7 a"), at),
            "site_v1_RPT_7_a_20260102_030405_000.pdf"
        );
        assert_eq!(
            output_file_name("site_v1", None, at),
            "site_v1_Unknown_20260102_030405_000.pdf"
        );
        assert_eq!(
            output_file_name("site_v1", Some("  "), at),
            "site_v1_Unknown_20260102_030405_000.pdf"
        );
    }

    fn engine(dir: &TempDir, mapping: FieldMapping) -> PdfFillEngine {
        let mut registry = MappingRegistry::new();
        registry.register(mapping).unwrap();
        PdfFillEngine::new(
            dir.path().join("templates"),
            dir.path().join("reports"),
            Arc::new(registry),
            Arc::new(OutboxShareTarget::new(dir.path().join("outbox"))),
        )
    }

    #[tokio::test]
    async fn test_fill_template_writes_and_shares() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("templates/site_v1.pdf"), full_template()).unwrap();

        let mut data = FormData::new();
        data.set("report_number", "RPT-9");
        data.set("hazards_found", true);

        let result = engine(&dir, mapping()).fill_template(&data, "site_v1").await;

        assert!(result.success, "{:?}", result.error);
        let path = PathBuf::from(result.file_path.unwrap());
        assert!(path.starts_with(dir.path().join("reports")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("site_v1_RPT-9_"));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), result.file_size.unwrap());
        assert!(dir.path().join("outbox").join(&name).exists());
    }

    #[tokio::test]
    async fn test_fill_template_missing_template_file() {
        let dir = TempDir::new().unwrap();
        let result = engine(&dir, mapping())
            .fill_template(&FormData::new(), "site_v1")
            .await;

        assert!(!result.success);
        assert!(result.file_path.is_none());
        assert!(result.error.unwrap().contains("template"));
        assert!(!dir.path().join("reports").exists());
    }

    #[tokio::test]
    async fn test_fill_template_unknown_mapping() {
        let dir = TempDir::new().unwrap();
        let result = engine(&dir, mapping())
            .fill_template(&FormData::new(), "other_v3")
            .await;
        assert!(!result.success);
    }
}
