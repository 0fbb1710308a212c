//! Inspection record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::form::{FieldType, FormData, FormSchema};

/// Export lifecycle of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Draft,
    Completed,
    Exported,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Draft => "draft",
            RecordStatus::Completed => "completed",
            RecordStatus::Exported => "exported",
        }
    }
}

/// The unit of persistence: one filled (or partly filled) inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRecord {
    pub id: String,
    pub form_id: String,
    pub category_id: String,
    pub title: String,
    pub data: FormData,
    /// Image URIs referenced by the record's image and signature fields
    #[serde(default)]
    pub photos: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
}

impl InspectionRecord {
    /// New draft for a form
    pub fn new(schema: &FormSchema, title: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_record_id(&schema.id),
            form_id: schema.id.clone(),
            category_id: schema.category_id.clone(),
            title: title.map(str::to_string).unwrap_or_else(|| schema.name.clone()),
            data: FormData::new(),
            photos: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            status: RecordStatus::Draft,
            pdf_path: None,
        }
    }

    /// Replace the form data and refresh derived fields
    pub fn apply_data(&mut self, schema: &FormSchema, data: FormData) {
        self.photos = collect_photos(schema, &data);
        self.data = data;
        self.updated_at = Utc::now();
    }

    /// Draft -> exported after a successful fill and write
    pub fn mark_exported(&mut self, pdf_path: &str) {
        let now = Utc::now();
        self.status = RecordStatus::Exported;
        self.pdf_path = Some(pdf_path.to_string());
        self.completed_at.get_or_insert(now);
        self.updated_at = now;
    }
}

/// Record id: `{form_id}_{millis}_{random}`
pub fn generate_record_id(form_id: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", form_id, Utc::now().timestamp_millis(), &suffix[..9])
}

/// Image URIs held by the schema's image and signature fields
pub fn collect_photos(schema: &FormSchema, data: &FormData) -> Vec<String> {
    schema
        .fields
        .iter()
        .filter(|f| matches!(f.field_type, FieldType::Image | FieldType::Signature))
        .filter_map(|f| data.get(&f.id))
        .flat_map(|v| v.uris())
        .collect()
}

/// Persistence failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
