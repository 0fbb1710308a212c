//! Inspection record routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::form::{FieldValue, FormData, FormStats, RenderedField, ValidationError, ValidationReport};
use crate::pdf::ExportResult;
use crate::photo::{ImageCategory, ProcessedImage};
use crate::records::InspectionRecord;
use crate::state::AppState;

/// Create the records router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/:id", get(get_record).delete(delete_record))
        .route("/:id/data", put(replace_data))
        .route("/:id/validate", post(validate_record))
        .route("/:id/export", post(export_record))
        .route("/:id/images", post(attach_image))
        .route("/:id/images/remove", post(remove_image))
        .route("/:id/session", get(get_session))
        .route("/:id/fields/:field_id", patch(update_field))
        .route("/:id/save", post(save_session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    pub form_id: String,
    pub title: Option<String>,
}

/// Record with its completion stats
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDetail {
    #[serde(flatten)]
    pub record: InspectionRecord,
    pub stats: FormStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachImageRequest {
    pub field_id: String,
    pub source_uri: String,
    #[serde(default)]
    pub category: ImageCategory,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachImageResponse {
    pub image: ProcessedImage,
    pub record: InspectionRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveImageRequest {
    pub field_id: String,
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFieldRequest {
    pub value: FieldValue,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub section: Option<String>,
}

/// Result of one field edit
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    pub stats: FormStats,
    pub dirty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ValidationError>,
}

/// One section of an open session, ready to render
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub record_id: String,
    pub sections: Vec<String>,
    pub current_section: String,
    pub is_first_section: bool,
    pub is_last_section: bool,
    pub dirty: bool,
    pub stats: FormStats,
    pub fields: Vec<RenderedField>,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub saved: bool,
}

/// Flush and close a held session so the stored record is current
async fn settle_session(state: &AppState, id: &str) -> Result<()> {
    state.save_session(id).await?;
    state.close_session(id).await;
    Ok(())
}

/// List all records, newest first
async fn list_records(State(state): State<AppState>) -> Result<Json<Vec<InspectionRecord>>> {
    Ok(Json(state.service().list().await?))
}

/// Create a draft record for a form
async fn create_record(
    State(state): State<AppState>,
    Json(request): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<InspectionRecord>)> {
    let record = state
        .service()
        .create_draft(&request.form_id, request.title.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Get a record with its stats
async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RecordDetail>> {
    let record = state.service().get(&id).await?;
    let stats = state.service().stats(&record)?;
    Ok(Json(RecordDetail { record, stats }))
}

/// Replace the form data (save as draft)
async fn replace_data(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(data): Json<FormData>,
) -> Result<Json<InspectionRecord>> {
    // The submitted data supersedes any open session
    state.close_session(&id).await;
    let record = state.service().save_draft(&id, data).await?;
    Ok(Json(record))
}

/// Delete a record and its images
async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.close_session(&id).await;
    state.service().delete_record(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Validate the stored data
async fn validate_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ValidationReport>> {
    settle_session(&state, &id).await?;
    Ok(Json(state.service().validate_record(&id).await?))
}

/// Export the record to PDF
async fn export_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExportResult>> {
    settle_session(&state, &id).await?;
    let result = state.service().export_record(&id).await?;
    Ok(Json(result))
}

/// Process an image already on the device and attach it
async fn attach_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AttachImageRequest>,
) -> Result<Json<AttachImageResponse>> {
    settle_session(&state, &id).await?;
    let (image, record) = state
        .service()
        .attach_image(&id, &request.field_id, &request.source_uri, request.category)
        .await?;
    Ok(Json(AttachImageResponse { image, record }))
}

/// Delete an attached image
async fn remove_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RemoveImageRequest>,
) -> Result<Json<InspectionRecord>> {
    settle_session(&state, &id).await?;
    let record = state
        .service()
        .remove_image(&id, &request.field_id, &request.uri)
        .await?;
    Ok(Json(record))
}

/// Render a section of the record's editing session
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionView>> {
    let view = state
        .with_session(&id, |session| {
            if let Some(section) = &query.section {
                session.go_to(section);
            }
            Ok(SessionView {
                record_id: session.record_id().to_string(),
                sections: session.sections().to_vec(),
                current_section: session.current_section().to_string(),
                is_first_section: session.is_first_section(),
                is_last_section: session.is_last_section(),
                dirty: session.is_dirty(),
                stats: session.stats(),
                fields: session.render_current_section(None),
            })
        })
        .await?;
    Ok(Json(view))
}

/// Edit one field; the change is auto-saved after the quiescence window
async fn update_field(
    State(state): State<AppState>,
    Path((id, field_id)): Path<(String, String)>,
    Json(request): Json<UpdateFieldRequest>,
) -> Result<Json<FieldUpdate>> {
    let update = state
        .with_session(&id, |session| {
            match request.value {
                FieldValue::Null => session.clear_value(&field_id)?,
                value => session.set_value(&field_id, value)?,
            }
            Ok(FieldUpdate {
                stats: session.stats(),
                dirty: session.is_dirty(),
                error: session.validate_field(&field_id),
            })
        })
        .await?;
    Ok(Json(update))
}

/// Save the open session now
async fn save_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SaveResponse>> {
    let saved = state.save_session(&id).await?;
    if !saved {
        // Nothing open; make sure the record exists
        state
            .service()
            .get(&id)
            .await
            .map_err(AppError::from)?;
    }
    Ok(Json(SaveResponse { saved }))
}
