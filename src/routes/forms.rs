//! Form catalog routes

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::form::FormSchema;
use crate::state::AppState;

/// Create the forms router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_forms))
        .route("/:form_id", get(get_form))
}

#[derive(Debug, Deserialize)]
pub struct ListFormsQuery {
    pub category: Option<String>,
}

/// Catalog entry
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub id: String,
    pub name: String,
    pub category_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub estimated_minutes: u32,
    pub field_count: usize,
    pub sections: Vec<String>,
}

impl From<&FormSchema> for FormSummary {
    fn from(schema: &FormSchema) -> Self {
        Self {
            id: schema.id.clone(),
            name: schema.name.clone(),
            category_id: schema.category_id.clone(),
            description: schema.description.clone(),
            estimated_minutes: schema.estimated_minutes,
            field_count: schema.fields.len(),
            sections: schema.sections(),
        }
    }
}

/// Full schema plus its derived sections
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDetail {
    #[serde(flatten)]
    pub schema: FormSchema,
    pub sections: Vec<String>,
}

/// List forms, optionally for one category
async fn list_forms(
    State(state): State<AppState>,
    Query(query): Query<ListFormsQuery>,
) -> Json<Vec<FormSummary>> {
    let catalog = state.service().catalog();
    let forms: Vec<Arc<FormSchema>> = match &query.category {
        Some(category) => catalog.by_category(category),
        None => catalog.list(),
    };
    Json(forms.iter().map(|f| FormSummary::from(f.as_ref())).collect())
}

/// Get one form schema
async fn get_form(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> Result<Json<FormDetail>> {
    let schema = state
        .service()
        .catalog()
        .get(&form_id)
        .ok_or_else(|| AppError::NotFound(format!("Form not found: {}", form_id)))?;

    Ok(Json(FormDetail {
        sections: schema.sections(),
        schema: schema.as_ref().clone(),
    }))
}
