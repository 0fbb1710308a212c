//! Form field to PDF field mapping tables
//!
//! Each PDF template has one `FieldMapping`, partitioned by PDF field kind.
//! Tables are plain data keyed by template id; adding a template means
//! registering a new table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Mapping of form field ids to PDF field names for one template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub template_id: String,
    #[serde(default)]
    pub text_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub checkbox_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub date_fields: BTreeMap<String, String>,
    /// Form field whose value names the exported file
    #[serde(default = "default_report_number_field")]
    pub report_number_field: String,
}

fn default_report_number_field() -> String {
    "report_number".to_string()
}

impl FieldMapping {
    pub fn new(template_id: &str) -> Self {
        Self {
            template_id: template_id.to_string(),
            text_fields: BTreeMap::new(),
            checkbox_fields: BTreeMap::new(),
            date_fields: BTreeMap::new(),
            report_number_field: default_report_number_field(),
        }
    }

    pub fn text(mut self, form_field: &str, pdf_field: &str) -> Self {
        self.text_fields
            .insert(form_field.to_string(), pdf_field.to_string());
        self
    }

    pub fn checkbox(mut self, form_field: &str, pdf_field: &str) -> Self {
        self.checkbox_fields
            .insert(form_field.to_string(), pdf_field.to_string());
        self
    }

    pub fn date(mut self, form_field: &str, pdf_field: &str) -> Self {
        self.date_fields
            .insert(form_field.to_string(), pdf_field.to_string());
        self
    }

    pub fn with_report_number_field(mut self, form_field: &str) -> Self {
        self.report_number_field = form_field.to_string();
        self
    }

    /// A form field may appear in only one partition
    pub fn check(&self) -> Result<(), MappingError> {
        let mut seen: HashMap<&str, &'static str> = HashMap::new();
        let partitions: [(&'static str, &BTreeMap<String, String>); 3] = [
            ("text", &self.text_fields),
            ("checkbox", &self.checkbox_fields),
            ("date", &self.date_fields),
        ];

        for (kind, fields) in partitions {
            for form_field in fields.keys() {
                if let Some(previous) = seen.insert(form_field.as_str(), kind) {
                    return Err(MappingError::DuplicateField {
                        template_id: self.template_id.clone(),
                        field: form_field.clone(),
                        first: previous,
                        second: kind,
                    });
                }
            }
        }

        Ok(())
    }

    /// Total number of mapped form fields
    pub fn len(&self) -> usize {
        self.text_fields.len() + self.checkbox_fields.len() + self.date_fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mapping tables keyed by template id
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    mappings: HashMap<String, Arc<FieldMapping>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the tables for the built-in templates
    pub fn builtin() -> Result<Self, MappingError> {
        let mut registry = Self::new();
        registry.register(facility_inspection_mapping())?;
        registry.register(vehicle_inspection_mapping())?;
        Ok(registry)
    }

    pub fn register(&mut self, mapping: FieldMapping) -> Result<(), MappingError> {
        mapping.check()?;
        tracing::debug!(
            template_id = %mapping.template_id,
            fields = mapping.len(),
            "Registered field mapping"
        );
        self.mappings
            .insert(mapping.template_id.clone(), Arc::new(mapping));
        Ok(())
    }

    /// Register a table given as JSON
    pub fn register_json(&mut self, json: &str) -> Result<(), MappingError> {
        let mapping: FieldMapping = serde_json::from_str(json)?;
        self.register(mapping)
    }

    pub fn get(&self, template_id: &str) -> Option<Arc<FieldMapping>> {
        self.mappings.get(template_id).cloned()
    }

    pub fn template_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.mappings.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Table for `facility_inspection_v1.pdf`
pub fn facility_inspection_mapping() -> FieldMapping {
    FieldMapping::new("facility_inspection_v1")
        .text("report_number", "ReportNumber")
        .text("inspector_name", "InspectorName")
        .text("inspector_email", "InspectorEmail")
        .text("site_name", "SiteName")
        .text("site_address", "SiteAddress")
        .text("weather", "Weather")
        .text("temperature", "Temperature")
        .text("hazard_types", "HazardTypes")
        .text("corrective_action", "CorrectiveAction")
        .text("follow_up", "FollowUp")
        .checkbox("hazards_found", "HazardsFound")
        .date("inspection_date", "InspectionDate")
}

/// Table for `vehicle_inspection_v1.pdf`, whose fields are grouped
pub fn vehicle_inspection_mapping() -> FieldMapping {
    FieldMapping::new("vehicle_inspection_v1")
        .text("report_number", "report.number")
        .text("plate", "vehicle.plate")
        .text("odometer", "vehicle.odometer")
        .text("defects", "checks.defects")
        .checkbox("lights_ok", "checks.lights")
        .checkbox("tires_ok", "checks.tires")
        .date("inspection_date", "report.date")
}

/// Mapping table errors
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Field {field} is mapped as both {first} and {second} in template {template_id}")]
    DuplicateField {
        template_id: String,
        field: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("Invalid mapping table: {0}")]
    Parse(#[from] serde_json::Error),
}
