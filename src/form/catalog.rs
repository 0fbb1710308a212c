//! Form catalog
//!
//! Static schemas available to the app, keyed by form id. Schemas are
//! checked on registration and read-only afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::{FieldSpec, FieldType, FieldValidation, FormSchema, SchemaError};

/// Registered form schemas
#[derive(Debug, Clone, Default)]
pub struct FormCatalog {
    forms: BTreeMap<String, Arc<FormSchema>>,
}

impl FormCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in inspection forms
    pub fn builtin() -> Result<Self, SchemaError> {
        let mut catalog = Self::new();
        catalog.register(facility_inspection_form())?;
        catalog.register(vehicle_inspection_form())?;
        Ok(catalog)
    }

    /// Add a schema after checking it
    pub fn register(&mut self, schema: FormSchema) -> Result<(), SchemaError> {
        schema.check()?;
        tracing::debug!(form_id = %schema.id, fields = schema.fields.len(), "Registered form");
        self.forms.insert(schema.id.clone(), Arc::new(schema));
        Ok(())
    }

    pub fn get(&self, form_id: &str) -> Option<Arc<FormSchema>> {
        self.forms.get(form_id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<FormSchema>> {
        self.forms.values().cloned().collect()
    }

    /// Forms belonging to one inspection category
    pub fn by_category(&self, category_id: &str) -> Vec<Arc<FormSchema>> {
        self.forms
            .values()
            .filter(|f| f.category_id == category_id)
            .cloned()
            .collect()
    }
}

/// General facility inspection, filled into `facility_inspection_v1.pdf`
pub fn facility_inspection_form() -> FormSchema {
    FormSchema {
        id: "facility_inspection".to_string(),
        name: "Facility Inspection".to_string(),
        category_id: "facility".to_string(),
        description: Some("Routine safety inspection of a site or building".to_string()),
        fields: vec![
            FieldSpec::new("report_number", FieldType::Text, "Report Number")
                .required()
                .with_placeholder("RPT-0001")
                .in_section("Report Details"),
            FieldSpec::new("inspection_date", FieldType::Date, "Inspection Date")
                .required()
                .in_section("Report Details"),
            FieldSpec::new("inspector_name", FieldType::Text, "Inspector Name")
                .required()
                .in_section("Report Details"),
            FieldSpec::new("inspector_email", FieldType::Email, "Inspector Email")
                .in_section("Report Details"),
            FieldSpec::new("site_name", FieldType::Text, "Site Name")
                .required()
                .in_section("Site"),
            FieldSpec::new("site_address", FieldType::Textarea, "Site Address").in_section("Site"),
            FieldSpec::new("weather", FieldType::Select, "Weather")
                .with_options(&["Clear", "Cloudy", "Rain", "Snow", "Wind"])
                .in_section("Site"),
            FieldSpec::new("temperature", FieldType::Number, "Temperature (C)")
                .with_validation(FieldValidation {
                    min: Some(-50.0),
                    max: Some(60.0),
                    pattern: None,
                })
                .in_section("Site"),
            FieldSpec::new("hazards_found", FieldType::Boolean, "Hazards Found").in_section("Findings"),
            FieldSpec::new("hazard_types", FieldType::Checkbox, "Hazard Types")
                .with_options(&["Electrical", "Fire", "Structural", "Chemical", "Trip"])
                .in_section("Findings"),
            FieldSpec::new("corrective_action", FieldType::Textarea, "Corrective Action")
                .in_section("Findings"),
            FieldSpec::new("follow_up", FieldType::Radio, "Follow-up Required")
                .with_options(&["Yes", "No"])
                .in_section("Findings"),
            FieldSpec::new("site_photos", FieldType::Image, "Site Photos")
                .with_max_images(4)
                .in_section("Photos"),
            FieldSpec::new("inspector_signature", FieldType::Signature, "Inspector Signature")
                .in_section("Photos"),
        ],
        pdf_template_ref: Some("facility_inspection_v1".to_string()),
        estimated_minutes: 20,
    }
}

/// Pre-trip vehicle check, filled into `vehicle_inspection_v1.pdf`
pub fn vehicle_inspection_form() -> FormSchema {
    FormSchema {
        id: "vehicle_inspection".to_string(),
        name: "Vehicle Inspection".to_string(),
        category_id: "vehicle".to_string(),
        description: Some("Pre-trip check of a fleet vehicle".to_string()),
        fields: vec![
            FieldSpec::new("report_number", FieldType::Text, "Report Number").required(),
            FieldSpec::new("inspection_date", FieldType::Date, "Inspection Date").required(),
            FieldSpec::new("plate", FieldType::Text, "License Plate")
                .required()
                .with_validation(FieldValidation {
                    pattern: Some(r"^[A-Z0-9 -]{2,10}$".to_string()),
                    ..Default::default()
                }),
            FieldSpec::new("odometer", FieldType::Number, "Odometer (km)").with_validation(
                FieldValidation {
                    min: Some(0.0),
                    ..Default::default()
                },
            ),
            FieldSpec::new("lights_ok", FieldType::Boolean, "Lights OK").in_section("Checks"),
            FieldSpec::new("tires_ok", FieldType::Boolean, "Tires OK").in_section("Checks"),
            FieldSpec::new("defects", FieldType::Textarea, "Defects").in_section("Checks"),
            FieldSpec::new("damage_photos", FieldType::Image, "Damage Photos")
                .with_max_images(6)
                .in_section("Checks"),
        ],
        pdf_template_ref: Some("vehicle_inspection_v1".to_string()),
        estimated_minutes: 10,
    }
}
