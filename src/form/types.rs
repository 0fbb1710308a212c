//! Form schema and form data types
//!
//! A `FormSchema` is the declarative description of one inspection form.
//! `FormData` is the value bag collected while a user fills it in.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Section used for fields that do not name one
pub const DEFAULT_SECTION: &str = "General";

// ============================================================================
// Field Types
// ============================================================================

/// Kind of input a field collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Email,
    Phone,
    Date,
    Time,
    Datetime,
    Textarea,
    Select,
    Radio,
    Checkbox,
    Boolean,
    Image,
    Signature,
    Location,
    /// Any type this build does not know about
    #[serde(other)]
    Unknown,
}

impl FieldType {
    /// Whether the field picks from `options`
    pub fn is_choice(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio | FieldType::Checkbox)
    }
}

/// Per-field constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// One field of a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// Unique within the owning form
    pub id: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    #[serde(default)]
    pub required: bool,

    /// Ordered choices for select/radio/checkbox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_images: Option<u32>,

    /// Carried in schemas but never evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
}

impl FieldSpec {
    pub fn new(id: &str, field_type: FieldType, label: &str) -> Self {
        Self {
            id: id.to_string(),
            field_type,
            label: label.to_string(),
            placeholder: None,
            required: false,
            options: None,
            validation: None,
            section: None,
            max_images: None,
            depends_on: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn in_section(mut self, section: &str) -> Self {
        self.section = Some(section.to_string());
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = Some(options.iter().map(|o| o.to_string()).collect());
        self
    }

    pub fn with_placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn with_validation(mut self, validation: FieldValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_max_images(mut self, max: u32) -> Self {
        self.max_images = Some(max);
        self
    }

    /// Section this field is displayed in
    pub fn section_name(&self) -> &str {
        match self.section.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => DEFAULT_SECTION,
        }
    }
}

// ============================================================================
// Form Schema
// ============================================================================

/// Declarative description of an inspection form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSchema {
    pub id: String,
    pub name: String,
    pub category_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Display order is section order
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_template_ref: Option<String>,
    #[serde(default)]
    pub estimated_minutes: u32,
}

impl FormSchema {
    /// Distinct section names in order of first appearance. Never empty.
    pub fn sections(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut sections = Vec::new();
        for field in &self.fields {
            let name = field.section_name();
            if seen.insert(name) {
                sections.push(name.to_string());
            }
        }
        if sections.is_empty() {
            sections.push(DEFAULT_SECTION.to_string());
        }
        sections
    }

    /// Fields belonging to a section, in schema order
    pub fn fields_in_section<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a FieldSpec> + 'a {
        self.fields.iter().filter(move |f| f.section_name() == section)
    }

    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Structural self-check of the schema
    pub fn check(&self) -> Result<(), SchemaError> {
        let mut ids = HashSet::new();
        for field in &self.fields {
            if !ids.insert(field.id.as_str()) {
                return Err(SchemaError::DuplicateFieldId(field.id.clone()));
            }

            if field.field_type.is_choice()
                && field.options.as_ref().map_or(true, |o| o.is_empty())
            {
                return Err(SchemaError::MissingOptions(field.id.clone()));
            }

            if let Some(validation) = &field.validation {
                if let (Some(min), Some(max)) = (validation.min, validation.max) {
                    if min > max {
                        return Err(SchemaError::InvalidRange {
                            field: field.id.clone(),
                            min,
                            max,
                        });
                    }
                }
                if let Some(pattern) = &validation.pattern {
                    regex::Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                        field: field.id.clone(),
                        message: e.to_string(),
                    })?;
                }
            }
        }
        Ok(())
    }
}

/// Schema definition errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Duplicate field id: {0}")]
    DuplicateFieldId(String),

    #[error("Field {0} needs at least one option")]
    MissingOptions(String),

    #[error("Field {field} has min {min} greater than max {max}")]
    InvalidRange { field: String, min: f64, max: f64 },

    #[error("Field {field} has an invalid pattern: {message}")]
    InvalidPattern { field: String, message: String },
}

// ============================================================================
// Form Data
// ============================================================================

/// A single collected value; its shape depends on the field type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn text(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }

    pub fn list(values: &[&str]) -> Self {
        FieldValue::List(values.iter().map(|v| v.to_string()).collect())
    }

    /// Counts toward completion: not null, not an empty string, not an empty list
    pub fn is_present(&self) -> bool {
        match self {
            FieldValue::Null => false,
            FieldValue::Text(s) => !s.is_empty(),
            FieldValue::List(items) => !items.is_empty(),
            FieldValue::Bool(_) | FieldValue::Number(_) => true,
        }
    }

    /// Checkbox truthiness used when filling PDFs
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::List(items) => !items.is_empty(),
            FieldValue::Bool(b) => *b,
            FieldValue::Text(s) => !s.trim().is_empty(),
            FieldValue::Null | FieldValue::Number(_) => false,
        }
    }

    /// Plain-text rendering used for pattern checks and text-field output
    pub fn to_display_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(true) => "Yes".to_string(),
            FieldValue::Bool(false) => "No".to_string(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join(", "),
        }
    }

    /// Numeric view, parsing text if needed
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// URIs held by an image or signature field
    pub fn uris(&self) -> Vec<String> {
        match self {
            FieldValue::Text(s) if !s.is_empty() => vec![s.clone()],
            FieldValue::List(items) => items.clone(),
            _ => Vec::new(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

/// Field id to collected value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormData(BTreeMap<String, FieldValue>);

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field_id: &str) -> Option<&FieldValue> {
        self.0.get(field_id)
    }

    pub fn set(&mut self, field_id: &str, value: impl Into<FieldValue>) {
        self.0.insert(field_id.to_string(), value.into());
    }

    pub fn remove(&mut self, field_id: &str) -> Option<FieldValue> {
        self.0.remove(field_id)
    }

    /// Whether the field holds a present value
    pub fn is_present(&self, field_id: &str) -> bool {
        self.0.get(field_id).map_or(false, FieldValue::is_present)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for FormData {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: Vec<FieldSpec>) -> FormSchema {
        FormSchema {
            id: "site".to_string(),
            name: "Site Inspection".to_string(),
            category_id: "general".to_string(),
            description: None,
            fields,
            pdf_template_ref: None,
            estimated_minutes: 10,
        }
    }

    #[test]
    fn test_sections_default_to_general() {
        let form = schema(vec![
            FieldSpec::new("a", FieldType::Text, "A"),
            FieldSpec::new("b", FieldType::Number, "B"),
        ]);
        assert_eq!(form.sections(), vec!["General".to_string()]);
    }

    #[test]
    fn test_sections_first_occurrence_order() {
        let form = schema(vec![
            FieldSpec::new("a", FieldType::Text, "A").in_section("Site"),
            FieldSpec::new("b", FieldType::Text, "B"),
            FieldSpec::new("c", FieldType::Text, "C").in_section("Site"),
            FieldSpec::new("d", FieldType::Text, "D").in_section("Photos"),
        ]);
        assert_eq!(form.sections(), vec!["Site", "General", "Photos"]);
        assert_eq!(form.fields_in_section("Site").count(), 2);
    }

    #[test]
    fn test_empty_schema_still_has_a_section() {
        let form = schema(vec![]);
        assert_eq!(form.sections(), vec!["General".to_string()]);
    }

    #[test]
    fn test_check_rejects_duplicates_and_missing_options() {
        let dup = schema(vec![
            FieldSpec::new("a", FieldType::Text, "A"),
            FieldSpec::new("a", FieldType::Text, "A again"),
        ]);
        assert_eq!(dup.check(), Err(SchemaError::DuplicateFieldId("a".to_string())));

        let no_options = schema(vec![FieldSpec::new("s", FieldType::Select, "S")]);
        assert_eq!(no_options.check(), Err(SchemaError::MissingOptions("s".to_string())));

        let bad_pattern = schema(vec![FieldSpec::new("p", FieldType::Text, "P").with_validation(
            FieldValidation {
                pattern: Some("(".to_string()),
                ..Default::default()
            },
        )]);
        assert!(matches!(bad_pattern.check(), Err(SchemaError::InvalidPattern { .. })));
    }

    #[test]
    fn test_presence_rules() {
        assert!(!FieldValue::Null.is_present());
        assert!(!FieldValue::text("").is_present());
        assert!(!FieldValue::List(vec![]).is_present());
        assert!(FieldValue::Bool(false).is_present());
        assert!(FieldValue::text(" ").is_present());
        assert!(FieldValue::list(&["x"]).is_present());
    }

    #[test]
    fn test_truthiness_rules() {
        assert!(FieldValue::list(&["yes"]).is_truthy());
        assert!(FieldValue::Bool(true).is_truthy());
        assert!(FieldValue::text("x").is_truthy());
        assert!(!FieldValue::text("   ").is_truthy());
        assert!(!FieldValue::List(vec![]).is_truthy());
        assert!(!FieldValue::Bool(false).is_truthy());
        assert!(!FieldValue::Null.is_truthy());
    }

    #[test]
    fn test_form_data_json_shapes() {
        let json = r#"{"name":"Depot","ok":true,"count":3,"tags":["a","b"],"gone":null}"#;
        let data: FormData = serde_json::from_str(json).unwrap();
        assert_eq!(data.get("name"), Some(&FieldValue::text("Depot")));
        assert_eq!(data.get("ok"), Some(&FieldValue::Bool(true)));
        assert_eq!(data.get("count"), Some(&FieldValue::Number(3.0)));
        assert_eq!(data.get("tags"), Some(&FieldValue::list(&["a", "b"])));
        assert_eq!(data.get("gone"), Some(&FieldValue::Null));
        assert_eq!(FieldValue::Number(3.0).to_display_string(), "3");
    }

    #[test]
    fn test_unknown_field_type_deserializes() {
        let json = r#"{"id":"x","type":"hologram","label":"X"}"#;
        let field: FieldSpec = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_type, FieldType::Unknown);
        assert_eq!(field.section_name(), DEFAULT_SECTION);
    }
}
