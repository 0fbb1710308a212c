//! Structural validation of form data
//!
//! A `FormValidator` is compiled once per schema and checks a `FormData`
//! bag field by field. Cross-field rules are not evaluated.

use regex::Regex;
use serde::Serialize;

use super::types::{FieldType, FieldValue, FormData, FormSchema, SchemaError};

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// A failed check on one field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field_id: String,
    pub message: String,
}

/// Outcome of validating a whole form
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// At most one error per field, in schema order
    pub errors: Vec<ValidationError>,
    /// Labels of required fields left empty, in schema order
    pub missing_required: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_for(&self, field_id: &str) -> Option<&ValidationError> {
        self.errors.iter().find(|e| e.field_id == field_id)
    }

    pub fn missing_required_labels(&self) -> &[String] {
        &self.missing_required
    }

    /// Errors for fields in one section
    pub fn errors_for_section<'a>(
        &'a self,
        schema: &'a FormSchema,
        section: &'a str,
    ) -> Vec<&'a ValidationError> {
        self.errors
            .iter()
            .filter(|e| {
                schema
                    .field(&e.field_id)
                    .map_or(false, |f| f.section_name() == section)
            })
            .collect()
    }
}

struct FieldRule {
    field_id: String,
    label: String,
    field_type: FieldType,
    required: bool,
    min: Option<f64>,
    max: Option<f64>,
    pattern: Option<Regex>,
}

/// Validator derived from a schema's field list
pub struct FormValidator {
    rules: Vec<FieldRule>,
    email: Regex,
}

impl FormValidator {
    /// Compile the rules for every field of `schema`
    pub fn new(schema: &FormSchema) -> Result<Self, SchemaError> {
        let email = Regex::new(EMAIL_PATTERN).map_err(|e| SchemaError::InvalidPattern {
            field: "email".to_string(),
            message: e.to_string(),
        })?;

        let mut rules = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let validation = field.validation.clone().unwrap_or_default();
            let pattern = match &validation.pattern {
                Some(p) => Some(Regex::new(p).map_err(|e| SchemaError::InvalidPattern {
                    field: field.id.clone(),
                    message: e.to_string(),
                })?),
                None => None,
            };

            rules.push(FieldRule {
                field_id: field.id.clone(),
                label: field.label.clone(),
                field_type: field.field_type,
                required: field.required,
                min: validation.min,
                max: validation.max,
                pattern,
            });
        }

        Ok(Self { rules, email })
    }

    /// Validate every field; no side effects
    pub fn validate(&self, data: &FormData) -> ValidationReport {
        let mut report = ValidationReport::default();

        for rule in &self.rules {
            let value = data.get(&rule.field_id).filter(|v| v.is_present());

            let Some(value) = value else {
                if rule.required {
                    report.missing_required.push(rule.label.clone());
                    report.errors.push(ValidationError {
                        field_id: rule.field_id.clone(),
                        message: format!("{} is required", rule.label),
                    });
                }
                continue;
            };

            if let Some(message) = self.check_value(rule, value) {
                report.errors.push(ValidationError {
                    field_id: rule.field_id.clone(),
                    message,
                });
            }
        }

        report
    }

    /// Validate a single field
    pub fn validate_field(&self, field_id: &str, data: &FormData) -> Option<ValidationError> {
        let rule = self.rules.iter().find(|r| r.field_id == field_id)?;
        match data.get(field_id).filter(|v| v.is_present()) {
            None if rule.required => Some(ValidationError {
                field_id: field_id.to_string(),
                message: format!("{} is required", rule.label),
            }),
            None => None,
            Some(value) => self.check_value(rule, value).map(|message| ValidationError {
                field_id: field_id.to_string(),
                message,
            }),
        }
    }

    fn check_value(&self, rule: &FieldRule, value: &FieldValue) -> Option<String> {
        let text = value.to_display_string();

        if rule.field_type == FieldType::Email && !self.email.is_match(text.trim()) {
            return Some("Please enter a valid email address".to_string());
        }

        if rule.field_type == FieldType::Number {
            let Some(number) = value.as_number().filter(|n| n.is_finite()) else {
                return Some(format!("{} must be a number", rule.label));
            };
            if let Some(min) = rule.min {
                if number < min {
                    return Some(format!("{} must be at least {}", rule.label, min));
                }
            }
            if let Some(max) = rule.max {
                if number > max {
                    return Some(format!("{} must be at most {}", rule.label, max));
                }
            }
        }

        if let Some(pattern) = &rule.pattern {
            if !pattern.is_match(&text) {
                return Some(format!("{} has an invalid format", rule.label));
            }
        }

        None
    }
}

// ============================================================================
// Tests
// ============================================================================
