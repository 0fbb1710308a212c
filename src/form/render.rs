//! Field rendering
//!
//! Rendering is a pure function of `(FieldSpec, value, error)`. Each field
//! type maps to one renderer kind; types without a renderer produce nothing.

use serde::Serialize;

use super::types::{FieldSpec, FieldType, FieldValue};
use super::validation::ValidationError;

/// Image slots offered when a schema does not set `maxImages`
pub const DEFAULT_MAX_IMAGES: u32 = 5;

/// Keyboard hint for plain inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    Number,
    Email,
    Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateTimeMode {
    Date,
    Time,
    Datetime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceStyle {
    Dropdown,
    Radio,
}

/// The UI element for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FieldWidget {
    Input {
        input: InputKind,
        multiline: bool,
        value: String,
    },
    DateTime {
        mode: DateTimeMode,
        value: Option<String>,
    },
    SingleChoice {
        style: ChoiceStyle,
        options: Vec<String>,
        selected: Option<String>,
    },
    MultiChoice {
        options: Vec<String>,
        selected: Vec<String>,
    },
    Toggle {
        on: bool,
    },
    Image {
        uris: Vec<String>,
        #[serde(rename = "maxImages")]
        max_images: u32,
        #[serde(rename = "canAdd")]
        can_add: bool,
    },
    Signature {
        uri: Option<String>,
    },
}

/// A field ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedField {
    pub field_id: String,
    pub label: String,
    pub required: bool,
    pub placeholder: Option<String>,
    pub error: Option<String>,
    pub widget: FieldWidget,
}

/// The seven renderer kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererKind {
    PlainInput,
    DateTime,
    SingleChoice,
    MultiChoice,
    Toggle,
    Image,
    Signature,
}

impl RendererKind {
    /// Renderer for a field type, if any
    pub fn for_type(field_type: FieldType) -> Option<Self> {
        match field_type {
            FieldType::Text
            | FieldType::Number
            | FieldType::Email
            | FieldType::Phone
            | FieldType::Textarea => Some(RendererKind::PlainInput),
            FieldType::Date | FieldType::Time | FieldType::Datetime => Some(RendererKind::DateTime),
            FieldType::Select | FieldType::Radio => Some(RendererKind::SingleChoice),
            FieldType::Checkbox => Some(RendererKind::MultiChoice),
            FieldType::Boolean => Some(RendererKind::Toggle),
            FieldType::Image => Some(RendererKind::Image),
            FieldType::Signature => Some(RendererKind::Signature),
            FieldType::Location | FieldType::Unknown => None,
        }
    }

    fn render(self, spec: &FieldSpec, value: Option<&FieldValue>) -> FieldWidget {
        match self {
            RendererKind::PlainInput => render_input(spec, value),
            RendererKind::DateTime => render_date_time(spec, value),
            RendererKind::SingleChoice => render_single_choice(spec, value),
            RendererKind::MultiChoice => render_multi_choice(spec, value),
            RendererKind::Toggle => render_toggle(value),
            RendererKind::Image => render_image(spec, value),
            RendererKind::Signature => render_signature(value),
        }
    }
}

/// Render one field. Returns `None` for types without a renderer.
pub fn render_field(
    spec: &FieldSpec,
    value: Option<&FieldValue>,
    error: Option<&ValidationError>,
) -> Option<RenderedField> {
    let kind = RendererKind::for_type(spec.field_type)?;

    Some(RenderedField {
        field_id: spec.id.clone(),
        label: spec.label.clone(),
        required: spec.required,
        placeholder: spec.placeholder.clone(),
        error: error.map(|e| e.message.clone()),
        widget: kind.render(spec, value),
    })
}

fn text_of(value: Option<&FieldValue>) -> Option<String> {
    value
        .filter(|v| v.is_present())
        .map(FieldValue::to_display_string)
}

fn options_of(spec: &FieldSpec) -> Vec<String> {
    spec.options.clone().unwrap_or_default()
}

fn render_input(spec: &FieldSpec, value: Option<&FieldValue>) -> FieldWidget {
    let input = match spec.field_type {
        FieldType::Number => InputKind::Number,
        FieldType::Email => InputKind::Email,
        FieldType::Phone => InputKind::Phone,
        _ => InputKind::Text,
    };
    FieldWidget::Input {
        input,
        multiline: spec.field_type == FieldType::Textarea,
        value: text_of(value).unwrap_or_default(),
    }
}

fn render_date_time(spec: &FieldSpec, value: Option<&FieldValue>) -> FieldWidget {
    let mode = match spec.field_type {
        FieldType::Time => DateTimeMode::Time,
        FieldType::Datetime => DateTimeMode::Datetime,
        _ => DateTimeMode::Date,
    };
    FieldWidget::DateTime {
        mode,
        value: text_of(value),
    }
}

fn render_single_choice(spec: &FieldSpec, value: Option<&FieldValue>) -> FieldWidget {
    let style = if spec.field_type == FieldType::Radio {
        ChoiceStyle::Radio
    } else {
        ChoiceStyle::Dropdown
    };
    FieldWidget::SingleChoice {
        style,
        options: options_of(spec),
        selected: text_of(value),
    }
}

fn render_multi_choice(spec: &FieldSpec, value: Option<&FieldValue>) -> FieldWidget {
    let selected = match value {
        Some(FieldValue::List(items)) => items.clone(),
        Some(FieldValue::Text(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };
    FieldWidget::MultiChoice {
        options: options_of(spec),
        selected,
    }
}

fn render_toggle(value: Option<&FieldValue>) -> FieldWidget {
    let on = match value {
        Some(FieldValue::Bool(b)) => *b,
        Some(FieldValue::Text(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    };
    FieldWidget::Toggle { on }
}

fn render_image(spec: &FieldSpec, value: Option<&FieldValue>) -> FieldWidget {
    let uris = value.map(FieldValue::uris).unwrap_or_default();
    let max_images = spec.max_images.unwrap_or(DEFAULT_MAX_IMAGES);
    FieldWidget::Image {
        can_add: (uris.len() as u32) < max_images,
        uris,
        max_images,
    }
}

fn render_signature(value: Option<&FieldValue>) -> FieldWidget {
    FieldWidget::Signature {
        uri: text_of(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_and_location_render_nothing() {
        let unknown = FieldSpec::new("x", FieldType::Unknown, "X");
        let location = FieldSpec::new("loc", FieldType::Location, "Location");
        assert!(render_field(&unknown, None, None).is_none());
        assert!(render_field(&location, None, None).is_none());
    }

    #[test]
    fn test_textarea_is_multiline_input() {
        let spec = FieldSpec::new("notes", FieldType::Textarea, "Notes");
        let rendered = render_field(&spec, Some(&FieldValue::text("leak")), None).unwrap();
        assert_eq!(
            rendered.widget,
            FieldWidget::Input {
                input: InputKind::Text,
                multiline: true,
                value: "leak".to_string(),
            }
        );
    }

    #[test]
    fn test_error_is_attached() {
        let spec = FieldSpec::new("site", FieldType::Text, "Site").required();
        let error = ValidationError {
            field_id: "site".to_string(),
            message: "Site is required".to_string(),
        };
        let rendered = render_field(&spec, None, Some(&error)).unwrap();
        assert_eq!(rendered.error.as_deref(), Some("Site is required"));
        assert!(rendered.required);
    }

    #[test]
    fn test_image_slots_respect_max() {
        let spec = FieldSpec::new("photos", FieldType::Image, "Photos").with_max_images(2);
        let value = FieldValue::list(&["/a.jpg", "/b.jpg"]);
        let rendered = render_field(&spec, Some(&value), None).unwrap();
        match rendered.widget {
            FieldWidget::Image { uris, max_images, can_add } => {
                assert_eq!(uris.len(), 2);
                assert_eq!(max_images, 2);
                assert!(!can_add);
            }
            other => panic!("unexpected widget: {:?}", other),
        }
    }

    #[test]
    fn test_choice_styles() {
        let radio = FieldSpec::new("r", FieldType::Radio, "R").with_options(&["Yes", "No"]);
        let rendered = render_field(&radio, Some(&FieldValue::text("No")), None).unwrap();
        assert_eq!(
            rendered.widget,
            FieldWidget::SingleChoice {
                style: ChoiceStyle::Radio,
                options: vec!["Yes".to_string(), "No".to_string()],
                selected: Some("No".to_string()),
            }
        );

        let multi = FieldSpec::new("m", FieldType::Checkbox, "M").with_options(&["a", "b"]);
        let rendered = render_field(&multi, Some(&FieldValue::list(&["b"])), None).unwrap();
        assert_eq!(
            rendered.widget,
            FieldWidget::MultiChoice {
                options: vec!["a".to_string(), "b".to_string()],
                selected: vec!["b".to_string()],
            }
        );
    }
}
