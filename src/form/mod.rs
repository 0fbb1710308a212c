//! Dynamic form engine
//!
//! Turns a declarative `FormSchema` into a section-paginated, validated form
//! with live progress tracking and debounced auto-save.
//!
//! # Architecture
//!
//! ```text
//! FormSchema ──► FormValidator ──► ValidationReport
//!     │
//!     └────────► FormSession ──► render_field ──► RenderedField
//!                    │
//!                    └──► AutoSaveScheduler ──► DraftSink
//! ```

mod autosave;
mod catalog;
mod engine;
mod render;
mod types;
mod validation;

pub use autosave::{AutoSaveScheduler, DraftSink, DEFAULT_AUTOSAVE_WINDOW};
pub use catalog::{facility_inspection_form, vehicle_inspection_form, FormCatalog};
pub use engine::{compute_stats, progress_percent, EngineError, FormSession, FormStats, SectionStats};
pub use render::{
    render_field, ChoiceStyle, DateTimeMode, FieldWidget, InputKind, RenderedField, RendererKind,
    DEFAULT_MAX_IMAGES,
};
pub use types::{
    FieldSpec, FieldType, FieldValidation, FieldValue, FormData, FormSchema, SchemaError,
    DEFAULT_SECTION,
};
pub use validation::{FormValidator, ValidationError, ValidationReport};
