//! PDF report export
//!
//! Fills a fixed AcroForm template from form data through a declarative
//! field mapping, writes the report and hands it to a share target.
//!
//! - `mapping`: form field id to PDF field name tables, keyed by template
//! - `acroform`: field discovery and value encoding on `lopdf` documents
//! - `fill`: `PdfFillEngine::fill_template` returning `ExportResult`
//! - `share`: where finished reports go

mod acroform;
mod fill;
mod mapping;
mod share;

pub use acroform::{
    check_box, decode_text, discover_fields, encode_text, field_kind, is_checked,
    set_need_appearances, set_text, text_value, PdfFieldKind,
};
pub use fill::{
    fill_bytes, output_file_name, parse_date, ExportResult, FieldMappingWarning, FillError,
    FilledDocument, PdfFillEngine, PDF_DATE_FORMAT,
};
pub use mapping::{
    facility_inspection_mapping, vehicle_inspection_mapping, FieldMapping, MappingError,
    MappingRegistry,
};
pub use share::{LogShareTarget, OutboxShareTarget, ShareError, ShareTarget, PDF_MIME};

#[cfg(test)]
pub(crate) use acroform::build_template;
