//! AcroForm access on a loaded `lopdf::Document`
//!
//! Discovers terminal form fields by fully qualified name and writes text
//! and checkbox values into them.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

/// Guard against malformed (cyclic) field trees
const MAX_FIELD_DEPTH: usize = 32;

/// Kind of a terminal field, from its (possibly inherited) `/FT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfFieldKind {
    Text,
    Button,
    Choice,
    Signature,
    Unknown,
}

/// Resolve an indirect reference, returning the object itself otherwise
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn acroform_dict(doc: &Document) -> Option<&Dictionary> {
    let root_id = doc.trailer.get(b"Root").ok()?.as_reference().ok()?;
    let catalog = doc.get_object(root_id).ok()?.as_dict().ok()?;
    let acroform = catalog.get(b"AcroForm").ok()?;
    resolve(doc, acroform).as_dict().ok()
}

/// Decode a PDF text string: UTF-16BE with BOM, else UTF-8, else Latin-1
pub fn decode_text(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => {
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let units: Vec<u16> = bytes[2..]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16(&units).ok()
            } else {
                match std::str::from_utf8(bytes) {
                    Ok(s) => Some(s.to_string()),
                    Err(_) => Some(bytes.iter().map(|&b| b as char).collect()),
                }
            }
        }
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// ASCII goes in as a literal string, anything else as UTF-16BE with BOM
pub fn encode_text(value: &str) -> Object {
    if value.is_ascii() {
        Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in value.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn kid_ids(dict: &Dictionary) -> Vec<ObjectId> {
    dict.get(b"Kids")
        .and_then(Object::as_array)
        .map(|kids| kids.iter().filter_map(|k| k.as_reference().ok()).collect())
        .unwrap_or_default()
}

fn has_partial_name(doc: &Document, id: ObjectId) -> bool {
    doc.get_object(id)
        .and_then(Object::as_dict)
        .map(|d| d.has(b"T"))
        .unwrap_or(false)
}

/// All terminal fields keyed by fully qualified (dotted) name.
///
/// A document without an AcroForm has no fields.
pub fn discover_fields(doc: &Document) -> BTreeMap<String, ObjectId> {
    let mut fields = BTreeMap::new();

    let Some(acroform) = acroform_dict(doc) else {
        return fields;
    };

    let roots: Vec<ObjectId> = acroform
        .get(b"Fields")
        .map(|f| resolve(doc, f))
        .and_then(Object::as_array)
        .map(|arr| arr.iter().filter_map(|o| o.as_reference().ok()).collect())
        .unwrap_or_default();

    for id in roots {
        collect_field(doc, id, None, 0, &mut fields);
    }

    fields
}

fn collect_field(
    doc: &Document,
    id: ObjectId,
    parent_name: Option<&str>,
    depth: usize,
    out: &mut BTreeMap<String, ObjectId>,
) {
    if depth > MAX_FIELD_DEPTH {
        tracing::warn!(?id, "Field tree too deep, skipping");
        return;
    }
    let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
        return;
    };

    let partial = dict.get(b"T").ok().and_then(|t| decode_text(resolve(doc, t)));
    let name = match (parent_name, partial) {
        (Some(parent), Some(partial)) => format!("{}.{}", parent, partial),
        (None, Some(partial)) => partial,
        (Some(parent), None) => parent.to_string(),
        (None, None) => return,
    };

    // Kids without /T are widgets of this field, not child fields
    let child_fields: Vec<ObjectId> = kid_ids(dict)
        .into_iter()
        .filter(|kid| has_partial_name(doc, *kid))
        .collect();

    if child_fields.is_empty() {
        out.insert(name, id);
    } else {
        for kid in child_fields {
            collect_field(doc, kid, Some(&name), depth + 1, out);
        }
    }
}

/// Field kind, following `/Parent` for an inherited `/FT`
pub fn field_kind(doc: &Document, id: ObjectId) -> PdfFieldKind {
    let mut current = Some(id);
    let mut depth = 0;

    while let Some(id) = current {
        if depth > MAX_FIELD_DEPTH {
            break;
        }
        let Ok(dict) = doc.get_object(id).and_then(Object::as_dict) else {
            break;
        };
        if let Ok(Object::Name(ft)) = dict.get(b"FT") {
            return match ft.as_slice() {
                b"Tx" => PdfFieldKind::Text,
                b"Btn" => PdfFieldKind::Button,
                b"Ch" => PdfFieldKind::Choice,
                b"Sig" => PdfFieldKind::Signature,
                _ => PdfFieldKind::Unknown,
            };
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    PdfFieldKind::Unknown
}

/// Widget annotations of a terminal field: its unnamed kids, or the field
/// itself when field and widget are merged.
fn widget_ids(doc: &Document, field_id: ObjectId) -> Vec<ObjectId> {
    let kids = doc
        .get_object(field_id)
        .and_then(Object::as_dict)
        .map(kid_ids)
        .unwrap_or_default();

    if kids.is_empty() {
        vec![field_id]
    } else {
        kids
    }
}

/// First non-`Off` appearance state of a widget
fn on_state(doc: &Document, widget_id: ObjectId) -> Option<Vec<u8>> {
    let widget = doc.get_object(widget_id).ok()?.as_dict().ok()?;
    let ap = resolve(doc, widget.get(b"AP").ok()?).as_dict().ok()?;
    let normal = resolve(doc, ap.get(b"N").ok()?).as_dict().ok()?;
    normal
        .iter()
        .map(|(key, _)| key)
        .find(|key| key.as_slice() != b"Off")
        .cloned()
}

/// Write a text value and drop stale appearance streams
pub fn set_text(doc: &mut Document, field_id: ObjectId, value: &str) -> Result<(), lopdf::Error> {
    let widgets = widget_ids(doc, field_id);

    let field = doc.get_object_mut(field_id)?.as_dict_mut()?;
    field.set("V", encode_text(value));
    field.remove(b"AP");

    for widget_id in widgets.into_iter().filter(|w| *w != field_id) {
        if let Ok(widget) = doc.get_object_mut(widget_id).and_then(Object::as_dict_mut) {
            widget.remove(b"AP");
        }
    }

    Ok(())
}

/// Check a checkbox using the state name its appearance dictionary
/// declares (`Yes` when none is declared). Returns the state used.
pub fn check_box(doc: &mut Document, field_id: ObjectId) -> Result<String, lopdf::Error> {
    let widgets = widget_ids(doc, field_id);
    let on = widgets
        .iter()
        .find_map(|w| on_state(doc, *w))
        .unwrap_or_else(|| b"Yes".to_vec());

    doc.get_object_mut(field_id)?
        .as_dict_mut()?
        .set("V", Object::Name(on.clone()));

    for widget_id in widgets {
        if let Ok(widget) = doc.get_object_mut(widget_id).and_then(Object::as_dict_mut) {
            widget.set("AS", Object::Name(on.clone()));
        }
    }

    Ok(String::from_utf8_lossy(&on).into_owned())
}

/// Ask viewers to regenerate field appearances
pub fn set_need_appearances(doc: &mut Document) -> Result<(), lopdf::Error> {
    let root_id = doc.trailer.get(b"Root")?.as_reference()?;
    let acroform = doc.get_object(root_id)?.as_dict()?.get(b"AcroForm")?.clone();

    match acroform {
        Object::Reference(id) => {
            doc.get_object_mut(id)?
                .as_dict_mut()?
                .set("NeedAppearances", true);
        }
        Object::Dictionary(_) => {
            doc.get_object_mut(root_id)?
                .as_dict_mut()?
                .get_mut(b"AcroForm")?
                .as_dict_mut()?
                .set("NeedAppearances", true);
        }
        _ => {}
    }

    Ok(())
}

/// Current text value of a field
pub fn text_value(doc: &Document, field_id: ObjectId) -> Option<String> {
    let field = doc.get_object(field_id).ok()?.as_dict().ok()?;
    decode_text(resolve(doc, field.get(b"V").ok()?))
}

/// Whether a checkbox holds an on-state
pub fn is_checked(doc: &Document, field_id: ObjectId) -> bool {
    let value = doc
        .get_object(field_id)
        .and_then(Object::as_dict)
        .and_then(|f| f.get(b"V"));

    matches!(value, Ok(Object::Name(name)) if name.as_slice() != b"Off")
}

// ============================================================================
// Test templates
// ============================================================================

/// Build a one-page AcroForm template in memory.
///
/// Dotted names become a parent field with a named kid; checkboxes get an
/// appearance dictionary with the states `On` and `Off`.
#[cfg(test)]
pub(crate) fn build_template(text_fields: &[&str], checkboxes: &[&str]) -> Vec<u8> {
    use lopdf::{dictionary, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();

    let rect = || -> Object {
        vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(120),
            Object::Integer(20),
        ]
        .into()
    };

    let on_ap = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
    let off_ap = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));

    let mut annots: Vec<Object> = Vec::new();
    let mut roots: Vec<Object> = Vec::new();
    let mut parents: BTreeMap<String, (ObjectId, Vec<Object>)> = BTreeMap::new();

    let specs = text_fields
        .iter()
        .map(|n| (*n, false))
        .chain(checkboxes.iter().map(|n| (*n, true)));

    for (name, is_checkbox) in specs {
        let (parent, leaf) = match name.split_once('.') {
            Some((p, l)) => (Some(p), l),
            None => (None, name),
        };

        let mut field = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "T" => Object::string_literal(leaf),
            "Rect" => rect(),
            "P" => page_id,
        };
        if is_checkbox {
            field.set("FT", "Btn");
            field.set("V", "Off");
            field.set("AS", "Off");
            field.set(
                "AP",
                dictionary! { "N" => dictionary! { "On" => on_ap, "Off" => off_ap } },
            );
        } else {
            field.set("FT", "Tx");
        }

        let field_id = doc.new_object_id();
        annots.push(field_id.into());

        match parent {
            Some(parent) => {
                let entry = parents
                    .entry(parent.to_string())
                    .or_insert_with(|| (doc.new_object_id(), Vec::new()));
                field.set("Parent", entry.0);
                entry.1.push(field_id.into());
            }
            None => roots.push(field_id.into()),
        }

        doc.objects.insert(field_id, Object::Dictionary(field));
    }

    for (name, (id, kids)) in parents {
        roots.push(id.into());
        doc.objects.insert(
            id,
            Object::Dictionary(dictionary! {
                "T" => Object::string_literal(name),
                "Kids" => kids,
            }),
        );
    }

    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
            "Annots" => annots,
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );

    let acroform_id = doc.add_object(dictionary! { "Fields" => roots });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(bytes: &[u8]) -> Document {
        Document::load_mem(bytes).unwrap()
    }

    #[test]
    fn test_discover_flat_and_grouped_fields() {
        let bytes = build_template(&["Name", "vehicle.plate", "vehicle.vin"], &["Done"]);
        let doc = load(&bytes);

        let fields = discover_fields(&doc);
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["Done", "Name", "vehicle.plate", "vehicle.vin"]);

        assert_eq!(field_kind(&doc, fields["Name"]), PdfFieldKind::Text);
        assert_eq!(field_kind(&doc, fields["Done"]), PdfFieldKind::Button);
    }

    #[test]
    fn test_document_without_acroform_has_no_fields() {
        let mut doc = Document::with_version("1.5");
        let catalog_id = doc.add_object(lopdf::dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", catalog_id);
        assert!(discover_fields(&doc).is_empty());
    }

    #[test]
    fn test_text_round_trip_ascii_and_unicode() {
        let bytes = build_template(&["Name", "Note"], &[]);
        let mut doc = load(&bytes);
        let fields = discover_fields(&doc);

        set_text(&mut doc, fields["Name"], "Jane O'Neil (Site 4)").unwrap();
        set_text(&mut doc, fields["Note"], "Prüfung ✓").unwrap();

        let mut saved = Vec::new();
        doc.save_to(&mut saved).unwrap();
        let reloaded = load(&saved);
        let fields = discover_fields(&reloaded);

        assert_eq!(
            text_value(&reloaded, fields["Name"]).as_deref(),
            Some("Jane O'Neil (Site 4)")
        );
        assert_eq!(text_value(&reloaded, fields["Note"]).as_deref(), Some("Prüfung ✓"));
    }

    #[test]
    fn test_check_box_uses_declared_on_state() {
        let bytes = build_template(&[], &["Done"]);
        let mut doc = load(&bytes);
        let id = discover_fields(&doc)["Done"];

        assert!(!is_checked(&doc, id));
        let state = check_box(&mut doc, id).unwrap();
        assert_eq!(state, "On");
        assert!(is_checked(&doc, id));

        let widget = doc.get_object(id).unwrap().as_dict().unwrap();
        assert!(matches!(widget.get(b"AS"), Ok(Object::Name(n)) if n == b"On"));
    }

    #[test]
    fn test_need_appearances_is_set() {
        let bytes = build_template(&["Name"], &[]);
        let mut doc = load(&bytes);
        set_need_appearances(&mut doc).unwrap();

        let acroform = acroform_dict(&doc).unwrap();
        assert!(matches!(acroform.get(b"NeedAppearances"), Ok(Object::Boolean(true))));
    }

    #[test]
    fn test_encode_text_picks_encoding() {
        assert!(matches!(encode_text("abc"), Object::String(b, StringFormat::Literal) if b == b"abc"));
        match encode_text("é") {
            Object::String(bytes, _) => assert_eq!(bytes, vec![0xFE, 0xFF, 0x00, 0xE9]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
