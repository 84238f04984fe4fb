//! Report aggregation.
//!
//! Flattens the raw setup and assessment records into an ordered list of
//! sections, each either absent or a tree of labelled values. Aggregation
//! never fails: missing or malformed sections become [`SectionBody::Absent`].

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::warn;

use crate::model::{AssessmentSetup, Section};

/// Placeholder printed for a section with no recorded data.
pub const NO_DATA: &str = "No data recorded for this section.";

/// Title of the setup pseudo-section.
pub const SETUP_TITLE: &str = "Assessment Setup";

/// Text for a null or empty value.
const NOT_APPLICABLE: &str = "N/A";

/// A normalized report ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Date printed on the cover and footers.
    pub generated: NaiveDate,
    /// Typed view of the setup record (defaults when absent or malformed).
    pub setup: AssessmentSetup,
    /// Sections in canonical order, setup first.
    pub sections: Vec<ReportSection>,
}

/// One top-level section of the report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    /// Heading text.
    pub title: String,
    /// Content, or absence.
    pub body: SectionBody,
}

/// Content of a section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    /// Nothing recorded; render [`NO_DATA`].
    Absent,
    /// Recorded fields in record order.
    Fields(Vec<FieldNode>),
}

/// A node in a section's field tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldNode {
    /// A scalar field.
    Row {
        /// Humanized field name.
        label: String,
        /// Display value.
        value: String,
    },
    /// An image array, summarised by its length.
    ImageCount {
        /// Humanized field name.
        label: String,
        /// Number of images.
        count: usize,
    },
    /// A nested sub-record.
    Group {
        /// Humanized field name.
        title: String,
        /// Fields of the sub-record.
        children: Vec<FieldNode>,
    },
    /// One element of an entity array (e.g. "Transformer 1").
    Entity {
        /// Singular name and 1-based position.
        title: String,
        /// Fields of the entity.
        children: Vec<FieldNode>,
    },
}

impl Report {
    /// Key cover-page fields as `(label, value)` pairs.
    #[must_use]
    pub fn cover_fields(&self) -> Vec<(&'static str, String)> {
        let setup = &self.setup;
        let mut fields = vec![
            ("Site Name", display_or_na(&setup.site_name)),
            ("Representative", display_or_na(&setup.representative)),
            ("Assessment Date", display_or_na(&setup.assessment_date)),
            ("Safety Entry", yes_no(setup.safety_entry).to_string()),
        ];
        if let Some(reason) = setup.decline_reason.as_deref() {
            fields.push(("Decline Reason", display_or_na(reason)));
        }
        fields
    }
}

/// Aggregate raw records into a [`Report`].
#[must_use]
pub fn aggregate(setup: Option<&Value>, data: Option<&Value>, generated: NaiveDate) -> Report {
    let typed_setup = setup
        .and_then(|value| match serde_json::from_value(value.clone()) {
            Ok(setup) => Some(setup),
            Err(e) => {
                warn!("Setup record is malformed, cover page will be blank: {}", e);
                None
            }
        })
        .unwrap_or_default();

    let mut sections = Vec::with_capacity(Section::ALL.len() + 1);
    sections.push(ReportSection {
        title: SETUP_TITLE.to_string(),
        body: section_body(setup),
    });
    for section in Section::ALL {
        sections.push(ReportSection {
            title: section.title().to_string(),
            body: section_body(data.and_then(|d| d.get(section.key()))),
        });
    }

    Report {
        generated,
        setup: typed_setup,
        sections,
    }
}

fn section_body(value: Option<&Value>) -> SectionBody {
    match value {
        Some(Value::Object(map)) if !map.is_empty() => SectionBody::Fields(field_nodes(map, false)),
        _ => SectionBody::Absent,
    }
}

fn field_nodes(map: &Map<String, Value>, is_entity: bool) -> Vec<FieldNode> {
    let mut nodes = Vec::new();
    for (key, value) in map {
        if is_entity && key == "id" {
            continue;
        }
        if is_image_field(key) {
            let count = value.as_array().map_or(0, Vec::len);
            if count > 0 {
                nodes.push(FieldNode::ImageCount {
                    label: humanize(key),
                    count,
                });
            }
            continue;
        }
        match value {
            Value::Object(child) if child.is_empty() => nodes.push(FieldNode::Row {
                label: humanize(key),
                value: NOT_APPLICABLE.to_string(),
            }),
            Value::Object(child) => nodes.push(FieldNode::Group {
                title: humanize(key),
                children: field_nodes(child, false),
            }),
            Value::Array(items) if items.iter().any(Value::is_object) => {
                let singular = singular_name(key);
                let entities = items.iter().filter_map(Value::as_object);
                for (index, entity) in entities.enumerate() {
                    nodes.push(FieldNode::Entity {
                        title: format!("{singular} {}", index + 1),
                        children: field_nodes(entity, true),
                    });
                }
            }
            Value::Array(items) if items.is_empty() => nodes.push(FieldNode::Row {
                label: humanize(key),
                value: "None recorded".to_string(),
            }),
            Value::Array(items) => nodes.push(FieldNode::Row {
                label: humanize(key),
                value: items.iter().map(format_scalar).collect::<Vec<_>>().join(", "),
            }),
            scalar => nodes.push(FieldNode::Row {
                label: humanize(key),
                value: format_scalar(scalar),
            }),
        }
    }
    nodes
}

/// Whether a field holds images and must never be printed inline.
#[must_use]
pub fn is_image_field(key: &str) -> bool {
    key.len() >= "images".len() && key.to_ascii_lowercase().ends_with("images")
}

/// Turn a camelCase field name into a label: `hasOilLeaks` -> `Has Oil Leaks`.
#[must_use]
pub fn humanize(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (index, ch) in key.chars().enumerate() {
        if index == 0 {
            out.extend(ch.to_uppercase());
            continue;
        }
        if ch.is_uppercase() && !out.ends_with(' ') {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

/// Label for one element of an entity array.
///
/// Known arrays use their catalogue name; anything else is humanized with a
/// trailing `s` dropped.
#[must_use]
pub fn singular_name(array: &str) -> String {
    Section::ALL
        .iter()
        .flat_map(|section| section.entity_arrays())
        .find(|entry| entry.name == array)
        .map_or_else(
            || {
                let label = humanize(array);
                label.strip_suffix('s').map_or(label.clone(), str::to_string)
            },
            |entry| entry.singular.to_string(),
        )
}

/// Display text for a scalar value.
#[must_use]
pub fn format_scalar(value: &Value) -> String {
    match value {
        Value::Bool(b) => yes_no(*b).to_string(),
        Value::Null => NOT_APPLICABLE.to_string(),
        Value::String(s) => display_or_na(s),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "Yes"
    } else {
        "No"
    }
}

fn display_or_na(s: &str) -> String {
    if s.trim().is_empty() {
        NOT_APPLICABLE.to_string()
    } else {
        s.to_string()
    }
}
