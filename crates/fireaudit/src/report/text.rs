//! Plain-text mirror of the report.
//!
//! Walks the raw records directly rather than the aggregated tree, with the
//! same section order and the same labelling rules.

use std::fmt::{self, Write as _};

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::aggregate::{format_scalar, humanize, is_image_field, singular_name, NO_DATA, SETUP_TITLE};
use crate::model::Section;

const RULE_WIDTH: usize = 60;

/// Render the plain-text report.
#[must_use]
pub fn render_text(
    title: &str,
    setup: Option<&Value>,
    data: Option<&Value>,
    generated: NaiveDate,
) -> String {
    let mut out = String::new();
    // Writing into a String never fails.
    let _ = write_report(&mut out, title, setup, data, generated);
    out
}

fn write_report(
    out: &mut String,
    title: &str,
    setup: Option<&Value>,
    data: Option<&Value>,
    generated: NaiveDate,
) -> fmt::Result {
    writeln!(out, "{}", title.to_uppercase())?;
    writeln!(out, "Generated: {}", generated.format("%Y-%m-%d"))?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;

    write_section(out, SETUP_TITLE, setup)?;
    for section in Section::ALL {
        write_section(out, section.title(), data.and_then(|d| d.get(section.key())))?;
    }
    Ok(())
}

fn write_section(out: &mut String, title: &str, value: Option<&Value>) -> fmt::Result {
    writeln!(out)?;
    writeln!(out, "{}", title.to_uppercase())?;
    writeln!(out, "{}", "-".repeat(title.chars().count()))?;
    match value {
        Some(Value::Object(map)) if !map.is_empty() => write_fields(out, map, 0, false),
        _ => writeln!(out, "{NO_DATA}"),
    }
}

fn write_fields(
    out: &mut String,
    map: &Map<String, Value>,
    depth: usize,
    is_entity: bool,
) -> fmt::Result {
    let indent = "  ".repeat(depth);
    for (key, value) in map {
        if is_entity && key == "id" {
            continue;
        }
        let label = humanize(key);
        if is_image_field(key) {
            let count = value.as_array().map_or(0, Vec::len);
            if count > 0 {
                writeln!(out, "{indent}{label}: {count} image(s) attached")?;
            }
            continue;
        }
        match value {
            Value::Object(child) if !child.is_empty() => {
                writeln!(out, "{indent}{label}:")?;
                write_fields(out, child, depth + 1, false)?;
            }
            Value::Array(items) if items.iter().any(Value::is_object) => {
                let singular = singular_name(key);
                for (index, entity) in items.iter().filter_map(Value::as_object).enumerate() {
                    writeln!(out, "{indent}{singular} {}", index + 1)?;
                    write_fields(out, entity, depth + 1, true)?;
                }
            }
            Value::Array(items) if items.is_empty() => {
                writeln!(out, "{indent}{label}: None recorded")?;
            }
            Value::Array(items) => {
                let joined = items.iter().map(format_scalar).collect::<Vec<_>>().join(", ");
                writeln!(out, "{indent}{label}: {joined}")?;
            }
            Value::Object(_) => writeln!(out, "{indent}{label}: N/A")?,
            scalar => writeln!(out, "{indent}{label}: {}", format_scalar(scalar))?,
        }
    }
    Ok(())
}
