//! Image extraction for the export archive.
//!
//! Only the places named by [`Section::image_sources`] are walked; an image
//! array stored under any other key is not exported.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use super::aggregate::{humanize, singular_name};
use crate::model::image::parse_images;
use crate::model::{CapturedImage, ImageSource, Section};

/// Length of the random filename suffix.
const RANDOM_SUFFIX_LEN: usize = 6;

/// A decoded image ready to be written into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// Decoded payload.
    pub bytes: Vec<u8>,
    /// Generated file name.
    pub filename: String,
    /// Title of the owning section.
    pub section_title: String,
    /// Item folder, or `None` for general images.
    pub item_label: Option<String>,
}

/// Extract every image reachable through the known image sources.
///
/// Images whose payload does not decode are skipped with a warning.
#[must_use]
pub fn extract_images(data: &Value) -> Vec<ExtractedImage> {
    let mut extracted = Vec::new();
    for section in Section::ALL {
        let Some(record) = data.get(section.key()).filter(|v| v.is_object()) else {
            continue;
        };
        for source in section.image_sources() {
            match *source {
                ImageSource::Field(field) => {
                    let images = parse_images(record.get(field));
                    for (index, image) in images.iter().enumerate() {
                        let label = association_label(image);
                        push_image(&mut extracted, section, label, index, image);
                    }
                }
                ImageSource::Nested { record: name, field } => {
                    let images = parse_images(record.get(name).and_then(|r| r.get(field)));
                    for (index, image) in images.iter().enumerate() {
                        push_image(&mut extracted, section, Some(humanize(name)), index, image);
                    }
                }
                ImageSource::PerEntity { array, field } => {
                    let Some(Value::Array(entities)) = record.get(array) else {
                        continue;
                    };
                    let singular = singular_name(array).replace(' ', "_");
                    let entities = entities.iter().filter(|e| e.is_object());
                    for (position, entity) in entities.enumerate() {
                        let label = format!("{singular}_{}", position + 1);
                        let images = parse_images(entity.get(field));
                        for (index, image) in images.iter().enumerate() {
                            push_image(&mut extracted, section, Some(label.clone()), index, image);
                        }
                    }
                }
            }
        }
    }
    debug!("Extracted {} images", extracted.len());
    extracted
}

fn push_image(
    out: &mut Vec<ExtractedImage>,
    section: Section,
    item_label: Option<String>,
    index: usize,
    image: &CapturedImage,
) {
    let bytes = match image.decode() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Skipping image in {}: {}", section, e);
            return;
        }
    };
    let filename = image_filename(section, item_label.as_deref(), index + 1, image);
    out.push(ExtractedImage {
        bytes,
        filename,
        section_title: section.title().to_string(),
        item_label,
    });
}

/// Item folder for an image in a top-level field: `Cable_1`, `Hose_Reel_7`.
fn association_label(image: &CapturedImage) -> Option<String> {
    let association = &image.associated_with;
    if association.is_general() {
        return None;
    }
    let kind = humanize(&association.kind).replace(' ', "_");
    Some(format!("{kind}_{}", association.id))
}

/// `{section}_{item?}_{index}_{timestamp}_{random}.{ext}`
fn image_filename(
    section: Section,
    item: Option<&str>,
    index: usize,
    image: &CapturedImage,
) -> String {
    let timestamp = if image.timestamp > 0 {
        image.timestamp
    } else {
        Utc::now().timestamp_millis()
    };
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect();

    let mut name = filename_component(section.key());
    if let Some(item) = item {
        name.push('_');
        name.push_str(&filename_component(item));
    }
    format!("{name}_{index}_{timestamp}_{random}.{}", image.extension())
}

fn filename_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Association;
    use regex::Regex;
    use serde_json::json;

    fn image(assoc: Association) -> Value {
        serde_json::to_value(CapturedImage::new(b"\xFF\xD8jpeg", "image/jpeg", assoc)).unwrap()
    }

    #[test]
    fn test_cable_images_filed_by_association() {
        let data = json!({"cableRisk": {
            "cables": [{"id": 1, "location": "Trench A"}],
            "cableImages": [
                image(Association::entity("cable", "1")),
                image(Association::general())
            ]
        }});
        let images = extract_images(&data);

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].section_title, "Cable Risk");
        assert_eq!(images[0].item_label.as_deref(), Some("Cable_1"));
        assert_eq!(images[0].bytes, b"\xFF\xD8jpeg");
        assert!(images[0].filename.starts_with("cableRisk_Cable_1_1_"));
        assert_eq!(images[1].item_label, None);
        assert!(images[1].filename.starts_with("cableRisk_2_"));
    }

    #[test]
    fn test_filename_shape() {
        let data = json!({"arcProtection": {"arcImages": [image(Association::general())]}});
        let images = extract_images(&data);

        let pattern = Regex::new(r"^arcProtection_1_\d+_[A-Za-z0-9]{6}\.jpg$").unwrap();
        assert!(pattern.is_match(&images[0].filename), "{}", images[0].filename);
    }

    #[test]
    fn test_camel_case_entity_types() {
        let data = json!({"activeFireProtection": {
            "activeImages": [image(Association::entity("hoseReel", "7"))]
        }});
        let images = extract_images(&data);
        assert_eq!(images[0].item_label.as_deref(), Some("Hose_Reel_7"));
    }

    #[test]
    fn test_nested_and_per_entity_sources() {
        let data = json!({
            "activeFireProtection": {
                "autoSuppressionSystem": {"installed": true, "systemImages": [image(Association::general())]}
            },
            "transformerRisk": {
                "transformers": [
                    {"id": 1, "images": []},
                    {"id": 2, "images": [image(Association::general()), image(Association::general())]}
                ]
            }
        });
        let images = extract_images(&data);

        assert_eq!(images.len(), 3);
        assert_eq!(images[0].item_label.as_deref(), Some("Auto Suppression System"));
        assert!(images[0].filename.starts_with("activeFireProtection_Auto_Suppression_System_1_"));
        assert_eq!(images[1].item_label.as_deref(), Some("Transformer_2"));
        assert!(images[2].filename.starts_with("transformerRisk_Transformer_2_2_"));
    }

    #[test]
    fn test_unknown_fields_and_bad_payloads_skipped() {
        let data = json!({"cableRisk": {
            "extraImages": [image(Association::general())],
            "cableImages": [
                {"id": "bad", "dataUrl": "data:image/png;base64,@@@"},
                "garbage"
            ]
        }});
        assert!(extract_images(&data).is_empty());
    }

    #[test]
    fn test_png_extension() {
        let value = serde_json::to_value(CapturedImage::new(b"png", "image/png", Association::general())).unwrap();
        let data = json!({"passiveFireProtection": {"passiveImages": [value]}});
        assert!(extract_images(&data)[0].filename.ends_with(".png"));
    }
}
