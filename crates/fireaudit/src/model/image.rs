//! Captured photographic evidence.
//!
//! Images live inside the assessment record, in arrays whose key ends in
//! `Images`. Each carries a base64 data URL and an association naming the
//! entity it documents. Associations are never checked against the entity
//! arrays; an image pointing at a deleted entity is simply orphaned.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// Association id meaning "belongs to the section as a whole".
pub const GENERAL_ASSOCIATION: &str = "general";

/// MIME type assumed when a data URL does not name one.
const DEFAULT_MIME: &str = "image/jpeg";

/// What an image is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Entity type (e.g. `cable`), or `section` for general images.
    #[serde(rename = "type")]
    pub kind: String,
    /// Entity id, or [`GENERAL_ASSOCIATION`].
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

impl Association {
    /// Association for an image covering the whole section.
    #[must_use]
    pub fn general() -> Self {
        Self {
            kind: "section".to_string(),
            id: GENERAL_ASSOCIATION.to_string(),
        }
    }

    /// Association for an image documenting one entity.
    #[must_use]
    pub fn entity(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Whether this is the general sentinel.
    #[must_use]
    pub fn is_general(&self) -> bool {
        self.id == GENERAL_ASSOCIATION
    }

    /// Whether this association points at the given entity.
    #[must_use]
    pub fn matches(&self, kind: &str, id: &str) -> bool {
        !self.is_general() && self.kind == kind && self.id == id
    }
}

impl Default for Association {
    fn default() -> Self {
        Self::general()
    }
}

/// A captured image as stored in the assessment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedImage {
    /// Image id, unique within its field.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// `data:<mime>;base64,<payload>`.
    pub data_url: String,
    /// Capture time in milliseconds since the epoch.
    #[serde(default)]
    pub timestamp: i64,
    /// What the image documents.
    #[serde(default)]
    pub associated_with: Association,
    /// BLAKE3 hash of the decoded payload, absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl CapturedImage {
    /// Build an image record from raw bytes.
    #[must_use]
    pub fn new(bytes: &[u8], mime: &str, associated_with: Association) -> Self {
        let timestamp = Utc::now().timestamp_millis();
        let content_hash = Self::compute_hash(bytes);
        Self {
            id: format!("img-{timestamp}-{}", &content_hash[..8]),
            data_url: format!("data:{mime};base64,{}", STANDARD.encode(bytes)),
            timestamp,
            associated_with,
            content_hash: Some(content_hash),
        }
    }

    /// Compute the BLAKE3 hash of an image payload.
    #[must_use]
    pub fn compute_hash(bytes: &[u8]) -> String {
        blake3::hash(bytes).to_hex().to_string()
    }

    /// MIME type named by the data URL.
    #[must_use]
    pub fn mime(&self) -> &str {
        self.data_url
            .strip_prefix("data:")
            .and_then(|rest| rest.split([';', ',']).next())
            .filter(|mime| !mime.is_empty())
            .unwrap_or(DEFAULT_MIME)
    }

    /// File extension matching the MIME type.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self.mime() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "jpg",
        }
    }

    /// Decode the base64 payload.
    ///
    /// Accepts a bare base64 string as well as a full data URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImageDecode`] if the payload is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>> {
        let payload = match self.data_url.split_once(',') {
            Some((_, payload)) => payload,
            None => self.data_url.as_str(),
        };
        STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::image_decode(&self.id, e.to_string()))
    }

    /// Hash of the payload, computing it when the record predates hashing.
    #[must_use]
    pub fn hash(&self) -> Option<String> {
        self.content_hash
            .clone()
            .or_else(|| self.decode().ok().map(|bytes| Self::compute_hash(&bytes)))
    }
}

/// Parse an image array, skipping entries that are not image records.
#[must_use]
pub fn parse_images(value: Option<&Value>) -> Vec<CapturedImage> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("Skipping malformed image record: {}", e);
                None
            }
        })
        .collect()
}

/// Render an entity id (number or string) as the string form associations use.
#[must_use]
pub fn id_to_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_to_string(&value)
        .ok_or_else(|| de::Error::custom(format!("expected string or number id, got {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_image_encodes_payload() {
        let image = CapturedImage::new(b"jpeg-bytes", "image/jpeg", Association::general());

        assert!(image.data_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(image.decode().unwrap(), b"jpeg-bytes");
        assert_eq!(image.content_hash.as_deref().map(str::len), Some(64));
        assert!(image.id.starts_with("img-"));
    }

    #[test]
    fn test_mime_and_extension() {
        let png = CapturedImage::new(b"x", "image/png", Association::general());
        assert_eq!(png.mime(), "image/png");
        assert_eq!(png.extension(), "png");

        let mut bare = png.clone();
        bare.data_url = STANDARD.encode(b"x");
        assert_eq!(bare.mime(), "image/jpeg");
        assert_eq!(bare.extension(), "jpg");
        assert_eq!(bare.decode().unwrap(), b"x");
    }

    #[test]
    fn test_decode_invalid_payload() {
        let mut image = CapturedImage::new(b"x", "image/jpeg", Association::general());
        image.data_url = "data:image/jpeg;base64,@@@".to_string();
        assert!(matches!(image.decode(), Err(Error::ImageDecode { .. })));
    }

    #[test]
    fn test_deserialize_numeric_ids() {
        let image: CapturedImage = serde_json::from_value(json!({
            "id": 1_700_000_000_000_i64,
            "dataUrl": "data:image/jpeg;base64,eA==",
            "timestamp": 1_700_000_000_000_i64,
            "associatedWith": {"type": "cable", "id": 2}
        }))
        .unwrap();

        assert_eq!(image.id, "1700000000000");
        assert_eq!(image.associated_with, Association::entity("cable", "2"));
        assert!(image.content_hash.is_none());
        assert_eq!(image.hash(), Some(CapturedImage::compute_hash(b"x")));
    }

    #[test]
    fn test_missing_association_defaults_to_general() {
        let image: CapturedImage =
            serde_json::from_value(json!({"id": "a", "dataUrl": "eA=="})).unwrap();
        assert!(image.associated_with.is_general());
    }

    #[test]
    fn test_association_matches() {
        let cable = Association::entity("cable", "1");
        assert!(cable.matches("cable", "1"));
        assert!(!cable.matches("cable", "2"));
        assert!(!cable.matches("transformer", "1"));

        let general = Association::entity("cable", GENERAL_ASSOCIATION);
        assert!(!general.matches("cable", GENERAL_ASSOCIATION));
    }

    #[test]
    fn test_parse_images_skips_garbage() {
        let value = json!([
            {"id": "a", "dataUrl": "eA=="},
            "not an image",
            {"dataUrl": "missing id"}
        ]);
        let images = parse_images(Some(&value));
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id, "a");

        assert!(parse_images(None).is_empty());
        assert!(parse_images(Some(&json!({"id": "a"}))).is_empty());
    }

    #[test]
    fn test_id_to_string() {
        assert_eq!(id_to_string(&json!(3)), Some("3".to_string()));
        assert_eq!(id_to_string(&json!("x")), Some("x".to_string()));
        assert_eq!(id_to_string(&json!(null)), None);
    }
}
