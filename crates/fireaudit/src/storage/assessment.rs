//! Assessment persistence on top of the key-value store.
//!
//! Two persistence paths coexist. The monolithic path keeps the whole record
//! under [`DATA_KEY`]; the chunked path writes one key per section plus an
//! index under [`CHUNK_INDEX_KEY`]. Report export reads only the monolithic
//! key, so a section saved only through the chunked path does not appear in
//! exports.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{AssessmentSetup, Section};

use super::Storage;

/// Key holding the setup record.
pub const SETUP_KEY: &str = "assessmentSetup";

/// Key holding the monolithic assessment record.
pub const DATA_KEY: &str = "assessmentData";

/// Key holding the list of sections saved through the chunked path.
pub const CHUNK_INDEX_KEY: &str = "assessment_chunks";

const CHUNK_PREFIX: &str = "assessment_";

/// Reads and writes assessment records.
#[derive(Debug)]
pub struct AssessmentRepository {
    storage: Storage,
}

impl AssessmentRepository {
    /// Wrap an open storage.
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Access the underlying storage.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Start a new assessment session.
    ///
    /// Clears the monolithic record and every chunked key, then writes the
    /// new setup. Returns the number of keys removed.
    ///
    /// # Errors
    ///
    /// Returns an error if any storage operation fails.
    pub fn start_session(&self, setup: &AssessmentSetup) -> Result<usize> {
        let mut cleared = usize::from(self.storage.remove(DATA_KEY)?);
        for key in self.storage.keys(Some(CHUNK_PREFIX))? {
            if self.storage.remove(&key)? {
                cleared += 1;
            }
        }
        self.save_setup(setup)?;
        info!(
            "Started assessment session for '{}' ({} keys cleared)",
            setup.site_name, cleared
        );
        Ok(cleared)
    }

    /// Load the setup record as raw JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptRecord`] if the stored blob is not valid JSON.
    pub fn load_setup_value(&self) -> Result<Option<Value>> {
        self.read_json(SETUP_KEY)
    }

    /// Load the typed setup record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptRecord`] if the stored blob cannot be parsed.
    pub fn load_setup(&self) -> Result<Option<AssessmentSetup>> {
        let Some(value) = self.read_json(SETUP_KEY)? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| Error::CorruptRecord {
                key: SETUP_KEY.to_string(),
                source,
            })
    }

    /// Overwrite the setup record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails.
    pub fn save_setup(&self, setup: &AssessmentSetup) -> Result<()> {
        self.storage.set(SETUP_KEY, &serde_json::to_string(setup)?)
    }

    /// Load the monolithic assessment record.
    ///
    /// A missing record is an empty object. A record that is valid JSON but
    /// not an object is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptRecord`] if the stored blob is not valid JSON.
    pub fn load_data(&self) -> Result<Value> {
        match self.read_json(DATA_KEY)? {
            Some(value @ Value::Object(_)) => Ok(value),
            Some(other) => {
                warn!(
                    "Ignoring {} holding a non-object value ({})",
                    DATA_KEY,
                    json_kind(&other)
                );
                Ok(Value::Object(Map::new()))
            }
            None => Ok(Value::Object(Map::new())),
        }
    }

    /// Load one section from the monolithic record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    pub fn load_section(&self, section: Section) -> Result<Option<Value>> {
        let mut data = self.load_data()?;
        Ok(data
            .as_object_mut()
            .and_then(|map| map.remove(section.key())))
    }

    /// Replace one section in the monolithic record.
    ///
    /// This is a read-modify-write of the whole blob; other sections are
    /// preserved as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or written.
    pub fn save_section(&self, section: Section, value: Value) -> Result<()> {
        let mut data = self.load_data()?;
        if let Value::Object(map) = &mut data {
            map.insert(section.key().to_string(), value);
        }
        self.storage.set(DATA_KEY, &serde_json::to_string(&data)?)?;
        debug!("Saved section {}", section);
        Ok(())
    }

    /// Write one section through the chunked path.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk or the index cannot be written.
    pub fn save_section_chunked(&self, section: Section, value: &Value) -> Result<()> {
        self.storage
            .set(&section.chunk_key(), &serde_json::to_string(value)?)?;

        let mut index = self.chunk_index()?;
        if !index.iter().any(|key| key == section.key()) {
            index.push(section.key().to_string());
            self.storage
                .set(CHUNK_INDEX_KEY, &serde_json::to_string(&index)?)?;
        }
        debug!("Saved section {} to chunked storage", section);
        Ok(())
    }

    /// Sections recorded in the chunk index.
    ///
    /// Index entries that do not name a known section are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn chunked_sections(&self) -> Result<Vec<Section>> {
        Ok(self
            .chunk_index()?
            .iter()
            .filter_map(|key| key.parse().ok())
            .collect())
    }

    /// Reassemble the record saved through the chunked path.
    ///
    /// # Errors
    ///
    /// Returns an error if the index or any chunk is corrupted.
    pub fn load_chunked(&self) -> Result<Value> {
        let mut map = Map::new();
        for section in self.chunked_sections()? {
            match self.read_json(&section.chunk_key())? {
                Some(value) => {
                    map.insert(section.key().to_string(), value);
                }
                None => warn!("Chunk index lists {} but no chunk is stored", section),
            }
        }
        Ok(Value::Object(map))
    }

    fn chunk_index(&self) -> Result<Vec<String>> {
        match self.read_json(CHUNK_INDEX_KEY)? {
            Some(value) => {
                serde_json::from_value(value).map_err(|source| Error::CorruptRecord {
                    key: CHUNK_INDEX_KEY.to_string(),
                    source,
                })
            }
            None => Ok(Vec::new()),
        }
    }

    fn read_json(&self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self.storage.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| Error::CorruptRecord {
                key: key.to_string(),
                source,
            })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo() -> AssessmentRepository {
        AssessmentRepository::new(Storage::open_in_memory().unwrap())
    }

    fn setup(site: &str) -> AssessmentSetup {
        AssessmentSetup {
            site_name: site.to_string(),
            representative: "R. Diaz".to_string(),
            assessment_date: "2024-05-01".to_string(),
            safety_entry: true,
            decline_reason: None,
        }
    }

    #[test]
    fn test_empty_repository() {
        let repo = repo();
        assert!(repo.load_setup().unwrap().is_none());
        assert_eq!(repo.load_data().unwrap(), json!({}));
        assert!(repo.load_section(Section::CableRisk).unwrap().is_none());
    }

    #[test]
    fn test_save_section_round_trip() {
        let repo = repo();
        let cables = json!({"cables": [{"id": 1, "location": "Trench A", "hasDamage": false}]});

        repo.save_section(Section::CableRisk, cables.clone()).unwrap();

        assert_eq!(repo.load_section(Section::CableRisk).unwrap(), Some(cables));
    }

    #[test]
    fn test_save_section_preserves_other_sections() {
        let repo = repo();
        repo.save_section(Section::ArcProtection, json!({"ppeAvailable": true}))
            .unwrap();
        repo.save_section(Section::CableRisk, json!({"cables": []}))
            .unwrap();

        let data = repo.load_data().unwrap();
        assert_eq!(data["arcProtection"]["ppeAvailable"], true);
        assert!(data["cableRisk"]["cables"].is_array());
    }

    #[test]
    fn test_corrupted_data_is_reported() {
        let repo = repo();
        repo.storage().set(DATA_KEY, "{not json").unwrap();

        let err = repo.load_data().unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { ref key, .. } if key == DATA_KEY));
    }

    #[test]
    fn test_non_object_data_treated_as_empty() {
        let repo = repo();
        repo.storage().set(DATA_KEY, "[1,2,3]").unwrap();
        assert_eq!(repo.load_data().unwrap(), json!({}));
    }

    #[test]
    fn test_start_session_clears_everything() {
        let repo = repo();
        repo.save_setup(&setup("Old Site")).unwrap();
        repo.save_section(Section::CableRisk, json!({"cables": []}))
            .unwrap();
        repo.save_section_chunked(Section::ArcProtection, &json!({"ppeAvailable": true}))
            .unwrap();

        let cleared = repo.start_session(&setup("New Site")).unwrap();

        // assessmentData, the arc chunk and the chunk index.
        assert_eq!(cleared, 3);
        assert_eq!(repo.load_data().unwrap(), json!({}));
        assert!(repo.chunked_sections().unwrap().is_empty());
        assert_eq!(repo.load_setup().unwrap().unwrap().site_name, "New Site");
    }

    #[test]
    fn test_chunked_round_trip() {
        let repo = repo();
        repo.save_section_chunked(Section::CableRisk, &json!({"cables": [{"id": 1}]}))
            .unwrap();
        repo.save_section_chunked(Section::CableRisk, &json!({"cables": [{"id": 2}]}))
            .unwrap();
        repo.save_section_chunked(Section::ArcProtection, &json!({"ppeAvailable": false}))
            .unwrap();

        assert_eq!(
            repo.chunked_sections().unwrap(),
            [Section::CableRisk, Section::ArcProtection]
        );
        let chunked = repo.load_chunked().unwrap();
        assert_eq!(chunked["cableRisk"]["cables"][0]["id"], 2);
        assert_eq!(chunked["arcProtection"]["ppeAvailable"], false);
    }

    #[test]
    fn test_chunked_saves_are_invisible_to_monolithic_reads() {
        let repo = repo();
        repo.save_section_chunked(Section::CableRisk, &json!({"cables": [{"id": 1}]}))
            .unwrap();

        assert!(repo.load_section(Section::CableRisk).unwrap().is_none());
        assert_eq!(repo.load_data().unwrap(), json!({}));
    }

    #[test]
    fn test_chunk_index_with_missing_chunk() {
        let repo = repo();
        repo.storage()
            .set(CHUNK_INDEX_KEY, r#"["cableRisk","notASection"]"#)
            .unwrap();

        assert_eq!(repo.chunked_sections().unwrap(), [Section::CableRisk]);
        assert_eq!(repo.load_chunked().unwrap(), json!({}));
    }

    #[test]
    fn test_corrupted_setup() {
        let repo = repo();
        repo.storage().set(SETUP_KEY, r#"{"siteName": 5}"#).unwrap();
        assert!(matches!(
            repo.load_setup(),
            Err(Error::CorruptRecord { .. })
        ));
        assert!(repo.load_setup_value().unwrap().is_some());
    }
}
