//! Section form state.
//!
//! A [`SectionForm`] holds the current values of one section, validates them
//! on submit and merges them into the persisted record. Validation only runs
//! here; stored records are never re-checked, so legacy and partial saves load
//! without complaint.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, FieldError, Result};
use crate::model::image::{id_to_string, parse_images};
use crate::model::{AssessmentSetup, CapturedImage, IdPolicy, ImageSource, Section};
use crate::storage::AssessmentRepository;

/// Validate a setup record.
#[must_use]
pub fn validate_setup(setup: &AssessmentSetup) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for (field, value) in [
        ("siteName", &setup.site_name),
        ("representative", &setup.representative),
        ("assessmentDate", &setup.assessment_date),
    ] {
        if value.trim().is_empty() {
            errors.push(FieldError::new(field, "is required"));
        }
    }
    let declined = setup
        .decline_reason
        .as_deref()
        .map_or(true, |reason| reason.trim().is_empty());
    if !setup.safety_entry && declined {
        errors.push(FieldError::new(
            "declineReason",
            "is required when safe entry was refused",
        ));
    }
    errors
}

/// Validate the setup and start a new session, clearing all prior data.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the setup is incomplete, or a storage
/// error if the session cannot be written.
pub fn start_session(repo: &AssessmentRepository, setup: &AssessmentSetup) -> Result<usize> {
    let errors = validate_setup(setup);
    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }
    repo.start_session(setup)
}

/// Editable values for one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionForm {
    section: Section,
    values: Map<String, Value>,
}

impl SectionForm {
    /// An empty form.
    #[must_use]
    pub fn new(section: Section) -> Self {
        Self {
            section,
            values: Map::new(),
        }
    }

    /// A form pre-populated with `values`.
    #[must_use]
    pub fn from_values(section: Section, values: Map<String, Value>) -> Self {
        Self { section, values }
    }

    /// Load the stored values of `section`.
    ///
    /// A stored value that is not an object yields an empty form.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored record cannot be read.
    pub fn load(repo: &AssessmentRepository, section: Section) -> Result<Self> {
        let values = match repo.load_section(section)? {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Ok(Self { section, values })
    }

    /// Load the values of `section` saved through the chunked path.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk index or a chunk cannot be read.
    pub fn load_chunked(repo: &AssessmentRepository, section: Section) -> Result<Self> {
        let mut chunked = repo.load_chunked()?;
        let values = match chunked.get_mut(section.key()).map(Value::take) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Ok(Self { section, values })
    }

    /// The section this form edits.
    #[must_use]
    pub fn section(&self) -> Section {
        self.section
    }

    /// Current values.
    #[must_use]
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Current value of one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Set one field.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    /// Overlay `values` onto the form, field by field.
    pub fn merge(&mut self, values: Map<String, Value>) {
        self.values.extend(values);
    }

    /// Check required and conditional fields.
    #[must_use]
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        let v = &self.values;
        match self.section {
            Section::PassiveFireProtection => {
                require_if(v, "hasDamage", "damageNotes", "", &mut errors);
            }
            Section::ActiveFireProtection => {
                if let Some(Value::Object(system)) = v.get("autoSuppressionSystem") {
                    require_if(
                        system,
                        "installed",
                        "type",
                        "autoSuppressionSystem.",
                        &mut errors,
                    );
                }
                for_each_entity(v, "portableFireExtinguishers", |entity, prefix| {
                    require(entity, "location", &prefix, &mut errors);
                });
            }
            Section::TransformerRisk => {
                for_each_entity(v, "transformers", |entity, prefix| {
                    require(entity, "serialNumber", &prefix, &mut errors);
                    require_if(entity, "hasOilLeaks", "oilLeakDetails", &prefix, &mut errors);
                });
            }
            Section::CircuitBreakerRisk => {
                for_each_entity(v, "breakers", |entity, prefix| {
                    require_if(
                        entity,
                        "hasOverheating",
                        "overheatingDetails",
                        &prefix,
                        &mut errors,
                    );
                });
            }
            Section::CableRisk => {
                for_each_entity(v, "cables", |entity, prefix| {
                    require_if(entity, "hasDamage", "damageDetails", &prefix, &mut errors);
                });
            }
            Section::EarthingLightning => {
                require_if(v, "earthingSystemPresent", "lastTestDate", "", &mut errors);
            }
            Section::ArcProtection => {}
        }
        errors
    }

    /// Validate, then merge the values into the monolithic stored record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] without writing anything if a rule fails,
    /// or a storage error if the write fails.
    pub fn submit(&self, repo: &AssessmentRepository) -> Result<()> {
        self.check()?;
        let merged = self.merged_over(repo.load_section(self.section)?);
        repo.save_section(self.section, merged)?;
        info!("Submitted {}", self.section);
        Ok(())
    }

    /// Validate, then merge the values into the section's stored chunk.
    ///
    /// Exports read the monolithic record only, so values written here are
    /// not visible to them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a rule fails, or a storage error.
    pub fn submit_chunked(&self, repo: &AssessmentRepository) -> Result<()> {
        self.check()?;
        let mut chunked = repo.load_chunked()?;
        let stored = chunked.get_mut(self.section.key()).map(Value::take);
        let merged = self.merged_over(stored);
        repo.save_section_chunked(self.section, &merged)?;
        info!("Submitted {} (chunked)", self.section);
        Ok(())
    }

    fn check(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }

    fn merged_over(&self, stored: Option<Value>) -> Value {
        let mut merged = match stored {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        merged.extend(self.values.clone());
        Value::Object(merged)
    }

    /// Append an entity to `array`, assigning its id. Returns the new id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if the section has no such array.
    pub fn add_entity(&mut self, array: &str, mut entity: Map<String, Value>) -> Result<Value> {
        let kind = self.entity_array(array)?;
        let items = self.array_mut(array);

        let id = match kind.id_policy {
            IdPolicy::Renumber => {
                let max = items
                    .iter()
                    .filter_map(|item| item.get("id").and_then(Value::as_i64))
                    .max()
                    .unwrap_or(0);
                Value::from(max.max(i64::try_from(items.len()).unwrap_or(i64::MAX)) + 1)
            }
            IdPolicy::Preserve => {
                let mut id = Utc::now().timestamp_millis();
                while items
                    .iter()
                    .any(|item| item.get("id").and_then(Value::as_i64) == Some(id))
                {
                    id += 1;
                }
                Value::from(id)
            }
        };

        entity.insert("id".to_string(), id.clone());
        items.push(Value::Object(entity));
        debug!("Added {} {} to {}", kind.singular, id, self.section);
        Ok(id)
    }

    /// Delete the entity with `id` from `array`.
    ///
    /// Removes exactly the images, across the section's image fields, whose
    /// association names this entity. General images and images of other
    /// entities stay. Arrays with [`IdPolicy::Renumber`] then renumber the
    /// survivors; image associations are not rewritten, so an image of a
    /// later entity can end up pointing at a reused id.
    ///
    /// Returns the number of images removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] for an unknown array, or
    /// [`Error::EntityNotFound`] if no entity carries `id`.
    pub fn delete_entity(&mut self, array: &str, id: &str) -> Result<usize> {
        let kind = self.entity_array(array)?;
        let section = self.section;
        let items = self.array_mut(array);

        let position = items
            .iter()
            .position(|item| has_id(item, id))
            .ok_or_else(|| Error::EntityNotFound {
                section: section.key().to_string(),
                array: array.to_string(),
                id: id.to_string(),
            })?;
        items.remove(position);

        if kind.id_policy == IdPolicy::Renumber {
            for (index, item) in items.iter_mut().enumerate() {
                if let Value::Object(entity) = item {
                    entity.insert("id".to_string(), Value::from(index + 1));
                }
            }
        }

        let mut removed = 0;
        for field in section.image_fields() {
            if let Some(Value::Array(images)) = self.values.get_mut(field) {
                let before = images.len();
                images.retain(|raw| {
                    serde_json::from_value::<CapturedImage>(raw.clone())
                        .map_or(true, |image| !image.associated_with.matches(kind.entity_type, id))
                });
                removed += before - images.len();
            }
        }

        info!(
            "Deleted {} {} from {} ({} images removed)",
            kind.singular, id, section, removed
        );
        Ok(removed)
    }

    /// Add an image at `path`. Returns `false` if an identical image is
    /// already stored there.
    ///
    /// `path` names one of the section's image sources: a top-level field
    /// (`cableImages`), a nested field (`autoSuppressionSystem.systemImages`)
    /// or a field on one entity (`transformers.2.images`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownField`] if `path` names no image source of
    /// this section, or [`Error::EntityNotFound`] if it names a missing entity.
    pub fn add_image(&mut self, path: &str, image: CapturedImage) -> Result<bool> {
        let slot = self.image_slot(path)?;
        let section = self.section;
        let images = self.image_array_mut(&slot)?;

        let hash = image.hash();
        let duplicate = hash.is_some()
            && images
                .iter()
                .filter_map(|raw| serde_json::from_value::<CapturedImage>(raw.clone()).ok())
                .any(|other| other.hash() == hash);
        if duplicate {
            debug!("Skipping duplicate image in {}.{}", section, path);
            return Ok(false);
        }

        images.push(serde_json::to_value(&image)?);
        Ok(true)
    }

    /// Remove one image by id from `path`. Returns `true` if it was present.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`SectionForm::add_image`] for a bad path.
    pub fn remove_image(&mut self, path: &str, image_id: &str) -> Result<bool> {
        let slot = self.image_slot(path)?;
        let images = self.image_array_mut(&slot)?;
        let before = images.len();
        images.retain(|raw| !has_id(raw, image_id));
        Ok(images.len() < before)
    }

    /// All parseable images in the section, with the path each lives at.
    #[must_use]
    pub fn images(&self) -> Vec<(String, CapturedImage)> {
        let mut found = Vec::new();
        let mut collect = |path: String, value: Option<&Value>| {
            found.extend(
                parse_images(value)
                    .into_iter()
                    .map(|image| (path.clone(), image)),
            );
        };
        for source in self.section.image_sources() {
            match *source {
                ImageSource::Field(field) => collect(field.to_string(), self.values.get(field)),
                ImageSource::Nested { record, field } => collect(
                    format!("{record}.{field}"),
                    self.values.get(record).and_then(|r| r.get(field)),
                ),
                ImageSource::PerEntity { array, field } => {
                    let Some(Value::Array(entities)) = self.values.get(array) else {
                        continue;
                    };
                    let entities = entities.iter().filter(|e| e.is_object());
                    for (position, entity) in entities.enumerate() {
                        let id = entity
                            .get("id")
                            .and_then(id_to_string)
                            .unwrap_or_else(|| (position + 1).to_string());
                        collect(format!("{array}.{id}.{field}"), entity.get(field));
                    }
                }
            }
        }
        found
    }

    fn entity_array(&self, array: &str) -> Result<&'static crate::model::EntityArray> {
        self.section
            .entity_array(array)
            .ok_or_else(|| Error::UnknownField {
                section: self.section.key().to_string(),
                field: array.to_string(),
            })
    }

    fn image_slot<'p>(&self, path: &'p str) -> Result<ImageSlot<'p>> {
        for source in self.section.image_sources() {
            match *source {
                ImageSource::Field(field) if path == field => {
                    return Ok(ImageSlot::Field(field));
                }
                ImageSource::Nested { record, field }
                    if path.split_once('.') == Some((record, field)) =>
                {
                    return Ok(ImageSlot::Nested { record, field });
                }
                ImageSource::PerEntity { array, field } => {
                    let parts = path
                        .split_once('.')
                        .and_then(|(head, rest)| Some((head, rest.rsplit_once('.')?)));
                    if let Some((head, (id, tail))) = parts {
                        if head == array && tail == field {
                            return Ok(ImageSlot::Entity { array, id, field });
                        }
                    }
                }
                _ => {}
            }
        }
        Err(Error::UnknownField {
            section: self.section.key().to_string(),
            field: path.to_string(),
        })
    }

    fn image_array_mut(&mut self, slot: &ImageSlot<'_>) -> Result<&mut Vec<Value>> {
        let section = self.section;
        let (holder, field) = match *slot {
            ImageSlot::Field(field) => (&mut self.values, field),
            ImageSlot::Nested { record, field } => (object_in(&mut self.values, record), field),
            ImageSlot::Entity { array, id, field } => {
                let entity = self
                    .values
                    .get_mut(array)
                    .and_then(Value::as_array_mut)
                    .and_then(|items| items.iter_mut().find(|item| has_id(item, id)))
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| Error::EntityNotFound {
                        section: section.key().to_string(),
                        array: array.to_string(),
                        id: id.to_string(),
                    })?;
                (entity, field)
            }
        };
        Ok(array_in(holder, field))
    }

    fn array_mut(&mut self, array: &str) -> &mut Vec<Value> {
        array_in(&mut self.values, array)
    }
}

/// A resolved image location.
enum ImageSlot<'p> {
    Field(&'static str),
    Nested {
        record: &'static str,
        field: &'static str,
    },
    Entity {
        array: &'static str,
        id: &'p str,
        field: &'static str,
    },
}

fn has_id(item: &Value, id: &str) -> bool {
    item.get("id").and_then(id_to_string).as_deref() == Some(id)
}

/// The array under `key`, replacing a missing or non-array value.
fn array_in<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Vec<Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just made an array"),
    }
}

/// The object under `key`, replacing a missing or non-object value.
fn object_in<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just made an object"),
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "yes" | "true"),
        _ => false,
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn require(map: &Map<String, Value>, field: &str, prefix: &str, errors: &mut Vec<FieldError>) {
    if is_blank(map.get(field)) {
        errors.push(FieldError::new(format!("{prefix}{field}"), "is required"));
    }
}

fn require_if(
    map: &Map<String, Value>,
    flag: &str,
    field: &str,
    prefix: &str,
    errors: &mut Vec<FieldError>,
) {
    if is_truthy(map.get(flag)) && is_blank(map.get(field)) {
        errors.push(FieldError::new(
            format!("{prefix}{field}"),
            format!("is required when {flag} is set"),
        ));
    }
}

fn for_each_entity<F>(values: &Map<String, Value>, array: &str, mut check: F)
where
    F: FnMut(&Map<String, Value>, String),
{
    let Some(Value::Array(items)) = values.get(array) else {
        return;
    };
    for (index, item) in items.iter().enumerate() {
        if let Value::Object(entity) = item {
            check(entity, format!("{array}.{}.", index + 1));
        }
    }
}
