//! The checklist section catalogue.
//!
//! Sections are fixed and appear in reports in the order of [`Section::ALL`].
//! The assessment setup record is not a section; reports render it first.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Id reassignment behaviour when an entity is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPolicy {
    /// Survivors are renumbered `1..=n` in array order.
    Renumber,
    /// Survivors keep their ids; new ids are millisecond timestamps.
    Preserve,
}

/// A repeated sub-entity array within a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityArray {
    /// JSON key of the array (e.g. `transformers`).
    pub name: &'static str,
    /// Association type images use to point at one element.
    pub entity_type: &'static str,
    /// Label for one element in reports (e.g. `Transformer`).
    pub singular: &'static str,
    /// Id behaviour on deletion.
    pub id_policy: IdPolicy,
}

/// Where a section keeps images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// A top-level field; association tags pick the entity.
    Field(&'static str),
    /// A field inside a nested sub-record.
    Nested {
        /// Key of the sub-record.
        record: &'static str,
        /// Image field within it.
        field: &'static str,
    },
    /// A field on each element of an entity array.
    PerEntity {
        /// Key of the entity array.
        array: &'static str,
        /// Image field on each element.
        field: &'static str,
    },
}

impl ImageSource {
    /// Path naming this source: `field`, `record.field` or `array.<id>.field`.
    #[must_use]
    pub fn path_pattern(&self) -> String {
        match self {
            Self::Field(field) => (*field).to_string(),
            Self::Nested { record, field } => format!("{record}.{field}"),
            Self::PerEntity { array, field } => format!("{array}.<id>.{field}"),
        }
    }
}

/// One top-level checklist category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Passive fire protection (construction, compartmentation, doors).
    PassiveFireProtection,
    /// Active fire protection (detection, suppression, extinguishers).
    ActiveFireProtection,
    /// Transformer risk.
    TransformerRisk,
    /// Circuit breaker risk.
    CircuitBreakerRisk,
    /// Cable risk.
    CableRisk,
    /// Earthing and lightning protection.
    EarthingLightning,
    /// Arc flash protection.
    ArcProtection,
}

const ACTIVE_ENTITIES: &[EntityArray] = &[
    EntityArray {
        name: "portableFireExtinguishers",
        entity_type: "extinguisher",
        singular: "Extinguisher",
        id_policy: IdPolicy::Preserve,
    },
    EntityArray {
        name: "hydrants",
        entity_type: "hydrant",
        singular: "Hydrant",
        id_policy: IdPolicy::Preserve,
    },
    EntityArray {
        name: "hoseReels",
        entity_type: "hoseReel",
        singular: "Hose Reel",
        id_policy: IdPolicy::Preserve,
    },
];

const TRANSFORMER_ENTITIES: &[EntityArray] = &[EntityArray {
    name: "transformers",
    entity_type: "transformer",
    singular: "Transformer",
    id_policy: IdPolicy::Renumber,
}];

const BREAKER_ENTITIES: &[EntityArray] = &[EntityArray {
    name: "breakers",
    entity_type: "breaker",
    singular: "Circuit Breaker",
    id_policy: IdPolicy::Preserve,
}];

const CABLE_ENTITIES: &[EntityArray] = &[EntityArray {
    name: "cables",
    entity_type: "cable",
    singular: "Cable",
    id_policy: IdPolicy::Renumber,
}];

impl Section {
    /// All sections in canonical report order.
    pub const ALL: [Section; 7] = [
        Section::PassiveFireProtection,
        Section::ActiveFireProtection,
        Section::TransformerRisk,
        Section::CircuitBreakerRisk,
        Section::CableRisk,
        Section::EarthingLightning,
        Section::ArcProtection,
    ];

    /// JSON key of the section within the assessment record.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::PassiveFireProtection => "passiveFireProtection",
            Self::ActiveFireProtection => "activeFireProtection",
            Self::TransformerRisk => "transformerRisk",
            Self::CircuitBreakerRisk => "circuitBreakerRisk",
            Self::CableRisk => "cableRisk",
            Self::EarthingLightning => "earthingLightning",
            Self::ArcProtection => "arcProtection",
        }
    }

    /// Display title used for report headings and archive folders.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::PassiveFireProtection => "Passive Fire Protection",
            Self::ActiveFireProtection => "Active Fire Protection",
            Self::TransformerRisk => "Transformer Risk",
            Self::CircuitBreakerRisk => "Circuit Breaker Risk",
            Self::CableRisk => "Cable Risk",
            Self::EarthingLightning => "Earthing & Lightning",
            Self::ArcProtection => "Arc Protection",
        }
    }

    /// Repeated entity arrays held by this section.
    #[must_use]
    pub fn entity_arrays(self) -> &'static [EntityArray] {
        match self {
            Self::ActiveFireProtection => ACTIVE_ENTITIES,
            Self::TransformerRisk => TRANSFORMER_ENTITIES,
            Self::CircuitBreakerRisk => BREAKER_ENTITIES,
            Self::CableRisk => CABLE_ENTITIES,
            _ => &[],
        }
    }

    /// Look up an entity array by its JSON key.
    #[must_use]
    pub fn entity_array(self, name: &str) -> Option<&'static EntityArray> {
        self.entity_arrays().iter().find(|array| array.name == name)
    }

    /// Every place this section keeps images.
    #[must_use]
    pub fn image_sources(self) -> &'static [ImageSource] {
        use ImageSource::{Field, Nested, PerEntity};
        match self {
            Self::PassiveFireProtection => &[Field("passiveImages")],
            Self::ActiveFireProtection => &[
                Field("activeImages"),
                Nested {
                    record: "autoSuppressionSystem",
                    field: "systemImages",
                },
            ],
            Self::TransformerRisk => &[
                Field("transformerImages"),
                PerEntity {
                    array: "transformers",
                    field: "images",
                },
            ],
            Self::CircuitBreakerRisk => &[Field("breakerImages")],
            Self::CableRisk => &[Field("cableImages")],
            Self::EarthingLightning => &[Field("earthingImages")],
            Self::ArcProtection => &[Field("arcImages")],
        }
    }

    /// Top-level image fields of this section.
    ///
    /// Images in these fields carry an association naming the entity they
    /// document, or the general sentinel.
    pub fn image_fields(self) -> impl Iterator<Item = &'static str> {
        self.image_sources().iter().filter_map(|source| match source {
            ImageSource::Field(field) => Some(*field),
            _ => None,
        })
    }

    /// Storage key used by the chunked persistence path.
    #[must_use]
    pub fn chunk_key(self) -> String {
        format!("assessment_{}", self.key())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Section {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownSection(s.to_string()))
    }
}
