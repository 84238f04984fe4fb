//! Domain records for an assessment.
//!
//! The assessment data itself stays a loosely-typed `serde_json::Value`:
//! stored records may be partial or carry legacy shapes, and every consumer
//! tolerates that. Only the setup record, images and the section catalogue
//! are typed.

pub mod image;
pub mod section;
pub mod setup;

pub use image::{Association, CapturedImage, GENERAL_ASSOCIATION};
pub use section::{EntityArray, IdPolicy, ImageSource, Section};
pub use setup::AssessmentSetup;
