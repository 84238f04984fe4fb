//! `fireaudit` - Fire-risk assessment capture and report export
//!
//! This library records a structured on-site inspection of an electrical
//! facility (setup, checklist sections, repeated entities, photographs) in a
//! local key-value store and turns it into a paginated PDF report, a plain
//! text report and a ZIP bundle with the images filed by section and item.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod form;
pub mod logging;
pub mod model;
pub mod report;
pub mod storage;

pub use config::Config;
pub use error::{Error, FieldError, Result};
pub use form::SectionForm;
pub use logging::init_logging;
pub use model::{AssessmentSetup, Association, CapturedImage, ImageSource, Section};
pub use storage::{AssessmentRepository, Storage, StorageStats};
