//! Error types for fireaudit.
//!
//! This module defines all error types used throughout the fireaudit crate.
//! Missing sections and missing images are not errors; they surface as
//! placeholders in the generated reports.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A single form field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the offending field (e.g. `transformers.1.serialNumber`).
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl FieldError {
    /// Create a new field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The main error type for fireaudit operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A stored record could not be parsed.
    #[error("stored record '{key}' is corrupted: {source}")]
    CorruptRecord {
        /// Storage key of the record.
        key: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Form Errors ===
    /// One or more form fields failed validation.
    #[error("validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// The named section does not exist.
    #[error("unknown section: {0}")]
    UnknownSection(String),

    /// The named entity array or image field is not part of the section.
    #[error("section '{section}' has no field '{field}'")]
    UnknownField {
        /// Section key.
        section: String,
        /// Field name.
        field: String,
    },

    /// No entity with the given id exists.
    #[error("no entity with id {id} in {section}.{array}")]
    EntityNotFound {
        /// Section key.
        section: String,
        /// Entity array name.
        array: String,
        /// Requested id.
        id: String,
    },

    // === Report Errors ===
    /// An image payload could not be decoded.
    #[error("failed to decode image {id}: {message}")]
    ImageDecode {
        /// Image id.
        id: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Document rendering failed.
    #[error("rendering failed: {0}")]
    Render(String),

    /// Archive packaging failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for fireaudit operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a new rendering error.
    #[must_use]
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an image decode error.
    #[must_use]
    pub fn image_decode(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ImageDecode {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a form validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Field errors carried by a validation failure, if any.
    #[must_use]
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::render("page limit exceeded");
        assert_eq!(err.to_string(), "rendering failed: page limit exceeded");

        let err = Error::UnknownSection("kitchen".to_string());
        assert_eq!(err.to_string(), "unknown section: kitchen");
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let err = Error::Validation(vec![
            FieldError::new("siteName", "is required"),
            FieldError::new("damageNotes", "is required when hasDamage is set"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("siteName: is required"));
        assert!(msg.contains("damageNotes"));
        assert!(err.is_validation());
        assert_eq!(err.field_errors().len(), 2);
    }

    #[test]
    fn test_non_validation_has_no_field_errors() {
        let err = Error::internal("boom");
        assert!(!err.is_validation());
        assert!(err.field_errors().is_empty());
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_entity_not_found_display() {
        let err = Error::EntityNotFound {
            section: "cableRisk".to_string(),
            array: "cables".to_string(),
            id: "7".to_string(),
        };
        assert_eq!(err.to_string(), "no entity with id 7 in cableRisk.cables");
    }

    #[test]
    fn test_image_decode_display() {
        let err = Error::image_decode("img-1", "invalid base64");
        let msg = err.to_string();
        assert!(msg.contains("img-1"));
        assert!(msg.contains("invalid base64"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_corrupt_record_display() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = Error::CorruptRecord {
            key: "assessmentData".to_string(),
            source,
        };
        assert!(err.to_string().contains("assessmentData"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "wrap_width must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("wrap_width"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
