//! Report generation and export.
//!
//! Three outputs are produced from the stored records:
//!
//! - a paginated PDF ([`export_pdf`]),
//! - a plain-text mirror ([`export_text`]),
//! - a ZIP archive bundling both with every captured image ([`export_archive`]).
//!
//! Exports read the monolithic assessment record only.

pub mod aggregate;
pub mod archive;
pub mod images;
pub mod layout;
pub mod pdf;
pub mod text;

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

pub use aggregate::{aggregate, FieldNode, Report, ReportSection, SectionBody, NO_DATA};
pub use archive::{archive_file_name, build_archive, sanitize_path_component};
pub use images::{extract_images, ExtractedImage};
pub use layout::{layout_report, LayoutOptions, PageSet};
pub use pdf::{render_pdf, RenderedPdf};
pub use text::render_text;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::AssessmentRepository;

/// Raw records an export is built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportInput {
    /// The setup record, if one was saved.
    pub setup: Option<Value>,
    /// The monolithic assessment record.
    pub data: Value,
}

impl ExportInput {
    /// Read the records from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored record is corrupted.
    pub fn load(repo: &AssessmentRepository) -> Result<Self> {
        Ok(Self {
            setup: repo.load_setup_value()?,
            data: repo.load_data()?,
        })
    }

    /// Build an input from in-memory values.
    #[must_use]
    pub fn new(setup: Option<Value>, data: Value) -> Self {
        Self { setup, data }
    }

    /// Site name from the setup record, if any.
    #[must_use]
    pub fn site(&self) -> Option<&str> {
        self.setup
            .as_ref()
            .and_then(|setup| setup.get("siteName"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|site| !site.is_empty())
    }

    fn report(&self, generated: NaiveDate) -> Report {
        aggregate(self.setup.as_ref(), Some(&self.data), generated)
    }
}

/// Options for one export run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// PDF layout tunables.
    pub layout: LayoutOptions,
    /// Bundle images into the archive.
    pub include_images: bool,
}

impl ExportOptions {
    /// Build options from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            layout: LayoutOptions::from_config(config),
            include_images: config.export.include_images,
        }
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of an archive export.
#[derive(Debug, Clone)]
pub struct ArchiveExport {
    /// Suggested file name.
    pub file_name: String,
    /// ZIP contents.
    pub bytes: Vec<u8>,
    /// Whether the bundled PDF is the fallback document.
    pub pdf_degraded: bool,
    /// Number of images bundled.
    pub image_count: usize,
}

/// Render the plain-text report.
#[must_use]
pub fn export_text(input: &ExportInput, title: &str, generated: NaiveDate) -> String {
    render_text(title, input.setup.as_ref(), Some(&input.data), generated)
}

/// Render the PDF report.
///
/// # Errors
///
/// Returns an error only if the fallback document cannot be produced.
pub fn export_pdf(
    input: &ExportInput,
    options: &LayoutOptions,
    generated: NaiveDate,
) -> Result<RenderedPdf> {
    let rendered = render_pdf(&input.report(generated), options)?;
    if rendered.degraded {
        warn!("Exported PDF is the fallback document");
    }
    Ok(rendered)
}

/// PDF file name: `Fire_Risk_Assessment_<Site>_<YYYY-MM-DD>.pdf`.
#[must_use]
pub fn pdf_file_name(site: Option<&str>, date: NaiveDate) -> String {
    format!(
        "Fire_Risk_Assessment_{}_{}.pdf",
        archive::site_component(site),
        date.format("%Y-%m-%d")
    )
}

/// Text file name: `Fire_Risk_Assessment_<Site>_<YYYY-MM-DD>.txt`.
#[must_use]
pub fn text_file_name(site: Option<&str>, date: NaiveDate) -> String {
    format!(
        "Fire_Risk_Assessment_{}_{}.txt",
        archive::site_component(site),
        date.format("%Y-%m-%d")
    )
}

/// Build the export archive.
///
/// PDF rendering and image extraction run as separate blocking tasks and
/// both must finish before the archive is assembled.
///
/// # Errors
///
/// Returns an error if either task fails or the archive cannot be written.
pub async fn export_archive(
    input: ExportInput,
    options: ExportOptions,
    generated: NaiveDate,
) -> Result<ArchiveExport> {
    let input = Arc::new(input);

    let pdf_task = {
        let input = Arc::clone(&input);
        let layout = options.layout.clone();
        tokio::task::spawn_blocking(move || export_pdf(&input, &layout, generated))
    };
    let image_task = {
        let input = Arc::clone(&input);
        let include = options.include_images;
        tokio::task::spawn_blocking(move || {
            if include {
                extract_images(&input.data)
            } else {
                Vec::new()
            }
        })
    };

    let (pdf, images) = tokio::try_join!(pdf_task, image_task)
        .map_err(|e| Error::internal(format!("export task failed: {e}")))?;
    let pdf = pdf?;

    let text = export_text(&input, &options.layout.title, generated);
    let bytes = build_archive(&pdf.bytes, &text, &images)?;
    let file_name = archive_file_name(input.site(), generated);
    info!(
        "Built {} with {} images ({} bytes)",
        file_name,
        images.len(),
        bytes.len()
    );

    Ok(ArchiveExport {
        file_name,
        bytes,
        pdf_degraded: pdf.degraded,
        image_count: images.len(),
    })
}
