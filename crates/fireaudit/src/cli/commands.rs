//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::model::{Association, Section};

/// Assessment session commands.
#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Start a new assessment, discarding all recorded data
    Start {
        /// Name of the inspected site
        #[arg(long)]
        site: String,

        /// Site representative present during the inspection
        #[arg(long)]
        representative: String,

        /// Assessment date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Record that safe entry to the site was refused
        #[arg(long)]
        no_safety_entry: bool,

        /// Why entry was refused
        #[arg(long, requires = "no_safety_entry")]
        decline_reason: Option<String>,
    },

    /// Show the current setup record
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete every stored record, including the setup
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Section commands.
#[derive(Debug, Subcommand)]
pub enum SectionCommand {
    /// Print the stored values of a section
    Show {
        /// Section key (e.g. cableRisk)
        #[arg(value_parser = parse_section)]
        section: Section,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Read from per-section chunked storage
        #[arg(long)]
        chunked: bool,
    },

    /// Validate and merge values from a JSON file into a section
    Set {
        /// Section key (e.g. cableRisk)
        #[arg(value_parser = parse_section)]
        section: Section,

        /// JSON object of field values ("-" reads stdin)
        values: PathBuf,

        /// Write through per-section chunked storage
        #[arg(long)]
        chunked: bool,
    },

    /// List the known sections
    List,
}

/// Entity commands.
#[derive(Debug, Subcommand)]
pub enum EntityCommand {
    /// Append an entity to an array, assigning its id
    Add {
        /// Section key
        #[arg(value_parser = parse_section)]
        section: Section,

        /// Entity array (e.g. transformers)
        array: String,

        /// JSON object of the entity's fields ("-" reads stdin)
        values: PathBuf,
    },

    /// Delete an entity and the images attached to it
    Delete {
        /// Section key
        #[arg(value_parser = parse_section)]
        section: Section,

        /// Entity array (e.g. transformers)
        array: String,

        /// Entity id
        id: String,
    },
}

/// Image commands.
#[derive(Debug, Subcommand)]
pub enum ImageCommand {
    /// Attach an image file to a section
    Add {
        /// Section key
        #[arg(value_parser = parse_section)]
        section: Section,

        /// Image field path (e.g. cableImages, transformers.2.images)
        field: String,

        /// Image file (JPEG, PNG, GIF or WebP)
        file: PathBuf,

        /// Entity the image documents, as TYPE:ID (e.g. cable:1)
        #[arg(long, value_parser = parse_association)]
        entity: Option<Association>,
    },

    /// List the images of a section
    List {
        /// Section key
        #[arg(value_parser = parse_section)]
        section: Section,
    },

    /// Remove an image by id
    Remove {
        /// Section key
        #[arg(value_parser = parse_section)]
        section: Section,

        /// Image field path, as shown by `image list`
        field: String,

        /// Image id
        id: String,
    },
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// What to produce
    #[arg(value_enum)]
    pub format: ExportFormat,

    /// Output directory (overrides `export.output_dir`)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Export output kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    /// Paginated PDF report
    #[default]
    Pdf,
    /// Plain-text report
    Text,
    /// ZIP bundle of the PDF, the text report and all images
    Zip,
}

fn parse_section(s: &str) -> Result<Section, String> {
    s.parse().map_err(|_| {
        let known: Vec<_> = Section::ALL.iter().map(|s| s.key()).collect();
        format!("unknown section '{s}' (expected one of: {})", known.join(", "))
    })
}

fn parse_association(s: &str) -> Result<Association, String> {
    match s.split_once(':') {
        Some((kind, id)) if !kind.is_empty() && !id.is_empty() => {
            Ok(Association::entity(kind, id))
        }
        _ => Err(format!("expected TYPE:ID, got '{s}'")),
    }
}
