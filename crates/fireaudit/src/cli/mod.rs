//! Command-line interface for fireaudit.
//!
//! This module provides the CLI structure for the `fireaudit` binary. The
//! handlers live in the binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, EntityCommand, ExportCommand, ExportFormat, ImageCommand, SectionCommand,
    SessionCommand, StatusCommand,
};

/// fireaudit - Record fire-risk assessments and export reports
///
/// Captures checklist answers, entities and photographs for an electrical
/// site inspection, and exports them as a PDF, a text report or a ZIP bundle.
#[derive(Debug, Parser)]
#[command(name = "fireaudit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start or inspect the assessment session
    #[command(subcommand)]
    Session(SessionCommand),

    /// Show or update checklist sections
    #[command(subcommand)]
    Section(SectionCommand),

    /// Add or delete repeated entities (transformers, cables, ...)
    #[command(subcommand)]
    Entity(EntityCommand),

    /// Attach, list or remove images
    #[command(subcommand)]
    Image(ImageCommand),

    /// Export the assessment report
    Export(ExportCommand),

    /// Show storage and progress status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
