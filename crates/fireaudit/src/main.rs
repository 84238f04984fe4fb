//! `fireaudit` - CLI for fire-risk assessments
//!
//! This binary records assessment data into the local store and exports the
//! finished report as PDF, plain text or a ZIP bundle.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use serde_json::{json, Map, Value};

use fireaudit::cli::{
    Cli, Command, ConfigCommand, EntityCommand, ExportCommand, ExportFormat, ImageCommand,
    SectionCommand, SessionCommand,
};
use fireaudit::form::{self, SectionForm};
use fireaudit::report::aggregate::{format_scalar, humanize, is_image_field};
use fireaudit::report::{self, ExportInput, ExportOptions, LayoutOptions};
use fireaudit::{
    init_logging, AssessmentRepository, AssessmentSetup, CapturedImage, Config, Error, ImageSource,
    Section, Storage,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Session(cmd) => handle_session(&config, cmd),
        Command::Section(cmd) => handle_section(&config, cmd),
        Command::Entity(cmd) => handle_entity(&config, cmd),
        Command::Image(cmd) => handle_image(&config, cmd),
        Command::Export(cmd) => handle_export(&config, cmd).await,
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn print_error(err: &anyhow::Error) {
    if let Some(Error::Validation(errors)) = err.downcast_ref::<Error>() {
        eprintln!("Validation failed:");
        for error in errors {
            eprintln!("  {error}");
        }
    } else {
        eprintln!("Error: {err:#}");
    }
}

fn open_repository(config: &Config) -> Result<AssessmentRepository> {
    let storage = Storage::open(config.database_path())?;
    Ok(AssessmentRepository::new(storage))
}

/// Read a JSON object from a file, or stdin for `-`.
fn read_values(path: &Path) -> Result<Map<String, Value>> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read values from stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    match serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

fn handle_session(config: &Config, cmd: SessionCommand) -> Result<()> {
    let repo = open_repository(config)?;
    match cmd {
        SessionCommand::Start {
            site,
            representative,
            date,
            no_safety_entry,
            decline_reason,
        } => {
            let setup = AssessmentSetup {
                site_name: site,
                representative,
                assessment_date: date,
                safety_entry: !no_safety_entry,
                decline_reason,
            };
            let cleared = form::start_session(&repo, &setup)?;
            println!(
                "Started assessment for {} ({} previous records cleared)",
                setup.site_name, cleared
            );
        }
        SessionCommand::Show { json } => {
            let Some(setup) = repo.load_setup()? else {
                println!("No assessment session has been started.");
                return Ok(());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&setup)?);
            } else {
                println!("Site:            {}", setup.site_name);
                println!("Representative:  {}", setup.representative);
                println!("Date:            {}", setup.assessment_date);
                println!(
                    "Safe entry:      {}",
                    if setup.safety_entry { "Yes" } else { "No" }
                );
                if let Some(reason) = &setup.decline_reason {
                    println!("Decline reason:  {reason}");
                }
            }
        }
        SessionCommand::Clear { yes } => {
            if !yes {
                println!("This will delete all recorded assessment data.");
                println!("Use --yes to confirm.");
                return Ok(());
            }
            let removed = repo.storage().clear()?;
            println!("Removed {removed} records.");
        }
    }
    Ok(())
}

fn handle_section(config: &Config, cmd: SectionCommand) -> Result<()> {
    match cmd {
        SectionCommand::Show {
            section,
            json,
            chunked,
        } => {
            let repo = open_repository(config)?;
            let form = if chunked {
                SectionForm::load_chunked(&repo, section)?
            } else {
                SectionForm::load(&repo, section)?
            };
            if json {
                let values = Value::Object(form.values().clone());
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else {
                print_section(section, form.values());
            }
        }
        SectionCommand::Set {
            section,
            values,
            chunked,
        } => {
            let repo = open_repository(config)?;
            let mut form = if chunked {
                SectionForm::load_chunked(&repo, section)?
            } else {
                SectionForm::load(&repo, section)?
            };
            form.merge(read_values(&values)?);
            if chunked {
                form.submit_chunked(&repo)?;
                println!("Saved {} (chunked; not included in exports)", section.title());
            } else {
                form.submit(&repo)?;
                println!("Saved {}", section.title());
            }
        }
        SectionCommand::List => {
            for section in Section::ALL {
                let arrays: Vec<_> = section.entity_arrays().iter().map(|a| a.name).collect();
                println!("{:<24} {}", section.key(), section.title());
                if !arrays.is_empty() {
                    println!("{:<24}   entities: {}", "", arrays.join(", "));
                }
                let images: Vec<_> = section
                    .image_sources()
                    .iter()
                    .map(ImageSource::path_pattern)
                    .collect();
                println!("{:<24}   images:   {}", "", images.join(", "));
            }
        }
    }
    Ok(())
}

fn print_section(section: Section, values: &Map<String, Value>) {
    println!("{}", section.title());
    println!("{}", "-".repeat(section.title().len()));
    if values.is_empty() {
        println!("{}", report::NO_DATA);
        return;
    }
    for (key, value) in values {
        let shown = match value {
            Value::Array(items) if is_image_field(key) => format!("{} image(s)", items.len()),
            Value::Array(items) => format!("{} item(s)", items.len()),
            Value::Object(map) => format!("{} field(s)", map.len()),
            scalar => format_scalar(scalar),
        };
        println!("{}: {}", humanize(key), shown);
    }
}

fn handle_entity(config: &Config, cmd: EntityCommand) -> Result<()> {
    let repo = open_repository(config)?;
    match cmd {
        EntityCommand::Add {
            section,
            array,
            values,
        } => {
            let mut form = SectionForm::load(&repo, section)?;
            let id = form.add_entity(&array, read_values(&values)?)?;
            form.submit(&repo)?;
            println!("Added {array} entry with id {id}");
        }
        EntityCommand::Delete { section, array, id } => {
            let mut form = SectionForm::load(&repo, section)?;
            let removed = form.delete_entity(&array, &id)?;
            form.submit(&repo)?;
            println!("Deleted {array} entry {id} ({removed} attached images removed)");
        }
    }
    Ok(())
}

fn handle_image(config: &Config, cmd: ImageCommand) -> Result<()> {
    let repo = open_repository(config)?;
    match cmd {
        ImageCommand::Add {
            section,
            field,
            file,
            entity,
        } => {
            let bytes =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let image = CapturedImage::new(&bytes, mime_for(&file), entity.unwrap_or_default());
            let id = image.id.clone();

            let mut form = SectionForm::load(&repo, section)?;
            if form.add_image(&field, image)? {
                form.submit(&repo)?;
                println!("Attached image {id}");
            } else {
                println!("An identical image is already attached to {field}.");
            }
        }
        ImageCommand::List { section } => {
            let form = SectionForm::load(&repo, section)?;
            let images = form.images();
            if images.is_empty() {
                println!("No images attached to {}.", section.title());
            }
            for (field, image) in images {
                let target = if image.associated_with.is_general() {
                    "general".to_string()
                } else {
                    format!(
                        "{}:{}",
                        image.associated_with.kind, image.associated_with.id
                    )
                };
                println!("{field:<36} {:<32} {:<12} {target}", image.id, image.mime());
            }
        }
        ImageCommand::Remove { section, field, id } => {
            let mut form = SectionForm::load(&repo, section)?;
            if !form.remove_image(&field, &id)? {
                bail!("no image with id {id} in {}.{field}", section.key());
            }
            form.submit(&repo)?;
            println!("Removed image {id}");
        }
    }
    Ok(())
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

async fn handle_export(config: &Config, cmd: ExportCommand) -> Result<()> {
    let repo = open_repository(config)?;
    let input = ExportInput::load(&repo)?;
    let date = Local::now().date_naive();

    let output_dir = cmd.output.unwrap_or_else(|| config.output_dir());
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let (path, degraded) = match cmd.format {
        ExportFormat::Pdf => {
            let rendered =
                report::export_pdf(&input, &LayoutOptions::from_config(config), date)?;
            let path = output_dir.join(report::pdf_file_name(input.site(), date));
            write_output(&path, &rendered.bytes)?;
            (path, rendered.degraded)
        }
        ExportFormat::Text => {
            let text = report::export_text(&input, &config.export.report_title, date);
            let path = output_dir.join(report::text_file_name(input.site(), date));
            write_output(&path, text.as_bytes())?;
            (path, false)
        }
        ExportFormat::Zip => {
            let export =
                report::export_archive(input, ExportOptions::from_config(config), date).await?;
            let path = output_dir.join(&export.file_name);
            write_output(&path, &export.bytes)?;
            println!("Bundled {} images", export.image_count);
            (path, export.pdf_degraded)
        }
    };

    println!("Wrote {}", path.display());
    if degraded {
        eprintln!("Warning: the report could not be laid out; the PDF contains an error page.");
    }
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let repo = open_repository(config)?;
    let stats = repo.storage().stats()?;
    let setup = repo.load_setup()?;
    let data = repo.load_data()?;
    let chunked = repo.chunked_sections()?;

    let sections: Vec<_> = Section::ALL
        .iter()
        .map(|section| {
            let values = data
                .get(section.key())
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let recorded = !values.is_empty();
            let images = SectionForm::from_values(*section, values).images().len();
            (*section, recorded, images)
        })
        .collect();

    if json {
        let status = json!({
            "database_path": config.database_path(),
            "site": setup.as_ref().map(|s| s.site_name.clone()),
            "sections": sections.iter().map(|(section, recorded, images)| json!({
                "key": section.key(),
                "recorded": recorded,
                "images": images,
            })).collect::<Vec<_>>(),
            "chunked_sections": chunked.iter().map(|s| s.key()).collect::<Vec<_>>(),
            "storage": {
                "keys": stats.total_keys,
                "value_bytes": stats.total_value_bytes,
                "db_size_bytes": stats.db_size_bytes,
                "last_updated": stats.last_updated,
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("fireaudit status");
        println!("----------------");
        println!("Database:      {}", config.database_path().display());
        match &setup {
            Some(setup) => println!(
                "Assessment:    {} ({})",
                setup.site_name, setup.assessment_date
            ),
            None => println!("Assessment:    not started"),
        }
        println!();
        for (section, recorded, images) in &sections {
            println!(
                "  {:<26} {:<10} {} image(s)",
                section.title(),
                if *recorded { "recorded" } else { "-" },
                images
            );
        }
        if !chunked.is_empty() {
            println!();
            println!(
                "Chunked only (not exported): {}",
                chunked.iter().map(|s| s.key()).collect::<Vec<_>>().join(", ")
            );
        }
        println!();
        println!(
            "Storage:       {} keys, {} bytes",
            stats.total_keys, stats.total_value_bytes
        );
        if let Some(last) = &stats.last_updated {
            println!("Last updated:  {last}");
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:        {}", config.database_path().display());
                println!();
                println!("[Export]");
                println!("  Output directory:     {}", config.output_dir().display());
                println!("  Report title:         {}", config.export.report_title);
                println!("  Wrap threshold:       {}", config.export.wrap_threshold);
                println!("  Wrap width:           {}", config.export.wrap_width);
                println!("  Margin (mm):          {}", config.export.margin_mm);
                println!(
                    "  Page per section:     {}",
                    config.export.new_page_per_section
                );
                match config.max_pages() {
                    Some(max) => println!("  Max pages:            {max}"),
                    None => println!("  Max pages:            unlimited"),
                }
                println!("  Include images:       {}", config.export.include_images);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
