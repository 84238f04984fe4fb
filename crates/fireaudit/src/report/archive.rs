//! ZIP packaging of an export.
//!
//! Layout of the archive:
//!
//! ```text
//! assessment.pdf
//! assessment.txt
//! images/<Section Title>/<Item>/<file>
//! images/<Section Title>/<file>          (general images)
//! ```

use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::images::ExtractedImage;
use crate::error::Result;

/// Name of the PDF entry.
pub const PDF_ENTRY: &str = "assessment.pdf";

/// Name of the text entry.
pub const TEXT_ENTRY: &str = "assessment.txt";

const IMAGES_DIR: &str = "images";

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid regex"))
}

/// Replace characters that are unsafe in archive folder names with `_`.
#[must_use]
pub fn sanitize_path_component(name: &str) -> String {
    let cleaned = unsafe_chars().replace_all(name.trim(), "_");
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.into_owned()
    }
}

/// `Fire_Risk_Assessment_<Site>_<YYYY-MM-DD>.zip`
#[must_use]
pub fn archive_file_name(site: Option<&str>, date: NaiveDate) -> String {
    format!(
        "Fire_Risk_Assessment_{}_{}.zip",
        site_component(site),
        date.format("%Y-%m-%d")
    )
}

/// Site name as used in export file names.
#[must_use]
pub fn site_component(site: Option<&str>) -> String {
    site.map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(
            || "Unknown_Site".to_string(),
            |s| sanitize_path_component(s).replace(' ', "_"),
        )
}

/// Assemble the export archive in memory.
///
/// # Errors
///
/// Returns an error if any entry cannot be written.
pub fn build_archive(pdf: &[u8], text: &str, images: &[ExtractedImage]) -> Result<Vec<u8>> {
    let deflated = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
    let stored = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(PDF_ENTRY, deflated)?;
    zip.write_all(pdf)?;
    zip.start_file(TEXT_ENTRY, deflated)?;
    zip.write_all(text.as_bytes())?;

    let mut directories = BTreeSet::new();
    for image in images {
        let mut dir = format!(
            "{IMAGES_DIR}/{}",
            sanitize_path_component(&image.section_title)
        );
        if let Some(item) = &image.item_label {
            dir.push('/');
            dir.push_str(&sanitize_path_component(item));
        }

        // Parent folders first, each once.
        let mut prefix = String::new();
        for part in dir.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            if directories.insert(prefix.clone()) {
                zip.add_directory(format!("{prefix}/"), stored)?;
            }
        }

        // JPEG and PNG payloads are already compressed.
        zip.start_file(format!("{dir}/{}", image.filename), stored)?;
        zip.write_all(&image.bytes)?;
    }

    let bytes = zip.finish()?.into_inner();
    debug!(
        "Built archive with {} images ({} bytes)",
        images.len(),
        bytes.len()
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn image(section: &str, item: Option<&str>, filename: &str) -> ExtractedImage {
        ExtractedImage {
            bytes: b"jpeg".to_vec(),
            filename: filename.to_string(),
            section_title: section.to_string(),
            item_label: item.map(str::to_string),
        }
    }

    fn names(bytes: Vec<u8>) -> Vec<String> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("Earthing & Lightning"), "Earthing & Lightning");
        assert_eq!(sanitize_path_component("a/b:c*d?"), "a_b_c_d_");
        assert_eq!(sanitize_path_component("tab\there"), "tab_here");
        assert_eq!(sanitize_path_component("  "), "_");
    }

    #[test]
    fn test_archive_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            archive_file_name(Some("North Substation"), date),
            "Fire_Risk_Assessment_North_Substation_2024-05-01.zip"
        );
        assert_eq!(
            archive_file_name(None, date),
            "Fire_Risk_Assessment_Unknown_Site_2024-05-01.zip"
        );
        assert_eq!(
            archive_file_name(Some("  "), date),
            "Fire_Risk_Assessment_Unknown_Site_2024-05-01.zip"
        );
        assert_eq!(
            archive_file_name(Some("Yard 3/B"), date),
            "Fire_Risk_Assessment_Yard_3_B_2024-05-01.zip"
        );
    }

    #[test]
    fn test_cable_folders() {
        let images = [
            image("Cable Risk", Some("Cable_1"), "cableRisk_Cable_1_1_1_abcdef.jpg"),
            image("Cable Risk", None, "cableRisk_2_1_ghijkl.jpg"),
        ];
        let names = names(build_archive(b"%PDF-1.3", "report", &images).unwrap());

        assert!(names.contains(&PDF_ENTRY.to_string()));
        assert!(names.contains(&TEXT_ENTRY.to_string()));
        assert!(names.contains(&"images/Cable Risk/Cable_1/cableRisk_Cable_1_1_1_abcdef.jpg".to_string()));
        assert!(names.contains(&"images/Cable Risk/cableRisk_2_1_ghijkl.jpg".to_string()));
    }

    #[test]
    fn test_directories_created_once() {
        let images = [
            image("Transformer Risk", Some("Transformer_1"), "a.jpg"),
            image("Transformer Risk", Some("Transformer_1"), "b.jpg"),
            image("Transformer Risk", Some("Transformer_2"), "c.jpg"),
        ];
        let names = names(build_archive(b"", "", &images).unwrap());

        let dirs: Vec<_> = names.iter().filter(|n| n.ends_with('/')).collect();
        assert_eq!(
            dirs,
            [
                "images/",
                "images/Transformer Risk/",
                "images/Transformer Risk/Transformer_1/",
                "images/Transformer Risk/Transformer_2/",
            ]
        );
    }

    #[test]
    fn test_entry_contents() {
        let bytes = build_archive(b"%PDF-1.3 body", "REPORT TEXT", &[]).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut text = String::new();
        zip.by_name(TEXT_ENTRY).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "REPORT TEXT");

        let mut pdf = Vec::new();
        zip.by_name(PDF_ENTRY).unwrap().read_to_end(&mut pdf).unwrap();
        assert_eq!(pdf, b"%PDF-1.3 body");
    }
}
