//! Page layout for the PDF report.
//!
//! Layout produces a [`PageSet`]: positioned text, boxes and rules measured in
//! millimetres from the top-left corner of an A4 page. The PDF backend only
//! serializes a finished page set, so everything about pagination (the table
//! of contents, wrapping, footers) is decided here and can be inspected
//! without parsing PDF output.
//!
//! Layout runs in two passes. The first places the cover, a table of contents
//! with placeholder page numbers, and the body. The second back-fills the
//! contents entries with the page each heading landed on and stamps a footer
//! on every page.

use chrono::NaiveDate;

use super::aggregate::{FieldNode, Report, SectionBody, NO_DATA};
use crate::config::Config;
use crate::error::{Error, Result};

/// A4 width in millimetres.
pub const PAGE_WIDTH_MM: f32 = 210.0;

/// A4 height in millimetres.
pub const PAGE_HEIGHT_MM: f32 = 297.0;

const TITLE_SIZE: f32 = 24.0;
const HEADING_SIZE: f32 = 16.0;
const SUBHEADING_SIZE: f32 = 12.0;
const BODY_SIZE: f32 = 10.0;
const FOOTER_SIZE: f32 = 8.0;

/// Space reserved at the bottom of each page for the footer.
const FOOTER_BAND_MM: f32 = 12.0;
/// Horizontal offset per nesting level.
const INDENT_MM: f32 = 6.0;
/// Width of the label column for single-line rows.
const LABEL_COLUMN_MM: f32 = 70.0;
/// Longest label, colon included, that fits the label column in bold body text.
const LABEL_COLUMN_CHARS: usize = 30;
/// Offset of the value column inside the cover box.
const COVER_VALUE_MM: f32 = 55.0;

/// Text printed on a page whose layout could not be completed.
pub const FALLBACK_HEADING: &str = "Error generating report";

/// Layout tunables, usually taken from `[export]` configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOptions {
    /// Cover-page title.
    pub title: String,
    /// Uniform page margin.
    pub margin_mm: f32,
    /// Values longer than this wrap below their label.
    pub wrap_threshold: usize,
    /// Characters per wrapped line.
    pub wrap_width: usize,
    /// Start each section on a fresh page.
    pub new_page_per_section: bool,
    /// Page limit; exceeding it fails the layout.
    pub max_pages: Option<usize>,
}

impl LayoutOptions {
    /// Build options from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            title: config.export.report_title.clone(),
            margin_mm: config.export.margin_mm,
            wrap_threshold: config.export.wrap_threshold,
            wrap_width: config.export.wrap_width,
            new_page_per_section: config.export.new_page_per_section,
            max_pages: config.max_pages(),
        }
    }
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A drawing primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// A run of text; `y` is the baseline.
    Text {
        /// Left edge.
        x: f32,
        /// Baseline, from the top of the page.
        y: f32,
        /// Font size in points.
        size: f32,
        /// Bold face.
        bold: bool,
        /// Content.
        text: String,
    },
    /// An unfilled rectangle; `y` is the top edge.
    Rect {
        /// Left edge.
        x: f32,
        /// Top edge.
        y: f32,
        /// Width.
        width: f32,
        /// Height.
        height: f32,
    },
    /// A horizontal rule.
    Rule {
        /// Left end.
        x1: f32,
        /// Right end.
        x2: f32,
        /// Vertical position.
        y: f32,
    },
}

/// One laid-out page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Elements in drawing order.
    pub elements: Vec<Element>,
}

impl Page {
    /// Text runs on the page, in drawing order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|element| match element {
            Element::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Whether any text run equals `needle`.
    #[must_use]
    pub fn has_text(&self, needle: &str) -> bool {
        self.texts().any(|text| text == needle)
    }

    fn push_text(&mut self, x: f32, y: f32, size: f32, bold: bool, text: impl Into<String>) {
        self.elements.push(Element::Text {
            x,
            y,
            size,
            bold,
            text: text.into(),
        });
    }
}

/// A laid-out document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSet {
    /// Pages in order.
    pub pages: Vec<Page>,
}

impl PageSet {
    /// Number of pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the document has no pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// 1-based number of the first page with a text run equal to `needle`,
    /// searching from page `from` (1-based).
    #[must_use]
    pub fn find_page(&self, needle: &str, from: usize) -> Option<usize> {
        self.pages
            .iter()
            .enumerate()
            .skip(from.saturating_sub(1))
            .find(|(_, page)| page.has_text(needle))
            .map(|(index, _)| index + 1)
    }
}

/// Lay out a report.
///
/// # Errors
///
/// Returns [`Error::Render`] if the page limit is exceeded.
pub fn layout_report(report: &Report, options: &LayoutOptions) -> Result<PageSet> {
    let mut layout = Layout::new(options);
    layout.cover(report)?;
    let toc = layout.contents(report)?;
    let mut heading_pages = Vec::with_capacity(report.sections.len());
    for (index, section) in report.sections.iter().enumerate() {
        heading_pages.push(layout.section(index, &section.title, &section.body)?);
    }

    let mut pages = layout.pages;
    for (slot, page_number) in toc.into_iter().zip(heading_pages) {
        if let Some(Element::Text { text, .. }) = pages
            .get_mut(slot.page)
            .and_then(|page| page.elements.get_mut(slot.element))
        {
            *text = page_number.to_string();
        }
    }
    stamp_footers(&mut pages, report.generated, options.margin_mm);
    Ok(PageSet { pages })
}

/// The single page produced when layout fails.
#[must_use]
pub fn fallback_pages(reason: &str, generated: NaiveDate, margin_mm: f32) -> PageSet {
    let mut page = Page::default();
    page.push_text(margin_mm, margin_mm + 20.0, HEADING_SIZE, true, FALLBACK_HEADING);
    page.push_text(
        margin_mm,
        margin_mm + 32.0,
        BODY_SIZE,
        false,
        "The report could not be generated. The text export contains the recorded data.",
    );
    page.push_text(margin_mm, margin_mm + 40.0, BODY_SIZE, false, reason);
    let mut pages = vec![page];
    stamp_footers(&mut pages, generated, margin_mm);
    PageSet { pages }
}

/// Where a contents placeholder lives.
#[derive(Debug, Clone, Copy)]
struct TocSlot {
    page: usize,
    element: usize,
}

struct Layout<'a> {
    options: &'a LayoutOptions,
    pages: Vec<Page>,
    cursor: f32,
}

impl<'a> Layout<'a> {
    fn new(options: &'a LayoutOptions) -> Self {
        Self {
            options,
            pages: Vec::new(),
            cursor: options.margin_mm,
        }
    }

    fn left(&self) -> f32 {
        self.options.margin_mm
    }

    fn right(&self) -> f32 {
        PAGE_WIDTH_MM - self.options.margin_mm
    }

    fn bottom(&self) -> f32 {
        PAGE_HEIGHT_MM - self.options.margin_mm - FOOTER_BAND_MM
    }

    fn new_page(&mut self) -> Result<()> {
        if let Some(max) = self.options.max_pages {
            if self.pages.len() >= max {
                return Err(Error::render(format!("page limit of {max} exceeded")));
            }
        }
        self.pages.push(Page::default());
        self.cursor = self.options.margin_mm;
        Ok(())
    }

    /// Start a new page unless `height` more millimetres fit on this one.
    fn ensure(&mut self, height: f32) -> Result<()> {
        if self.pages.is_empty() || self.cursor + height > self.bottom() {
            self.new_page()?;
        }
        Ok(())
    }

    fn page(&mut self) -> &mut Page {
        if self.pages.is_empty() {
            self.pages.push(Page::default());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Write one line of text at the cursor and advance.
    fn line(&mut self, indent: f32, size: f32, bold: bool, text: impl Into<String>) -> Result<()> {
        let height = line_height(size);
        self.ensure(height)?;
        self.cursor += height;
        let (x, y) = (self.left() + indent, self.cursor);
        self.page().push_text(x, y, size, bold, text);
        Ok(())
    }

    fn cover(&mut self, report: &Report) -> Result<()> {
        self.new_page()?;
        let (left, right) = (self.left(), self.right());
        let title = self.options.title.clone();
        let page = self.page();
        page.push_text(left, 70.0, TITLE_SIZE, true, title);
        page.push_text(
            left,
            82.0,
            BODY_SIZE,
            false,
            format!("Generated: {}", report.generated.format("%Y-%m-%d")),
        );

        let fields = report.cover_fields();
        let row = line_height(SUBHEADING_SIZE);
        let top = 100.0;
        let mut y = top + 4.0;
        for (label, value) in fields {
            y += row;
            page.push_text(left + 5.0, y, SUBHEADING_SIZE, true, label);
            page.push_text(left + COVER_VALUE_MM, y, SUBHEADING_SIZE, false, value);
        }
        page.elements.push(Element::Rect {
            x: left,
            y: top,
            width: right - left,
            height: y - top + 6.0,
        });
        Ok(())
    }

    fn contents(&mut self, report: &Report) -> Result<Vec<TocSlot>> {
        self.new_page()?;
        self.line(0.0, HEADING_SIZE, true, "Table of Contents")?;
        self.cursor += 4.0;

        let mut slots = Vec::with_capacity(report.sections.len());
        for (index, section) in report.sections.iter().enumerate() {
            self.line(0.0, SUBHEADING_SIZE, false, format!("{}. {}", index + 1, section.title))?;
            let (x, y) = (self.right() - 15.0, self.cursor);
            let page = self.pages.len() - 1;
            let current = self.page();
            current.push_text(x, y, SUBHEADING_SIZE, false, "...");
            slots.push(TocSlot {
                page,
                element: current.elements.len() - 1,
            });
        }
        Ok(slots)
    }

    /// Lay out one section and return the 1-based page of its heading.
    fn section(&mut self, index: usize, title: &str, body: &SectionBody) -> Result<usize> {
        let heading = line_height(HEADING_SIZE);
        if index == 0 || self.options.new_page_per_section {
            self.new_page()?;
        } else {
            self.cursor += 6.0;
            self.ensure(heading + 2.0 * line_height(BODY_SIZE))?;
        }

        self.line(0.0, HEADING_SIZE, true, title)?;
        let heading_page = self.pages.len();
        let (x1, x2, y) = (self.left(), self.right(), self.cursor + 1.5);
        self.page().elements.push(Element::Rule { x1, x2, y });
        self.cursor += 3.0;

        match body {
            SectionBody::Absent => self.line(0.0, BODY_SIZE, false, NO_DATA)?,
            SectionBody::Fields(nodes) => self.nodes(nodes, 0.0)?,
        }
        Ok(heading_page)
    }

    fn nodes(&mut self, nodes: &[FieldNode], indent: f32) -> Result<()> {
        for node in nodes {
            match node {
                FieldNode::Row { label, value } => self.row(indent, label, value)?,
                FieldNode::ImageCount { label, count } => {
                    self.row(indent, label, &format!("{count} image(s) attached"))?;
                }
                FieldNode::Group { title, children } | FieldNode::Entity { title, children } => {
                    self.cursor += 1.5;
                    self.line(indent, SUBHEADING_SIZE, true, title.as_str())?;
                    self.nodes(children, indent + INDENT_MM)?;
                }
            }
        }
        Ok(())
    }

    fn row(&mut self, indent: f32, label: &str, value: &str) -> Result<()> {
        if !needs_wrap(label, value, self.options.wrap_threshold) {
            let height = line_height(BODY_SIZE);
            self.ensure(height)?;
            self.cursor += height;
            let (x, y) = (self.left() + indent, self.cursor);
            let page = self.page();
            page.push_text(x, y, BODY_SIZE, true, format!("{label}:"));
            page.push_text(x + LABEL_COLUMN_MM, y, BODY_SIZE, false, value);
            return Ok(());
        }

        self.line(indent, BODY_SIZE, true, format!("{label}:"))?;
        for wrapped in textwrap::wrap(value, self.options.wrap_width.max(1)) {
            self.line(indent + INDENT_MM, BODY_SIZE, false, wrapped.into_owned())?;
        }
        Ok(())
    }
}

/// Whether a row renders its value on separate wrapped lines.
///
/// Long values, comment and note fields, and labels too wide for the label
/// column all wrap.
#[must_use]
pub fn needs_wrap(label: &str, value: &str, threshold: usize) -> bool {
    let wide_label = label.chars().count() + 1 > LABEL_COLUMN_CHARS;
    let label = label.to_ascii_lowercase();
    value.chars().count() > threshold
        || wide_label
        || label.contains("comment")
        || label.contains("note")
}

fn line_height(size: f32) -> f32 {
    // 1pt is 0.3528mm; 1.4 leading.
    size * 0.3528 * 1.4
}

fn stamp_footers(pages: &mut [Page], generated: NaiveDate, margin_mm: f32) {
    let total = pages.len();
    let y = PAGE_HEIGHT_MM - margin_mm / 2.0;
    for (index, page) in pages.iter_mut().enumerate() {
        page.elements.push(Element::Rule {
            x1: margin_mm,
            x2: PAGE_WIDTH_MM - margin_mm,
            y: y - 5.0,
        });
        page.push_text(
            margin_mm,
            y,
            FOOTER_SIZE,
            false,
            format!("Generated: {}", generated.format("%Y-%m-%d")),
        );
        page.push_text(
            PAGE_WIDTH_MM - margin_mm - 25.0,
            y,
            FOOTER_SIZE,
            false,
            format!("Page {} of {}", index + 1, total),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::aggregate::aggregate;
    use serde_json::{json, Value};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn report(data: &Value) -> Report {
        let setup = json!({
            "siteName": "North Substation",
            "representative": "J. Okafor",
            "assessmentDate": "2024-05-01",
            "safetyEntry": true
        });
        aggregate(Some(&setup), Some(data), date())
    }

    fn many_cables(count: usize) -> Value {
        let cables: Vec<Value> = (1..=count)
            .map(|id| json!({"id": id, "location": format!("Trench {id}"), "hasDamage": false}))
            .collect();
        json!({"cableRisk": {"cables": cables}})
    }

    fn toc_entries(pages: &PageSet) -> Vec<(String, usize)> {
        let texts: Vec<&str> = pages.pages[1].texts().collect();
        texts
            .windows(2)
            .filter_map(|pair| {
                let number = pair[1].parse::<usize>().ok()?;
                let (_, title) = pair[0].split_once(". ")?;
                Some((title.to_string(), number))
            })
            .collect()
    }

    #[test]
    fn test_cover_and_contents() {
        let pages = layout_report(&report(&json!({})), &LayoutOptions::default()).unwrap();

        let cover = &pages.pages[0];
        assert!(cover.has_text("Fire Risk Assessment Report"));
        assert!(cover.has_text("North Substation"));
        assert!(cover.elements.iter().any(|e| matches!(e, Element::Rect { .. })));
        assert!(pages.pages[1].has_text("Table of Contents"));
        assert_eq!(toc_entries(&pages).len(), 8);
    }

    #[test]
    fn test_contents_match_heading_pages() {
        let options = LayoutOptions::default();
        let pages = layout_report(&report(&many_cables(60)), &options).unwrap();

        let entries = toc_entries(&pages);
        assert_eq!(entries.len(), 8);
        for (title, number) in entries {
            assert_eq!(pages.find_page(&title, 3), Some(number), "heading {title}");
        }
        assert!(pages.len() > 4);
    }

    #[test]
    fn test_new_page_per_section() {
        let options = LayoutOptions {
            new_page_per_section: true,
            ..LayoutOptions::default()
        };
        let pages = layout_report(&report(&json!({})), &options).unwrap();

        // Cover, contents and eight sections.
        assert_eq!(pages.len(), 10);
        assert_eq!(pages.find_page("Cable Risk", 3), Some(8));
    }

    #[test]
    fn test_absent_sections_show_placeholder() {
        let pages = layout_report(&report(&json!({})), &LayoutOptions::default()).unwrap();
        let placeholders: usize = pages
            .pages
            .iter()
            .map(|page| page.texts().filter(|t| *t == NO_DATA).count())
            .sum();

        // The setup section is present; the seven checklist sections are not.
        assert_eq!(placeholders, 7);
    }

    #[test]
    fn test_long_values_wrap_below_label() {
        let long = "Cable tray in the north trench shows heat discolouration along a two metre run near the joint bay and needs thermal imaging.";
        let data = json!({"cableRisk": {"condition": long, "rating": "Good"}});
        let options = LayoutOptions {
            wrap_width: 40,
            ..LayoutOptions::default()
        };
        let pages = layout_report(&report(&data), &options).unwrap();

        let body: Vec<&str> = pages.pages.iter().flat_map(|page| page.texts()).collect();
        let label = body.iter().position(|t| *t == "Condition:").unwrap();
        assert!(body[label + 1].starts_with("Cable tray"));
        assert!(body[label + 1].len() <= 40);
        assert!(!body.contains(&long));

        let rating = body.iter().position(|t| *t == "Rating:").unwrap();
        assert_eq!(body[rating + 1], "Good");
    }

    #[test]
    fn test_needs_wrap() {
        assert!(needs_wrap("Comments", "ok", 40));
        assert!(needs_wrap("Inspector Notes", "ok", 40));
        assert!(!needs_wrap("Location", "Trench A", 40));
        assert!(needs_wrap("Location", &"x".repeat(41), 40));
        assert!(needs_wrap("Has Fire Detection System Installed Correctly", "Yes", 40));
        assert!(!needs_wrap("Has Fire Detection System", "Yes", 40));
    }

    #[test]
    fn test_wide_label_keeps_value_off_label_column() {
        let data = json!({"activeFireProtection": {
            "hasFireDetectionSystemInstalledCorrectly": true
        }});
        let pages = layout_report(&report(&data), &LayoutOptions::default()).unwrap();

        let label = "Has Fire Detection System Installed Correctly:";
        let page = &pages.pages[pages.find_page(label, 1).unwrap() - 1];
        let texts: Vec<(f32, f32, &str)> = page
            .elements
            .iter()
            .filter_map(|element| match element {
                Element::Text { x, y, text, .. } => Some((*x, *y, text.as_str())),
                _ => None,
            })
            .collect();
        let at = texts.iter().position(|(_, _, t)| *t == label).unwrap();
        let (label_x, label_y, _) = texts[at];
        let (value_x, value_y, value) = texts[at + 1];

        assert_eq!(value, "Yes");
        assert!(value_y > label_y);
        assert!(value_x < label_x + LABEL_COLUMN_MM);
    }

    #[test]
    fn test_footers_on_every_page() {
        let pages = layout_report(&report(&many_cables(30)), &LayoutOptions::default()).unwrap();
        let total = pages.len();

        for (index, page) in pages.pages.iter().enumerate() {
            assert!(page.has_text(&format!("Page {} of {}", index + 1, total)));
            assert!(page.has_text("Generated: 2024-05-01"));
        }
    }

    #[test]
    fn test_page_limit_fails_layout() {
        let options = LayoutOptions {
            max_pages: Some(2),
            ..LayoutOptions::default()
        };
        let err = layout_report(&report(&json!({})), &options).unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }

    #[test]
    fn test_content_stays_above_footer_band() {
        let options = LayoutOptions::default();
        let pages = layout_report(&report(&many_cables(60)), &options).unwrap();
        let limit = PAGE_HEIGHT_MM - options.margin_mm - FOOTER_BAND_MM;

        for page in &pages.pages {
            for element in &page.elements {
                if let Element::Text { y, size, .. } = element {
                    if *size > FOOTER_SIZE {
                        assert!(*y <= limit);
                    }
                }
            }
        }
    }

    #[test]
    fn test_fallback_is_single_page() {
        let pages = fallback_pages("page limit of 2 exceeded", date(), 20.0);
        assert_eq!(pages.len(), 1);
        assert!(pages.pages[0].has_text(FALLBACK_HEADING));
        assert!(pages.pages[0].has_text("Page 1 of 1"));
    }
}
