//! PDF serialization.
//!
//! Converts a laid-out [`PageSet`] into PDF bytes with the builtin Helvetica
//! faces. Layout failures never reach the caller: they are logged and a
//! single-page fallback document is produced instead.

use printpdf::{BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point};
use tracing::{debug, error};

use super::aggregate::Report;
use super::layout::{
    fallback_pages, layout_report, Element, LayoutOptions, PageSet, PAGE_HEIGHT_MM, PAGE_WIDTH_MM,
};
use crate::error::{Error, Result};

const LAYER_NAME: &str = "Layer 1";

/// A rendered PDF document.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    /// The PDF file contents.
    pub bytes: Vec<u8>,
    /// Number of pages.
    pub pages: usize,
    /// Whether the fallback document was produced instead of the report.
    pub degraded: bool,
}

/// Render a report to PDF.
///
/// # Errors
///
/// Returns [`Error::Render`] only if the fallback document itself cannot be
/// serialized.
pub fn render_pdf(report: &Report, options: &LayoutOptions) -> Result<RenderedPdf> {
    let attempt = layout_report(report, options)
        .and_then(|pages| write_pdf(&pages, &options.title).map(|bytes| (bytes, pages.len())));

    match attempt {
        Ok((bytes, pages)) => {
            debug!("Rendered {} page PDF ({} bytes)", pages, bytes.len());
            Ok(RenderedPdf {
                bytes,
                pages,
                degraded: false,
            })
        }
        Err(e) => {
            error!("PDF generation failed, writing fallback document: {}", e);
            let pages = fallback_pages(&e.to_string(), report.generated, options.margin_mm);
            let bytes = write_pdf(&pages, &options.title)?;
            Ok(RenderedPdf {
                bytes,
                pages: pages.len(),
                degraded: true,
            })
        }
    }
}

/// Serialize a page set.
///
/// # Errors
///
/// Returns [`Error::Render`] if fonts cannot be registered or the document
/// cannot be written.
pub fn write_pdf(pages: &PageSet, title: &str) -> Result<Vec<u8>> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME);
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| Error::render(format!("font registration failed: {e:?}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| Error::render(format!("font registration failed: {e:?}")))?;
    let fonts = Fonts { regular, bold };

    for (index, page) in pages.pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), LAYER_NAME);
            doc.get_page(page).get_layer(layer)
        };
        layer.set_outline_thickness(0.5);
        for element in &page.elements {
            draw(&layer, &fonts, element);
        }
    }

    doc.save_to_bytes()
        .map_err(|e| Error::render(format!("PDF serialization failed: {e:?}")))
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn draw(layer: &PdfLayerReference, fonts: &Fonts, element: &Element) {
    match element {
        Element::Text {
            x,
            y,
            size,
            bold,
            text,
        } => {
            let font = if *bold { &fonts.bold } else { &fonts.regular };
            layer.use_text(latin1(text), *size, Mm(*x), Mm(flip(*y)), font);
        }
        Element::Rect {
            x,
            y,
            width,
            height,
        } => layer.add_line(Line {
            points: vec![
                (Point::new(Mm(*x), Mm(flip(*y))), false),
                (Point::new(Mm(x + width), Mm(flip(*y))), false),
                (Point::new(Mm(x + width), Mm(flip(y + height))), false),
                (Point::new(Mm(*x), Mm(flip(y + height))), false),
            ],
            is_closed: true,
        }),
        Element::Rule { x1, x2, y } => layer.add_line(Line {
            points: vec![
                (Point::new(Mm(*x1), Mm(flip(*y))), false),
                (Point::new(Mm(*x2), Mm(flip(*y))), false),
            ],
            is_closed: false,
        }),
    }
}

/// Layout measures from the top; PDF from the bottom.
fn flip(y: f32) -> f32 {
    PAGE_HEIGHT_MM - y
}

/// Replace characters the builtin fonts cannot encode.
#[must_use]
pub fn latin1(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\t' | '\n' | '\r' => ' ',
            c if c.is_control() || u32::from(c) > 0xFF => '?',
            c => c,
        })
        .collect()
}
