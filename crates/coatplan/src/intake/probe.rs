use std::io::Cursor;

use image::{ImageDecoder, ImageReader};
use lopdf::{Dictionary, Document, Object};

use crate::model::{DocumentMetadata, MimeKind, PageDimensions};

use super::IntakeError;

pub fn probe_metadata(kind: MimeKind, bytes: &[u8]) -> Result<DocumentMetadata, IntakeError> {
    let _span = tracing::info_span!("intake.probe", format = kind.extension()).entered();
    if kind.is_raster() {
        probe_image(bytes)
    } else {
        probe_pdf(bytes)
    }
}

/// Reads dimensions and colour type from the image header. Pixel data is
/// never decoded, so large scans cost no more than small ones.
fn probe_image(bytes: &[u8]) -> Result<DocumentMetadata, IntakeError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| IntakeError::Probe(format!("Failed to read image: {}", e)))?;
    reader.no_limits();
    let decoder = reader
        .into_decoder()
        .map_err(|e| IntakeError::Probe(format!("Failed to load image: {}", e)))?;

    let (width, height) = decoder.dimensions();
    let color = decoder.color_type();
    let color_space = match (color.has_color(), color.has_alpha()) {
        (true, true) => "rgba",
        (true, false) => "rgb",
        (false, true) => "gray_alpha",
        (false, false) => "gray",
    };

    Ok(DocumentMetadata {
        dimensions: Some(PageDimensions {
            width: f64::from(width),
            height: f64::from(height),
            unit: "px".to_string(),
        }),
        resolution_dpi: None,
        color_space: Some(color_space.to_string()),
        page_count: Some(1),
    })
}

fn probe_pdf(bytes: &[u8]) -> Result<DocumentMetadata, IntakeError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| IntakeError::Probe(format!("Failed to parse PDF: {}", e)))?;

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(IntakeError::Probe("PDF has no pages".to_string()));
    }

    let dimensions = pages
        .values()
        .next()
        .and_then(|id| doc.get_dictionary(*id).ok())
        .and_then(|page| media_box(&doc, page))
        .map(|(width, height)| PageDimensions {
            width,
            height,
            unit: "pt".to_string(),
        });

    Ok(DocumentMetadata {
        dimensions,
        resolution_dpi: None,
        color_space: None,
        page_count: Some(pages.len() as u32),
    })
}

/// MediaBox of a page, following the inheritance chain up through `Parent`.
fn media_box(doc: &Document, page: &Dictionary) -> Option<(f64, f64)> {
    let mut current = page;
    for _ in 0..32 {
        if let Ok(object) = current.get(b"MediaBox") {
            let array = match object {
                Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
                other => other.as_array().ok()?,
            };
            let values: Vec<f64> = array.iter().filter_map(number).collect();
            if values.len() != 4 {
                return None;
            }
            return Some(((values[2] - values[0]).abs(), (values[3] - values[1]).abs()));
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}
