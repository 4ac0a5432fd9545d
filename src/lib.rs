//! # Folio
//!
//! An incremental PDF writer with an embedded TrueType subsetting engine.
//!
//! A [`Document`] collects pages, fonts, images, links and bookmarks as the
//! caller produces them. Nothing is written until the document is closed;
//! at that point every TrueType font is cut down to the glyphs the document
//! actually shows and the whole file is serialized in one pass, with a
//! byte-exact cross-reference table.
//!
//! ## Architecture
//!
//! ```text
//! Input (JSON/API)
//!       ↓
//!   [model]    document description, options, metadata
//!       ↓
//!   [pdf]      document state machine, accumulates pages and resources
//!       ↓                          ↑
//!   [pdf::writer]            [font::truetype] → [font::subset]
//!       ↓                     parse .ttf         rebuild a minimal .ttf
//!   PDF bytes
//! ```

pub mod binary;
pub mod error;
pub mod font;
pub mod image;
pub mod model;
pub mod pdf;

use std::collections::HashMap;
use std::path::Path;

pub use error::{FolioError, Result};
pub use pdf::Document;

use font::TrueTypeFont;
use image::{ImageLoader, JpegLoader};
use model::{DocumentSpec, FontSourceSpec};

/// Render a document description to PDF bytes.
///
/// Relative font and image paths are resolved against the current
/// directory.
pub fn render(input: &DocumentSpec) -> Result<Vec<u8>> {
    let mut doc = Document::new(input.options.clone());
    doc.set_metadata(input.metadata.clone())?;
    if let Some(alias) = &input.alias_nb_pages {
        doc.set_alias_nb_pages(alias.clone())?;
    }

    let mut fonts = HashMap::new();
    for font in &input.fonts {
        let id = match &font.source {
            FontSourceSpec::Core { font: name } => doc.add_core_font(name)?,
            FontSourceSpec::TrueType { path } => doc.add_truetype_font(&font.name, path)?,
        };
        fonts.insert(font.name.as_str(), id);
    }

    let loader = JpegLoader;
    let mut images = HashMap::new();
    for image in &input.images {
        let loaded = loader.load(&image.path)?;
        images.insert(image.name.as_str(), doc.register_image(&image.name, loaded)?);
    }

    for page in &input.pages {
        doc.add_page(page.size, page.rotation)?;
        for op in &page.content {
            doc.write(op)?;
        }
        for run in &page.text {
            let font = fonts.get(run.font.as_str()).copied().ok_or_else(|| {
                FolioError::state(format!("text run uses undeclared font '{}'", run.font))
            })?;
            doc.show_text(font, run.size, run.x, run.y, &run.text)?;
        }
        for placement in &page.images {
            let image = images.get(placement.image.as_str()).copied().ok_or_else(|| {
                FolioError::state(format!("page places undeclared image '{}'", placement.image))
            })?;
            doc.draw_image(image, placement.x, placement.y, placement.width, placement.height)?;
        }
        for link in &page.links {
            doc.add_link(link.rect, link.target.clone())?;
        }
        for bookmark in &page.bookmarks {
            doc.add_bookmark(&bookmark.title, bookmark.level, bookmark.y)?;
        }
    }

    doc.finalize()
}

/// Render a document described as JSON to PDF bytes.
pub fn render_json(json: &str) -> Result<Vec<u8>> {
    let input: DocumentSpec = serde_json::from_str(json)?;
    render(&input)
}

/// Subset a TrueType file to the characters of `text` and return the new
/// font program.
pub fn subset_font(path: impl AsRef<Path>, text: &str) -> Result<Vec<u8>> {
    let mut font = TrueTypeFont::open(path)?;
    font.parse()?;
    font.subset(text.chars().map(|c| c as u32))?;
    font.build()
}

/// Like [`subset_font`], for a font already in memory.
pub fn subset_font_bytes(data: Vec<u8>, text: &str) -> Result<Vec<u8>> {
    let mut font = TrueTypeFont::from_bytes(data);
    font.parse()?;
    font.subset(text.chars().map(|c| c as u32))?;
    font.build()
}
