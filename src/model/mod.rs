//! # Document Model
//!
//! Serde types for everything a caller configures: document options,
//! metadata, display preferences, page sizes, and the JSON document
//! description consumed by [`crate::render_json`].
//!
//! A JSON document is a flat list of pages. Each page carries raw content
//! stream operators plus higher-level text runs, image placements, links
//! and bookmarks, all positioned in PDF user space (origin bottom-left,
//! units in points).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Document-level switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOptions {
    /// FlateDecode content streams, font files and CMaps.
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Minimum header version. Raised to 1.4 when a soft mask is used.
    #[serde(default = "default_pdf_version")]
    pub pdf_version: String,

    #[serde(default)]
    pub display_mode: DisplayMode,

    /// Size used by pages that don't set their own.
    #[serde(default)]
    pub default_page_size: PageSize,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            compress: true,
            pdf_version: default_pdf_version(),
            display_mode: DisplayMode::default(),
            default_page_size: PageSize::A4,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pdf_version() -> String {
    "1.3".to_string()
}

/// Document metadata embedded in the PDF `/Info` dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub author: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    /// Defaults to `folio <version>`.
    pub producer: Option<String>,
    /// `YYYYMMDDHHmmSS`, with or without the `D:` prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

impl Metadata {
    /// The creation date as a PDF date string.
    pub fn pdf_date(&self) -> Option<String> {
        self.creation_date.as_ref().map(|d| {
            if d.starts_with("D:") {
                d.clone()
            } else {
                format!("D:{}", d)
            }
        })
    }
}

/// How a viewer should open the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayMode {
    #[serde(default)]
    pub zoom: Zoom,
    #[serde(default)]
    pub layout: Layout,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zoom {
    /// Whole page visible.
    FullPage,
    FullWidth,
    /// 100%.
    Real,
    /// Viewer's choice.
    #[default]
    Default,
    Percent(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Single,
    Continuous,
    Two,
    #[default]
    Default,
}

/// Standard page sizes in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom {
        width: f64,
        height: f64,
    },
}

impl PageSize {
    /// Returns (width, height) in points.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::A3 => (841.89, 1190.55),
            PageSize::A5 => (419.53, 595.28),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Custom { width, height } => (*width, *height),
        }
    }
}

/// A complete document described in JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSpec {
    #[serde(default)]
    pub options: DocumentOptions,

    #[serde(default)]
    pub metadata: Metadata,

    /// Fonts, referenced from text runs by `name`.
    #[serde(default)]
    pub fonts: Vec<FontSpec>,

    /// Images, referenced from placements by `name`.
    #[serde(default)]
    pub images: Vec<ImageSpec>,

    /// Replaced by the page count in every content stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_nb_pages: Option<String>,

    pub pages: Vec<PageSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontSpec {
    pub name: String,
    #[serde(flatten)]
    pub source: FontSourceSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FontSourceSpec {
    /// One of the 14 standard fonts, e.g. `Helvetica-Bold`.
    Core { font: String },
    /// A `.ttf` file, subsetted and embedded as a Unicode font.
    TrueType { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSpec {
    pub name: String,
    /// JPEG file.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<PageSize>,

    /// Clockwise, a multiple of 90.
    #[serde(default)]
    pub rotation: u16,

    /// Raw content stream operators, written before everything else.
    #[serde(default)]
    pub content: Vec<String>,

    #[serde(default)]
    pub text: Vec<TextRun>,

    #[serde(default)]
    pub images: Vec<ImagePlacement>,

    #[serde(default)]
    pub links: Vec<LinkSpec>,

    #[serde(default)]
    pub bookmarks: Vec<BookmarkSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRun {
    pub font: String,
    pub size: f64,
    pub x: f64,
    pub y: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePlacement {
    pub image: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    /// `[x, y, width, height]`
    pub rect: [f64; 4],
    pub target: LinkTarget,
}

/// Where a link annotation points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LinkTarget {
    Uri { uri: String },
    /// Zero-based page index and the y coordinate to scroll to.
    Page { page: usize, y: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkSpec {
    pub title: String,
    #[serde(default)]
    pub level: usize,
    #[serde(default)]
    pub y: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options: DocumentOptions = serde_json::from_str("{}").unwrap();
        assert!(options.compress);
        assert_eq!(options.pdf_version, "1.3");
        assert_eq!(options.display_mode, DisplayMode::default());
        assert_eq!(options.default_page_size.dimensions(), (595.28, 841.89));
    }

    #[test]
    fn test_display_mode_json() {
        let mode: DisplayMode =
            serde_json::from_str(r#"{"zoom": {"percent": 150}, "layout": "two"}"#).unwrap();
        assert_eq!(mode.zoom, Zoom::Percent(150.0));
        assert_eq!(mode.layout, Layout::Two);
        let mode: DisplayMode = serde_json::from_str(r#"{"zoom": "fullpage"}"#).unwrap();
        assert_eq!(mode.zoom, Zoom::FullPage);
        assert_eq!(mode.layout, Layout::Default);
    }

    #[test]
    fn test_document_spec_json() {
        let json = r#"{
            "metadata": {"title": "Invoice", "creationDate": "20240102030405"},
            "fonts": [
                {"name": "body", "type": "core", "font": "Helvetica"},
                {"name": "uni", "type": "trueType", "path": "fonts/Body.ttf"}
            ],
            "pages": [{
                "size": {"Custom": {"width": 300, "height": 400}},
                "rotation": 90,
                "text": [{"font": "body", "size": 12, "x": 72, "y": 700, "text": "Hi"}],
                "links": [
                    {"rect": [72, 700, 50, 12], "target": {"type": "uri", "uri": "https://example.com"}},
                    {"rect": [72, 650, 50, 12], "target": {"type": "page", "page": 0, "y": 100}}
                ],
                "bookmarks": [{"title": "Start"}]
            }]
        }"#;
        let doc: DocumentSpec = serde_json::from_str(json).unwrap();
        assert_eq!(doc.metadata.pdf_date().as_deref(), Some("D:20240102030405"));
        assert!(matches!(doc.fonts[0].source, FontSourceSpec::Core { ref font } if font == "Helvetica"));
        assert!(matches!(doc.fonts[1].source, FontSourceSpec::TrueType { .. }));
        let page = &doc.pages[0];
        assert_eq!(page.size.map(|s| s.dimensions()), Some((300.0, 400.0)));
        assert_eq!(page.rotation, 90);
        assert_eq!(page.links[1].target, LinkTarget::Page { page: 0, y: 100.0 });
        assert_eq!(page.bookmarks[0].level, 0);
    }
}
