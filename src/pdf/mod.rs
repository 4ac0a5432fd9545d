//! # PDF Serializer
//!
//! [`Document`] accumulates pages, fonts, images, links and bookmarks, and
//! writes the whole file in one pass when it is closed.
//!
//! ## PDF Structure (simplified)
//!
//! ```text
//! %PDF-1.3            <- header
//! 3 0 obj ... endobj  <- per page: page dict, content stream, link annotations
//! 1 0 obj ... endobj  <- page tree root
//! N 0 obj ... endobj  <- fonts, font files, CMaps, images
//! 2 0 obj ... endobj  <- shared resource dictionary
//! ...                 <- outlines, info, catalog
//! xref                <- cross-reference table (byte offsets of each object)
//! trailer             <- points to the catalog and info objects
//! %%EOF
//! ```
//!
//! ## Font Embedding
//!
//! Core fonts are plain references. Unicode TrueType fonts are subsetted to
//! the characters shown with them and embedded as `Type0`/`CIDFontType2`
//! with `Identity-H` encoding; see [`fonts`].

pub mod fonts;
pub mod images;
pub mod writer;

use std::collections::HashMap;
use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;
use std::path::Path;

use crate::error::{FolioError, Result};
use crate::font::{CoreFont, FontKind, UnicodeFont};
use crate::image::Image;
use crate::model::{DocumentOptions, Layout, LinkTarget, Metadata, PageSize, Zoom};
use fonts::FontEntry;
use images::ImageEntry;
pub use writer::PdfWriter;
use writer::{num, text_string, PAGES_ROOT_ID, RESOURCES_ID};

/// Handle to a registered font.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontId(usize);

/// Handle to a registered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocState {
    Empty,
    PageOpen,
    Closed,
}

struct Page {
    width: f64,
    height: f64,
    rotation: u16,
    content: Vec<u8>,
    links: Vec<Link>,
}

struct Link {
    /// `[x, y, width, height]`
    rect: [f64; 4],
    target: LinkTarget,
}

struct Bookmark {
    title: String,
    level: usize,
    page: usize,
    y: f64,
}

/// Outline tree links, as indices into the bookmark list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct OutlineNode {
    parent: Option<usize>,
    prev: Option<usize>,
    next: Option<usize>,
    first: Option<usize>,
    last: Option<usize>,
}

/// A PDF document under construction.
pub struct Document {
    options: DocumentOptions,
    metadata: Metadata,
    state: DocState,
    pdf_version: String,
    pages: Vec<Page>,
    fonts: Vec<FontEntry>,
    font_keys: HashMap<String, FontId>,
    images: Vec<ImageEntry>,
    image_keys: HashMap<String, ImageId>,
    bookmarks: Vec<Bookmark>,
    alias_nb_pages: Option<String>,
    output: Option<Vec<u8>>,
    /// Bytes written before the last failed close.
    partial: Option<Vec<u8>>,
}

impl Document {
    pub fn new(options: DocumentOptions) -> Self {
        let pdf_version = options.pdf_version.clone();
        Self {
            options,
            metadata: Metadata::default(),
            state: DocState::Empty,
            pdf_version,
            pages: Vec::new(),
            fonts: Vec::new(),
            font_keys: HashMap::new(),
            images: Vec::new(),
            image_keys: HashMap::new(),
            bookmarks: Vec::new(),
            alias_nb_pages: None,
            output: None,
            partial: None,
        }
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn set_metadata(&mut self, metadata: Metadata) -> Result<()> {
        self.ensure_open("set metadata")?;
        self.metadata = metadata;
        Ok(())
    }

    /// Header version that will be written.
    pub fn pdf_version(&self) -> &str {
        &self.pdf_version
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state == DocState::Closed
    }

    /// Replace `alias` with the total page count in every content stream
    /// when the document is closed.
    pub fn set_alias_nb_pages(&mut self, alias: impl Into<String>) -> Result<()> {
        self.ensure_open("set the page count alias")?;
        self.alias_nb_pages = Some(alias.into());
        Ok(())
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        if self.state == DocState::Closed {
            Err(FolioError::state(format!("cannot {}: the document is closed", action)))
        } else {
            Ok(())
        }
    }

    fn current_page(&mut self, action: &str) -> Result<&mut Page> {
        match self.state {
            DocState::PageOpen => self
                .pages
                .last_mut()
                .ok_or_else(|| FolioError::state("page state without a page")),
            DocState::Empty => Err(FolioError::state(format!(
                "cannot {}: no page has been added",
                action
            ))),
            DocState::Closed => Err(FolioError::state(format!(
                "cannot {}: the document is closed",
                action
            ))),
        }
    }

    /// Start a new page; it becomes the target of all drawing calls.
    /// Returns the zero-based page index.
    pub fn add_page(&mut self, size: Option<PageSize>, rotation: u16) -> Result<usize> {
        self.ensure_open("add a page")?;
        if rotation % 90 != 0 {
            return Err(FolioError::state(format!(
                "page rotation must be a multiple of 90, got {}",
                rotation
            )));
        }
        let (width, height) = size.unwrap_or(self.options.default_page_size).dimensions();
        self.pages.push(Page {
            width,
            height,
            rotation: rotation % 360,
            content: Vec::new(),
            links: Vec::new(),
        });
        self.state = DocState::PageOpen;
        Ok(self.pages.len() - 1)
    }

    /// Append raw content stream operators to the current page.
    pub fn write(&mut self, content: impl AsRef<[u8]>) -> Result<()> {
        let page = self.current_page("write content")?;
        page.content.extend_from_slice(content.as_ref());
        page.content.push(b'\n');
        Ok(())
    }

    /// Register a font under `key`. Registering the same key again returns
    /// the existing handle.
    pub fn add_font(&mut self, key: &str, kind: FontKind) -> Result<FontId> {
        self.ensure_open("add a font")?;
        if let Some(&id) = self.font_keys.get(key) {
            return Ok(id);
        }
        let id = FontId(self.fonts.len());
        log::debug!("registered font '{}' as {}", key, kind.type_name());
        self.fonts.push(FontEntry {
            key: key.to_string(),
            kind,
            used: Default::default(),
        });
        self.font_keys.insert(key.to_string(), id);
        Ok(id)
    }

    /// Register one of the 14 standard fonts by name, e.g. `Times-Bold`.
    pub fn add_core_font(&mut self, name: &str) -> Result<FontId> {
        let core = CoreFont::from_name(name).ok_or_else(|| {
            FolioError::format(format!("'{}' is not one of the 14 standard PDF fonts", name))
        })?;
        self.add_font(core.pdf_name(), FontKind::Core(core))
    }

    /// Register a `.ttf` file as a subsetted Unicode font.
    pub fn add_truetype_font(&mut self, key: &str, path: impl AsRef<Path>) -> Result<FontId> {
        self.ensure_open("add a font")?;
        if let Some(&id) = self.font_keys.get(key) {
            return Ok(id);
        }
        let font = UnicodeFont::open(path)?;
        self.add_font(key, FontKind::Unicode(Box::new(font)))
    }

    pub fn font_by_key(&self, key: &str) -> Option<FontId> {
        self.font_keys.get(key).copied()
    }

    /// Resource name of a font, e.g. `/F1`.
    pub fn font_resource(&self, font: FontId) -> Result<String> {
        self.font_entry(font)?;
        Ok(format!("/F{}", font.0 + 1))
    }

    fn font_entry(&self, font: FontId) -> Result<&FontEntry> {
        self.fonts
            .get(font.0)
            .ok_or_else(|| FolioError::state(format!("unknown font handle {}", font.0)))
    }

    /// Encode `text` as a string operand for `font`, recording the
    /// characters so the font can be subsetted.
    pub fn encode_text(&mut self, font: FontId, text: &str) -> Result<Vec<u8>> {
        self.ensure_open("encode text")?;
        let entry = self
            .fonts
            .get_mut(font.0)
            .ok_or_else(|| FolioError::state(format!("unknown font handle {}", font.0)))?;
        entry.kind.encode_text(text, &mut entry.used)
    }

    /// Show `text` at `(x, y)` on the current page.
    pub fn show_text(&mut self, font: FontId, size: f64, x: f64, y: f64, text: &str) -> Result<()> {
        self.current_page("show text")?;
        let resource = self.font_resource(font)?;
        let encoded = self.encode_text(font, text)?;
        let mut op: Vec<u8> = Vec::with_capacity(encoded.len() + 48);
        let _ = write!(
            op,
            "BT {} {} Tf {} {} Td ",
            resource,
            num(size),
            num(x),
            num(y)
        );
        op.extend_from_slice(&encoded);
        op.extend_from_slice(b" Tj ET");
        self.write(op)
    }

    /// Register an image under `key`. Registering the same key again
    /// returns the existing handle.
    pub fn register_image(&mut self, key: &str, image: Image) -> Result<ImageId> {
        self.ensure_open("add an image")?;
        if let Some(&id) = self.image_keys.get(key) {
            return Ok(id);
        }
        if image.has_soft_mask() && version_less_than(&self.pdf_version, "1.4") {
            self.pdf_version = "1.4".to_string();
        }
        let id = ImageId(self.images.len());
        self.images.push(ImageEntry {
            key: key.to_string(),
            image,
        });
        self.image_keys.insert(key.to_string(), id);
        Ok(id)
    }

    pub fn image_by_key(&self, key: &str) -> Option<ImageId> {
        self.image_keys.get(key).copied()
    }

    /// Resource name of an image, e.g. `/I1`.
    pub fn image_resource(&self, image: ImageId) -> Result<String> {
        if image.0 >= self.images.len() {
            return Err(FolioError::state(format!("unknown image handle {}", image.0)));
        }
        Ok(format!("/I{}", image.0 + 1))
    }

    /// Paint an image into the rectangle at `(x, y)` (lower-left corner).
    pub fn draw_image(&mut self, image: ImageId, x: f64, y: f64, width: f64, height: f64) -> Result<()> {
        self.current_page("draw an image")?;
        let resource = self.image_resource(image)?;
        self.write(format!(
            "q {} 0 0 {} {} {} cm {} Do Q",
            num(width),
            num(height),
            num(x),
            num(y),
            resource
        ))
    }

    /// Add a link annotation to the current page. `rect` is
    /// `[x, y, width, height]`.
    pub fn add_link(&mut self, rect: [f64; 4], target: LinkTarget) -> Result<()> {
        let page = self.current_page("add a link")?;
        page.links.push(Link { rect, target });
        Ok(())
    }

    /// Add an outline entry pointing at `y` on the current page. Levels
    /// start at 0 and may only go one deeper than the previous entry.
    pub fn add_bookmark(&mut self, title: &str, level: usize, y: f64) -> Result<()> {
        self.current_page("add a bookmark")?;
        let max_level = self.bookmarks.last().map(|b| b.level + 1).unwrap_or(0);
        if level > max_level {
            return Err(FolioError::state(format!(
                "bookmark '{}' at level {} skips a level (at most {} allowed here)",
                title, level, max_level
            )));
        }
        self.bookmarks.push(Bookmark {
            title: title.to_string(),
            level,
            page: self.pages.len() - 1,
            y,
        });
        Ok(())
    }

    /// Serialize the document. Adds an empty page if there is none.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == DocState::Closed {
            return Ok(());
        }
        if self.pages.is_empty() {
            self.add_page(None, 0)?;
        }
        let mut w = PdfWriter::new(self.options.compress);
        let output = match self.serialize(&mut w) {
            Ok((catalog_id, info_id)) => w.finish(catalog_id, Some(info_id))?,
            Err(e) => {
                self.partial = Some(w.bytes().to_vec());
                return Err(e);
            }
        };
        self.partial = None;
        self.output = Some(output);
        self.state = DocState::Closed;
        Ok(())
    }

    /// The finished file, once [`close`](Self::close) has succeeded.
    pub fn output(&self) -> Option<&[u8]> {
        self.output.as_deref()
    }

    /// What had been written when the last [`close`](Self::close) failed.
    /// Not a valid PDF; kept for debugging.
    pub fn partial_output(&self) -> Option<&[u8]> {
        self.partial.as_deref()
    }

    /// Close the document and return the PDF bytes.
    pub fn finalize(mut self) -> Result<Vec<u8>> {
        self.close()?;
        self.output
            .take()
            .ok_or_else(|| FolioError::state("document closed without output"))
    }

    /// Write every object, returning the catalog and info ids.
    fn serialize(&mut self, w: &mut PdfWriter) -> Result<(u32, u32)> {
        w.header(&self.pdf_version)?;

        // Page objects are numbered ahead of time so links can point at
        // pages that haven't been written yet.
        let mut page_ids = Vec::with_capacity(self.pages.len());
        let mut next = w.next_id();
        for page in &self.pages {
            page_ids.push(next);
            next += 2 + page.links.len() as u32;
        }

        let (default_w, default_h) = self.options.default_page_size.dimensions();
        let nb_pages = self.pages.len().to_string();
        for (page, &page_id) in self.pages.iter().zip(&page_ids) {
            let mut dict = format!("<< /Type /Page /Parent {} 0 R", PAGES_ROOT_ID);
            if page.width != default_w || page.height != default_h {
                let _ = write!(dict, " /MediaBox [0 0 {} {}]", num(page.width), num(page.height));
            }
            if page.rotation != 0 {
                let _ = write!(dict, " /Rotate {}", page.rotation);
            }
            let _ = write!(dict, " /Resources {} 0 R /Contents {} 0 R", RESOURCES_ID, page_id + 1);
            if !page.links.is_empty() {
                dict.push_str(" /Annots [");
                for i in 0..page.links.len() {
                    let _ = write!(dict, "{}{} 0 R", if i > 0 { " " } else { "" }, page_id + 2 + i as u32);
                }
                dict.push(']');
            }
            dict.push_str(" >>");
            w.write_object(page_id, dict)?;

            let content = match &self.alias_nb_pages {
                Some(alias) => replace_alias(&page.content, alias, &nb_pages),
                None => page.content.clone(),
            };
            w.put_stream_object("", &content)?;

            for link in &page.links {
                w.put_object(link_annotation(link, &page_ids)?)?;
            }
        }

        let mut kids = String::new();
        for (i, id) in page_ids.iter().enumerate() {
            let _ = write!(kids, "{}{} 0 R", if i > 0 { " " } else { "" }, id);
        }
        w.write_object(
            PAGES_ROOT_ID,
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 {} {}] >>",
                kids,
                page_ids.len(),
                num(default_w),
                num(default_h)
            ),
        )?;

        let font_ids = fonts::put_fonts(w, &mut self.fonts)?;
        let mut image_ids = Vec::with_capacity(self.images.len());
        for entry in &self.images {
            let id = images::put_image(w, &entry.image)?;
            log::debug!("image '{}' -> object {}", entry.key, id);
            image_ids.push(id);
        }
        w.write_object(RESOURCES_ID, resource_dict(&font_ids, &image_ids))?;

        let outlines_id = self.put_outlines(w, &page_ids)?;
        let info_id = w.put_object(self.info_dict())?;
        let catalog_id = w.put_object(self.catalog_dict(&page_ids, outlines_id))?;
        Ok((catalog_id, info_id))
    }

    /// Write the bookmark tree, returning the `/Outlines` root id.
    fn put_outlines(&self, w: &mut PdfWriter, page_ids: &[u32]) -> Result<Option<u32>> {
        if self.bookmarks.is_empty() {
            return Ok(None);
        }
        let levels: Vec<usize> = self.bookmarks.iter().map(|b| b.level).collect();
        let nodes = outline_tree(&levels);
        let first_id = w.next_id();
        let root_id = first_id + nodes.len() as u32;
        let id_of = |i: usize| first_id + i as u32;

        for (bookmark, node) in self.bookmarks.iter().zip(&nodes) {
            let page_id = page_ids.get(bookmark.page).ok_or_else(|| {
                FolioError::format(format!("bookmark '{}' points at a missing page", bookmark.title))
            })?;
            let mut dict: Vec<u8> = Vec::new();
            dict.extend_from_slice(b"<< /Title ");
            dict.extend_from_slice(&text_string(&bookmark.title));
            let _ = write!(dict, " /Parent {} 0 R", node.parent.map(id_of).unwrap_or(root_id));
            for (key, link) in [("Prev", node.prev), ("Next", node.next), ("First", node.first), ("Last", node.last)] {
                if let Some(i) = link {
                    let _ = write!(dict, " /{} {} 0 R", key, id_of(i));
                }
            }
            let _ = write!(dict, " /Dest [{} 0 R /XYZ 0 {} null] /Count 0 >>", page_id, num(bookmark.y));
            w.put_object(dict)?;
        }

        let last_top = levels.iter().rposition(|&l| l == 0).unwrap_or(0);
        w.write_object(
            root_id,
            format!("<< /Type /Outlines /First {} 0 R /Last {} 0 R >>", id_of(0), id_of(last_top)),
        )?;
        Ok(Some(root_id))
    }

    fn info_dict(&self) -> Vec<u8> {
        let meta = &self.metadata;
        let producer = meta
            .producer
            .clone()
            .unwrap_or_else(|| format!("folio {}", env!("CARGO_PKG_VERSION")));
        let mut dict: Vec<u8> = b"<< /Producer ".to_vec();
        dict.extend_from_slice(&text_string(&producer));
        let fields = [
            ("Title", &meta.title),
            ("Subject", &meta.subject),
            ("Author", &meta.author),
            ("Keywords", &meta.keywords),
            ("Creator", &meta.creator),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                let _ = write!(dict, " /{} ", key);
                dict.extend_from_slice(&text_string(value));
            }
        }
        if let Some(date) = meta.pdf_date() {
            dict.extend_from_slice(b" /CreationDate ");
            dict.extend_from_slice(&text_string(&date));
        }
        dict.extend_from_slice(b" >>");
        dict
    }

    fn catalog_dict(&self, page_ids: &[u32], outlines_id: Option<u32>) -> String {
        let mut dict = format!("<< /Type /Catalog /Pages {} 0 R", PAGES_ROOT_ID);
        let first_page = page_ids.first().copied().unwrap_or(0);
        let mode = self.options.display_mode;
        match mode.zoom {
            Zoom::FullPage => {
                let _ = write!(dict, " /OpenAction [{} 0 R /Fit]", first_page);
            }
            Zoom::FullWidth => {
                let _ = write!(dict, " /OpenAction [{} 0 R /FitH null]", first_page);
            }
            Zoom::Real => {
                let _ = write!(dict, " /OpenAction [{} 0 R /XYZ null null 1]", first_page);
            }
            Zoom::Percent(pct) => {
                let _ = write!(
                    dict,
                    " /OpenAction [{} 0 R /XYZ null null {}]",
                    first_page,
                    num(pct / 100.0)
                );
            }
            Zoom::Default => {}
        }
        match mode.layout {
            Layout::Single => dict.push_str(" /PageLayout /SinglePage"),
            Layout::Continuous => dict.push_str(" /PageLayout /OneColumn"),
            Layout::Two => dict.push_str(" /PageLayout /TwoColumnLeft"),
            Layout::Default => {}
        }
        if let Some(id) = outlines_id {
            let _ = write!(dict, " /Outlines {} 0 R /PageMode /UseOutlines", id);
        }
        dict.push_str(" >>");
        dict
    }
}

fn link_annotation(link: &Link, page_ids: &[u32]) -> Result<Vec<u8>> {
    let [x, y, w, h] = link.rect;
    let mut dict: Vec<u8> = Vec::new();
    let _ = write!(
        dict,
        "<< /Type /Annot /Subtype /Link /Rect [{} {} {} {}] /Border [0 0 0] ",
        num(x),
        num(y),
        num(x + w),
        num(y + h)
    );
    match &link.target {
        LinkTarget::Uri { uri } => {
            dict.extend_from_slice(b"/A << /S /URI /URI ");
            dict.extend_from_slice(&text_string(uri));
            dict.extend_from_slice(b" >>");
        }
        LinkTarget::Page { page, y } => {
            let page_id = page_ids.get(*page).ok_or_else(|| {
                FolioError::format(format!(
                    "link targets page {} but the document has {} pages",
                    page,
                    page_ids.len()
                ))
            })?;
            let _ = write!(dict, "/Dest [{} 0 R /XYZ 0 {} null]", page_id, num(*y));
        }
    }
    dict.extend_from_slice(b" >>");
    Ok(dict)
}

fn resource_dict(font_ids: &[u32], image_ids: &[u32]) -> String {
    let mut dict = String::from("<< /ProcSet [/PDF /Text /ImageB /ImageC /ImageI]");
    if !font_ids.is_empty() {
        dict.push_str(" /Font <<");
        for (i, id) in font_ids.iter().enumerate() {
            let _ = write!(dict, " /F{} {} 0 R", i + 1, id);
        }
        dict.push_str(" >>");
    }
    if !image_ids.is_empty() {
        dict.push_str(" /XObject <<");
        for (i, id) in image_ids.iter().enumerate() {
            let _ = write!(dict, " /I{} {} 0 R", i + 1, id);
        }
        dict.push_str(" >>");
    }
    dict.push_str(" >>");
    dict
}

/// Parent/sibling/child links for a flat list of outline levels. Levels
/// must start at 0 and never grow by more than one.
fn outline_tree(levels: &[usize]) -> Vec<OutlineNode> {
    let mut nodes = vec![OutlineNode::default(); levels.len()];
    // Most recent entry seen at each level.
    let mut recent: Vec<usize> = Vec::new();
    let mut level = 0;
    for (i, &l) in levels.iter().enumerate() {
        if l > 0 {
            if let Some(&parent) = recent.get(l - 1) {
                nodes[i].parent = Some(parent);
                nodes[parent].last = Some(i);
                if l > level {
                    nodes[parent].first = Some(i);
                }
            }
        }
        if l <= level && i > 0 {
            if let Some(&prev) = recent.get(l) {
                nodes[prev].next = Some(i);
                nodes[i].prev = Some(prev);
            }
        }
        recent.truncate(l);
        recent.push(i);
        level = l;
    }
    nodes
}

/// Replace the page-count alias, both as plain bytes and in the UTF-16BE
/// hex form used by Unicode fonts.
fn replace_alias(content: &[u8], alias: &str, count: &str) -> Vec<u8> {
    if alias.is_empty() {
        return content.to_vec();
    }
    let plain = replace_bytes(content, alias.as_bytes(), count.as_bytes());
    let hex = |s: &str| -> String { s.encode_utf16().map(|u| format!("{:04X}", u)).collect() };
    replace_bytes(&plain, hex(alias).as_bytes(), hex(count).as_bytes())
}

fn replace_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}

fn version_less_than(version: &str, other: &str) -> bool {
    let parse = |v: &str| -> (u32, u32) {
        let mut parts = v.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
    };
    parse(version) < parse(other)
}
