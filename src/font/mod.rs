//! # Font Management
//!
//! The fonts a document can reference, as a closed set of kinds:
//!
//! - [`CoreFont`]: the 14 standard PDF fonts. Never embedded.
//! - [`SimpleFont`]: Type1 or TrueType fonts with a single-byte encoding,
//!   caller-supplied widths and an optional embedded font file.
//! - [`UnicodeFont`]: a TrueType file parsed by [`truetype`] and subsetted by
//!   [`subset`] at close time, embedded as a CID-keyed `Type0` font.
//! - [`FontHandler`]: an extension point for any other font type.

pub mod subset;
pub mod truetype;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as FmtWrite;
use std::io::{Read, Seek};
use std::path::Path;

pub use truetype::{FontMetadata, Glyph, GlyphName, TrueTypeFont};

use crate::error::{FolioError, Result};
use crate::pdf::writer::{escape_literal, PdfWriter};

/// Prefix marking an embedded font as a subset (`ABCDEF+Name`).
pub const SUBSET_TAG: &str = "FOLIOA";

/// The 14 standard PDF fonts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
    Symbol,
    ZapfDingbats,
}

impl CoreFont {
    pub const ALL: [CoreFont; 14] = [
        Self::Helvetica,
        Self::HelveticaBold,
        Self::HelveticaOblique,
        Self::HelveticaBoldOblique,
        Self::TimesRoman,
        Self::TimesBold,
        Self::TimesItalic,
        Self::TimesBoldItalic,
        Self::Courier,
        Self::CourierBold,
        Self::CourierOblique,
        Self::CourierBoldOblique,
        Self::Symbol,
        Self::ZapfDingbats,
    ];

    /// The PDF name for this font.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
            Self::HelveticaOblique => "Helvetica-Oblique",
            Self::HelveticaBoldOblique => "Helvetica-BoldOblique",
            Self::TimesRoman => "Times-Roman",
            Self::TimesBold => "Times-Bold",
            Self::TimesItalic => "Times-Italic",
            Self::TimesBoldItalic => "Times-BoldItalic",
            Self::Courier => "Courier",
            Self::CourierBold => "Courier-Bold",
            Self::CourierOblique => "Courier-Oblique",
            Self::CourierBoldOblique => "Courier-BoldOblique",
            Self::Symbol => "Symbol",
            Self::ZapfDingbats => "ZapfDingbats",
        }
    }

    /// Look up a core font by its PDF name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.pdf_name().eq_ignore_ascii_case(name))
    }

    /// Symbol and ZapfDingbats use their built-in encodings.
    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbol | Self::ZapfDingbats)
    }
}

/// A font program embedded as `/FontFile` (Type1) or `/FontFile2` (TrueType).
#[derive(Debug, Clone)]
pub struct EmbeddedFile {
    pub data: Vec<u8>,
    /// Uncompressed length (Type1: length of the clear-text portion).
    pub length1: usize,
    /// Type1 only: length of the encrypted portion.
    pub length2: Option<usize>,
    /// `data` is already zlib-compressed.
    pub compressed: bool,
}

/// Font descriptor values in PDF glyph space (1000 units per em).
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub ascent: i32,
    pub descent: i32,
    pub cap_height: i32,
    pub flags: u32,
    pub font_bbox: [i32; 4],
    pub italic_angle: f64,
    pub stem_v: u32,
    pub missing_width: u32,
}

impl Descriptor {
    /// Build a descriptor from parsed TrueType metrics.
    pub fn from_metadata(meta: &FontMetadata) -> Self {
        Descriptor {
            ascent: meta.scale(meta.ascent as i32),
            descent: meta.scale(meta.descent as i32),
            cap_height: meta.scale(meta.cap_height as i32),
            flags: meta.flags,
            font_bbox: [
                meta.scale(meta.bbox[0] as i32),
                meta.scale(meta.bbox[1] as i32),
                meta.scale(meta.bbox[2] as i32),
                meta.scale(meta.bbox[3] as i32),
            ],
            italic_angle: meta.italic_angle,
            stem_v: meta.stem_v,
            missing_width: meta.scale(meta.missing_width as i32).max(0) as u32,
        }
    }
}

/// A Type1 or TrueType font with a single-byte encoding.
#[derive(Debug, Clone)]
pub struct SimpleFont {
    pub base_name: String,
    /// Code of `widths[0]`.
    pub first_char: u8,
    pub widths: Vec<u32>,
    pub descriptor: Descriptor,
    pub file: Option<EmbeddedFile>,
    /// Body of an `/Encoding /Differences` array, e.g. `"128 /Euro 130 /quotesinglbase"`.
    pub differences: Option<String>,
    /// Byte code → Unicode, used both to encode text and to emit `/ToUnicode`.
    pub to_unicode: Option<BTreeMap<u8, u32>>,
    /// The embedded file only contains the glyphs this document uses.
    pub subsetted: bool,
}

impl SimpleFont {
    pub fn last_char(&self) -> u8 {
        let last = self.first_char as usize + self.widths.len().saturating_sub(1);
        last.min(255) as u8
    }

    /// Map text to byte codes through `to_unicode`, or WinAnsi without one.
    fn encode_bytes(&self, text: &str) -> Vec<u8> {
        match &self.to_unicode {
            Some(map) => {
                let reverse: BTreeMap<u32, u8> = map.iter().map(|(&b, &u)| (u, b)).collect();
                text.chars()
                    .map(|ch| reverse.get(&(ch as u32)).copied().unwrap_or(b'?'))
                    .collect()
            }
            None => text
                .chars()
                .map(|ch| unicode_to_winansi(ch).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// Any seekable byte source a TrueType font can be read from.
pub trait FontSource: Read + Seek {}

impl<T: Read + Seek> FontSource for T {}

/// A TrueType font embedded as `Type0`/`CIDFontType2`, subsetted to the
/// characters the document actually shows.
pub struct UnicodeFont {
    font: TrueTypeFont<Box<dyn FontSource>>,
    metadata: FontMetadata,
}

impl UnicodeFont {
    /// Open and fully parse a `.ttf` file. The file stays open until the
    /// document is finalized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_source(Box::new(std::io::BufReader::new(file)))
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_source(Box::new(std::io::Cursor::new(data)))
    }

    fn from_source(source: Box<dyn FontSource>) -> Result<Self> {
        let mut font = TrueTypeFont::new(source);
        let metadata = font.parse()?;
        if !metadata.embeddable {
            return Err(FolioError::format(format!(
                "font '{}' cannot be embedded: its license forbids it",
                metadata.postscript_name
            )));
        }
        Ok(Self { font, metadata })
    }

    pub fn metadata(&self) -> &FontMetadata {
        &self.metadata
    }

    /// Advance width of a character in PDF glyph space, if the font maps it.
    pub fn char_width(&self, code_point: u32) -> Option<u32> {
        self.font
            .char_advance(code_point)
            .map(|w| self.metadata.scale(w as i32).max(0) as u32)
    }

    pub fn has_char(&self, code_point: u32) -> bool {
        self.font.glyph_for_char(code_point).is_some()
    }

    pub(crate) fn font_mut(&mut self) -> &mut TrueTypeFont<Box<dyn FontSource>> {
        &mut self.font
    }

    pub(crate) fn font(&self) -> &TrueTypeFont<Box<dyn FontSource>> {
        &self.font
    }
}

impl std::fmt::Debug for UnicodeFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnicodeFont")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Extension point for font types folio doesn't know about.
pub trait FontHandler {
    /// Short name used in logs and error messages.
    fn type_name(&self) -> &str;

    /// Write the font's objects and return the id of its font dictionary.
    fn emit(&self, writer: &mut PdfWriter, used: &BTreeSet<u32>) -> Result<u32>;

    /// Encode text as a PDF string operand. Defaults to a WinAnsi literal.
    fn encode_text(&self, text: &str) -> Result<Vec<u8>> {
        let bytes: Vec<u8> = text
            .chars()
            .map(|ch| unicode_to_winansi(ch).unwrap_or(b'?'))
            .collect();
        Ok(literal(&bytes))
    }
}

/// The fonts a document can use.
pub enum FontKind {
    Core(CoreFont),
    Type1(SimpleFont),
    TrueType(SimpleFont),
    Unicode(Box<UnicodeFont>),
    Custom(Box<dyn FontHandler>),
}

impl FontKind {
    pub fn type_name(&self) -> &str {
        match self {
            FontKind::Core(_) => "Core",
            FontKind::Type1(_) => "Type1",
            FontKind::TrueType(_) => "TrueType",
            FontKind::Unicode(_) => "Type0",
            FontKind::Custom(handler) => handler.type_name(),
        }
    }

    /// Encode `text` as a string operand for `Tj`, recording which
    /// characters were used.
    pub fn encode_text(&self, text: &str, used: &mut BTreeSet<u32>) -> Result<Vec<u8>> {
        match self {
            FontKind::Core(_) => {
                used.extend(text.chars().map(|c| c as u32));
                let bytes: Vec<u8> = text
                    .chars()
                    .map(|ch| unicode_to_winansi(ch).unwrap_or(b'?'))
                    .collect();
                Ok(literal(&bytes))
            }
            FontKind::Type1(font) | FontKind::TrueType(font) => {
                used.extend(text.chars().map(|c| c as u32));
                Ok(literal(&font.encode_bytes(text)))
            }
            FontKind::Unicode(font) => {
                let mut hex = String::with_capacity(text.len() * 4 + 2);
                hex.push('<');
                for ch in text.chars() {
                    let cp = ch as u32;
                    if cp > 0xFFFF {
                        log::warn!(
                            "U+{:X} is outside the BMP; '{}' will show .notdef",
                            cp,
                            font.metadata().postscript_name
                        );
                        hex.push_str("0000");
                        continue;
                    }
                    used.insert(cp);
                    let _ = write!(hex, "{:04X}", cp);
                }
                hex.push('>');
                Ok(hex.into_bytes())
            }
            FontKind::Custom(handler) => {
                used.extend(text.chars().map(|c| c as u32));
                handler.encode_text(text)
            }
        }
    }
}

impl std::fmt::Debug for FontKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FontKind::Core(core) => f.debug_tuple("Core").field(core).finish(),
            FontKind::Type1(font) => f.debug_tuple("Type1").field(&font.base_name).finish(),
            FontKind::TrueType(font) => f.debug_tuple("TrueType").field(&font.base_name).finish(),
            FontKind::Unicode(font) => f
                .debug_tuple("Unicode")
                .field(&font.metadata().postscript_name)
                .finish(),
            FontKind::Custom(handler) => f.debug_tuple("Custom").field(&handler.type_name()).finish(),
        }
    }
}

fn literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(b'(');
    out.extend_from_slice(&escape_literal(bytes));
    out.push(b')');
    out
}

/// Map a Unicode codepoint to a WinAnsiEncoding byte value.
///
/// WinAnsiEncoding is based on Windows-1252. Most codepoints in
/// 0x20..=0x7E and 0xA0..=0xFF map directly. The 0x80..=0x9F range
/// contains special mappings for smart quotes, bullets, dashes, etc.
pub fn unicode_to_winansi(ch: char) -> Option<u8> {
    let cp = ch as u32;
    if (0x20..=0x7E).contains(&cp) || (0xA0..=0xFF).contains(&cp) {
        return Some(cp as u8);
    }
    match cp {
        0x20AC => Some(0x80), // Euro sign
        0x201A => Some(0x82),
        0x0192 => Some(0x83),
        0x201E => Some(0x84),
        0x2026 => Some(0x85), // Horizontal ellipsis
        0x2020 => Some(0x86),
        0x2021 => Some(0x87),
        0x02C6 => Some(0x88),
        0x2030 => Some(0x89),
        0x0160 => Some(0x8A),
        0x2039 => Some(0x8B),
        0x0152 => Some(0x8C),
        0x017D => Some(0x8E),
        0x2018 => Some(0x91), // Smart quotes
        0x2019 => Some(0x92),
        0x201C => Some(0x93),
        0x201D => Some(0x94),
        0x2022 => Some(0x95), // Bullet
        0x2013 => Some(0x96), // En dash
        0x2014 => Some(0x97), // Em dash
        0x02DC => Some(0x98),
        0x2122 => Some(0x99), // Trade mark sign
        0x0161 => Some(0x9A),
        0x203A => Some(0x9B),
        0x0153 => Some(0x9C),
        0x017E => Some(0x9E),
        0x0178 => Some(0x9F),
        _ => None,
    }
}
