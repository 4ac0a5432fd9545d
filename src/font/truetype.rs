//! # TrueType Parser
//!
//! Reads the parts of a TrueType (`glyf`-flavoured sfnt) font needed to embed
//! it in a PDF and to subset it: the table directory, metrics, the glyph
//! offset table, composite glyph structure, the Unicode BMP cmap, the
//! PostScript name and the descriptor metrics from `OS/2` and `post`.
//!
//! Tables are read lazily. [`TrueTypeFont::parse_directory`] only records
//! where each table lives; a table's bytes are pulled from the source the
//! first time a parse step (or the subset builder) asks for them.
//!
//! The parse steps must run in dependency order: `head`, `hhea` and `maxp`
//! before `hmtx`/`loca`, and `loca` before `glyf`. [`TrueTypeFont::parse`]
//! runs all of them in that order.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use crate::binary::{Reader, Tag};
use crate::error::{FolioError, Result};

pub const TRUETYPE_VERSION: u32 = 0x0001_0000;
const HEAD_MAGIC: u32 = 0x5F0F_3CF5;

pub const CMAP: Tag = Tag::new(b"cmap");
pub const CVT: Tag = Tag::new(b"cvt ");
pub const FPGM: Tag = Tag::new(b"fpgm");
pub const GASP: Tag = Tag::new(b"gasp");
pub const GLYF: Tag = Tag::new(b"glyf");
pub const HEAD: Tag = Tag::new(b"head");
pub const HHEA: Tag = Tag::new(b"hhea");
pub const HMTX: Tag = Tag::new(b"hmtx");
pub const LOCA: Tag = Tag::new(b"loca");
pub const MAXP: Tag = Tag::new(b"maxp");
pub const NAME: Tag = Tag::new(b"name");
pub const OS2: Tag = Tag::new(b"OS/2");
pub const POST: Tag = Tag::new(b"post");
pub const PREP: Tag = Tag::new(b"prep");

// Composite glyph component flags.
const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
const WE_HAVE_A_SCALE: u16 = 0x0008;
const MORE_COMPONENTS: u16 = 0x0020;
const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

/// Location of a table inside the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRecord {
    pub offset: u32,
    pub length: u32,
    pub checksum: u32,
}

/// A directory entry before and after its bytes have been read.
#[derive(Debug, Clone)]
enum TableState {
    Unloaded(TableRecord),
    Loaded { record: TableRecord, data: Vec<u8> },
}

impl TableState {
    fn record(&self) -> TableRecord {
        match self {
            TableState::Unloaded(record) => *record,
            TableState::Loaded { record, .. } => *record,
        }
    }
}

/// Tag → table map backed by a seekable source.
pub struct TableDirectory<R> {
    source: R,
    tables: BTreeMap<Tag, TableState>,
}

impl<R: Read + Seek> TableDirectory<R> {
    fn new(source: R) -> Self {
        Self {
            source,
            tables: BTreeMap::new(),
        }
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.tables.contains_key(&tag)
    }

    pub fn record(&self, tag: Tag) -> Option<TableRecord> {
        self.tables.get(&tag).map(TableState::record)
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.tables.keys().copied()
    }

    /// Whether the table's bytes have been read yet.
    pub fn is_loaded(&self, tag: Tag) -> bool {
        matches!(self.tables.get(&tag), Some(TableState::Loaded { .. }))
    }

    /// Bytes of a required table, reading them on first use.
    pub fn load(&mut self, tag: Tag) -> Result<&[u8]> {
        self.load_optional(tag)?
            .ok_or_else(|| FolioError::format(format!("missing required '{}' table", tag)))
    }

    /// Bytes of a table, or `None` if the font doesn't have it.
    pub fn load_optional(&mut self, tag: Tag) -> Result<Option<&[u8]>> {
        let Some(state) = self.tables.get_mut(&tag) else {
            return Ok(None);
        };
        if let TableState::Unloaded(record) = *state {
            let data = read_at(&mut self.source, record.offset, record.length, tag)?;
            log::debug!("loaded '{}' ({} bytes)", tag, data.len());
            *state = TableState::Loaded { record, data };
        }
        match state {
            TableState::Loaded { data, .. } => Ok(Some(data.as_slice())),
            TableState::Unloaded(_) => Err(FolioError::state(format!("table '{}' was not loaded", tag))),
        }
    }
}

fn read_at<R: Read + Seek>(source: &mut R, offset: u32, length: u32, tag: Tag) -> Result<Vec<u8>> {
    source.seek(SeekFrom::Start(offset as u64))?;
    let mut data = vec![0u8; length as usize];
    source.read_exact(&mut data).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            FolioError::format(format!(
                "table '{}' ({} bytes at {}) extends past end of file",
                tag, length, offset
            ))
        } else {
            FolioError::Io(e)
        }
    })?;
    Ok(data)
}

/// A PostScript glyph name from `post` format 2.0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlyphName {
    /// Index into the 258 standard Macintosh glyph names.
    Standard(u16),
    Custom(String),
}

/// A composite glyph's reference to another glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentRef {
    /// Byte offset of the glyph-index field within this glyph's data.
    pub byte_offset: usize,
    /// Referenced glyph in the source font.
    pub glyph: u16,
}

#[derive(Debug, Clone, Default)]
pub struct Glyph {
    /// Offset into the `glyf` table.
    pub offset: u32,
    /// Byte length within `glyf`; 0 for empty glyphs such as space.
    pub length: u32,
    /// Non-empty only for composite glyphs.
    pub components: Vec<ComponentRef>,
    pub advance_width: u16,
    pub lsb: i16,
    pub name: Option<GlyphName>,
    /// Subset id, assigned when the glyph is selected for output.
    pub ssid: Option<u16>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HeadInfo {
    pub units_per_em: u16,
    pub bbox: [i16; 4],
    pub mac_style: u16,
    pub index_to_loc_format: i16,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HheaInfo {
    pub ascender: i16,
    pub descender: i16,
    pub number_of_h_metrics: u16,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Os2Info {
    pub weight_class: u16,
    pub fs_type: u16,
    pub fs_selection: u16,
    pub typo_ascender: Option<i16>,
    pub typo_descender: Option<i16>,
    pub cap_height: Option<i16>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PostInfo {
    pub version: u32,
    pub italic_angle: f64,
    pub underline_position: i16,
    pub underline_thickness: i16,
    pub is_fixed_pitch: bool,
}

/// Everything a PDF font descriptor needs, in font units unless noted.
#[derive(Debug, Clone, PartialEq)]
pub struct FontMetadata {
    pub postscript_name: String,
    pub units_per_em: u16,
    /// `[xMin, yMin, xMax, yMax]`
    pub bbox: [i16; 4],
    pub ascent: i16,
    pub descent: i16,
    pub cap_height: i16,
    /// Degrees counter-clockwise from vertical.
    pub italic_angle: f64,
    pub underline_position: i16,
    pub underline_thickness: i16,
    pub fixed_pitch: bool,
    pub bold: bool,
    pub weight_class: u16,
    pub stem_v: u32,
    /// PDF font descriptor `/Flags`.
    pub flags: u32,
    /// False when the `OS/2` licensing bits forbid embedding.
    pub embeddable: bool,
    /// Advance width of `.notdef`.
    pub missing_width: u16,
    pub num_glyphs: u16,
}

impl FontMetadata {
    /// Scale a font-unit value to PDF glyph space (1000 units per em).
    pub fn scale(&self, value: i32) -> i32 {
        (value as f64 * 1000.0 / self.units_per_em as f64).round() as i32
    }
}

/// A TrueType font being parsed and, optionally, subsetted.
pub struct TrueTypeFont<R> {
    pub(crate) directory: TableDirectory<R>,
    pub(crate) directory_parsed: bool,
    pub(crate) head: Option<HeadInfo>,
    pub(crate) hhea: Option<HheaInfo>,
    pub(crate) num_glyphs: Option<u16>,
    pub(crate) glyphs: Vec<Glyph>,
    pub(crate) loca_parsed: bool,
    pub(crate) glyf_parsed: bool,
    pub(crate) char_map: BTreeMap<u32, u16>,
    pub(crate) postscript_name: Option<String>,
    pub(crate) os2: Option<Os2Info>,
    pub(crate) post: Option<PostInfo>,
    /// Source glyph ids in output order; position == ssid.
    pub(crate) subsetted_glyphs: Vec<u16>,
    pub(crate) subsetted_chars: BTreeSet<u32>,
}

impl TrueTypeFont<BufReader<File>> {
    /// Open a font file for lazy reading. The handle stays open for the
    /// lifetime of the parser.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl TrueTypeFont<Cursor<Vec<u8>>> {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::new(Cursor::new(data))
    }
}

impl<R: Read + Seek> TrueTypeFont<R> {
    pub fn new(source: R) -> Self {
        Self {
            directory: TableDirectory::new(source),
            directory_parsed: false,
            head: None,
            hhea: None,
            num_glyphs: None,
            glyphs: Vec::new(),
            loca_parsed: false,
            glyf_parsed: false,
            char_map: BTreeMap::new(),
            postscript_name: None,
            os2: None,
            post: None,
            subsetted_glyphs: Vec::new(),
            subsetted_chars: BTreeSet::new(),
        }
    }

    /// Run every parse step in dependency order.
    pub fn parse(&mut self) -> Result<FontMetadata> {
        self.parse_directory()?;
        self.parse_head()?;
        self.parse_hhea()?;
        self.parse_maxp()?;
        self.parse_hmtx()?;
        self.parse_loca()?;
        self.parse_glyf()?;
        self.parse_cmap()?;
        self.parse_name()?;
        self.parse_os2()?;
        self.parse_post()?;
        self.metadata()
    }

    /// Read the sfnt header and the table directory.
    pub fn parse_directory(&mut self) -> Result<()> {
        let header = read_at(&mut self.directory.source, 0, 12, Tag::new(b"sfnt"))?;
        let mut r = Reader::new(&header);
        let version = r.read_tag()?;
        if version == Tag::new(b"OTTO") {
            return Err(FolioError::format(
                "CFF-based OpenType fonts (OTTO) are not supported",
            ));
        }
        if version.to_u32() != TRUETYPE_VERSION {
            return Err(FolioError::format(format!(
                "not a TrueType 1.0 font (version tag {:#010x})",
                version.to_u32()
            )));
        }
        let num_tables = r.read_u16()?;

        let entries = read_at(
            &mut self.directory.source,
            12,
            num_tables as u32 * 16,
            Tag::new(b"sfnt"),
        )?;
        let mut r = Reader::new(&entries);
        self.directory.tables.clear();
        for _ in 0..num_tables {
            let tag = r.read_tag()?;
            let checksum = r.read_u32()?;
            let offset = r.read_u32()?;
            let length = r.read_u32()?;
            self.directory.tables.insert(
                tag,
                TableState::Unloaded(TableRecord {
                    offset,
                    length,
                    checksum,
                }),
            );
        }
        self.directory_parsed = true;
        log::debug!("table directory: {} tables", num_tables);
        Ok(())
    }

    fn require_directory(&self) -> Result<()> {
        if self.directory_parsed {
            Ok(())
        } else {
            Err(FolioError::state("parse_directory() must run first"))
        }
    }

    pub fn parse_head(&mut self) -> Result<()> {
        self.require_directory()?;
        let data = self.directory.load(HEAD)?;
        let mut r = Reader::at(data, 12);
        let magic = r.read_u32()?;
        if magic != HEAD_MAGIC {
            return Err(FolioError::format(format!(
                "bad 'head' magic number {:#010x}",
                magic
            )));
        }
        r.seek(18);
        let units_per_em = r.read_u16()?;
        if units_per_em == 0 {
            return Err(FolioError::format("'head' unitsPerEm is zero"));
        }
        r.seek(36);
        let bbox = [r.read_i16()?, r.read_i16()?, r.read_i16()?, r.read_i16()?];
        let mac_style = r.read_u16()?;
        r.seek(50);
        let index_to_loc_format = r.read_i16()?;
        if !matches!(index_to_loc_format, 0 | 1) {
            return Err(FolioError::format(format!(
                "unknown indexToLocFormat {}",
                index_to_loc_format
            )));
        }
        self.head = Some(HeadInfo {
            units_per_em,
            bbox,
            mac_style,
            index_to_loc_format,
        });
        Ok(())
    }

    pub fn parse_hhea(&mut self) -> Result<()> {
        self.require_directory()?;
        let data = self.directory.load(HHEA)?;
        let mut r = Reader::at(data, 4);
        let ascender = r.read_i16()?;
        let descender = r.read_i16()?;
        r.seek(34);
        let number_of_h_metrics = r.read_u16()?;
        self.hhea = Some(HheaInfo {
            ascender,
            descender,
            number_of_h_metrics,
        });
        Ok(())
    }

    pub fn parse_maxp(&mut self) -> Result<()> {
        self.require_directory()?;
        let data = self.directory.load(MAXP)?;
        let num_glyphs = Reader::at(data, 4).read_u16()?;
        if num_glyphs == 0 {
            return Err(FolioError::format("'maxp' declares zero glyphs"));
        }
        self.num_glyphs = Some(num_glyphs);
        self.glyphs = vec![Glyph::default(); num_glyphs as usize];
        Ok(())
    }

    fn require_num_glyphs(&self, step: &str) -> Result<u16> {
        self.num_glyphs
            .ok_or_else(|| FolioError::state(format!("parse_maxp() must run before {}", step)))
    }

    /// Advance width and left side bearing for every glyph.
    pub fn parse_hmtx(&mut self) -> Result<()> {
        let num_glyphs = self.require_num_glyphs("parse_hmtx()")? as usize;
        let hhea = self
            .hhea
            .ok_or_else(|| FolioError::state("parse_hhea() must run before parse_hmtx()"))?;
        let num_metrics = hhea.number_of_h_metrics as usize;
        if num_metrics == 0 {
            return Err(FolioError::format("'hhea' numberOfHMetrics is zero"));
        }

        let data = self.directory.load(HMTX)?;
        let mut r = Reader::new(data);
        let mut advance_width = 0u16;
        for (i, glyph) in self.glyphs.iter_mut().enumerate() {
            if i < num_metrics {
                advance_width = r.read_u16()?;
                glyph.lsb = r.read_i16()?;
            } else {
                // Monospaced tail: width repeats, only lsb is stored.
                glyph.lsb = r.read_i16()?;
            }
            glyph.advance_width = advance_width;
        }
        if num_metrics > num_glyphs {
            log::warn!(
                "numberOfHMetrics ({}) exceeds numGlyphs ({})",
                num_metrics,
                num_glyphs
            );
        }
        Ok(())
    }

    /// Glyph offsets and lengths into `glyf`.
    pub fn parse_loca(&mut self) -> Result<()> {
        let num_glyphs = self.require_num_glyphs("parse_loca()")? as usize;
        let head = self
            .head
            .ok_or_else(|| FolioError::state("parse_head() must run before parse_loca()"))?;

        let data = self.directory.load(LOCA)?;
        let mut r = Reader::new(data);
        let mut offsets = Vec::with_capacity(num_glyphs + 1);
        for _ in 0..=num_glyphs {
            let offset = if head.index_to_loc_format == 0 {
                r.read_u16()? as u32 * 2
            } else {
                r.read_u32()?
            };
            offsets.push(offset);
        }

        for (i, glyph) in self.glyphs.iter_mut().enumerate() {
            let (start, end) = (offsets[i], offsets[i + 1]);
            if end < start {
                return Err(FolioError::format(format!(
                    "'loca' is not monotonic at glyph {} ({} > {})",
                    i, start, end
                )));
            }
            glyph.offset = start;
            glyph.length = end - start;
        }
        self.loca_parsed = true;
        Ok(())
    }

    /// Find composite glyphs and record where each component's glyph index
    /// lives, so the subset builder can patch it without re-parsing.
    pub fn parse_glyf(&mut self) -> Result<()> {
        if !self.loca_parsed {
            return Err(FolioError::state("parse_loca() must run before parse_glyf()"));
        }
        let num_glyphs = self.glyphs.len();
        let data = self.directory.load(GLYF)?;

        let mut composites = 0usize;
        for (gid, glyph) in self.glyphs.iter_mut().enumerate() {
            if glyph.length == 0 {
                continue;
            }
            let start = glyph.offset as usize;
            let end = start + glyph.length as usize;
            if end > data.len() {
                return Err(FolioError::format(format!(
                    "glyph {} ({}..{}) lies outside 'glyf' ({} bytes)",
                    gid,
                    start,
                    end,
                    data.len()
                )));
            }
            let glyph_data = &data[start..end];
            let mut r = Reader::new(glyph_data);
            if r.read_i16()? >= 0 {
                continue;
            }

            composites += 1;
            r.seek(10);
            loop {
                let flags = r.read_u16()?;
                let byte_offset = r.position();
                let component = r.read_u16()?;
                if component as usize >= num_glyphs {
                    return Err(FolioError::format(format!(
                        "composite glyph {} references glyph {} of {}",
                        gid, component, num_glyphs
                    )));
                }
                glyph.components.push(ComponentRef {
                    byte_offset,
                    glyph: component,
                });

                r.skip(if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 });
                if flags & WE_HAVE_A_SCALE != 0 {
                    r.skip(2);
                } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
                    r.skip(4);
                } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
                    r.skip(8);
                }
                if flags & MORE_COMPONENTS == 0 {
                    break;
                }
            }
        }
        self.glyf_parsed = true;
        log::debug!("glyf: {} glyphs, {} composite", num_glyphs, composites);
        Ok(())
    }

    /// Unicode BMP → glyph map from the Windows (3, 1) format 4 subtable.
    pub fn parse_cmap(&mut self) -> Result<()> {
        self.require_directory()?;
        let num_glyphs = self.num_glyphs;
        let data = self.directory.load(CMAP)?;
        let subtable = find_unicode_bmp_subtable(data)?;
        let mut map = decode_cmap_format4(subtable)?;
        if let Some(n) = num_glyphs {
            let before = map.len();
            map.retain(|_, gid| *gid < n);
            if map.len() < before {
                log::warn!(
                    "cmap: dropped {} mappings to glyphs beyond numGlyphs",
                    before - map.len()
                );
            }
        }
        self.char_map = map;
        Ok(())
    }

    /// PostScript name (name id 6), cleaned for use as a PDF name.
    pub fn parse_name(&mut self) -> Result<()> {
        self.require_directory()?;
        let data = self.directory.load(NAME)?;
        let mut r = Reader::new(data);
        let _format = r.read_u16()?;
        let count = r.read_u16()?;
        let string_offset = r.read_u16()? as usize;

        let mut windows: Option<(u16, String)> = None;
        let mut mac: Option<String> = None;
        for _ in 0..count {
            let platform = r.read_u16()?;
            let encoding = r.read_u16()?;
            let language = r.read_u16()?;
            let name_id = r.read_u16()?;
            let length = r.read_u16()? as usize;
            let offset = r.read_u16()? as usize;
            if name_id != 6 {
                continue;
            }
            let raw = Reader::at(data, string_offset + offset).read_bytes(length)?;
            match (platform, encoding) {
                (3, 1) => {
                    let units: Vec<u16> = raw
                        .chunks_exact(2)
                        .map(|c| u16::from_be_bytes([c[0], c[1]]))
                        .collect();
                    let name = String::from_utf16_lossy(&units);
                    let better = match &windows {
                        None => true,
                        Some((lang, _)) => *lang != 0x0409 && language == 0x0409,
                    };
                    if better {
                        windows = Some((language, name));
                    }
                }
                (1, 0) if mac.is_none() => {
                    mac = Some(raw.iter().map(|&b| b as char).collect());
                }
                _ => {}
            }
        }

        let name = windows
            .map(|(_, name)| name)
            .or(mac)
            .map(|name| sanitize_postscript_name(&name))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| FolioError::format("font has no PostScript name (name id 6)"))?;
        self.postscript_name = Some(name);
        Ok(())
    }

    /// Weight, licensing and vertical metrics. The table is optional.
    pub fn parse_os2(&mut self) -> Result<()> {
        self.require_directory()?;
        let Some(data) = self.directory.load_optional(OS2)? else {
            log::debug!("no 'OS/2' table; falling back to hhea/head metrics");
            self.os2 = None;
            return Ok(());
        };
        let mut r = Reader::new(data);
        let version = r.read_u16()?;
        r.seek(4);
        let weight_class = r.read_u16()?;
        r.seek(8);
        let fs_type = r.read_u16()?;
        r.seek(62);
        let fs_selection = r.read_u16()?;

        let (typo_ascender, typo_descender) = if data.len() >= 72 {
            r.seek(68);
            (Some(r.read_i16()?), Some(r.read_i16()?))
        } else {
            (None, None)
        };
        let cap_height = if version >= 2 {
            r.seek(88);
            Some(r.read_i16()?)
        } else {
            None
        };

        self.os2 = Some(Os2Info {
            weight_class,
            fs_type,
            fs_selection,
            typo_ascender,
            typo_descender,
            cap_height,
        });
        Ok(())
    }

    /// Italic angle, underline metrics, pitch, and format 2.0 glyph names.
    pub fn parse_post(&mut self) -> Result<()> {
        self.require_directory()?;
        let num_glyphs = self.num_glyphs;
        let Some(data) = self.directory.load_optional(POST)? else {
            self.post = None;
            return Ok(());
        };
        let mut r = Reader::new(data);
        let version = r.read_u32()?;
        let italic_angle = r.read_fixed()?;
        let underline_position = r.read_i16()?;
        let underline_thickness = r.read_i16()?;
        let is_fixed_pitch = r.read_u32()? != 0;
        self.post = Some(PostInfo {
            version,
            italic_angle,
            underline_position,
            underline_thickness,
            is_fixed_pitch,
        });

        if version != 0x0002_0000 {
            return Ok(());
        }
        let Some(expected) = num_glyphs else {
            return Err(FolioError::state("parse_maxp() must run before parse_post()"));
        };

        r.seek(32);
        let count = r.read_u16()?;
        if count != expected {
            log::warn!("post: {} glyph names for {} glyphs", count, expected);
        }
        let mut indices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            indices.push(r.read_u16()?);
        }
        let mut custom: Vec<String> = Vec::new();
        while r.remaining() > 0 {
            let len = r.read_u8()? as usize;
            let bytes = r.read_bytes(len)?;
            custom.push(bytes.iter().map(|&b| b as char).collect());
        }

        for (glyph, &index) in self.glyphs.iter_mut().zip(&indices) {
            glyph.name = Some(if index < 258 {
                GlyphName::Standard(index)
            } else {
                let name = custom.get(index as usize - 258).ok_or_else(|| {
                    FolioError::format(format!("post: glyph name index {} out of range", index))
                })?;
                GlyphName::Custom(name.clone())
            });
        }
        Ok(())
    }

    /// Descriptor metrics derived from the parsed tables.
    pub fn metadata(&self) -> Result<FontMetadata> {
        let head = self
            .head
            .ok_or_else(|| FolioError::state("parse_head() has not run"))?;
        let hhea = self
            .hhea
            .ok_or_else(|| FolioError::state("parse_hhea() has not run"))?;
        let postscript_name = self
            .postscript_name
            .clone()
            .ok_or_else(|| FolioError::state("parse_name() has not run"))?;
        let post = self.post.unwrap_or_default();

        let (ascent, descent, cap_height, weight_class, bold, embeddable) = match self.os2 {
            Some(os2) => {
                let ascent = os2.typo_ascender.unwrap_or(hhea.ascender);
                (
                    ascent,
                    os2.typo_descender.unwrap_or(hhea.descender),
                    os2.cap_height.unwrap_or(ascent),
                    os2.weight_class,
                    os2.fs_selection & 0x0020 != 0,
                    os2.fs_type != 0x0002 && os2.fs_type & 0x0300 == 0,
                )
            }
            None => (
                hhea.ascender,
                hhea.descender,
                hhea.ascender,
                if head.mac_style & 1 != 0 { 700 } else { 400 },
                head.mac_style & 1 != 0,
                true,
            ),
        };
        let stem_v = if self.os2.is_some() {
            50 + ((weight_class as f64 / 65.0).powi(2)) as u32
        } else {
            70
        };

        let mut flags = 4u32;
        if post.is_fixed_pitch {
            flags |= 1;
        }
        if post.italic_angle != 0.0 {
            flags |= 64;
        }
        if weight_class >= 600 {
            flags |= 262144;
        }

        Ok(FontMetadata {
            postscript_name,
            units_per_em: head.units_per_em,
            bbox: head.bbox,
            ascent,
            descent,
            cap_height,
            italic_angle: post.italic_angle,
            underline_position: post.underline_position,
            underline_thickness: post.underline_thickness,
            fixed_pitch: post.is_fixed_pitch,
            bold,
            weight_class,
            stem_v,
            flags,
            embeddable,
            missing_width: self.glyphs.first().map(|g| g.advance_width).unwrap_or(0),
            num_glyphs: self.num_glyphs.unwrap_or(0),
        })
    }

    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    pub fn char_map(&self) -> &BTreeMap<u32, u16> {
        &self.char_map
    }

    pub fn glyph_for_char(&self, code_point: u32) -> Option<u16> {
        self.char_map.get(&code_point).copied()
    }

    /// Advance width of the glyph a character maps to, in font units.
    pub fn char_advance(&self, code_point: u32) -> Option<u16> {
        let gid = self.glyph_for_char(code_point)?;
        self.glyphs.get(gid as usize).map(|g| g.advance_width)
    }

    pub fn directory(&self) -> &TableDirectory<R> {
        &self.directory
    }
}

/// Locate the platform 3 / encoding 1 subtable inside a `cmap` table.
pub fn find_unicode_bmp_subtable(cmap: &[u8]) -> Result<&[u8]> {
    let mut r = Reader::new(cmap);
    let _version = r.read_u16()?;
    let num_tables = r.read_u16()?;
    let mut found = None;
    for _ in 0..num_tables {
        let platform = r.read_u16()?;
        let encoding = r.read_u16()?;
        let offset = r.read_u32()? as usize;
        if platform == 3 && encoding == 1 {
            found = Some(offset);
            break;
        }
    }
    let offset = found
        .ok_or_else(|| FolioError::format("no Windows Unicode BMP (3, 1) cmap subtable"))?;
    if offset >= cmap.len() {
        return Err(FolioError::format("cmap subtable offset out of range"));
    }
    Ok(&cmap[offset..])
}

/// Decode a format 4 (segment mapping to delta values) subtable.
///
/// Glyph 0 mappings and the `0xFFFF` terminator are skipped.
pub fn decode_cmap_format4(subtable: &[u8]) -> Result<BTreeMap<u32, u16>> {
    let mut r = Reader::new(subtable);
    let format = r.read_u16()?;
    if format != 4 {
        return Err(FolioError::format(format!(
            "unsupported cmap subtable format {} (expected 4)",
            format
        )));
    }
    r.seek(6);
    let seg_count = (r.read_u16()? / 2) as usize;

    let end_base = 14;
    let start_base = end_base + seg_count * 2 + 2;
    let delta_base = start_base + seg_count * 2;
    let range_base = delta_base + seg_count * 2;

    let mut map = BTreeMap::new();
    for i in 0..seg_count {
        let end = Reader::at(subtable, end_base + i * 2).read_u16()?;
        let start = Reader::at(subtable, start_base + i * 2).read_u16()?;
        let delta = Reader::at(subtable, delta_base + i * 2).read_u16()?;
        let range_pos = range_base + i * 2;
        let range_offset = Reader::at(subtable, range_pos).read_u16()? as usize;
        if start > end {
            return Err(FolioError::format(format!(
                "cmap segment {} has start {:#06x} > end {:#06x}",
                i, start, end
            )));
        }

        for code in start..=end {
            if code == 0xFFFF {
                break;
            }
            let gid = if range_offset == 0 {
                code.wrapping_add(delta)
            } else {
                let pos = range_pos + range_offset + (code - start) as usize * 2;
                match Reader::at(subtable, pos).read_u16()? {
                    0 => 0,
                    g => g.wrapping_add(delta),
                }
            };
            if gid != 0 {
                map.insert(code as u32, gid);
            }
        }
    }
    Ok(map)
}

/// Strip NULs and characters that can't appear in a PDF name token.
pub fn sanitize_postscript_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\0' | '[' | ']' | '(' | ')' | '{' | '}' | '<' | '>' | '/' | '%' | ' '))
        .collect()
}
