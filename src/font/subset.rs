//! # TrueType Font Subsetter
//!
//! Strips a parsed TrueType font to only the glyphs a document uses. A
//! typical font is 50-200KB; a subset with ~100 glyphs is usually 5-15KB.
//!
//! ## Approach
//!
//! 1. Always select `.notdef`, then each requested character's glyph, pulling
//!    in composite components transitively. Every glyph gets exactly one
//!    subset id (`ssid`), in first-visit order.
//! 2. Regenerate `cmap`, `hhea`, `hmtx`, `loca`, `glyf`, `maxp` and `post`
//!    for the subset, patching composite component references to the new ids.
//! 3. Copy `name`, `OS/2` and the hinting tables, then write a valid sfnt
//!    with padded tables, per-table checksums and the `head` adjustment.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Seek};

use crate::binary::{checksum, pad4, set_u16, set_u32, SearchRange, Tag, WriteBe};
use crate::error::{FolioError, Result};
use crate::font::truetype::{
    ComponentRef, GlyphName, TrueTypeFont, CMAP, CVT, FPGM, GASP, GLYF, HEAD, HHEA, HMTX, LOCA,
    MAXP, NAME, OS2, POST, PREP, TRUETYPE_VERSION,
};

/// `head.checkSumAdjustment` is this minus the whole-font checksum.
pub const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

/// Tables copied verbatim into the subset when the source has them.
const COPIED_TABLES: [Tag; 6] = [NAME, OS2, CVT, FPGM, PREP, GASP];

impl<R: Read + Seek> TrueTypeFont<R> {
    /// Select the glyphs needed to render `code_points`.
    ///
    /// May be called repeatedly; selections accumulate. Code points the font
    /// doesn't map are ignored.
    pub fn subset<I>(&mut self, code_points: I) -> Result<()>
    where
        I: IntoIterator<Item = u32>,
    {
        if !self.glyf_parsed {
            return Err(FolioError::state("parse_glyf() must run before subset()"));
        }
        self.add_glyph(0)?;

        let requested: BTreeSet<u32> = code_points.into_iter().collect();
        for code_point in requested {
            if let Some(gid) = self.glyph_for_char(code_point) {
                self.subsetted_chars.insert(code_point);
                self.add_glyph(gid)?;
            }
        }
        log::debug!(
            "subset: {} chars -> {} glyphs",
            self.subsetted_chars.len(),
            self.subsetted_glyphs.len()
        );
        Ok(())
    }

    /// Give `gid` a subset id unless it already has one, then do the same
    /// for its components, depth first.
    pub(crate) fn add_glyph(&mut self, gid: u16) -> Result<()> {
        let mut pending = vec![gid];
        while let Some(gid) = pending.pop() {
            let glyph = self.glyphs.get_mut(gid as usize).ok_or_else(|| {
                FolioError::format(format!("glyph {} does not exist in the font", gid))
            })?;
            if glyph.ssid.is_some() {
                continue;
            }
            glyph.ssid = Some(self.subsetted_glyphs.len() as u16);
            self.subsetted_glyphs.push(gid);
            // Reversed so the first component is visited next.
            pending.extend(glyph.components.iter().rev().map(|c| c.glyph));
        }
        Ok(())
    }

    /// Source glyph ids in subset order.
    pub fn subsetted_glyphs(&self) -> &[u16] {
        &self.subsetted_glyphs
    }

    pub fn subsetted_chars(&self) -> &BTreeSet<u32> {
        &self.subsetted_chars
    }

    fn ssid(&self, gid: u16) -> Option<u16> {
        self.glyphs.get(gid as usize).and_then(|g| g.ssid)
    }

    /// Subset glyph id for a selected character.
    pub fn ssid_for_char(&self, code_point: u32) -> Option<u16> {
        if !self.subsetted_chars.contains(&code_point) {
            return None;
        }
        self.glyph_for_char(code_point).and_then(|gid| self.ssid(gid))
    }

    /// Write the subset as a standalone TrueType font.
    pub fn build(&mut self) -> Result<Vec<u8>> {
        if self.subsetted_glyphs.is_empty() {
            return Err(FolioError::state("subset() must run before build()"));
        }
        let mut tables: BTreeMap<Tag, Vec<u8>> = BTreeMap::new();

        tables.insert(CMAP, self.build_cmap()?);
        tables.insert(HHEA, self.build_hhea()?);
        tables.insert(HMTX, self.build_hmtx());
        let (glyf, offsets) = self.build_glyf()?;
        // Glyphs are 4-byte aligned, so short offsets work until /2 overflows.
        let long_loca = glyf.len() > 0x1FFFE;
        tables.insert(LOCA, build_loca(&offsets, long_loca));
        tables.insert(GLYF, glyf);
        tables.insert(MAXP, self.build_maxp()?);
        tables.insert(POST, self.build_post()?);
        tables.insert(HEAD, self.build_head(long_loca)?);

        for tag in COPIED_TABLES {
            if let Some(data) = self.directory.load_optional(tag)? {
                tables.insert(tag, data.to_vec());
            }
        }

        let font = assemble_sfnt(tables)?;
        log::debug!(
            "built subset font: {} glyphs, {} bytes",
            self.subsetted_glyphs.len(),
            font.len()
        );
        Ok(font)
    }

    fn build_cmap(&self) -> Result<Vec<u8>> {
        let mut entries: Vec<(u16, u16)> = Vec::with_capacity(self.subsetted_chars.len());
        for &code_point in &self.subsetted_chars {
            let ssid = self.ssid_for_char(code_point).ok_or_else(|| {
                FolioError::state(format!("character U+{:04X} has no subset glyph", code_point))
            })?;
            let code = u16::try_from(code_point).map_err(|_| {
                FolioError::format(format!("U+{:X} is outside the BMP", code_point))
            })?;
            entries.push((code, ssid));
        }
        build_cmap_format4(&entries)
    }

    fn build_hhea(&mut self) -> Result<Vec<u8>> {
        let mut hhea = self.directory.load(HHEA)?.to_vec();
        // Every subset glyph gets a full metric record.
        set_u16(&mut hhea, 34, self.subsetted_glyphs.len() as u16)?;
        Ok(hhea)
    }

    fn build_hmtx(&self) -> Vec<u8> {
        let mut hmtx = Vec::with_capacity(self.subsetted_glyphs.len() * 4);
        for &gid in &self.subsetted_glyphs {
            let glyph = &self.glyphs[gid as usize];
            hmtx.put_u16(glyph.advance_width);
            hmtx.put_i16(glyph.lsb);
        }
        hmtx
    }

    /// Concatenate subset glyphs, returning the new `glyf` and its offsets
    /// (one more than the glyph count).
    fn build_glyf(&mut self) -> Result<(Vec<u8>, Vec<u32>)> {
        let source = self.directory.load(GLYF)?;
        let mut glyf: Vec<u8> = Vec::new();
        let mut offsets: Vec<u32> = Vec::with_capacity(self.subsetted_glyphs.len() + 1);

        for &gid in &self.subsetted_glyphs {
            offsets.push(glyf.len() as u32);
            let glyph = &self.glyphs[gid as usize];
            if glyph.length == 0 {
                continue;
            }
            let start = glyph.offset as usize;
            let raw = source
                .get(start..start + glyph.length as usize)
                .ok_or_else(|| FolioError::format(format!("glyph {} lies outside 'glyf'", gid)))?;

            if glyph.components.is_empty() {
                glyf.extend_from_slice(raw);
            } else {
                let glyphs = &self.glyphs;
                let patched = patch_components(raw, &glyph.components, |old| {
                    glyphs.get(old as usize).and_then(|g| g.ssid)
                })?;
                glyf.extend_from_slice(&patched);
            }
            pad4(&mut glyf);
        }
        offsets.push(glyf.len() as u32);
        Ok((glyf, offsets))
    }

    fn build_maxp(&mut self) -> Result<Vec<u8>> {
        let mut maxp = self.directory.load(MAXP)?.to_vec();
        set_u16(&mut maxp, 4, self.subsetted_glyphs.len() as u16)?;
        Ok(maxp)
    }

    fn build_head(&mut self, long_loca: bool) -> Result<Vec<u8>> {
        let mut head = self.directory.load(HEAD)?.to_vec();
        set_u32(&mut head, 8, 0)?;
        set_u16(&mut head, 50, long_loca as u16)?;
        Ok(head)
    }

    fn build_post(&mut self) -> Result<Vec<u8>> {
        let is_format2 = self.post.map(|p| p.version == 0x0002_0000).unwrap_or(false);
        let source = self.directory.load_optional(POST)?;
        let Some(header) = source.and_then(|data| data.get(..32)) else {
            let mut stub = vec![0u8; 32];
            set_u32(&mut stub, 0, 0x0003_0000)?;
            return Ok(stub);
        };
        let header = header.to_vec();

        if is_format2 {
            let names = self
                .subsetted_glyphs
                .iter()
                .map(|&gid| self.glyphs[gid as usize].name.as_ref());
            build_post_format2(&header, names)
        } else {
            let mut stub = header;
            set_u32(&mut stub, 0, 0x0003_0000)?;
            Ok(stub)
        }
    }
}

/// Copy `raw` glyph data with every component reference rewritten through
/// `resolve` (source glyph id → subset id).
pub fn patch_components<F>(raw: &[u8], components: &[ComponentRef], resolve: F) -> Result<Vec<u8>>
where
    F: Fn(u16) -> Option<u16>,
{
    let mut patched = raw.to_vec();
    for component in components {
        let new_id = resolve(component.glyph).ok_or_else(|| {
            FolioError::state(format!(
                "component glyph {} was not selected for the subset",
                component.glyph
            ))
        })?;
        set_u16(&mut patched, component.byte_offset, new_id)?;
    }
    Ok(patched)
}

pub fn build_loca(offsets: &[u32], long: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(offsets.len() * if long { 4 } else { 2 });
    for &offset in offsets {
        if long {
            data.put_u32(offset);
        } else {
            data.put_u16((offset / 2) as u16);
        }
    }
    data
}

/// A `cmap` table with a single Windows Unicode BMP format 4 subtable.
///
/// Consecutive codes form one segment. Segments whose glyph ids advance in
/// step with the codes use `idDelta`; the rest index into `glyphIdArray`.
pub fn build_cmap_format4(char_to_gid: &[(u16, u16)]) -> Result<Vec<u8>> {
    let mut sorted = char_to_gid.to_vec();
    sorted.sort_by_key(|&(code, _)| code);
    sorted.dedup_by_key(|&mut (code, _)| code);

    // (start, end, gids)
    let mut segments: Vec<(u16, u16, Vec<u16>)> = Vec::new();
    for &(code, gid) in &sorted {
        if code == 0xFFFF {
            continue;
        }
        if let Some(last) = segments.last_mut() {
            if code == last.1 + 1 {
                last.1 = code;
                last.2.push(gid);
                continue;
            }
        }
        segments.push((code, code, vec![gid]));
    }
    segments.push((0xFFFF, 0xFFFF, vec![0]));

    let seg_count = segments.len();
    let mut end_codes: Vec<u16> = Vec::with_capacity(seg_count);
    let mut start_codes: Vec<u16> = Vec::with_capacity(seg_count);
    let mut id_deltas: Vec<u16> = Vec::with_capacity(seg_count);
    let mut id_range_offsets: Vec<u16> = Vec::with_capacity(seg_count);
    let mut glyph_id_array: Vec<u16> = Vec::new();

    for (i, (start, end, gids)) in segments.iter().enumerate() {
        start_codes.push(*start);
        end_codes.push(*end);

        if *start == 0xFFFF {
            id_deltas.push(1);
            id_range_offsets.push(0);
            continue;
        }
        let delta = gids[0].wrapping_sub(*start);
        let uniform = gids
            .iter()
            .zip(*start..=*end)
            .all(|(&gid, code)| gid.wrapping_sub(code) == delta);
        if uniform {
            id_deltas.push(delta);
            id_range_offsets.push(0);
        } else {
            // Distance in bytes from this idRangeOffset slot to the segment's
            // first glyphIdArray entry.
            let offset = ((seg_count - i) + glyph_id_array.len()) * 2;
            let offset = u16::try_from(offset)
                .map_err(|_| FolioError::format("cmap glyphIdArray too large"))?;
            id_deltas.push(0);
            id_range_offsets.push(offset);
            glyph_id_array.extend_from_slice(gids);
        }
    }

    let subtable_len = 16 + seg_count * 8 + glyph_id_array.len() * 2;
    let subtable_len = u16::try_from(subtable_len)
        .map_err(|_| FolioError::format("cmap format 4 subtable exceeds 64KB"))?;
    let search = SearchRange::compute(seg_count, 2);

    let mut cmap: Vec<u8> = Vec::with_capacity(12 + subtable_len as usize);
    cmap.put_u16(0); // version
    cmap.put_u16(1); // numTables
    cmap.put_u16(3); // platformID: Windows
    cmap.put_u16(1); // encodingID: Unicode BMP
    cmap.put_u32(12);

    cmap.put_u16(4); // format
    cmap.put_u16(subtable_len);
    cmap.put_u16(0); // language
    cmap.put_u16((seg_count * 2) as u16);
    cmap.put_u16(search.search_range);
    cmap.put_u16(search.entry_selector);
    cmap.put_u16(search.range_shift);
    for &code in &end_codes {
        cmap.put_u16(code);
    }
    cmap.put_u16(0); // reservedPad
    for &code in &start_codes {
        cmap.put_u16(code);
    }
    for &delta in &id_deltas {
        cmap.put_u16(delta);
    }
    for &offset in &id_range_offsets {
        cmap.put_u16(offset);
    }
    for &gid in &glyph_id_array {
        cmap.put_u16(gid);
    }
    Ok(cmap)
}

/// `post` format 2.0 for the subset: standard names keep their index,
/// custom names are renumbered from 258 in subset order.
pub fn build_post_format2<'a, I>(header: &[u8], names: I) -> Result<Vec<u8>>
where
    I: ExactSizeIterator<Item = Option<&'a GlyphName>>,
{
    let mut post = header.get(..32).map(<[u8]>::to_vec).ok_or_else(|| {
        FolioError::format("'post' header shorter than 32 bytes")
    })?;
    set_u32(&mut post, 0, 0x0002_0000)?;
    post.put_u16(names.len() as u16);

    let mut strings: Vec<u8> = Vec::new();
    let mut next_custom = 258u32;
    for name in names {
        match name {
            Some(GlyphName::Standard(index)) => post.put_u16(*index),
            Some(GlyphName::Custom(name)) => {
                let index = u16::try_from(next_custom).map_err(|_| {
                    FolioError::format("too many custom glyph names for 'post' format 2")
                })?;
                post.put_u16(index);
                next_custom += 1;
                let bytes: Vec<u8> = name.chars().take(255).map(|c| c as u8).collect();
                strings.push(bytes.len() as u8);
                strings.extend_from_slice(&bytes);
            }
            None => post.put_u16(0),
        }
    }
    post.extend_from_slice(&strings);
    Ok(post)
}

/// Write tables (sorted by tag) into an sfnt container and fix up
/// `head.checkSumAdjustment`.
pub fn assemble_sfnt(tables: BTreeMap<Tag, Vec<u8>>) -> Result<Vec<u8>> {
    let num_tables = tables.len();
    let search = SearchRange::compute(num_tables, 16);

    let mut output: Vec<u8> = Vec::new();
    output.put_u32(TRUETYPE_VERSION);
    output.put_u16(num_tables as u16);
    output.put_u16(search.search_range);
    output.put_u16(search.entry_selector);
    output.put_u16(search.range_shift);

    let mut offset = 12 + num_tables * 16;
    let mut head_offset = None;
    for (tag, data) in &tables {
        if *tag == HEAD {
            head_offset = Some(offset);
        }
        output.extend_from_slice(&tag.to_bytes());
        output.put_u32(checksum(data));
        output.put_u32(offset as u32);
        output.put_u32(data.len() as u32);
        offset += (data.len() + 3) & !3;
    }
    for data in tables.values() {
        output.extend_from_slice(data);
        pad4(&mut output);
    }

    let head_offset =
        head_offset.ok_or_else(|| FolioError::format("cannot build a font without 'head'"))?;
    let adjustment = CHECKSUM_MAGIC.wrapping_sub(checksum(&output));
    set_u32(&mut output, head_offset + 8, adjustment)?;
    Ok(output)
}
