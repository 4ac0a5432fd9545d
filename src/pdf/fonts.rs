//! Font resource emission.
//!
//! Objects are written leaf-first (font file, maps, descriptor, then the
//! font dictionary) so every reference points backwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as FmtWrite;

use crate::error::Result;
use crate::font::{
    CoreFont, Descriptor, EmbeddedFile, FontKind, SimpleFont, UnicodeFont, SUBSET_TAG,
};
use crate::pdf::writer::PdfWriter;

/// Size of the CID → GID map: one big-endian u16 per BMP code point.
const CID_TO_GID_MAP_LEN: usize = 0x10000 * 2;

/// A registered font and the characters shown with it.
pub(crate) struct FontEntry {
    pub key: String,
    pub kind: FontKind,
    pub used: BTreeSet<u32>,
}

/// Write every font and return the font dictionary ids, in entry order.
pub(crate) fn put_fonts(writer: &mut PdfWriter, fonts: &mut [FontEntry]) -> Result<Vec<u32>> {
    // Identical /Differences arrays share one encoding object.
    let mut encodings: BTreeMap<String, u32> = BTreeMap::new();
    for entry in fonts.iter() {
        if let FontKind::Type1(font) | FontKind::TrueType(font) = &entry.kind {
            if let Some(diff) = &font.differences {
                if !encodings.contains_key(diff) {
                    let id = writer.put_object(format!(
                        "<< /Type /Encoding /BaseEncoding /WinAnsiEncoding /Differences [{}] >>",
                        diff
                    ))?;
                    encodings.insert(diff.clone(), id);
                }
            }
        }
    }

    let mut ids = Vec::with_capacity(fonts.len());
    for entry in fonts.iter_mut() {
        let id = match &mut entry.kind {
            FontKind::Core(core) => put_core_font(writer, *core)?,
            FontKind::Type1(font) => put_simple_font(writer, font, "Type1", &encodings, &entry.used)?,
            FontKind::TrueType(font) => {
                put_simple_font(writer, font, "TrueType", &encodings, &entry.used)?
            }
            FontKind::Unicode(font) => put_unicode_font(writer, font, &entry.used)?,
            FontKind::Custom(handler) => handler.emit(writer, &entry.used)?,
        };
        log::debug!("font '{}' ({}) -> object {}", entry.key, entry.kind.type_name(), id);
        ids.push(id);
    }
    Ok(ids)
}

fn put_core_font(writer: &mut PdfWriter, font: CoreFont) -> Result<u32> {
    let mut dict = format!("<< /Type /Font /Subtype /Type1 /BaseFont /{}", font.pdf_name());
    if !font.is_symbolic() {
        dict.push_str(" /Encoding /WinAnsiEncoding");
    }
    dict.push_str(" >>");
    writer.put_object(dict)
}

fn put_font_file(writer: &mut PdfWriter, file: &EmbeddedFile) -> Result<u32> {
    let mut entries = format!("/Length1 {}", file.length1);
    if let Some(length2) = file.length2 {
        let _ = write!(entries, " /Length2 {} /Length3 0", length2);
    }
    if file.compressed {
        entries.push_str(" /Filter /FlateDecode");
        writer.put_raw_stream_object(&entries, &file.data)
    } else {
        writer.put_stream_object(&entries, &file.data)
    }
}

fn descriptor_dict(name: &str, descriptor: &Descriptor, file_entry: Option<(&str, u32)>) -> String {
    let [x0, y0, x1, y1] = descriptor.font_bbox;
    let mut dict = format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] \
         /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV {} /MissingWidth {}",
        name,
        descriptor.flags,
        x0,
        y0,
        x1,
        y1,
        descriptor.italic_angle,
        descriptor.ascent,
        descriptor.descent,
        descriptor.cap_height,
        descriptor.stem_v,
        descriptor.missing_width,
    );
    if let Some((key, id)) = file_entry {
        let _ = write!(dict, " /{} {} 0 R", key, id);
    }
    dict.push_str(" >>");
    dict
}

fn put_simple_font(
    writer: &mut PdfWriter,
    font: &SimpleFont,
    subtype: &str,
    encodings: &BTreeMap<String, u32>,
    used: &BTreeSet<u32>,
) -> Result<u32> {
    let name = if font.subsetted && !used.is_empty() {
        format!("{}+{}", SUBSET_TAG, font.base_name)
    } else {
        font.base_name.clone()
    };

    let file_id = match &font.file {
        Some(file) => Some(put_font_file(writer, file)?),
        None => None,
    };
    let to_unicode_id = match &font.to_unicode {
        Some(map) => {
            let entries: Vec<(u32, u32)> = map.iter().map(|(&b, &u)| (b as u32, u)).collect();
            let cmap = build_tounicode_cmap(&name, 1, &entries);
            Some(writer.put_stream_object("", cmap.as_bytes())?)
        }
        None => None,
    };

    let mut widths = String::from("[");
    for (i, w) in font.widths.iter().enumerate() {
        if i > 0 {
            widths.push(' ');
        }
        let _ = write!(widths, "{}", w);
    }
    widths.push(']');
    let widths_id = writer.put_object(widths)?;

    let file_key = if subtype == "Type1" { "FontFile" } else { "FontFile2" };
    let descriptor_id = writer.put_object(descriptor_dict(
        &name,
        &font.descriptor,
        file_id.map(|id| (file_key, id)),
    ))?;

    let mut dict = format!(
        "<< /Type /Font /Subtype /{} /BaseFont /{} /FirstChar {} /LastChar {} \
         /Widths {} 0 R /FontDescriptor {} 0 R",
        subtype,
        name,
        font.first_char,
        font.last_char(),
        widths_id,
        descriptor_id
    );
    match font.differences.as_ref().and_then(|d| encodings.get(d)) {
        Some(encoding_id) => {
            let _ = write!(dict, " /Encoding {} 0 R", encoding_id);
        }
        None if font.descriptor.flags & 4 == 0 => dict.push_str(" /Encoding /WinAnsiEncoding"),
        None => {}
    }
    if let Some(id) = to_unicode_id {
        let _ = write!(dict, " /ToUnicode {} 0 R", id);
    }
    dict.push_str(" >>");
    writer.put_object(dict)
}

/// Subset, build and embed a TrueType font as Type0 / CIDFontType2 with
/// CID == Unicode code point.
fn put_unicode_font(
    writer: &mut PdfWriter,
    font: &mut UnicodeFont,
    used: &BTreeSet<u32>,
) -> Result<u32> {
    let metadata = font.metadata().clone();
    let ttf = font.font_mut();
    ttf.subset(used.iter().copied())?;
    let subset = ttf.build()?;

    let ttf = font.font();
    let chars: Vec<u32> = ttf.subsetted_chars().iter().copied().collect();
    let name = if used.is_empty() {
        metadata.postscript_name.clone()
    } else {
        format!("{}+{}", SUBSET_TAG, metadata.postscript_name)
    };

    let file_id = writer.put_stream_object(&format!("/Length1 {}", subset.len()), &subset)?;

    let mut cid_to_gid = vec![0u8; CID_TO_GID_MAP_LEN];
    for &cp in &chars {
        let at = cp as usize * 2;
        if let (Some(ssid), Some(slot)) = (ttf.ssid_for_char(cp), cid_to_gid.get_mut(at..at + 2)) {
            slot.copy_from_slice(&ssid.to_be_bytes());
        }
    }
    let cid_to_gid_id = writer.put_stream_object("", &cid_to_gid)?;

    let descriptor = Descriptor::from_metadata(&metadata);
    let descriptor_id =
        writer.put_object(descriptor_dict(&name, &descriptor, Some(("FontFile2", file_id))))?;

    let identity: Vec<(u32, u32)> = chars.iter().map(|&cp| (cp, cp)).collect();
    let cmap = build_tounicode_cmap(&name, 2, &identity);
    let to_unicode_id = writer.put_stream_object("", cmap.as_bytes())?;

    let widths: Vec<(u32, u32)> = chars
        .iter()
        .map(|&cp| (cp, font.char_width(cp).unwrap_or(descriptor.missing_width)))
        .collect();
    let cid_font_id = writer.put_object(format!(
        "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} \
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> \
         /FontDescriptor {} 0 R /DW {} /W {} /CIDToGIDMap {} 0 R >>",
        name,
        descriptor_id,
        descriptor.missing_width,
        build_w_array(&widths),
        cid_to_gid_id,
    ))?;

    writer.put_object(format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H \
         /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
        name, cid_font_id, to_unicode_id
    ))
}

/// The CIDFont `/W` array from `(cid, width)` pairs sorted by cid.
///
/// Runs of consecutive CIDs sharing one width use the `first last width`
/// form; other runs use `first [w1 w2 ...]`.
pub(crate) fn build_w_array(widths: &[(u32, u32)]) -> String {
    let mut runs: Vec<Vec<(u32, u32)>> = Vec::new();
    for &(cid, width) in widths {
        match runs.last_mut() {
            Some(run) if run.last().map(|&(c, _)| c + 1) == Some(cid) => run.push((cid, width)),
            _ => runs.push(vec![(cid, width)]),
        }
    }

    let mut out = String::from("[");
    for run in &runs {
        let first = run[0].0;
        let uniform = run.len() > 1 && run.iter().all(|&(_, w)| w == run[0].1);
        if uniform {
            let _ = write!(out, " {} {} {}", first, first + run.len() as u32 - 1, run[0].1);
        } else {
            let _ = write!(out, " {} [", first);
            for (i, &(_, w)) in run.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{}", w);
            }
            out.push(']');
        }
    }
    out.push_str(" ]");
    out
}

/// Build a ToUnicode CMap for text extraction/copy-paste support.
///
/// `entries` are `(code, unicode)` pairs sorted by code; `code_bytes` is the
/// width of a character code (1 for simple fonts, 2 for CID fonts).
/// Consecutive runs become `bfrange` entries, the rest `bfchar`, at most
/// 100 per block.
pub(crate) fn build_tounicode_cmap(font_name: &str, code_bytes: usize, entries: &[(u32, u32)]) -> String {
    let digits = code_bytes * 2;
    let mut ranges: Vec<(u32, u32, u32)> = Vec::new();
    let mut singles: Vec<(u32, u32)> = Vec::new();

    let mut i = 0;
    while i < entries.len() {
        let (start, uni) = entries[i];
        let mut end = start;
        let mut j = i + 1;
        // A bfrange may only vary in the last byte of the code.
        while j < entries.len()
            && entries[j].0 == end + 1
            && entries[j].1 == uni + (end + 1 - start)
            && entries[j].1 <= 0xFFFF
            && (end + 1) >> 8 == start >> 8
        {
            end += 1;
            j += 1;
        }
        if end > start {
            ranges.push((start, end, uni));
        } else {
            singles.push((start, uni));
        }
        i = j;
    }

    let mut cmap = String::new();
    cmap.push_str("/CIDInit /ProcSet findresource begin\n");
    cmap.push_str("12 dict begin\n");
    cmap.push_str("begincmap\n");
    cmap.push_str("/CIDSystemInfo\n");
    cmap.push_str("<< /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    let _ = writeln!(cmap, "/CMapName /{}-UTF16 def", font_name);
    cmap.push_str("/CMapType 2 def\n");
    cmap.push_str("1 begincodespacerange\n");
    let _ = writeln!(cmap, "<{:0w$X}> <{:0w$X}>", 0, (1u32 << (8 * code_bytes)) - 1, w = digits);
    cmap.push_str("endcodespacerange\n");

    for chunk in ranges.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfrange", chunk.len());
        for &(start, end, uni) in chunk {
            let _ = writeln!(cmap, "<{:0w$X}> <{:0w$X}> <{:04X}>", start, end, uni, w = digits);
        }
        cmap.push_str("endbfrange\n");
    }
    for chunk in singles.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for &(code, uni) in chunk {
            let _ = writeln!(cmap, "<{:0w$X}> <{}>", code, utf16_hex(uni), w = digits);
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\n");
    cmap.push_str("CMapName currentdict /CMap defineresource pop\n");
    cmap.push_str("end\n");
    cmap.push_str("end\n");
    cmap
}

fn utf16_hex(cp: u32) -> String {
    match char::from_u32(cp) {
        Some(ch) => {
            let mut buf = [0u16; 2];
            ch.encode_utf16(&mut buf)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect()
        }
        None => "FFFD".to_string(),
    }
}
