//! A tiny TrueType font assembled in memory for the integration tests.
//!
//! Glyphs:
//!
//! | gid | name            | char | kind                       |
//! |-----|-----------------|------|----------------------------|
//! | 0   | .notdef         |      | simple                     |
//! | 1   | H               | H    | simple                     |
//! | 2   | e               | e    | simple                     |
//! | 3   | l               | l    | simple                     |
//! | 4   | o               | o    | simple                     |
//! | 5   | Adieresis.alt   | Ä    | composite of 6 and 7       |
//! | 6   | A               | A    | simple                     |
//! | 7   | dieresiscomb    |      | simple, unmapped           |
//! | 8   | x               | x    | simple                     |
//! | 9   | space           | ' '  | empty                      |

#![allow(dead_code)]

use std::collections::BTreeMap;

pub const NUM_GLYPHS: u16 = 10;
pub const UNITS_PER_EM: u16 = 1000;
pub const POSTSCRIPT_NAME: &str = "FolioTest-Regular";

/// Advance widths by glyph id. The last two share one metric record.
pub const ADVANCES: [u16; 10] = [500, 700, 550, 250, 560, 640, 640, 0, 520, 520];

/// (char, gid)
pub const CHAR_MAP: [(char, u16); 8] = [
    (' ', 9),
    ('A', 6),
    ('H', 1),
    ('e', 2),
    ('l', 3),
    ('o', 4),
    ('x', 8),
    ('Ä', 5),
];

/// Knobs for the variations individual tests need.
#[derive(Debug, Clone)]
pub struct TestFont {
    pub fs_type: u16,
    pub with_os2: bool,
    pub post_format2: bool,
    pub italic_angle: i16,
    pub weight_class: u16,
    /// Extra tables copied as-is, e.g. `prep`.
    pub extra: Vec<([u8; 4], Vec<u8>)>,
}

impl Default for TestFont {
    fn default() -> Self {
        Self {
            fs_type: 0,
            with_os2: true,
            post_format2: true,
            italic_angle: 0,
            weight_class: 400,
            extra: Vec::new(),
        }
    }
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// A one-point simple glyph; `seed` varies the bytes per glyph.
fn simple_glyph(seed: u8) -> Vec<u8> {
    let mut g = Vec::new();
    put_i16(&mut g, 1); // numberOfContours
    put_i16(&mut g, 0);
    put_i16(&mut g, 0);
    put_i16(&mut g, seed as i16 * 10);
    put_i16(&mut g, 700);
    put_u16(&mut g, 0); // endPtsOfContours[0]
    put_u16(&mut g, 0); // instructionLength
    g.push(0x37); // on curve, short positive x and y
    g.push(seed.wrapping_mul(10));
    g.push(70);
    g
}

/// Composite glyph placing `base` and `mark`.
fn composite_glyph(base: u16, mark: u16) -> Vec<u8> {
    let mut g = Vec::new();
    put_i16(&mut g, -1);
    put_i16(&mut g, 0);
    put_i16(&mut g, 0);
    put_i16(&mut g, 640);
    put_i16(&mut g, 900);
    // ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES | MORE_COMPONENTS
    put_u16(&mut g, 0x0023);
    put_u16(&mut g, base);
    put_i16(&mut g, 0);
    put_i16(&mut g, 0);
    // ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES
    put_u16(&mut g, 0x0003);
    put_u16(&mut g, mark);
    put_i16(&mut g, 120);
    put_i16(&mut g, 200);
    g
}

fn glyphs() -> Vec<Vec<u8>> {
    (0..NUM_GLYPHS)
        .map(|gid| match gid {
            5 => composite_glyph(6, 7),
            9 => Vec::new(),
            _ => simple_glyph(gid as u8 + 1),
        })
        .collect()
}

fn head() -> Vec<u8> {
    let mut t = Vec::new();
    put_u32(&mut t, 0x0001_0000); // version
    put_u32(&mut t, 0x0001_0000); // fontRevision
    put_u32(&mut t, 0); // checkSumAdjustment
    put_u32(&mut t, 0x5F0F_3CF5); // magicNumber
    put_u16(&mut t, 0x000B); // flags
    put_u16(&mut t, UNITS_PER_EM);
    t.extend_from_slice(&[0u8; 16]); // created, modified
    put_i16(&mut t, -50);
    put_i16(&mut t, -250);
    put_i16(&mut t, 1000);
    put_i16(&mut t, 950);
    put_u16(&mut t, 0); // macStyle
    put_u16(&mut t, 8); // lowestRecPPEM
    put_i16(&mut t, 2); // fontDirectionHint
    put_i16(&mut t, 1); // indexToLocFormat: long
    put_i16(&mut t, 0); // glyphDataFormat
    assert_eq!(t.len(), 54);
    t
}

fn hhea(num_metrics: u16) -> Vec<u8> {
    let mut t = Vec::new();
    put_u32(&mut t, 0x0001_0000);
    put_i16(&mut t, 900); // ascender
    put_i16(&mut t, -250); // descender
    put_i16(&mut t, 0); // lineGap
    put_u16(&mut t, 700); // advanceWidthMax
    put_i16(&mut t, 0);
    put_i16(&mut t, 0);
    put_i16(&mut t, 1000);
    put_i16(&mut t, 1); // caretSlopeRise
    put_i16(&mut t, 0);
    put_i16(&mut t, 0);
    t.extend_from_slice(&[0u8; 8]);
    put_i16(&mut t, 0); // metricDataFormat
    put_u16(&mut t, num_metrics);
    assert_eq!(t.len(), 36);
    t
}

fn maxp() -> Vec<u8> {
    let mut t = Vec::new();
    put_u32(&mut t, 0x0001_0000);
    put_u16(&mut t, NUM_GLYPHS);
    put_u16(&mut t, 8); // maxPoints
    put_u16(&mut t, 1); // maxContours
    put_u16(&mut t, 8); // maxCompositePoints
    put_u16(&mut t, 2); // maxCompositeContours
    put_u16(&mut t, 2); // maxZones
    t.extend_from_slice(&[0u8; 14]);
    put_u16(&mut t, 2); // maxComponentElements
    put_u16(&mut t, 1); // maxComponentDepth
    assert_eq!(t.len(), 32);
    t
}

fn hmtx(num_metrics: u16) -> Vec<u8> {
    let mut t = Vec::new();
    for gid in 0..NUM_GLYPHS {
        if gid < num_metrics {
            put_u16(&mut t, ADVANCES[gid as usize]);
        }
        put_i16(&mut t, 10);
    }
    t
}

fn cmap() -> Vec<u8> {
    let mut segments: Vec<(u16, u16)> = CHAR_MAP.iter().map(|&(c, g)| (c as u16, g)).collect();
    segments.sort();
    let seg_count = segments.len() as u16 + 1;
    let entry_selector = 15 - seg_count.leading_zeros() as u16;
    let search_range = 2 * (1u16 << entry_selector);

    let mut st = Vec::new();
    put_u16(&mut st, 4);
    put_u16(&mut st, 16 + 8 * seg_count);
    put_u16(&mut st, 0);
    put_u16(&mut st, seg_count * 2);
    put_u16(&mut st, search_range);
    put_u16(&mut st, entry_selector);
    put_u16(&mut st, seg_count * 2 - search_range);
    for &(code, _) in &segments {
        put_u16(&mut st, code);
    }
    put_u16(&mut st, 0xFFFF);
    put_u16(&mut st, 0); // reservedPad
    for &(code, _) in &segments {
        put_u16(&mut st, code);
    }
    put_u16(&mut st, 0xFFFF);
    for &(code, gid) in &segments {
        put_u16(&mut st, gid.wrapping_sub(code));
    }
    put_u16(&mut st, 1);
    for _ in 0..seg_count {
        put_u16(&mut st, 0);
    }

    let mut t = Vec::new();
    put_u16(&mut t, 0);
    put_u16(&mut t, 1);
    put_u16(&mut t, 3);
    put_u16(&mut t, 1);
    put_u32(&mut t, 12);
    t.extend_from_slice(&st);
    t
}

fn name() -> Vec<u8> {
    let ps: Vec<u8> = POSTSCRIPT_NAME
        .encode_utf16()
        .flat_map(|u| u.to_be_bytes())
        .collect();
    let mut t = Vec::new();
    put_u16(&mut t, 0); // format
    put_u16(&mut t, 1); // count
    put_u16(&mut t, 6 + 12); // stringOffset
    put_u16(&mut t, 3);
    put_u16(&mut t, 1);
    put_u16(&mut t, 0x0409);
    put_u16(&mut t, 6);
    put_u16(&mut t, ps.len() as u16);
    put_u16(&mut t, 0);
    t.extend_from_slice(&ps);
    t
}

fn os2(font: &TestFont) -> Vec<u8> {
    let mut t = vec![0u8; 96];
    t[0..2].copy_from_slice(&4u16.to_be_bytes()); // version
    t[2..4].copy_from_slice(&520i16.to_be_bytes()); // xAvgCharWidth
    t[4..6].copy_from_slice(&font.weight_class.to_be_bytes());
    t[6..8].copy_from_slice(&5u16.to_be_bytes()); // usWidthClass
    t[8..10].copy_from_slice(&font.fs_type.to_be_bytes());
    t[58..62].copy_from_slice(b"FLIO");
    t[62..64].copy_from_slice(&0x0040u16.to_be_bytes()); // fsSelection: REGULAR
    t[64..66].copy_from_slice(&0x0020u16.to_be_bytes());
    t[66..68].copy_from_slice(&0x00C4u16.to_be_bytes());
    t[68..70].copy_from_slice(&800i16.to_be_bytes()); // sTypoAscender
    t[70..72].copy_from_slice(&(-200i16).to_be_bytes()); // sTypoDescender
    t[74..76].copy_from_slice(&900u16.to_be_bytes()); // usWinAscent
    t[76..78].copy_from_slice(&250u16.to_be_bytes()); // usWinDescent
    t[86..88].copy_from_slice(&500i16.to_be_bytes()); // sxHeight
    t[88..90].copy_from_slice(&700i16.to_be_bytes()); // sCapHeight
    t
}

fn post(font: &TestFont) -> Vec<u8> {
    let mut t = Vec::new();
    put_u32(&mut t, if font.post_format2 { 0x0002_0000 } else { 0x0003_0000 });
    put_i16(&mut t, font.italic_angle);
    put_u16(&mut t, 0);
    put_i16(&mut t, -100); // underlinePosition
    put_i16(&mut t, 50); // underlineThickness
    put_u32(&mut t, 0); // isFixedPitch
    t.extend_from_slice(&[0u8; 16]);
    if !font.post_format2 {
        return t;
    }
    put_u16(&mut t, NUM_GLYPHS);
    // .notdef H e l o Adieresis.alt A dieresiscomb x space
    for index in [0u16, 43, 72, 79, 82, 258, 36, 259, 91, 3] {
        put_u16(&mut t, index);
    }
    for custom in ["Adieresis.alt", "dieresiscomb"] {
        t.push(custom.len() as u8);
        t.extend_from_slice(custom.as_bytes());
    }
    t
}

fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

/// Wrap tables in an sfnt container.
pub fn assemble(version: u32, tables: &BTreeMap<[u8; 4], Vec<u8>>) -> Vec<u8> {
    let num_tables = tables.len() as u16;
    let entry_selector = 15 - num_tables.leading_zeros() as u16;
    let search_range = 16 * (1u16 << entry_selector);

    let mut out = Vec::new();
    put_u32(&mut out, version);
    put_u16(&mut out, num_tables);
    put_u16(&mut out, search_range);
    put_u16(&mut out, entry_selector);
    put_u16(&mut out, num_tables * 16 - search_range);

    let mut offset = 12 + tables.len() * 16;
    for (tag, data) in tables {
        out.extend_from_slice(tag);
        put_u32(&mut out, checksum(data));
        put_u32(&mut out, offset as u32);
        put_u32(&mut out, data.len() as u32);
        offset += (data.len() + 3) & !3;
    }
    for data in tables.values() {
        out.extend_from_slice(data);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }
    out
}

impl TestFont {
    pub fn tables(&self) -> BTreeMap<[u8; 4], Vec<u8>> {
        let num_metrics = NUM_GLYPHS - 1;
        let mut glyf = Vec::new();
        let mut loca = Vec::new();
        for glyph in glyphs() {
            put_u32(&mut loca, glyf.len() as u32);
            // Unpadded, so most glyphs start at odd offsets.
            glyf.extend_from_slice(&glyph);
        }
        put_u32(&mut loca, glyf.len() as u32);

        let mut tables = BTreeMap::new();
        tables.insert(*b"cmap", cmap());
        tables.insert(*b"glyf", glyf);
        tables.insert(*b"head", head());
        tables.insert(*b"hhea", hhea(num_metrics));
        tables.insert(*b"hmtx", hmtx(num_metrics));
        tables.insert(*b"loca", loca);
        tables.insert(*b"maxp", maxp());
        tables.insert(*b"name", name());
        tables.insert(*b"post", post(self));
        if self.with_os2 {
            tables.insert(*b"OS/2", os2(self));
        }
        for (tag, data) in &self.extra {
            tables.insert(*tag, data.clone());
        }
        tables
    }

    pub fn build(&self) -> Vec<u8> {
        assemble(0x0001_0000, &self.tables())
    }
}

/// The default test font.
pub fn test_font() -> Vec<u8> {
    TestFont::default().build()
}

/// Table bytes of an sfnt file, by tag.
pub fn read_tables(font: &[u8]) -> BTreeMap<[u8; 4], Vec<u8>> {
    let num_tables = u16::from_be_bytes([font[4], font[5]]) as usize;
    let mut tables = BTreeMap::new();
    for i in 0..num_tables {
        let rec = &font[12 + i * 16..12 + (i + 1) * 16];
        let tag = [rec[0], rec[1], rec[2], rec[3]];
        let offset = u32::from_be_bytes([rec[8], rec[9], rec[10], rec[11]]) as usize;
        let length = u32::from_be_bytes([rec[12], rec[13], rec[14], rec[15]]) as usize;
        tables.insert(tag, font[offset..offset + length].to_vec());
    }
    tables
}

/// Directory checksum recorded for `tag`.
pub fn recorded_checksum(font: &[u8], tag: &[u8; 4]) -> Option<u32> {
    let num_tables = u16::from_be_bytes([font[4], font[5]]) as usize;
    (0..num_tables).find_map(|i| {
        let rec = &font[12 + i * 16..12 + (i + 1) * 16];
        (&rec[0..4] == tag).then(|| u32::from_be_bytes([rec[4], rec[5], rec[6], rec[7]]))
    })
}

pub fn table_checksum(data: &[u8]) -> u32 {
    checksum(data)
}
