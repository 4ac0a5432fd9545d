//! Integration tests for the TrueType parser and subsetter.
//!
//! Every subset is re-read with `ttf-parser` as an independent check that
//! the output is a well-formed font, and with folio's own parser where the
//! test needs the raw glyph structure.

mod common;

use common::{read_tables, recorded_checksum, table_checksum, TestFont};
use folio::error::FolioError;
use folio::font::{TrueTypeFont, UnicodeFont};
use ttf_parser::{Face, GlyphId};

// ─── Helpers ────────────────────────────────────────────────────

fn subset(text: &str) -> Vec<u8> {
    folio::subset_font_bytes(common::test_font(), text).unwrap()
}

fn reparse(font: &[u8]) -> TrueTypeFont<std::io::Cursor<Vec<u8>>> {
    let mut parsed = TrueTypeFont::from_bytes(font.to_vec());
    parsed.parse().unwrap();
    parsed
}

fn u16_at(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

// ─── Parsing ────────────────────────────────────────────────────

#[test]
fn test_metadata_from_os2_and_post() {
    let mut font = TrueTypeFont::from_bytes(common::test_font());
    let meta = font.parse().unwrap();
    assert_eq!(meta.postscript_name, common::POSTSCRIPT_NAME);
    assert_eq!(meta.units_per_em, 1000);
    assert_eq!(meta.bbox, [-50, -250, 1000, 950]);
    assert_eq!((meta.ascent, meta.descent, meta.cap_height), (800, -200, 700));
    assert_eq!(meta.stem_v, 87);
    assert_eq!(meta.flags, 4);
    assert_eq!(meta.missing_width, 500);
    assert_eq!(meta.num_glyphs, common::NUM_GLYPHS);
    assert!(meta.embeddable);
    assert!(!meta.bold);
}

#[test]
fn test_bold_italic_flags() {
    let data = TestFont {
        italic_angle: -12,
        weight_class: 700,
        ..Default::default()
    }
    .build();
    let meta = TrueTypeFont::from_bytes(data).parse().unwrap();
    assert_eq!(meta.italic_angle, -12.0);
    assert_eq!(meta.flags, 4 | 64 | 262144);
    assert_eq!(meta.stem_v, 165);
}

#[test]
fn test_metrics_without_os2_fall_back_to_hhea() {
    let data = TestFont {
        with_os2: false,
        ..Default::default()
    }
    .build();
    let meta = TrueTypeFont::from_bytes(data).parse().unwrap();
    assert_eq!((meta.ascent, meta.descent, meta.cap_height), (900, -250, 900));
    assert_eq!(meta.stem_v, 70);
}

#[test]
fn test_glyph_structure_and_cmap() {
    let mut font = TrueTypeFont::from_bytes(common::test_font());
    font.parse().unwrap();
    for (ch, gid) in common::CHAR_MAP {
        assert_eq!(font.glyph_for_char(ch as u32), Some(gid), "{:?}", ch);
    }
    assert_eq!(font.glyph_for_char('z' as u32), None);

    let composite = &font.glyphs()[5];
    let components: Vec<u16> = composite.components.iter().map(|c| c.glyph).collect();
    assert_eq!(components, vec![6, 7]);
    assert_eq!(font.glyphs()[9].length, 0);
    // Glyph 9 lives in the monospaced hmtx tail.
    assert_eq!(font.glyphs()[9].advance_width, 520);
}

#[test]
fn test_tables_are_read_lazily() {
    let mut font = TrueTypeFont::from_bytes(common::test_font());
    font.parse_directory().unwrap();
    assert!(font.directory().contains(folio::binary::Tag::new(b"glyf")));
    assert_eq!(font.directory().tags().count(), TestFont::default().tables().len());
    assert!(!font.directory().is_loaded(folio::binary::Tag::new(b"glyf")));
    font.parse_head().unwrap();
    assert!(font.directory().is_loaded(folio::binary::Tag::new(b"head")));
    assert!(!font.directory().is_loaded(folio::binary::Tag::new(b"glyf")));
}

#[test]
fn test_otto_font_rejected() {
    let cff = common::assemble(0x4F54_544F, &TestFont::default().tables());
    let mut font = TrueTypeFont::from_bytes(cff);
    match font.parse() {
        Err(FolioError::Format(msg)) => assert!(msg.contains("OTTO")),
        other => panic!("expected a format error, got {:?}", other.map(|m| m.postscript_name)),
    }
}

#[test]
fn test_bad_head_magic_rejected() {
    let mut tables = TestFont::default().tables();
    if let Some(head) = tables.get_mut(b"head") {
        head[12] = 0;
    }
    let data = common::assemble(0x0001_0000, &tables);
    assert!(matches!(
        TrueTypeFont::from_bytes(data).parse(),
        Err(FolioError::Format(_))
    ));
}

#[test]
fn test_zero_h_metrics_rejected() {
    let mut tables = TestFont::default().tables();
    if let Some(hhea) = tables.get_mut(b"hhea") {
        hhea[34] = 0;
        hhea[35] = 0;
    }
    let data = common::assemble(0x0001_0000, &tables);
    assert!(matches!(
        TrueTypeFont::from_bytes(data).parse(),
        Err(FolioError::Format(_))
    ));
}

#[test]
fn test_missing_required_table() {
    let mut tables = TestFont::default().tables();
    tables.remove(b"loca");
    let data = common::assemble(0x0001_0000, &tables);
    match TrueTypeFont::from_bytes(data).parse() {
        Err(FolioError::Format(msg)) => assert!(msg.contains("'loca'")),
        other => panic!("expected a format error, got {:?}", other.map(|m| m.postscript_name)),
    }
}

#[test]
fn test_restricted_license_not_embeddable() {
    let data = TestFont {
        fs_type: 0x0002,
        ..Default::default()
    }
    .build();
    assert!(matches!(UnicodeFont::from_bytes(data), Err(FolioError::Format(_))));

    let editable = TestFont {
        fs_type: 0x0008,
        ..Default::default()
    }
    .build();
    assert!(UnicodeFont::from_bytes(editable).is_ok());
}

// ─── Subsetting ─────────────────────────────────────────────────

#[test]
fn test_hello_subset() {
    let out = subset("Hello");
    let face = Face::parse(&out, 0).unwrap();
    assert_eq!(face.number_of_glyphs(), 5);
    assert_eq!(face.units_per_em(), 1000);
    assert_eq!(face.glyph_index('H'), Some(GlyphId(1)));
    assert_eq!(face.glyph_index('e'), Some(GlyphId(2)));
    assert_eq!(face.glyph_index('l'), Some(GlyphId(3)));
    assert_eq!(face.glyph_index('o'), Some(GlyphId(4)));
    assert_eq!(face.glyph_index('x'), None);
    assert_eq!(face.glyph_hor_advance(GlyphId(0)), Some(500));
    assert_eq!(face.glyph_hor_advance(GlyphId(1)), Some(700));
    assert_eq!(face.glyph_hor_advance(GlyphId(4)), Some(560));
    assert_eq!(face.glyph_name(GlyphId(1)), Some("H"));
    assert_eq!(face.glyph_name(GlyphId(3)), Some("l"));

    let tables = read_tables(&out);
    assert_eq!(u16_at(&tables[b"maxp"], 4), 5);
    assert_eq!(u16_at(&tables[b"hhea"], 34), 5);
    assert_eq!(tables[b"hmtx"].len(), 5 * 4);
}

#[test]
fn test_subset_checksums() {
    let out = subset("Hello");
    assert_eq!(out.len() % 4, 0);
    assert_eq!(folio::binary::checksum(&out), 0xB1B0_AFBA);

    for (tag, data) in read_tables(&out) {
        let recorded = recorded_checksum(&out, &tag).unwrap();
        if &tag == b"head" {
            let mut zeroed = data.clone();
            zeroed[8..12].copy_from_slice(&[0; 4]);
            assert_eq!(recorded, table_checksum(&zeroed));
        } else {
            assert_eq!(recorded, table_checksum(&data), "{}", String::from_utf8_lossy(&tag));
        }
    }
}

#[test]
fn test_subset_uses_short_loca_with_aligned_glyphs() {
    let out = subset("Hello");
    let tables = read_tables(&out);
    assert_eq!(u16_at(&tables[b"head"], 50), 0);
    let loca = &tables[b"loca"];
    assert_eq!(loca.len(), 6 * 2);
    let offsets: Vec<u32> = (0..6).map(|i| u16_at(loca, i * 2) as u32 * 2).collect();
    assert_eq!(offsets[0], 0);
    assert!(offsets.iter().all(|o| o % 4 == 0));
    assert_eq!(*offsets.last().unwrap() as usize, tables[b"glyf"].len());
}

#[test]
fn test_composite_pulls_in_components() {
    let out = subset("Ä");
    let face = Face::parse(&out, 0).unwrap();
    assert_eq!(face.number_of_glyphs(), 4);
    assert_eq!(face.glyph_index('Ä'), Some(GlyphId(1)));
    // Components are in the subset but not mapped.
    assert_eq!(face.glyph_index('A'), None);
    assert_eq!(face.glyph_name(GlyphId(1)), Some("Adieresis.alt"));
    assert_eq!(face.glyph_name(GlyphId(2)), Some("A"));
    assert_eq!(face.glyph_name(GlyphId(3)), Some("dieresiscomb"));

    let parsed = reparse(&out);
    let components: Vec<u16> = parsed.glyphs()[1].components.iter().map(|c| c.glyph).collect();
    assert_eq!(components, vec![2, 3]);
}

#[test]
fn test_shared_component_selected_once() {
    let out = subset("AÄ");
    let face = Face::parse(&out, 0).unwrap();
    assert_eq!(face.number_of_glyphs(), 4);
    assert_eq!(face.glyph_index('A'), Some(GlyphId(1)));
    assert_eq!(face.glyph_index('Ä'), Some(GlyphId(2)));

    let parsed = reparse(&out);
    let components: Vec<u16> = parsed.glyphs()[2].components.iter().map(|c| c.glyph).collect();
    assert_eq!(components, vec![1, 3]);
}

#[test]
fn test_repeated_subset_calls_accumulate() {
    let mut font = TrueTypeFont::from_bytes(common::test_font());
    font.parse().unwrap();
    font.subset("He".chars().map(|c| c as u32)).unwrap();
    font.subset("llo".chars().map(|c| c as u32)).unwrap();
    font.subset("Hello".chars().map(|c| c as u32)).unwrap();
    assert_eq!(font.subsetted_glyphs(), &[0, 1, 2, 3, 4]);
    assert_eq!(font.build().unwrap(), subset("Hello"));
}

#[test]
fn test_unmapped_and_astral_code_points_ignored() {
    let mut font = TrueTypeFont::from_bytes(common::test_font());
    font.parse().unwrap();
    font.subset(['H' as u32, 'z' as u32, 0x1F600]).unwrap();
    assert_eq!(font.subsetted_glyphs(), &[0, 1]);
    assert_eq!(font.subsetted_chars().len(), 1);
    assert_eq!(font.ssid_for_char('H' as u32), Some(1));
    assert_eq!(font.ssid_for_char('z' as u32), None);
}

#[test]
fn test_empty_glyph_and_metric_tail() {
    let out = subset(" x");
    let face = Face::parse(&out, 0).unwrap();
    assert_eq!(face.glyph_index(' '), Some(GlyphId(1)));
    assert_eq!(face.glyph_hor_advance(GlyphId(1)), Some(520));
    assert_eq!(face.glyph_hor_advance(GlyphId(2)), Some(520));

    let parsed = reparse(&out);
    assert_eq!(parsed.glyphs()[1].length, 0);
    assert!(parsed.glyphs()[2].length > 0);
}

#[test]
fn test_optional_tables_carried_over() {
    let prep = vec![0xB0, 0x01, 0x2C, 0x00];
    let source = TestFont {
        extra: vec![(*b"prep", prep.clone())],
        ..Default::default()
    };
    let out = folio::subset_font_bytes(source.build(), "H").unwrap();
    let tables = read_tables(&out);
    let source_tables = source.tables();
    assert_eq!(tables[b"prep"], prep);
    assert_eq!(tables[b"name"], source_tables[b"name"]);
    assert_eq!(tables[b"OS/2"], source_tables[b"OS/2"]);
    assert!(!tables.contains_key(b"fpgm"));
}

#[test]
fn test_post_format3_stays_nameless() {
    let source = TestFont {
        post_format2: false,
        ..Default::default()
    };
    let out = folio::subset_font_bytes(source.build(), "Hello").unwrap();
    let post = &read_tables(&out)[b"post"];
    assert_eq!(post.len(), 32);
    assert_eq!(&post[0..4], &[0, 3, 0, 0]);
    assert!(Face::parse(&out, 0).is_ok());
}

#[test]
fn test_subset_font_from_file() {
    let path = std::env::temp_dir().join(format!("folio-subset-{}.ttf", std::process::id()));
    std::fs::write(&path, common::test_font()).unwrap();
    let from_file = folio::subset_font(&path, "Hello").unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(from_file, subset("Hello"));
}

#[test]
fn test_api_order_enforced() {
    let mut font = TrueTypeFont::from_bytes(common::test_font());
    assert!(matches!(font.subset(['H' as u32]), Err(FolioError::State(_))));
    font.parse().unwrap();
    assert!(matches!(font.build(), Err(FolioError::State(_))));
}
