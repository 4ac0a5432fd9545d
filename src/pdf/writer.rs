//! # PDF Object Writer
//!
//! The low-level half of the serializer. Owns the output buffer and the
//! object number → byte offset table, and knows how to frame indirect
//! objects and streams and how to close the file with a cross-reference
//! table and trailer.
//!
//! Object 1 (page tree root) and object 2 (resource dictionary) are
//! reserved and may be written at any point. Every other object gets the
//! next number in sequence, so ids increase strictly in emission order.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write as IoWrite;

use miniz_oxide::deflate::compress_to_vec_zlib;

use crate::error::{FolioError, Result};

pub const PAGES_ROOT_ID: u32 = 1;
pub const RESOURCES_ID: u32 = 2;

/// Appends indirect objects to a single output buffer.
pub struct PdfWriter {
    buffer: Vec<u8>,
    offsets: BTreeMap<u32, usize>,
    /// Highest object number handed out so far.
    last_id: u32,
    open: Option<u32>,
    compress: bool,
}

impl PdfWriter {
    pub fn new(compress: bool) -> Self {
        Self {
            buffer: Vec::new(),
            offsets: BTreeMap::new(),
            last_id: RESOURCES_ID,
            open: None,
            compress,
        }
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    /// Current length of the output, i.e. where the next byte will land.
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    /// Number the next [`new_obj`](Self::new_obj) call will return.
    pub fn next_id(&self) -> u32 {
        self.last_id + 1
    }

    /// The bytes written so far. Useful for inspecting a failed run.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Write the `%PDF-x.y` header and the binary marker comment.
    pub fn header(&mut self, version: &str) -> Result<()> {
        if !self.buffer.is_empty() {
            return Err(FolioError::state("PDF header must be the first thing written"));
        }
        let _ = write!(self.buffer, "%PDF-{}\n", version);
        self.buffer.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");
        Ok(())
    }

    /// Append bytes followed by a newline.
    pub fn put(&mut self, bytes: impl AsRef<[u8]>) {
        self.buffer.extend_from_slice(bytes.as_ref());
        self.buffer.push(b'\n');
    }

    /// Start the next sequentially numbered object.
    pub fn new_obj(&mut self) -> Result<u32> {
        let id = self.next_id();
        self.begin_obj(id)?;
        Ok(id)
    }

    /// Start object `id`, recording its offset.
    pub fn begin_obj(&mut self, id: u32) -> Result<()> {
        if let Some(open) = self.open {
            return Err(FolioError::state(format!(
                "cannot start object {} while object {} is open",
                id, open
            )));
        }
        if id == 0 {
            return Err(FolioError::state("object 0 is the free-list head"));
        }
        if self.offsets.contains_key(&id) {
            return Err(FolioError::state(format!("object {} was already written", id)));
        }
        if id > RESOURCES_ID {
            if id != self.next_id() {
                return Err(FolioError::state(format!(
                    "object {} written out of order (next is {})",
                    id,
                    self.next_id()
                )));
            }
            self.last_id = id;
        }
        self.offsets.insert(id, self.buffer.len());
        let _ = write!(self.buffer, "{} 0 obj\n", id);
        self.open = Some(id);
        Ok(())
    }

    pub fn end_obj(&mut self) -> Result<()> {
        if self.open.take().is_none() {
            return Err(FolioError::state("endobj without an open object"));
        }
        self.buffer.extend_from_slice(b"endobj\n");
        Ok(())
    }

    /// Write a complete non-stream object and return its number.
    pub fn put_object(&mut self, body: impl AsRef<[u8]>) -> Result<u32> {
        let id = self.new_obj()?;
        self.put(body);
        self.end_obj()?;
        Ok(id)
    }

    /// Write a complete object under a known number (one of the reserved
    /// ids, or the next one in sequence).
    pub fn write_object(&mut self, id: u32, body: impl AsRef<[u8]>) -> Result<()> {
        self.begin_obj(id)?;
        self.put(body);
        self.end_obj()
    }

    /// Write a stream object, deflating the payload when compression is on.
    ///
    /// `entries` are extra dictionary entries (e.g. `/Length1 1234`);
    /// `/Filter` and `/Length` are added here.
    pub fn put_stream_object(&mut self, entries: &str, data: &[u8]) -> Result<u32> {
        let id = self.new_obj()?;
        let (filter, payload) = if self.compress {
            (" /Filter /FlateDecode", Cow::Owned(compress_to_vec_zlib(data, 6)))
        } else {
            ("", Cow::Borrowed(data))
        };
        self.stream_body(entries, filter, &payload);
        self.end_obj()?;
        Ok(id)
    }

    /// Write a stream object whose payload is already in its final
    /// encoding. The caller supplies any `/Filter` in `entries`.
    pub fn put_raw_stream_object(&mut self, entries: &str, data: &[u8]) -> Result<u32> {
        let id = self.new_obj()?;
        self.stream_body(entries, "", data);
        self.end_obj()?;
        Ok(id)
    }

    fn stream_body(&mut self, entries: &str, filter: &str, payload: &[u8]) {
        self.buffer.extend_from_slice(b"<<");
        if !entries.is_empty() {
            self.buffer.push(b' ');
            self.buffer.extend_from_slice(entries.as_bytes());
        }
        let _ = write!(self.buffer, "{} /Length {} >>\nstream\n", filter, payload.len());
        self.buffer.extend_from_slice(payload);
        self.buffer.extend_from_slice(b"\nendstream\n");
    }

    /// Append the cross-reference table and trailer and hand back the file.
    pub fn finish(mut self, root: u32, info: Option<u32>) -> Result<Vec<u8>> {
        if let Some(open) = self.open {
            return Err(FolioError::state(format!("object {} was never closed", open)));
        }
        let size = self.last_id + 1;
        let mut offsets = Vec::with_capacity(self.last_id as usize);
        for id in 1..size {
            let offset = self.offsets.get(&id).ok_or_else(|| {
                FolioError::format(format!("object {} is referenced but was never written", id))
            })?;
            offsets.push(*offset);
        }
        if !self.offsets.contains_key(&root) {
            return Err(FolioError::format(format!("catalog object {} was never written", root)));
        }

        let xref_offset = self.buffer.len();
        let _ = write!(self.buffer, "xref\n0 {}\n", size);
        self.buffer.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets {
            let _ = write!(self.buffer, "{:010} 00000 n \n", offset);
        }

        let _ = write!(self.buffer, "trailer\n<< /Size {} /Root {} 0 R", size, root);
        if let Some(info) = info {
            let _ = write!(self.buffer, " /Info {} 0 R", info);
        }
        let _ = write!(self.buffer, " >>\nstartxref\n{}\n%%EOF\n", xref_offset);
        log::debug!("wrote {} objects, {} bytes", self.last_id, self.buffer.len());
        Ok(self.buffer)
    }
}

/// Escape the bytes of a PDF string literal: backslash, parentheses and
/// carriage return.
pub fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' | b'(' | b')' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out
}

/// A text string literal, parentheses included. ASCII is written as-is;
/// anything else becomes UTF-16BE with a byte-order mark.
pub fn text_string(s: &str) -> Vec<u8> {
    let raw: Vec<u8> = if s.is_ascii() {
        s.as_bytes().to_vec()
    } else {
        let mut utf16 = vec![0xFE, 0xFF];
        for unit in s.encode_utf16() {
            utf16.extend_from_slice(&unit.to_be_bytes());
        }
        utf16
    };
    let mut out = Vec::with_capacity(raw.len() + 2);
    out.push(b'(');
    out.extend_from_slice(&escape_literal(&raw));
    out.push(b')');
    out
}

/// Format a coordinate with two decimals, as content streams expect.
pub fn num(v: f64) -> String {
    format!("{:.2}", v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal(b"Hello (World)"), b"Hello \\(World\\)".to_vec());
        assert_eq!(escape_literal(b"back\\slash"), b"back\\\\slash".to_vec());
        assert_eq!(escape_literal(b"a\rb"), b"a\\rb".to_vec());
    }

    #[test]
    fn test_text_string_ascii_and_utf16() {
        assert_eq!(text_string("Report (v2)"), b"(Report \\(v2\\))".to_vec());
        let encoded = text_string("é");
        assert_eq!(encoded, vec![b'(', 0xFE, 0xFF, 0x00, 0xE9, b')']);
    }

    #[test]
    fn test_offsets_point_at_object_headers() {
        let mut w = PdfWriter::new(false);
        w.header("1.3").unwrap();
        let a = w.put_object("<< /A 1 >>").unwrap();
        w.write_object(PAGES_ROOT_ID, "<< /Type /Pages /Kids [] /Count 0 >>").unwrap();
        w.write_object(RESOURCES_ID, "<< >>").unwrap();
        let b = w.put_object("<< /Type /Catalog /Pages 1 0 R >>").unwrap();
        assert_eq!((a, b), (3, 4));

        let pdf = w.finish(b, None).unwrap();
        let xref = find(&pdf, b"xref\n").unwrap();
        let table = String::from_utf8_lossy(&pdf[xref..]).to_string();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[1], "0 5");
        assert_eq!(lines[2], "0000000000 65535 f ");
        for id in 1..5usize {
            let offset: usize = lines[2 + id][..10].parse().unwrap();
            let marker = format!("{} 0 obj", id);
            assert!(pdf[offset..].starts_with(marker.as_bytes()), "object {}", id);
        }
        assert!(table.contains("trailer\n<< /Size 5 /Root 4 0 R >>"));
        assert!(pdf.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn test_objects_must_be_sequential_and_write_once() {
        let mut w = PdfWriter::new(false);
        assert!(matches!(w.begin_obj(5), Err(FolioError::State(_))));
        w.write_object(RESOURCES_ID, "<< >>").unwrap();
        assert!(matches!(w.write_object(RESOURCES_ID, "<< >>"), Err(FolioError::State(_))));
        w.begin_obj(3).unwrap();
        assert!(matches!(w.begin_obj(4), Err(FolioError::State(_))));
    }

    #[test]
    fn test_missing_reserved_object_is_format_error() {
        let mut w = PdfWriter::new(false);
        w.header("1.3").unwrap();
        w.write_object(RESOURCES_ID, "<< >>").unwrap();
        let catalog = w.put_object("<< /Type /Catalog >>").unwrap();
        assert!(matches!(w.finish(catalog, None), Err(FolioError::Format(_))));
    }

    #[test]
    fn test_stream_length_uncompressed() {
        let mut w = PdfWriter::new(false);
        w.put_stream_object("", b"0 0 m 10 10 l S").unwrap();
        let out = w.bytes();
        assert!(find(out, b"<< /Length 15 >>\nstream\n0 0 m 10 10 l S\nendstream\n").is_some());
    }

    #[test]
    fn test_stream_compressed_inflates_back() {
        let mut w = PdfWriter::new(true);
        let payload = b"BT /F1 12.00 Tf 72.00 720.00 Td (Hello) Tj ET".repeat(10);
        w.put_stream_object("/Length1 42", &payload).unwrap();
        let out = w.bytes().to_vec();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("<< /Length1 42 /Filter /FlateDecode /Length "));

        let start = find(&out, b"stream\n").unwrap() + 7;
        let end = find(&out, b"\nendstream").unwrap();
        let inflated = miniz_oxide::inflate::decompress_to_vec_zlib(&out[start..end]).unwrap();
        assert_eq!(inflated, payload);
    }
}
