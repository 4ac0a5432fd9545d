//! # Binary I/O Helpers
//!
//! Big-endian reading and writing for sfnt data. Reads go through an explicit
//! [`Reader`] cursor over a borrowed slice, so every parse step can be run
//! against in-memory buffers and a truncated table surfaces as a
//! [`FolioError::Format`] instead of a panic.

use std::fmt;

use crate::error::{FolioError, Result};

/// A 4-byte sfnt table tag such as `glyf` or `OS/2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag([u8; 4]);

impl Tag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Tag(*bytes)
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0
    }

    pub fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Cursor over a byte slice. All reads are bounds-checked.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Start reading at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n);
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                FolioError::format(format!(
                    "unexpected end of data: wanted {} bytes at offset {}, have {}",
                    n,
                    self.pos,
                    self.data.len()
                ))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_array().map(i16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_be_bytes)
    }

    pub fn read_tag(&mut self) -> Result<Tag> {
        self.read_array().map(Tag)
    }

    /// 16.16 fixed-point number as used by `post.italicAngle`.
    pub fn read_fixed(&mut self) -> Result<f64> {
        let raw = self.read_array().map(i32::from_be_bytes)?;
        Ok(raw as f64 / 65536.0)
    }
}

/// Append-only big-endian writers for building tables.
pub trait WriteBe {
    fn put_u16(&mut self, v: u16);
    fn put_i16(&mut self, v: i16);
    fn put_u32(&mut self, v: u32);
}

impl WriteBe for Vec<u8> {
    fn put_u16(&mut self, v: u16) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_i16(&mut self, v: i16) {
        self.extend_from_slice(&v.to_be_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_be_bytes());
    }
}

/// Overwrite a big-endian u16 in place.
pub fn set_u16(data: &mut [u8], offset: usize, val: u16) -> Result<()> {
    let slot = data
        .get_mut(offset..offset.saturating_add(2))
        .ok_or_else(|| FolioError::format(format!("patch offset {} out of range", offset)))?;
    slot.copy_from_slice(&val.to_be_bytes());
    Ok(())
}

/// Overwrite a big-endian u32 in place.
pub fn set_u32(data: &mut [u8], offset: usize, val: u32) -> Result<()> {
    let slot = data
        .get_mut(offset..offset.saturating_add(4))
        .ok_or_else(|| FolioError::format(format!("patch offset {} out of range", offset)))?;
    slot.copy_from_slice(&val.to_be_bytes());
    Ok(())
}

/// Zero-pad to a 4-byte boundary.
pub fn pad4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

/// sfnt checksum.
///
/// Each 4-byte group is summed as two big-endian 16-bit words into separate
/// high and low accumulators; the low carry is folded into the high word. A
/// trailing partial group is treated as zero-padded.
pub fn checksum(data: &[u8]) -> u32 {
    let mut hi: u32 = 0;
    let mut lo: u32 = 0;
    for group in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..group.len()].copy_from_slice(group);
        hi += u16::from_be_bytes([word[0], word[1]]) as u32;
        lo += u16::from_be_bytes([word[2], word[3]]) as u32;
        hi += lo >> 16;
        lo &= 0xFFFF;
        hi &= 0xFFFF;
    }
    (hi << 16) | lo
}

/// `searchRange`/`entrySelector`/`rangeShift` triple for binary-searchable
/// headers (table directory, cmap format 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchRange {
    pub search_range: u16,
    pub entry_selector: u16,
    pub range_shift: u16,
}

impl SearchRange {
    pub fn compute(count: usize, unit: usize) -> Self {
        let mut entry_selector = 0u16;
        while count >> (entry_selector + 1) > 0 {
            entry_selector += 1;
        }
        let search_range = (1usize << entry_selector) * unit;
        let range_shift = (count * unit).saturating_sub(search_range);
        SearchRange {
            search_range: search_range as u16,
            entry_selector,
            range_shift: range_shift as u16,
        }
    }
}
