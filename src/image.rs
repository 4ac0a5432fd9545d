//! # Images
//!
//! The serializer embeds images without interpreting their pixels. Decoders
//! live outside this crate and hand over an [`Image`]: dimensions, colour
//! space, bits per component, the filter the payload is already encoded
//! with, and optional palette and soft-mask data.
//!
//! [`JpegLoader`] is the one loader shipped here. JPEG needs no decoding to
//! embed (PDF reads it with `DCTDecode`), so it only scans the frame header.

use std::path::Path;

use crate::binary::Reader;
use crate::error::{FolioError, Result};

/// PDF colour spaces an image can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    /// Palette-based; the palette is RGB triplets in [`Image::palette`].
    Indexed,
}

impl ColorSpace {
    pub fn components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray | ColorSpace::Indexed => 1,
            ColorSpace::DeviceRGB => 3,
            ColorSpace::DeviceCMYK => 4,
        }
    }
}

/// An image ready to embed as an `/XObject`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    pub bits_per_component: u8,
    /// Filter the payload is already encoded with, e.g. `DCTDecode`.
    pub filter: Option<String>,
    /// Raw `/DecodeParms` dictionary body, e.g. `/Predictor 15 /Colors 3`.
    pub decode_parms: Option<String>,
    pub data: Vec<u8>,
    /// RGB triplets for [`ColorSpace::Indexed`].
    pub palette: Option<Vec<u8>>,
    /// Uncompressed 8-bit alpha samples, one per pixel.
    pub soft_mask: Option<Vec<u8>>,
    /// CMYK samples are stored inverted (Adobe JPEG).
    pub invert_cmyk: bool,
}

impl Image {
    /// Uncompressed samples. The serializer stores them as given.
    pub fn raw(width: u32, height: u32, color_space: ColorSpace, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * color_space.components();
        if data.len() != expected {
            return Err(FolioError::format(format!(
                "{}x{} {:?} image needs {} bytes, got {}",
                width,
                height,
                color_space,
                expected,
                data.len()
            )));
        }
        Ok(Image {
            width,
            height,
            color_space,
            bits_per_component: 8,
            filter: None,
            decode_parms: None,
            data,
            palette: None,
            soft_mask: None,
            invert_cmyk: false,
        })
    }

    /// Palette image with one index byte per pixel.
    pub fn indexed(width: u32, height: u32, palette: Vec<u8>, indices: Vec<u8>) -> Result<Self> {
        if palette.is_empty() || palette.len() % 3 != 0 || palette.len() > 256 * 3 {
            return Err(FolioError::format(format!(
                "palette must hold 1-256 RGB entries, got {} bytes",
                palette.len()
            )));
        }
        let entries = palette.len() / 3;
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= entries) {
            return Err(FolioError::format(format!(
                "palette index {} out of range ({} entries)",
                bad, entries
            )));
        }
        let mut image = Image::raw(width, height, ColorSpace::Indexed, indices)?;
        image.palette = Some(palette);
        Ok(image)
    }

    /// Attach an alpha channel.
    pub fn with_soft_mask(mut self, alpha: Vec<u8>) -> Result<Self> {
        let expected = self.width as usize * self.height as usize;
        if alpha.len() != expected {
            return Err(FolioError::format(format!(
                "soft mask needs {} bytes, got {}",
                expected,
                alpha.len()
            )));
        }
        self.soft_mask = Some(alpha);
        Ok(self)
    }

    /// Wrap JPEG bytes, reading size and component count from the frame
    /// header.
    pub fn from_jpeg(data: Vec<u8>) -> Result<Self> {
        let frame = scan_jpeg(&data)?;
        let color_space = match frame.components {
            1 => ColorSpace::DeviceGray,
            3 => ColorSpace::DeviceRGB,
            4 => ColorSpace::DeviceCMYK,
            n => {
                return Err(FolioError::format(format!(
                    "JPEG with {} components is not supported",
                    n
                )))
            }
        };
        Ok(Image {
            width: frame.width as u32,
            height: frame.height as u32,
            color_space,
            bits_per_component: frame.precision,
            filter: Some("DCTDecode".to_string()),
            decode_parms: None,
            data,
            palette: None,
            soft_mask: None,
            invert_cmyk: color_space == ColorSpace::DeviceCMYK && frame.adobe,
        })
    }

    pub fn has_soft_mask(&self) -> bool {
        self.soft_mask.is_some()
    }
}

/// Something that can turn a file into an [`Image`].
pub trait ImageLoader {
    fn load(&self, path: &Path) -> Result<Image>;
}

/// Loads JPEG files for pass-through embedding.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegLoader;

impl ImageLoader for JpegLoader {
    fn load(&self, path: &Path) -> Result<Image> {
        let data = std::fs::read(path)?;
        Image::from_jpeg(data)
    }
}

struct JpegFrame {
    width: u16,
    height: u16,
    precision: u8,
    components: u8,
    adobe: bool,
}

/// Walk the marker segments up to the first SOF.
fn scan_jpeg(data: &[u8]) -> Result<JpegFrame> {
    let mut r = Reader::new(data);
    if r.read_u16()? != 0xFFD8 {
        return Err(FolioError::format("not a JPEG file (missing SOI marker)"));
    }
    let mut adobe = false;
    loop {
        let mut marker = r.read_u16()?;
        while marker == 0xFFFF {
            // Fill bytes before a marker.
            marker = 0xFF00 | r.read_u8()? as u16;
        }
        if marker >> 8 != 0xFF {
            return Err(FolioError::format(format!(
                "corrupt JPEG: expected a marker at offset {}",
                r.position() - 2
            )));
        }
        if matches!(marker & 0xFF, 0xD9 | 0xDA) {
            return Err(FolioError::format("JPEG has no frame header before scan data"));
        }
        let length = r.read_u16()? as usize;
        if length < 2 {
            return Err(FolioError::format("corrupt JPEG: segment length below 2"));
        }
        let segment = r.read_bytes(length - 2)?;
        match marker & 0xFF {
            0xEE if segment.starts_with(b"Adobe") => adobe = true,
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                let mut s = Reader::new(segment);
                let precision = s.read_u8()?;
                let height = s.read_u16()?;
                let width = s.read_u16()?;
                let components = s.read_u8()?;
                if width == 0 || height == 0 {
                    return Err(FolioError::format("JPEG frame has zero size"));
                }
                return Ok(JpegFrame {
                    width,
                    height,
                    precision,
                    components,
                    adobe,
                });
            }
            _ => {}
        }
    }
}
