//! Image XObject emission.

use std::fmt::Write as FmtWrite;

use miniz_oxide::deflate::compress_to_vec_zlib;

use crate::error::{FolioError, Result};
use crate::image::{ColorSpace, Image};
use crate::pdf::writer::PdfWriter;

/// A registered image, keyed so repeated placements share one XObject.
pub(crate) struct ImageEntry {
    pub key: String,
    pub image: Image,
}

/// Write an image and its soft mask and palette, returning the image's
/// object id. The payload is stored exactly as supplied.
pub(crate) fn put_image(writer: &mut PdfWriter, image: &Image) -> Result<u32> {
    // Alpha samples arrive raw and are always deflated.
    let smask_id = match &image.soft_mask {
        Some(alpha) => {
            let compressed = compress_to_vec_zlib(alpha, 6);
            Some(writer.put_raw_stream_object(
                &format!(
                    "/Type /XObject /Subtype /Image /Width {} /Height {} \
                     /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode",
                    image.width, image.height
                ),
                &compressed,
            )?)
        }
        None => None,
    };

    let color_space = match (&image.color_space, &image.palette) {
        (ColorSpace::Indexed, Some(palette)) => {
            let palette_id = writer.put_stream_object("", palette)?;
            format!("[/Indexed /DeviceRGB {} {} 0 R]", (palette.len() / 3).saturating_sub(1), palette_id)
        }
        (ColorSpace::Indexed, None) => {
            return Err(FolioError::format("indexed image has no palette"))
        }
        (ColorSpace::DeviceGray, _) => "/DeviceGray".to_string(),
        (ColorSpace::DeviceRGB, _) => "/DeviceRGB".to_string(),
        (ColorSpace::DeviceCMYK, _) => "/DeviceCMYK".to_string(),
    };

    let mut entries = format!(
        "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent {}",
        image.width, image.height, color_space, image.bits_per_component
    );
    if image.color_space == ColorSpace::DeviceCMYK && image.invert_cmyk {
        entries.push_str(" /Decode [1 0 1 0 1 0 1 0]");
    }
    if let Some(filter) = &image.filter {
        let _ = write!(entries, " /Filter /{}", filter);
    }
    if let Some(parms) = &image.decode_parms {
        let _ = write!(entries, " /DecodeParms << {} >>", parms);
    }
    if let Some(id) = smask_id {
        let _ = write!(entries, " /SMask {} 0 R", id);
    }
    writer.put_raw_stream_object(&entries, &image.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(image: &Image, compress: bool) -> (u32, String) {
        let mut w = PdfWriter::new(compress);
        let id = put_image(&mut w, image).unwrap();
        (id, String::from_utf8_lossy(w.bytes()).to_string())
    }

    #[test]
    fn test_rgb_image_is_not_recompressed() {
        let image = Image::raw(2, 1, ColorSpace::DeviceRGB, vec![255, 0, 0, 0, 255, 0]).unwrap();
        let (id, text) = output(&image, true);
        assert_eq!(id, 3);
        assert!(text.contains("/ColorSpace /DeviceRGB /BitsPerComponent 8 /Length 6 >>"));
        assert!(!text.contains("FlateDecode"));
    }

    #[test]
    fn test_soft_mask_written_first() {
        let image = Image::raw(1, 1, ColorSpace::DeviceGray, vec![0])
            .unwrap()
            .with_soft_mask(vec![128])
            .unwrap();
        let (id, text) = output(&image, false);
        assert_eq!(id, 4);
        assert!(text.starts_with("3 0 obj\n<< /Type /XObject /Subtype /Image /Width 1 /Height 1 /ColorSpace /DeviceGray"));
        assert!(text.contains("/SMask 3 0 R"));
    }

    #[test]
    fn test_indexed_palette_object() {
        let image = Image::indexed(2, 1, vec![255, 0, 0, 0, 0, 255], vec![0, 1]).unwrap();
        let (id, text) = output(&image, false);
        assert_eq!(id, 4);
        assert!(text.contains("/ColorSpace [/Indexed /DeviceRGB 1 3 0 R]"));
    }

    #[test]
    fn test_inverted_cmyk_decode_array() {
        let mut image = Image::raw(1, 1, ColorSpace::DeviceCMYK, vec![0, 0, 0, 0]).unwrap();
        image.invert_cmyk = true;
        image.filter = Some("DCTDecode".into());
        let (_, text) = output(&image, true);
        assert!(text.contains("/Decode [1 0 1 0 1 0 1 0] /Filter /DCTDecode"));
    }
}
