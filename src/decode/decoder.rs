use image::{DynamicImage, ImageFormat};
use tracing::trace;

use crate::decode::error::DecodeError;

/// Bytes needed before the format can be sniffed reliably.
const SNIFF_LEN: usize = 16;

/// Accepts an image piecewise and yields it once the stream ends.
pub trait IncrementalDecoder {
    /// Feed the next run of bytes. An error means the stream can't be an image
    /// this decoder understands; no further writes should follow.
    fn write(&mut self, data: &[u8]) -> Result<(), DecodeError>;

    /// End of stream.
    fn close(self: Box<Self>) -> Result<DynamicImage, DecodeError>;

    /// Throw away whatever was buffered.
    fn abort(self: Box<Self>);
}

/// Buffers the stream and hands it to the `image` crate at close.
#[derive(Debug, Default)]
pub struct ImageCrateDecoder {
    buf: Vec<u8>,
    format: Option<ImageFormat>,
}

impl ImageCrateDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    fn sniff(&mut self) -> Result<(), DecodeError> {
        if self.format.is_some() || self.buf.len() < SNIFF_LEN {
            return Ok(());
        }
        let format = image::guess_format(&self.buf).map_err(|_| DecodeError::UnknownFormat)?;
        trace!(?format, "image format detected");
        self.format = Some(format);
        Ok(())
    }
}

impl IncrementalDecoder for ImageCrateDecoder {
    fn write(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        self.buf.extend_from_slice(data);
        self.sniff()
    }

    fn close(self: Box<Self>) -> Result<DynamicImage, DecodeError> {
        let this = *self;
        if this.buf.is_empty() {
            return Err(DecodeError::Empty);
        }
        let format = match this.format {
            Some(format) => format,
            None => image::guess_format(&this.buf).map_err(|_| DecodeError::Truncated(this.buf.len()))?,
        };
        Ok(image::load_from_memory_with_format(&this.buf, format)?)
    }

    fn abort(self: Box<Self>) {
        trace!(buffered = self.buf.len(), "decoder aborted");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0x80]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_png_fed_byte_by_byte() {
        let bytes = png_bytes(7, 5);
        let mut dec: Box<dyn IncrementalDecoder> = Box::new(ImageCrateDecoder::new());
        for b in &bytes {
            dec.write(std::slice::from_ref(b)).unwrap();
        }
        let img = dec.close().unwrap();
        assert_eq!((img.width(), img.height()), (7, 5));
    }

    #[test]
    fn format_known_after_sniff_window() {
        let bytes = png_bytes(2, 2);
        let mut dec = ImageCrateDecoder::new();
        dec.write(&bytes[..SNIFF_LEN - 1]).unwrap();
        assert_eq!(dec.format(), None);
        dec.write(&bytes[SNIFF_LEN - 1..SNIFF_LEN]).unwrap();
        assert_eq!(dec.format(), Some(ImageFormat::Png));
    }

    #[test]
    fn garbage_is_rejected_on_write() {
        let mut dec = ImageCrateDecoder::new();
        let err = dec.write(b"this is plainly not an image at all").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownFormat));
    }

    #[test]
    fn closing_without_data_is_empty() {
        let dec: Box<dyn IncrementalDecoder> = Box::new(ImageCrateDecoder::new());
        assert!(matches!(dec.close(), Err(DecodeError::Empty)));
    }

    #[test]
    fn short_unknown_stream_is_truncated() {
        let mut dec: Box<dyn IncrementalDecoder> = Box::new(ImageCrateDecoder::new());
        dec.write(b"abc").unwrap();
        assert!(matches!(dec.close(), Err(DecodeError::Truncated(3))));
    }

    #[test]
    fn cut_off_png_fails_in_the_image_crate() {
        let bytes = png_bytes(16, 16);
        let mut dec: Box<dyn IncrementalDecoder> = Box::new(ImageCrateDecoder::new());
        dec.write(&bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(dec.close(), Err(DecodeError::Image(_))));
    }
}
