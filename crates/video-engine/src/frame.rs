use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ColorType, ImageFormat, RgbaImage};

use crate::error::{EngineError, Result};

/// Decoded RGBA8 image; cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<[u8]>,
}

impl RawImage {
    /// Wraps a tightly packed RGBA buffer, checking its length.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(EngineError::invalid(
                "image",
                format!(
                    "expected {expected} bytes for {width}x{height}, got {}",
                    rgba.len()
                ),
            ));
        }
        Ok(Self {
            width,
            height,
            rgba: rgba.into(),
        })
    }

    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Downscales so the longest side is at most `max_side`, keeping aspect ratio.
    ///
    /// Images that already fit are returned unchanged.
    ///
    /// # Example
    /// ```
    /// use video_engine::RawImage;
    ///
    /// let image = RawImage::new(640, 360, vec![0; 640 * 360 * 4]).expect("valid");
    /// let scaled = image.scaled_to_fit(320).expect("scale");
    /// assert_eq!((scaled.width, scaled.height), (320, 180));
    /// ```
    pub fn scaled_to_fit(&self, max_side: u32) -> Result<Self> {
        if max_side == 0 || self.longest_side() <= max_side {
            return Ok(self.clone());
        }
        let (width, height) = media_ffmpeg::fit_within(self.width, self.height, max_side);
        let source = RgbaImage::from_raw(self.width, self.height, self.rgba.to_vec())
            .ok_or_else(|| EngineError::invalid("image", "buffer does not match dimensions"))?;
        let resized = imageops::resize(&source, width, height, FilterType::Triangle);
        Ok(Self {
            width,
            height,
            rgba: resized.into_raw().into(),
        })
    }

    /// Encodes the image as PNG at `path`.
    pub fn write_png(&self, path: &Path) -> Result<()> {
        image::save_buffer_with_format(
            path,
            &self.rgba,
            self.width,
            self.height,
            ColorType::Rgba8,
            ImageFormat::Png,
        )?;
        Ok(())
    }
}

impl From<media_ffmpeg::DecodedVideoFrame> for RawImage {
    fn from(value: media_ffmpeg::DecodedVideoFrame) -> Self {
        Self {
            width: value.width,
            height: value.height,
            rgba: value.rgba.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RawImage;

    #[test]
    fn new_rejects_mismatched_buffer() {
        assert!(RawImage::new(2, 2, vec![0; 15]).is_err());
        assert!(RawImage::new(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn scaled_to_fit_handles_portrait_and_never_upscales() {
        let portrait = RawImage::new(90, 160, vec![255; 90 * 160 * 4]).expect("valid");
        let scaled = portrait.scaled_to_fit(80).expect("scale");
        assert_eq!((scaled.width, scaled.height), (45, 80));
        assert_eq!(scaled.rgba.len(), 45 * 80 * 4);

        let small = portrait.scaled_to_fit(320).expect("scale");
        assert_eq!(small, portrait);
    }

    #[test]
    fn write_png_round_trips_dimensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cover.png");
        let image = RawImage::new(4, 3, vec![128; 4 * 3 * 4]).expect("valid");

        image.write_png(&path).expect("write");

        let decoded = image::open(&path).expect("open").to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
    }
}
