//! Captured frames and the PNG codec

use async_trait::async_trait;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::path::PathBuf;

use crate::error::{Result, ScanError};

/// An RGB8 image, row-major, three bytes per pixel.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(ScanError::InvalidImage(format!(
                "{}x{} RGB frame needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Encode a frame as PNG.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            &frame.pixels,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| ScanError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode any supported image (PNG, JPEG) into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| ScanError::InvalidImage(e.to_string()))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    Frame::new(width, height, image.into_raw())
}

/// Something that yields frames: a camera driver, a file, a test fixture.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Result<Frame>;

    fn describe(&self) -> String;
}

/// Reads a still image from disk on every capture.
#[derive(Debug, Clone)]
pub struct ImageFileSource {
    path: PathBuf,
}

impl ImageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FrameSource for ImageFileSource {
    async fn capture(&self) -> Result<Frame> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ScanError::Capture(format!("{}: {}", self.path.display(), e)))?;
        let frame = tokio::task::spawn_blocking(move || decode_image(&bytes)).await??;
        tracing::info!(
            source = %self.path.display(),
            width = frame.width(),
            height = frame.height(),
            "Frame captured"
        );
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::gradient;

    #[test]
    fn test_frame_size_checked() {
        assert!(Frame::new(2, 2, vec![0; 12]).is_ok());
        assert!(Frame::new(2, 2, vec![0; 11]).is_err());
        assert!(Frame::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_png_encode_decode() {
        let frame = gradient(8, 4);
        let png = encode_png(&frame).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = decode_image(&png).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_decode_garbage_is_invalid_image() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ScanError::InvalidImage(_)));
    }

    #[tokio::test]
    async fn test_image_file_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("still.png");
        std::fs::write(&path, encode_png(&gradient(3, 3)).unwrap()).unwrap();

        let source = ImageFileSource::new(&path);
        let frame = source.capture().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 3));
        assert!(source.describe().starts_with("file:"));

        let missing = ImageFileSource::new(dir.path().join("missing.png"));
        assert!(matches!(
            missing.capture().await.unwrap_err(),
            ScanError::Capture(_)
        ));
    }
}
