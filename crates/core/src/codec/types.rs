//! Types for the codec module.

use bytes::Bytes;
use image::DynamicImage;
use std::fmt;

pub const JPEG_MIME: &str = "image/jpeg";

/// An in-memory file: a name, a MIME type and its bytes.
#[derive(Clone)]
pub struct ImageFile {
    pub name: String,
    pub mime: String,
    pub data: Bytes,
    /// Last-modified time in epoch milliseconds, when the origin reported one.
    pub last_modified_ms: Option<i64>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data: data.into(),
            last_modified_ms: None,
        }
    }

    pub fn with_last_modified(mut self, epoch_ms: i64) -> Self {
        self.last_modified_ms = Some(epoch_ms);
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether the MIME type can carry an EXIF block.
    pub fn is_jpeg(&self) -> bool {
        self.mime.to_ascii_lowercase().contains("jpeg")
    }
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.data.len())
            .field("last_modified_ms", &self.last_modified_ms)
            .finish()
    }
}

/// A decoded raster.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub raster: DynamicImage,
}

impl DecodedImage {
    pub fn new(raster: DynamicImage) -> Self {
        Self { raster }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }
}

/// Encoder output before it is named.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub mime: String,
    pub data: Bytes,
}

/// Name of the converted file: the source stem with a `.jpg` extension.
pub fn output_name(source_name: &str) -> String {
    match source_name.rfind('.') {
        Some(index) => format!("{}.jpg", &source_name[..index]),
        None => format!("{}.jpg", source_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name_replaces_extension() {
        assert_eq!(output_name("IMG_0001.HEIC"), "IMG_0001.jpg");
        assert_eq!(output_name("screen.shot.png"), "screen.shot.jpg");
    }

    #[test]
    fn test_output_name_without_extension() {
        assert_eq!(output_name("photo"), "photo.jpg");
    }

    #[test]
    fn test_is_jpeg_is_case_insensitive() {
        assert!(ImageFile::new("a.jpg", "IMAGE/JPEG", Vec::new()).is_jpeg());
        assert!(!ImageFile::new("a.png", "image/png", Vec::new()).is_jpeg());
    }

    #[test]
    fn test_debug_hides_bytes() {
        let file = ImageFile::new("a.png", "image/png", vec![1u8, 2, 3]);
        let rendered = format!("{:?}", file);
        assert!(rendered.contains("size: 3"));
        assert!(!rendered.contains("[1, 2, 3]"));
    }
}
