//! Trait definitions for the codec module.

use async_trait::async_trait;

use super::error::CodecError;
use super::types::{DecodedImage, EncodedImage, ImageFile};

/// Decodes source images and encodes JPEG output.
#[async_trait]
pub trait ImageCodec: Send + Sync {
    /// Returns the name of this codec implementation.
    fn name(&self) -> &str;

    /// Decodes a source file into a raster.
    async fn load_image(&self, file: &ImageFile) -> Result<DecodedImage, CodecError>;

    /// Encodes a raster as JPEG.
    ///
    /// `quality` is in (0, 1]. Implementations report the MIME type they
    /// actually produced; callers must not assume it is `image/jpeg`.
    async fn encode_jpeg(
        &self,
        image: DecodedImage,
        quality: f32,
    ) -> Result<EncodedImage, CodecError>;
}
