//! `image`-crate backed codec.

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

use super::error::CodecError;
use super::traits::ImageCodec;
use super::types::{DecodedImage, EncodedImage, ImageFile, JPEG_MIME};

/// Decodes PNG, JPEG, WebP, GIF, BMP and TIFF; encodes baseline JPEG.
///
/// Work runs on tokio's blocking pool so a large decode never stalls the
/// runtime that drives the queue.
#[derive(Debug, Default, Clone)]
pub struct RasterCodec;

impl RasterCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Maps quality in (0, 1] onto the encoder's 1..=100 scale.
fn encoder_quality(quality: f32) -> u8 {
    if !quality.is_finite() {
        return 100;
    }
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn decode(file: &ImageFile) -> Result<DynamicImage, CodecError> {
    let format = match ImageFormat::from_mime_type(&file.mime) {
        Some(format) => format,
        None => image::guess_format(&file.data).map_err(|_| CodecError::UnsupportedFormat {
            mime: file.mime.clone(),
        })?,
    };
    image::load_from_memory_with_format(&file.data, format)
        .map_err(|e| CodecError::decode(e.to_string()))
}

fn encode(raster: &DynamicImage, quality: u8) -> Result<Vec<u8>, CodecError> {
    // JPEG has no alpha channel; flatten to RGB first.
    let rgb = raster.to_rgb8();
    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| CodecError::encode(e.to_string()))?;
    Ok(out.into_inner())
}

#[async_trait]
impl ImageCodec for RasterCodec {
    fn name(&self) -> &str {
        "raster"
    }

    async fn load_image(&self, file: &ImageFile) -> Result<DecodedImage, CodecError> {
        let file = file.clone();
        let raster = tokio::task::spawn_blocking(move || decode(&file))
            .await
            .map_err(|e| CodecError::Task(e.to_string()))??;
        debug!(
            width = raster.width(),
            height = raster.height(),
            "Decoded source image"
        );
        Ok(DecodedImage::new(raster))
    }

    async fn encode_jpeg(
        &self,
        image: DecodedImage,
        quality: f32,
    ) -> Result<EncodedImage, CodecError> {
        let quality = encoder_quality(quality);
        let data = tokio::task::spawn_blocking(move || encode(&image.raster, quality))
            .await
            .map_err(|e| CodecError::Task(e.to_string()))??;
        Ok(EncodedImage {
            mime: JPEG_MIME.to_string(),
            data: Bytes::from(data),
        })
    }
}
