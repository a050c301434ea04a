//! Test fixtures and helper functions.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use crate::codec::ImageFile;

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 40 % 256) as u8, (y * 40 % 256) as u8, 128])
    })
}

/// A small PNG with a gradient fill.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .expect("in-memory PNG encoding");
    out.into_inner()
}

/// A small baseline JPEG without any EXIF block.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 90))
        .expect("in-memory JPEG encoding");
    out.into_inner()
}

/// A PNG source file of exactly `size` bytes as far as size accounting goes.
///
/// The bytes are opaque filler; pair it with `MockCodec`, which never looks
/// at them.
pub fn opaque_source(name: &str, size: usize) -> ImageFile {
    ImageFile::new(name, "image/png", vec![0u8; size]).with_last_modified(1_700_000_000_000)
}

/// A decodable PNG source file.
pub fn png_source(name: &str) -> ImageFile {
    ImageFile::new(name, "image/png", png_bytes(8, 8)).with_last_modified(1_700_000_000_000)
}
