//! Image codec capability.
//!
//! The pipeline only needs two operations from a codec: decode a source file
//! into a raster, and encode a raster as JPEG at a given quality. The default
//! `RasterCodec` does both with the `image` crate on the blocking pool.

mod error;
mod raster;
mod traits;
mod types;

pub use error::CodecError;
pub use raster::RasterCodec;
pub use traits::ImageCodec;
pub use types::{output_name, DecodedImage, EncodedImage, ImageFile, JPEG_MIME};
