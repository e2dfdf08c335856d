//! DCTDecode (JPEG), behind the `image-codecs` feature.
//!
//! Dimensions are validated against hard caps before any pixel buffer is
//! allocated: 32768 per side and a ~64 megapixel total budget.

use super::{DecodeBudget, StreamFilter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::Dictionary;
use image::ImageDecoder;
use image::codecs::jpeg::JpegDecoder;
use std::io::Cursor;

/// Largest accepted width or height in pixels.
const MAX_DIMENSION: u32 = 32768;
/// Total pixel budget (64 MP).
const MAX_PIXELS: u64 = 64 * 1024 * 1024;

/// `DCTDecode` filter: decodes JPEG to raw pixel samples.
pub struct DctFilter;

impl StreamFilter for DctFilter {
    fn name(&self) -> &'static str {
        "DCTDecode"
    }

    fn decode(
        &self,
        _ctx: &Context,
        input: &[u8],
        _params: &Dictionary,
        budget: &DecodeBudget,
    ) -> Result<Vec<u8>> {
        let fail = |reason: String| Error::FilterFailed {
            name: "DCTDecode".to_string(),
            reason,
        };

        let decoder = JpegDecoder::new(Cursor::new(input)).map_err(|e| fail(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(fail(format!("image dimensions {}x{} exceed cap", width, height)));
        }
        if width as u64 * height as u64 > MAX_PIXELS {
            return Err(fail(format!(
                "image {}x{} exceeds pixel budget",
                width, height
            )));
        }

        let total = decoder.total_bytes();
        if total > budget.max_output as u64 {
            return Err(Error::DecompressionBombSuspected {
                limit: budget.max_output,
            });
        }

        let mut pixels = vec![0u8; total as usize];
        decoder
            .read_image(&mut pixels)
            .map_err(|e| fail(e.to_string()))?;
        Ok(pixels)
    }
}
