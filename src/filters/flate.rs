//! FlateDecode (zlib/deflate).
//!
//! The workhorse filter. Inflation is chunked so the decompression budget
//! and decode deadline are enforced while output grows, not after. Damaged
//! streams fall back from zlib to raw deflate, and partial output is kept
//! when the tail of a stream is corrupt, which matches how the rest of the
//! ecosystem treats real-world files.

use super::{DecodeBudget, StreamFilter, apply_predictor};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::Dictionary;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// `FlateDecode` filter.
pub struct FlateFilter;

impl StreamFilter for FlateFilter {
    fn name(&self) -> &'static str {
        "FlateDecode"
    }

    fn decode(
        &self,
        ctx: &Context,
        input: &[u8],
        params: &Dictionary,
        budget: &DecodeBudget,
    ) -> Result<Vec<u8>> {
        let inflated = inflate(ctx, input, budget)?;
        apply_predictor(inflated, params)
    }
}

/// Inflate with budget enforcement and a raw-deflate fallback.
fn inflate(ctx: &Context, input: &[u8], budget: &DecodeBudget) -> Result<Vec<u8>> {
    match read_bounded(ctx, ZlibDecoder::new(input), budget) {
        Ok(out) => Ok(out),
        Err(ReadError::Fatal(e)) => Err(e),
        Err(ReadError::Corrupt { partial, source }) => {
            if !partial.is_empty() {
                log::warn!(
                    "FlateDecode: kept {} bytes before corruption: {}",
                    partial.len(),
                    source
                );
                return Ok(partial);
            }
            // Some producers write raw deflate without the zlib wrapper.
            log::debug!("FlateDecode: zlib failed ({}), trying raw deflate", source);
            match read_bounded(ctx, DeflateDecoder::new(input), budget) {
                Ok(out) => Ok(out),
                Err(ReadError::Fatal(e)) => Err(e),
                Err(ReadError::Corrupt { partial, .. }) if !partial.is_empty() => {
                    log::warn!(
                        "FlateDecode: raw deflate kept {} bytes before corruption",
                        partial.len()
                    );
                    Ok(partial)
                }
                Err(ReadError::Corrupt { .. }) => Err(Error::FilterFailed {
                    name: "FlateDecode".to_string(),
                    reason: source,
                }),
            }
        }
    }
}

enum ReadError {
    /// Budget or cancellation; propagate as-is.
    Fatal(Error),
    /// Stream damage; the caller decides what to do with the partial data.
    Corrupt { partial: Vec<u8>, source: String },
}

fn read_bounded<R: Read>(
    ctx: &Context,
    mut reader: R,
    budget: &DecodeBudget,
) -> std::result::Result<Vec<u8>, ReadError> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    loop {
        if let Err(e) = ctx.check().and_then(|_| budget.check_time()) {
            return Err(ReadError::Fatal(e));
        }
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(out),
            Ok(n) => {
                out.extend_from_slice(&chunk[..n]);
                if let Err(e) = budget.check_size(out.len()) {
                    return Err(ReadError::Fatal(e));
                }
            }
            Err(e) => {
                return Err(ReadError::Corrupt {
                    partial: out,
                    source: e.to_string(),
                });
            }
        }
    }
}
