//! Predictor post-processing for Flate and LZW streams.
//!
//! The PNG predictor family (values 10-15) prefixes every row with a filter
//! tag byte consumed per standard PNG rules; the declared predictor value
//! only selects the family, each row's tag picks the actual algorithm.
//! Predictor 2 is TIFF component-wise horizontal prediction.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

/// Parameters steering prediction, from a filter's decode-parms dictionary.
#[derive(Debug, Clone, Copy)]
pub struct PredictorParams {
    /// 1 = none, 2 = TIFF, 10-15 = PNG family.
    pub predictor: i64,
    /// Color components per sample.
    pub colors: usize,
    /// Bits per component.
    pub bits_per_component: usize,
    /// Samples per row.
    pub columns: usize,
}

impl PredictorParams {
    /// Read `/Predictor`, `/Colors`, `/BitsPerComponent`, `/Columns` with
    /// their spec defaults.
    pub fn from_dict(params: &Dictionary) -> Self {
        let int = |key: &str, default: i64| {
            params.get(key).and_then(Object::as_integer).unwrap_or(default)
        };
        Self {
            predictor: int("Predictor", 1),
            colors: int("Colors", 1).max(0) as usize,
            bits_per_component: int("BitsPerComponent", 8).max(0) as usize,
            columns: int("Columns", 1).max(0) as usize,
        }
    }

    /// Bytes per complete pixel, at least one.
    fn bytes_per_pixel(&self) -> usize {
        ((self.colors * self.bits_per_component) / 8).max(1)
    }

    /// Bytes of sample data per row.
    fn bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }
}

/// Undo the predictor declared in `params`, if any.
pub fn apply_predictor(data: Vec<u8>, params: &Dictionary) -> Result<Vec<u8>> {
    let p = PredictorParams::from_dict(params);
    match p.predictor {
        1 => Ok(data),
        2 => decode_tiff(&data, &p),
        10..=15 => decode_png(&data, &p),
        other => Err(Error::PredictorInvalid(format!("predictor {}", other))),
    }
}

/// TIFF predictor 2: add the sample `colors` positions to the left.
fn decode_tiff(data: &[u8], p: &PredictorParams) -> Result<Vec<u8>> {
    if p.bits_per_component != 8 {
        return Err(Error::PredictorInvalid(format!(
            "TIFF predictor with {} bits per component",
            p.bits_per_component
        )));
    }
    let row_len = p.bytes_per_row();
    if row_len == 0 || data.len() % row_len != 0 {
        return Err(Error::PredictorInvalid(format!(
            "data length {} is not a whole number of {}-byte rows",
            data.len(),
            row_len
        )));
    }

    let mut out = Vec::with_capacity(data.len());
    for row in data.chunks_exact(row_len) {
        let row_start = out.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= p.colors {
                out[row_start + i - p.colors]
            } else {
                0
            };
            out.push(byte.wrapping_add(left));
        }
    }
    Ok(out)
}

/// PNG predictors: every row carries a tag byte selecting
/// None/Sub/Up/Average/Paeth for that row.
fn decode_png(data: &[u8], p: &PredictorParams) -> Result<Vec<u8>> {
    let row_len = p.bytes_per_row();
    let stride = row_len + 1;
    if row_len == 0 || data.len() % stride != 0 {
        return Err(Error::PredictorInvalid(format!(
            "data length {} is not a whole number of {}-byte tagged rows",
            data.len(),
            stride
        )));
    }

    let bpp = p.bytes_per_pixel();
    let mut out = Vec::with_capacity((data.len() / stride) * row_len);
    let mut prev_row = vec![0u8; row_len];

    for tagged in data.chunks_exact(stride) {
        let tag = tagged[0];
        let row = &tagged[1..];
        let mut decoded = vec![0u8; row_len];

        match tag {
            0 => decoded.copy_from_slice(row),
            1 => {
                // Sub
                for i in 0..row_len {
                    let left = if i >= bpp { decoded[i - bpp] } else { 0 };
                    decoded[i] = row[i].wrapping_add(left);
                }
            }
            2 => {
                // Up
                for i in 0..row_len {
                    decoded[i] = row[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                // Average
                for i in 0..row_len {
                    let left = if i >= bpp { decoded[i - bpp] as u16 } else { 0 };
                    let up = prev_row[i] as u16;
                    decoded[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                // Paeth
                for i in 0..row_len {
                    let left = if i >= bpp { decoded[i - bpp] as i16 } else { 0 };
                    let up = prev_row[i] as i16;
                    let up_left = if i >= bpp { prev_row[i - bpp] as i16 } else { 0 };
                    decoded[i] = row[i].wrapping_add(paeth(left, up, up_left) as u8);
                }
            }
            other => {
                return Err(Error::PredictorInvalid(format!("PNG row tag {}", other)));
            }
        }

        out.extend_from_slice(&decoded);
        prev_row = decoded;
    }
    Ok(out)
}

/// Paeth selector from the PNG specification.
fn paeth(a: i16, b: i16, c: i16) -> i16 {
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
