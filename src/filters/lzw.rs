//! LZWDecode.
//!
//! PDF's LZW is MSB-first, 9-bit initial codes, clear code 256, EOD 257,
//! and `EarlyChange` defaulting to 1 (the code width grows one code earlier
//! than in plain LZW). The weezl decoder handles the common case; a small
//! fallback decoder covers streams weezl rejects.

use super::{DecodeBudget, StreamFilter, apply_predictor};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use weezl::{BitOrder, decode::Decoder as WeezlDecoder};

const CLEAR_CODE: u16 = 256;
const EOD_CODE: u16 = 257;
const MAX_CODE_BITS: u8 = 12;

/// `LZWDecode` filter.
pub struct LzwFilter;

impl StreamFilter for LzwFilter {
    fn name(&self) -> &'static str {
        "LZWDecode"
    }

    fn decode(
        &self,
        ctx: &Context,
        input: &[u8],
        params: &Dictionary,
        budget: &DecodeBudget,
    ) -> Result<Vec<u8>> {
        let early_change = params
            .get("EarlyChange")
            .and_then(Object::as_integer)
            .unwrap_or(1)
            != 0;

        let expanded = match decode_weezl(input, early_change) {
            Ok(out) => out,
            Err(weezl_err) => {
                log::debug!("LZWDecode: weezl failed ({}), using fallback", weezl_err);
                decode_fallback(ctx, input, early_change, budget)?
            }
        };
        budget.check_size(expanded.len())?;
        apply_predictor(expanded, params)
    }
}

fn decode_weezl(input: &[u8], early_change: bool) -> std::result::Result<Vec<u8>, String> {
    let mut decoder = if early_change {
        // TIFF-style size switching is the EarlyChange=1 behavior.
        WeezlDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        WeezlDecoder::new(BitOrder::Msb, 8)
    };
    decoder
        .decode(input)
        .map_err(|e| format!("{:?}", e))
}

/// MSB-first bit reader.
struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn read(&mut self, bits: u8) -> Option<u16> {
        let mut value = 0u16;
        for _ in 0..bits {
            let byte = *self.data.get(self.bit_pos / 8)?;
            let bit = (byte >> (7 - (self.bit_pos % 8))) & 1;
            value = (value << 1) | bit as u16;
            self.bit_pos += 1;
        }
        Some(value)
    }
}

/// Spec-exact LZW decoder used when weezl refuses the stream.
fn decode_fallback(
    ctx: &Context,
    input: &[u8],
    early_change: bool,
    budget: &DecodeBudget,
) -> Result<Vec<u8>> {
    let fail = |reason: String| Error::FilterFailed {
        name: "LZWDecode".to_string(),
        reason,
    };

    // Entries 256/257 are placeholders for the reserved codes.
    let mut table: Vec<Vec<u8>> = (0..=257u16)
        .map(|c| if c < 256 { vec![c as u8] } else { Vec::new() })
        .collect();
    let mut code_bits: u8 = 9;
    let mut prev: Option<u16> = None;
    let mut reader = BitReader::new(input);
    let mut out = Vec::new();

    while let Some(code) = reader.read(code_bits) {
        ctx.check()?;
        if code == EOD_CODE {
            break;
        }
        if code == CLEAR_CODE {
            table.truncate(258);
            code_bits = 9;
            prev = None;
            continue;
        }

        let sequence: Vec<u8> = if (code as usize) < table.len() {
            if code == CLEAR_CODE || code == EOD_CODE {
                return Err(fail(format!("reserved code {}", code)));
            }
            table[code as usize].clone()
        } else if code as usize == table.len() {
            // KwKwK case: the sequence is prev + prev[0].
            let prev_code = prev.ok_or_else(|| fail("dangling first code".to_string()))?;
            let prev_seq = &table[prev_code as usize];
            let mut seq = prev_seq.clone();
            seq.push(prev_seq[0]);
            seq
        } else {
            return Err(fail(format!("code {} beyond table size {}", code, table.len())));
        };

        out.extend_from_slice(&sequence);
        budget.check_size(out.len())?;

        if let Some(prev_code) = prev {
            let mut entry = table[prev_code as usize].clone();
            entry.push(sequence[0]);
            table.push(entry);
        }
        prev = Some(code);

        // Grow the code width, one code early under EarlyChange.
        if code_bits < MAX_CODE_BITS {
            let next_code = table.len();
            let threshold = if early_change {
                (1usize << code_bits) - 1
            } else {
                1usize << code_bits
            };
            if next_code >= threshold {
                code_bits += 1;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weezl::encode::Encoder as WeezlEncoder;

    fn decode(input: &[u8], params: &Dictionary) -> Result<Vec<u8>> {
        LzwFilter.decode(
            &Context::background(),
            input,
            params,
            &DecodeBudget::unlimited(),
        )
    }

    #[test]
    fn test_round_trip_early_change() {
        let data = b"aaaaaaaaaabbbbbbbbbbaaaaaaaaaab";
        let compressed = WeezlEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(data)
            .unwrap();
        let out = decode(&compressed, &Dictionary::new()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_round_trip_no_early_change() {
        let data = b"repeated repeated repeated repeated";
        let compressed = WeezlEncoder::new(BitOrder::Msb, 8).encode(data).unwrap();

        let mut params = Dictionary::new();
        params.insert("EarlyChange".to_string(), Object::Integer(0));
        let out = decode(&compressed, &params).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_fallback_agrees_with_weezl() {
        let data = b"the quick brown fox jumps over the lazy dog the quick brown fox";
        let compressed = WeezlEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(data)
            .unwrap();
        let out = decode_fallback(
            &Context::background(),
            &compressed,
            true,
            &DecodeBudget::unlimited(),
        )
        .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_budget() {
        let data = vec![b'x'; 64 * 1024];
        let compressed = WeezlEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .encode(&data)
            .unwrap();
        let budget = DecodeBudget {
            max_output: 100,
            deadline: None,
        };
        let result = LzwFilter.decode(
            &Context::background(),
            &compressed,
            &Dictionary::new(),
            &budget,
        );
        assert!(matches!(
            result,
            Err(Error::DecompressionBombSuspected { .. })
        ));
    }
}
