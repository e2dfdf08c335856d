//! ASCIIHexDecode.
//!
//! Pairs of hex digits, whitespace ignored, `>` as EOD. An odd number of
//! digits reads as if a trailing `0` were present.

use super::{DecodeBudget, StreamFilter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::Dictionary;

/// `ASCIIHexDecode` filter.
pub struct AsciiHexFilter;

impl StreamFilter for AsciiHexFilter {
    fn name(&self) -> &'static str {
        "ASCIIHexDecode"
    }

    fn decode(
        &self,
        _ctx: &Context,
        input: &[u8],
        _params: &Dictionary,
        budget: &DecodeBudget,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() / 2);
        let mut pending: Option<u8> = None;

        for &byte in input {
            let digit = match byte {
                b'>' => break,
                b if crate::scanner::is_whitespace(b) => continue,
                b => (b as char).to_digit(16).ok_or_else(|| Error::FilterFailed {
                    name: "ASCIIHexDecode".to_string(),
                    reason: format!("invalid character 0x{:02x}", b),
                })? as u8,
            };
            match pending.take() {
                Some(high) => out.push(high << 4 | digit),
                None => pending = Some(digit),
            }
            budget.check_size(out.len())?;
        }

        if let Some(high) = pending {
            out.push(high << 4);
        }
        Ok(out)
    }
}

/// Encode bytes as uppercase hex with the `>` terminator.
pub fn asciihex_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2 + 1);
    for &byte in data {
        out.extend_from_slice(format!("{:02X}", byte).as_bytes());
    }
    out.push(b'>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &[u8]) -> Result<Vec<u8>> {
        AsciiHexFilter.decode(
            &Context::background(),
            input,
            &Dictionary::new(),
            &DecodeBudget::unlimited(),
        )
    }

    #[test]
    fn test_basic() {
        assert_eq!(decode(b"48656C6C6F>").unwrap(), b"Hello");
    }

    #[test]
    fn test_whitespace_and_case() {
        assert_eq!(decode(b"48 65\n6c 6C 6f>").unwrap(), b"Hello");
    }

    #[test]
    fn test_odd_length_pads_zero() {
        assert_eq!(decode(b"ABC>").unwrap(), vec![0xAB, 0xC0]);
    }

    #[test]
    fn test_missing_eod_tolerated() {
        assert_eq!(decode(b"4142").unwrap(), b"AB");
    }

    #[test]
    fn test_invalid_character() {
        assert!(decode(b"41zz>").is_err());
    }

    #[test]
    fn test_round_trip() {
        let data: Vec<u8> = (0u8..=255).collect();
        assert_eq!(decode(&asciihex_encode(&data)).unwrap(), data);
    }
}
