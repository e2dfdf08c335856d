//! RunLengthDecode.
//!
//! Length byte 0-127 copies the next `length + 1` bytes literally; 129-255
//! repeats the next byte `257 - length` times; 128 is EOD.

use super::{DecodeBudget, StreamFilter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::Dictionary;

/// `RunLengthDecode` filter.
pub struct RunLengthFilter;

impl StreamFilter for RunLengthFilter {
    fn name(&self) -> &'static str {
        "RunLengthDecode"
    }

    fn decode(
        &self,
        _ctx: &Context,
        input: &[u8],
        _params: &Dictionary,
        budget: &DecodeBudget,
    ) -> Result<Vec<u8>> {
        let fail = |reason: &str| Error::FilterFailed {
            name: "RunLengthDecode".to_string(),
            reason: reason.to_string(),
        };

        let mut out = Vec::new();
        let mut i = 0;
        while i < input.len() {
            let length = input[i];
            i += 1;
            match length {
                128 => return Ok(out),
                0..=127 => {
                    let count = length as usize + 1;
                    let bytes = input
                        .get(i..i + count)
                        .ok_or_else(|| fail("literal run past end of data"))?;
                    out.extend_from_slice(bytes);
                    i += count;
                }
                129..=255 => {
                    let &byte = input.get(i).ok_or_else(|| fail("repeat run past end of data"))?;
                    out.extend(std::iter::repeat(byte).take(257 - length as usize));
                    i += 1;
                }
            }
            budget.check_size(out.len())?;
        }
        // Missing EOD is tolerated; the data simply ended.
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &[u8]) -> Result<Vec<u8>> {
        RunLengthFilter.decode(
            &Context::background(),
            input,
            &Dictionary::new(),
            &DecodeBudget::unlimited(),
        )
    }

    #[test]
    fn test_literal_run() {
        assert_eq!(decode(&[2, b'a', b'b', b'c', 128]).unwrap(), b"abc");
    }

    #[test]
    fn test_repeat_run() {
        // 257 - 254 = 3 copies.
        assert_eq!(decode(&[254, b'x', 128]).unwrap(), b"xxx");
    }

    #[test]
    fn test_mixed_runs() {
        assert_eq!(
            decode(&[1, b'h', b'i', 253, b'-', 0, b'!', 128]).unwrap(),
            b"hi----!"
        );
    }

    #[test]
    fn test_truncated_literal_fails() {
        assert!(decode(&[5, b'a']).is_err());
    }

    #[test]
    fn test_eod_stops_early() {
        assert_eq!(decode(&[0, b'a', 128, 0, b'b']).unwrap(), b"a");
    }
}
