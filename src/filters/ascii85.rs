//! ASCII85Decode.
//!
//! Groups of five characters in `!`..`u` encode four bytes base-85; `z`
//! is shorthand for four zero bytes. `~>` ends the data and an optional
//! `<~` may start it. A final partial group of n characters yields n-1
//! bytes. Whitespace is ignored everywhere.

use super::{DecodeBudget, StreamFilter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::Dictionary;

/// `ASCII85Decode` filter.
pub struct Ascii85Filter;

impl StreamFilter for Ascii85Filter {
    fn name(&self) -> &'static str {
        "ASCII85Decode"
    }

    fn decode(
        &self,
        _ctx: &Context,
        input: &[u8],
        _params: &Dictionary,
        budget: &DecodeBudget,
    ) -> Result<Vec<u8>> {
        let fail = |reason: String| Error::FilterFailed {
            name: "ASCII85Decode".to_string(),
            reason,
        };

        let mut data = input;
        if data.starts_with(b"<~") {
            data = &data[2..];
        }

        let mut out = Vec::new();
        let mut group = [0u8; 5];
        let mut group_len = 0;
        let mut i = 0;

        loop {
            let Some(&byte) = data.get(i) else {
                break;
            };
            match byte {
                b'~' => break,
                b'z' if group_len == 0 => {
                    out.extend_from_slice(&[0, 0, 0, 0]);
                    i += 1;
                }
                b'!'..=b'u' => {
                    group[group_len] = byte - b'!';
                    group_len += 1;
                    i += 1;
                    if group_len == 5 {
                        push_group(&mut out, &group, 5).map_err(&fail)?;
                        group_len = 0;
                    }
                }
                b if crate::scanner::is_whitespace(b) => i += 1,
                b => return Err(fail(format!("invalid character 0x{:02x}", b))),
            }
            budget.check_size(out.len())?;
        }

        match group_len {
            0 => {}
            1 => return Err(fail("final group of one character".to_string())),
            n => {
                // Pad with 'u' and keep n-1 bytes.
                for slot in group.iter_mut().skip(n) {
                    *slot = 84;
                }
                push_group(&mut out, &group, n).map_err(fail)?;
            }
        }

        Ok(out)
    }
}

/// Decode one five-character group, keeping `len - 1` bytes for partial
/// groups.
fn push_group(out: &mut Vec<u8>, group: &[u8; 5], len: usize) -> std::result::Result<(), String> {
    let mut value: u32 = 0;
    for &digit in group {
        value = value
            .checked_mul(85)
            .and_then(|v| v.checked_add(digit as u32))
            .ok_or_else(|| "group value overflows 32 bits".to_string())?;
    }
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[..len - 1]);
    Ok(())
}

/// Encode bytes as ASCII85 with the `<~ ~>` frame.
///
/// Exists for fixtures and round-trip tests; the writer side of the
/// library uses it when a text-safe envelope is wanted.
pub fn ascii85_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 5 / 4 + 6);
    out.extend_from_slice(b"<~");

    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let value = u32::from_be_bytes(word);

        if value == 0 && chunk.len() == 4 {
            out.push(b'z');
            continue;
        }

        let mut digits = [0u8; 5];
        let mut rest = value;
        for slot in digits.iter_mut().rev() {
            *slot = (rest % 85) as u8 + b'!';
            rest /= 85;
        }
        out.extend_from_slice(&digits[..chunk.len() + 1]);
    }

    out.extend_from_slice(b"~>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &[u8]) -> Result<Vec<u8>> {
        Ascii85Filter.decode(
            &Context::background(),
            input,
            &Dictionary::new(),
            &DecodeBudget::unlimited(),
        )
    }

    #[test]
    fn test_known_vector() {
        let out = decode(b"<~87cURD_*#4DfTZ)+T~>").unwrap();
        assert_eq!(out, b"Hello, World!");
    }

    #[test]
    fn test_round_trip() {
        let data: Vec<u8> = (0u8..=255).collect();
        let encoded = ascii85_encode(&data);
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_z_shorthand() {
        let encoded = ascii85_encode(&[0, 0, 0, 0, 1]);
        assert!(encoded.contains(&b'z'));
        assert_eq!(decode(&encoded).unwrap(), vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_whitespace_ignored() {
        let out = decode(b"87cU RD_*#4\nDfTZ)+T~>").unwrap();
        assert_eq!(out, b"Hello, World!");
    }

    #[test]
    fn test_invalid_character() {
        assert!(decode(b"87c\x7f~>").is_err());
    }

    #[test]
    fn test_single_trailing_character_rejected() {
        assert!(decode(b"zz8~>").is_err());
    }
}
