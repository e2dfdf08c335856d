//! Resource limits for parsing untrusted input.
//!
//! Every bound is configurable and reaching any of them yields a distinct
//! error kind, so callers can tell hostile input from implementation bugs.

use std::time::Duration;

/// Resource limits applied while parsing.
///
/// The defaults are sized for real-world documents; lower them when
/// ingesting fully untrusted input on constrained hosts.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Ceiling on cumulative decoded stream output (decompression bombs).
    pub max_decompressed_size: usize,
    /// Maximum depth of indirect-reference chains followed by the loader.
    pub max_indirect_depth: usize,
    /// Maximum number of cross-reference sections in a `/Prev` chain.
    pub max_xref_depth: usize,
    /// Maximum number of elements in a single array.
    pub max_array_len: usize,
    /// Maximum number of entries in a single dictionary.
    pub max_dict_len: usize,
    /// Maximum length of a single string object in bytes.
    pub max_string_len: usize,
    /// Maximum length of a raw stream payload in bytes.
    pub max_stream_len: usize,
    /// Maximum nesting depth of arrays and dictionaries.
    pub max_nesting_depth: usize,
    /// Maximum size of the input buffer read from the byte source.
    pub max_buffer_size: usize,
    /// Soft deadline for a single filter-pipeline decode.
    pub max_decode_time: Duration,
    /// Soft deadline for a whole-document parse.
    pub max_parse_time: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_decompressed_size: 100 * 1024 * 1024,
            max_indirect_depth: 100,
            max_xref_depth: 32,
            max_array_len: 100_000,
            max_dict_len: 10_000,
            max_string_len: 10 * 1024 * 1024,
            max_stream_len: 50 * 1024 * 1024,
            max_nesting_depth: 100,
            max_buffer_size: 500 * 1024 * 1024,
            max_decode_time: Duration::from_secs(30),
            max_parse_time: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ParseOptions::default();
        assert_eq!(opts.max_indirect_depth, 100);
        assert_eq!(opts.max_xref_depth, 32);
        assert_eq!(opts.max_decompressed_size, 100 * 1024 * 1024);
        assert_eq!(opts.max_decode_time, Duration::from_secs(30));
    }
}
