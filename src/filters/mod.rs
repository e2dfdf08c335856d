//! Stream filter registry and decode pipeline.
//!
//! Decoders are discovered by name. The standard set covers `FlateDecode`,
//! `LZWDecode`, `RunLengthDecode`, `ASCII85Decode`, `ASCIIHexDecode`, and
//! the pass-through `Crypt` filter; image codecs can be registered by
//! collaborators (`DCTDecode` ships behind the `image-codecs` feature).
//! Asking for a name the registry does not know fails with
//! [`Error::FilterUnknown`], which callers use to skip image streams
//! gracefully.
//!
//! Filters are applied in listed order with parameter dictionaries aligned
//! by index. The cumulative buffer size is checked against the
//! decompression budget before and after every stage, and the context is
//! consulted at the same points so cancellation cannot be stalled by a
//! hostile stream.

use crate::config::ParseOptions;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::{Dictionary, ObjectRef};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

mod ascii85;
mod asciihex;
mod crypt;
#[cfg(feature = "image-codecs")]
mod dct;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use ascii85::{Ascii85Filter, ascii85_encode};
pub use asciihex::{AsciiHexFilter, asciihex_encode};
pub use crypt::CryptFilter;
#[cfg(feature = "image-codecs")]
pub use dct::DctFilter;
pub use flate::FlateFilter;
pub use lzw::LzwFilter;
pub use predictor::{PredictorParams, apply_predictor};
pub use runlength::RunLengthFilter;

/// Callback that resolves an indirect reference to decoded stream bytes.
///
/// Needed by filters whose parameters point at shared data in other
/// objects (JBIG2 global segments are the canonical case).
pub trait StreamResolver {
    /// Load and decode the stream behind `r`.
    fn resolve_stream(&self, r: ObjectRef) -> Result<Vec<u8>>;
}

/// Size and time budget scoped to one pipeline decode.
#[derive(Debug, Clone, Copy)]
pub struct DecodeBudget {
    /// Ceiling on any intermediate or final buffer.
    pub max_output: usize,
    /// Soft deadline checked at loop boundaries.
    pub deadline: Option<Instant>,
}

impl DecodeBudget {
    /// Budget derived from parse options; the clock starts now.
    pub fn from_options(options: &ParseOptions) -> Self {
        Self {
            max_output: options.max_decompressed_size,
            deadline: Some(Instant::now() + options.max_decode_time),
        }
    }

    /// Unlimited budget (tests, trusted input).
    pub fn unlimited() -> Self {
        Self {
            max_output: usize::MAX,
            deadline: None,
        }
    }

    /// Fail with a bomb suspicion when `len` exceeds the ceiling.
    pub fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_output {
            Err(Error::DecompressionBombSuspected {
                limit: self.max_output,
            })
        } else {
            Ok(())
        }
    }

    /// Fail with cancellation once the deadline has passed.
    pub fn check_time(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }
}

/// A single stream decoder.
pub trait StreamFilter: Send + Sync {
    /// Registry name (e.g. `"FlateDecode"`).
    fn name(&self) -> &'static str;

    /// Decode `input` under `params`.
    fn decode(
        &self,
        ctx: &Context,
        input: &[u8],
        params: &Dictionary,
        budget: &DecodeBudget,
    ) -> Result<Vec<u8>>;

    /// Whether this filter needs the object-resolver callback for the
    /// given parameters.
    fn needs_resolver(&self, _params: &Dictionary) -> bool {
        false
    }

    /// Decode with access to the resolver. Default delegates to
    /// [`StreamFilter::decode`].
    fn decode_with_resolver(
        &self,
        ctx: &Context,
        input: &[u8],
        params: &Dictionary,
        budget: &DecodeBudget,
        _resolver: &dyn StreamResolver,
    ) -> Result<Vec<u8>> {
        self.decode(ctx, input, params, budget)
    }
}

/// Name-indexed filter registry.
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn StreamFilter>>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// The standard filter set.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(FlateFilter));
        registry.register(Arc::new(LzwFilter));
        registry.register(Arc::new(RunLengthFilter));
        registry.register(Arc::new(Ascii85Filter));
        registry.register(Arc::new(AsciiHexFilter));
        registry.register(Arc::new(CryptFilter));
        #[cfg(feature = "image-codecs")]
        registry.register(Arc::new(DctFilter));
        registry
    }

    /// Register a filter under its own name, replacing any previous one.
    pub fn register(&mut self, filter: Arc<dyn StreamFilter>) {
        self.filters.insert(filter.name().to_string(), filter);
    }

    /// Look a filter up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn StreamFilter>> {
        self.filters.get(name)
    }

    /// Decode `data` through `chain` (filter name, aligned params).
    pub fn decode(
        &self,
        ctx: &Context,
        data: &[u8],
        chain: &[(String, Dictionary)],
        options: &ParseOptions,
    ) -> Result<Vec<u8>> {
        self.decode_with_resolver(ctx, data, chain, options, None)
    }

    /// Decode with an optional resolver for filters that demand one.
    pub fn decode_with_resolver(
        &self,
        ctx: &Context,
        data: &[u8],
        chain: &[(String, Dictionary)],
        options: &ParseOptions,
        resolver: Option<&dyn StreamResolver>,
    ) -> Result<Vec<u8>> {
        let budget = DecodeBudget::from_options(options);
        let mut current = data.to_vec();

        for (name, params) in chain {
            ctx.check()?;
            budget.check_time()?;
            budget.check_size(current.len())?;

            let filter = self
                .filters
                .get(name)
                .ok_or_else(|| Error::FilterUnknown(name.clone()))?;

            current = if filter.needs_resolver(params) {
                let resolver =
                    resolver.ok_or_else(|| Error::ResolverRequired(name.clone()))?;
                filter.decode_with_resolver(ctx, &current, params, &budget, resolver)?
            } else {
                filter.decode(ctx, &current, params, &budget)?
            };

            budget.check_size(current.len())?;
            ctx.check()?;
        }

        Ok(current)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(names: &[&str]) -> Vec<(String, Dictionary)> {
        names
            .iter()
            .map(|n| (n.to_string(), Dictionary::new()))
            .collect()
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let registry = FilterRegistry::standard();
        let out = registry
            .decode(&Context::background(), b"abc", &[], &ParseOptions::default())
            .unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_unknown_filter() {
        let registry = FilterRegistry::standard();
        let result = registry.decode(
            &Context::background(),
            b"abc",
            &chain(&["JPXDecode"]),
            &ParseOptions::default(),
        );
        assert!(matches!(result, Err(Error::FilterUnknown(ref name)) if name == "JPXDecode"));
    }

    #[test]
    fn test_chained_filters() {
        // ASCIIHex of ASCII85 of "Hello, World!".
        let a85 = ascii85_encode(b"Hello, World!");
        let hex = asciihex_encode(&a85);
        let registry = FilterRegistry::standard();
        let out = registry
            .decode(
                &Context::background(),
                &hex,
                &chain(&["ASCIIHexDecode", "ASCII85Decode"]),
                &ParseOptions::default(),
            )
            .unwrap();
        assert_eq!(out, b"Hello, World!");
    }

    #[test]
    fn test_crypt_is_pass_through() {
        let registry = FilterRegistry::standard();
        let out = registry
            .decode(
                &Context::background(),
                b"already decrypted",
                &chain(&["Crypt"]),
                &ParseOptions::default(),
            )
            .unwrap();
        assert_eq!(out, b"already decrypted");
    }

    #[test]
    fn test_bomb_budget() {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        // 4 MiB of zeros compress to almost nothing.
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&vec![0u8; 4 * 1024 * 1024]).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut options = ParseOptions::default();
        options.max_decompressed_size = 1024;
        let registry = FilterRegistry::standard();
        let result = registry.decode(
            &Context::background(),
            &compressed,
            &chain(&["FlateDecode"]),
            &options,
        );
        assert!(matches!(
            result,
            Err(Error::DecompressionBombSuspected { limit: 1024 })
        ));
    }

    #[test]
    fn test_cancelled_context() {
        let (ctx, handle) = Context::cancellable();
        handle.cancel();
        let registry = FilterRegistry::standard();
        let result = registry.decode(
            &ctx,
            b"41424344>",
            &chain(&["ASCIIHexDecode"]),
            &ParseOptions::default(),
        );
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_resolver_required() {
        struct Needy;
        impl StreamFilter for Needy {
            fn name(&self) -> &'static str {
                "NeedyDecode"
            }
            fn decode(
                &self,
                _ctx: &Context,
                input: &[u8],
                _params: &Dictionary,
                _budget: &DecodeBudget,
            ) -> Result<Vec<u8>> {
                Ok(input.to_vec())
            }
            fn needs_resolver(&self, _params: &Dictionary) -> bool {
                true
            }
        }

        let mut registry = FilterRegistry::standard();
        registry.register(Arc::new(Needy));
        let result = registry.decode(
            &Context::background(),
            b"x",
            &chain(&["NeedyDecode"]),
            &ParseOptions::default(),
        );
        assert!(matches!(result, Err(Error::ResolverRequired(_))));
    }
}
