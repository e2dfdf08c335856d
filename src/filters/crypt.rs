//! The `Crypt` filter.
//!
//! In the pipeline this is a pass-through: decryption happens before any
//! filter runs, in the security handler. A stream lists `Crypt` (with a
//! `/Name` in its decode-parms) purely to declare its cryptographic
//! disposition, and the loader reads that declaration from the filter
//! chain, not from here.

use super::{DecodeBudget, StreamFilter};
use crate::context::Context;
use crate::error::Result;
use crate::object::{Dictionary, Object};

/// `Crypt` filter (pass-through).
pub struct CryptFilter;

impl StreamFilter for CryptFilter {
    fn name(&self) -> &'static str {
        "Crypt"
    }

    fn decode(
        &self,
        _ctx: &Context,
        input: &[u8],
        params: &Dictionary,
        _budget: &DecodeBudget,
    ) -> Result<Vec<u8>> {
        if let Some(name) = params.get("Name").and_then(Object::as_name) {
            log::debug!("Crypt stage declares filter /{}", name);
        }
        Ok(input.to_vec())
    }
}
