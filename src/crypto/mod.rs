//! Standard security handler (the `/Filter /Standard` scheme).
//!
//! Covers every revision in circulation: RC4 with 40-bit keys (V1/R2), RC4
//! up to 128 bits (V2/R3), AES-128 behind crypt filters (V4/R4), and
//! AES-256 (V5/R5 and R6). Crypt-filter routing selects the method per
//! data class (`/StmF`, `/StrF`, `/CF`, `/Identity`), and a per-stream
//! `[/Crypt]` filter entry can override it for a single stream.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use std::collections::HashMap;

mod aes;
mod algorithms;
mod handler;
mod rc4;
mod rev6;

pub use algorithms::{
    compute_encryption_key, compute_owner_value, compute_user_value, pad_password,
};
pub use handler::{DataClass, StandardSecurityHandler};
pub use rev6::build_salted_value;

/// Base encryption algorithm of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Not encrypted.
    None,
    /// RC4, key length from `/Length` (40-128 bits).
    Rc4,
    /// AES-128-CBC.
    Aes128,
    /// AES-256-CBC.
    Aes256,
}

/// Method selected by a crypt filter's `/CFM` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// No transformation.
    Identity,
    /// `/V2`: RC4 with the file key.
    Rc4,
    /// `/AESV2`: AES-128-CBC with per-object keys.
    Aes128,
    /// `/AESV3`: AES-256-CBC with the file key.
    Aes256,
}

/// User access permissions from the `/P` field.
///
/// Bit positions are 1-indexed as in the PDF spec; the two low bits are
/// reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions(i32);

impl Permissions {
    /// Wrap a raw `/P` value.
    pub fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// Raw `/P` value.
    pub fn bits(&self) -> i32 {
        self.0
    }

    fn bit(&self, position: u32) -> bool {
        debug_assert!(position >= 1);
        self.0 & (1 << (position - 1)) != 0
    }

    /// Bit 3: print the document.
    pub fn can_print(&self) -> bool {
        self.bit(3)
    }

    /// Bit 4: modify contents.
    pub fn can_modify(&self) -> bool {
        self.bit(4)
    }

    /// Bit 5: copy or extract text and graphics.
    pub fn can_copy(&self) -> bool {
        self.bit(5)
    }

    /// Bit 6: add or modify annotations.
    pub fn can_modify_annotations(&self) -> bool {
        self.bit(6)
    }

    /// Bit 9: fill in form fields.
    pub fn can_fill_forms(&self) -> bool {
        self.bit(9)
    }

    /// Bit 10: extract for accessibility.
    pub fn can_extract_for_accessibility(&self) -> bool {
        self.bit(10)
    }

    /// Bit 11: assemble (insert, rotate, delete pages).
    pub fn can_assemble(&self) -> bool {
        self.bit(11)
    }

    /// Bit 12: print at full quality.
    pub fn can_print_high_quality(&self) -> bool {
        self.bit(12)
    }
}

/// Parsed `/Encrypt` dictionary.
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// `/V` value.
    pub v: i64,
    /// `/R` value.
    pub r: i64,
    /// File key length in bytes.
    pub key_length: usize,
    /// `/O` value.
    pub o: Vec<u8>,
    /// `/U` value.
    pub u: Vec<u8>,
    /// `/OE` value (V5).
    pub oe: Option<Vec<u8>>,
    /// `/UE` value (V5).
    pub ue: Option<Vec<u8>>,
    /// `/Perms` record (V5).
    pub perms: Option<Vec<u8>>,
    /// `/P` permissions.
    pub p: i32,
    /// `/EncryptMetadata` (default true).
    pub encrypt_metadata: bool,
    /// `/CF` crypt filters by name.
    pub crypt_filters: HashMap<String, CryptMethod>,
    /// `/StmF` name.
    pub stm_f: Option<String>,
    /// `/StrF` name.
    pub str_f: Option<String>,
}

impl EncryptDict {
    /// Parse the `/Encrypt` dictionary.
    ///
    /// Only the standard security handler is supported; any other
    /// `/Filter` (certificate security, vendor handlers) is
    /// [`Error::UnsupportedEncryption`].
    pub fn from_dict(dict: &Dictionary) -> Result<Self> {
        let v = dict.get("V").and_then(Object::as_integer).unwrap_or(0);
        let r = dict.get("R").and_then(Object::as_integer).unwrap_or(0);
        let unsupported = || Error::UnsupportedEncryption { v, r };

        let filter = dict
            .get("Filter")
            .and_then(Object::as_name)
            .ok_or_else(unsupported)?;
        if filter != "Standard" {
            return Err(unsupported());
        }
        if !matches!((v, r), (1, 2) | (1 | 2, 3) | (2, 2) | (4, 4) | (5, 5) | (5, 6)) {
            return Err(unsupported());
        }

        let bytes = |key: &str| {
            dict.get(key)
                .and_then(Object::as_string)
                .map(|s| s.to_vec())
        };

        let o = bytes("O").ok_or_else(unsupported)?;
        let u = bytes("U").ok_or_else(unsupported)?;
        let p = dict
            .get("P")
            .and_then(Object::as_integer)
            .ok_or_else(unsupported)? as i32;

        let key_length = match v {
            1 => 5,
            5 => 32,
            _ => {
                let bits = dict
                    .get("Length")
                    .and_then(Object::as_integer)
                    .unwrap_or(if v == 4 { 128 } else { 40 });
                if bits % 8 != 0 || !(40..=256).contains(&bits) {
                    return Err(unsupported());
                }
                (bits / 8) as usize
            }
        };

        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(Object::as_bool)
            .unwrap_or(true);

        let mut crypt_filters = HashMap::new();
        if let Some(cf) = dict.get("CF").and_then(Object::as_dict) {
            for (name, entry) in cf {
                let Some(entry) = entry.as_dict() else {
                    continue;
                };
                let method = match entry.get("CFM").and_then(Object::as_name) {
                    Some("None") | None => CryptMethod::Identity,
                    Some("V2") => CryptMethod::Rc4,
                    Some("AESV2") => CryptMethod::Aes128,
                    Some("AESV3") => CryptMethod::Aes256,
                    Some(other) => {
                        log::warn!("unknown /CFM {} in crypt filter /{}", other, name);
                        return Err(unsupported());
                    }
                };
                crypt_filters.insert(name.clone(), method);
            }
        }

        Ok(Self {
            v,
            r,
            key_length,
            o,
            u,
            oe: bytes("OE"),
            ue: bytes("UE"),
            perms: bytes("Perms"),
            p,
            encrypt_metadata,
            crypt_filters,
            stm_f: dict.get("StmF").and_then(Object::as_name).map(str::to_string),
            str_f: dict.get("StrF").and_then(Object::as_name).map(str::to_string),
        })
    }

    /// The base algorithm implied by `/V`.
    pub fn base_algorithm(&self) -> Algorithm {
        match self.v {
            1 | 2 => Algorithm::Rc4,
            4 => Algorithm::Aes128,
            5 => Algorithm::Aes256,
            _ => Algorithm::None,
        }
    }

    /// The method implied by the base algorithm, for filter-name fallback.
    fn base_method(&self) -> CryptMethod {
        match self.base_algorithm() {
            Algorithm::None => CryptMethod::Identity,
            Algorithm::Rc4 => CryptMethod::Rc4,
            Algorithm::Aes128 => CryptMethod::Aes128,
            Algorithm::Aes256 => CryptMethod::Aes256,
        }
    }

    /// Resolve a crypt-filter name: `/Identity` bypasses, a missing or
    /// `/Standard` name falls back to the base algorithm, anything else
    /// must be defined under `/CF`.
    pub fn resolve_filter(&self, name: Option<&str>) -> Result<CryptMethod> {
        match name {
            None | Some("Standard") => Ok(self.base_method()),
            Some("Identity") => Ok(CryptMethod::Identity),
            Some(other) => self
                .crypt_filters
                .get(other)
                .copied()
                .ok_or_else(|| Error::CryptFilterUndefined(other.to_string())),
        }
    }
}
