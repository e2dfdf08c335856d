//! The standard security handler: authentication and content crypto.

use super::{Algorithm, CryptMethod, EncryptDict, Permissions, algorithms, rc4, rev6};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::{Dictionary, ObjectRef};
use md5::{Digest, Md5};

/// What is being encrypted or decrypted; routing differs per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataClass {
    /// A string object.
    String,
    /// An ordinary stream payload.
    Stream,
    /// A `/Type /Metadata` stream, exempt when `/EncryptMetadata` is
    /// false.
    MetadataStream,
}

enum Direction {
    Encrypt,
    Decrypt,
}

/// Standard security handler built from a document's `/Encrypt`
/// dictionary and file ID.
///
/// Built once per document; authentication may be retried with additional
/// passwords and is idempotent for the same password. The derived file key
/// is cached after the first success.
#[derive(Debug, Clone)]
pub struct StandardSecurityHandler {
    dict: EncryptDict,
    file_id: Vec<u8>,
    key: Option<Vec<u8>>,
}

impl StandardSecurityHandler {
    /// Parse the `/Encrypt` dictionary; `file_id` is the first element of
    /// the trailer `/ID` array (empty when absent).
    pub fn new(encrypt: &Dictionary, file_id: Vec<u8>) -> Result<Self> {
        let dict = EncryptDict::from_dict(encrypt)?;
        log::info!(
            "document encrypted with {:?} (V={}, R={})",
            dict.base_algorithm(),
            dict.v,
            dict.r
        );
        Ok(Self {
            dict,
            file_id,
            key: None,
        })
    }

    /// True when the handler performs any transformation at all.
    pub fn is_encrypted(&self) -> bool {
        !matches!(self.dict.base_algorithm(), Algorithm::None)
    }

    /// True once a password has authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.key.is_some()
    }

    /// Declared permissions.
    pub fn permissions(&self) -> Permissions {
        Permissions::from_bits(self.dict.p)
    }

    /// Whether metadata streams are encrypted.
    pub fn encrypt_metadata(&self) -> bool {
        self.dict.encrypt_metadata
    }

    /// Try `password` as the user password first, then as the owner
    /// password. On success the file key is derived and cached.
    pub fn authenticate(&mut self, ctx: &Context, password: &[u8]) -> Result<()> {
        let key = if self.dict.v < 5 {
            self.authenticate_legacy(password)
        } else {
            self.authenticate_v5(ctx, password)?
        };
        match key {
            Some(key) => {
                self.key = Some(key);
                Ok(())
            }
            None => Err(Error::InvalidPassword),
        }
    }

    fn authenticate_legacy(&self, password: &[u8]) -> Option<Vec<u8>> {
        algorithms::authenticate_user_password(
            password,
            &self.dict.u,
            &self.dict.o,
            self.dict.p,
            &self.file_id,
            self.dict.r,
            self.dict.key_length,
            self.dict.encrypt_metadata,
        )
        .or_else(|| {
            algorithms::authenticate_owner_password(
                password,
                &self.dict.u,
                &self.dict.o,
                self.dict.p,
                &self.file_id,
                self.dict.r,
                self.dict.key_length,
                self.dict.encrypt_metadata,
            )
            .inspect(|_| log::info!("authenticated with the owner password"))
        })
    }

    fn authenticate_v5(&self, ctx: &Context, password: &[u8]) -> Result<Option<Vec<u8>>> {
        let unsupported = || Error::UnsupportedEncryption {
            v: self.dict.v,
            r: self.dict.r,
        };
        let ue = self.dict.ue.as_ref().ok_or_else(unsupported)?;
        let oe = self.dict.oe.as_ref().ok_or_else(unsupported)?;

        let key = match rev6::authenticate_user(ctx, self.dict.r, password, &self.dict.u, ue)? {
            Some(key) => Some(key),
            None => {
                let owner = rev6::authenticate_owner(
                    ctx,
                    self.dict.r,
                    password,
                    &self.dict.o,
                    oe,
                    &self.dict.u,
                )?;
                if owner.is_some() {
                    log::info!("authenticated with the owner password");
                }
                owner
            }
        };

        if let (Some(key), Some(perms)) = (&key, &self.dict.perms) {
            rev6::check_perms(key, perms, self.dict.p, self.dict.encrypt_metadata);
        }
        Ok(key)
    }

    /// Decrypt `data` for the given class and owning object.
    pub fn decrypt(&self, class: DataClass, r: ObjectRef, data: &[u8]) -> Result<Vec<u8>> {
        if class == DataClass::MetadataStream && !self.dict.encrypt_metadata {
            return Ok(data.to_vec());
        }
        let method = self.method_for_class(class)?;
        self.apply(method, r, data, Direction::Decrypt)
    }

    /// Encrypt `data` for the given class and owning object.
    pub fn encrypt(&self, class: DataClass, r: ObjectRef, data: &[u8]) -> Result<Vec<u8>> {
        if class == DataClass::MetadataStream && !self.dict.encrypt_metadata {
            return Ok(data.to_vec());
        }
        let method = self.method_for_class(class)?;
        self.apply(method, r, data, Direction::Encrypt)
    }

    /// Decrypt a stream that declared its own crypt filter via
    /// `[/Crypt]` parameters; overrides `/StmF` for that stream.
    pub fn decrypt_with_filter(&self, name: &str, r: ObjectRef, data: &[u8]) -> Result<Vec<u8>> {
        let method = self.dict.resolve_filter(Some(name))?;
        self.apply(method, r, data, Direction::Decrypt)
    }

    fn method_for_class(&self, class: DataClass) -> Result<CryptMethod> {
        match class {
            DataClass::String => self.dict.resolve_filter(self.dict.str_f.as_deref()),
            DataClass::Stream | DataClass::MetadataStream => {
                self.dict.resolve_filter(self.dict.stm_f.as_deref())
            }
        }
    }

    fn file_key(&self) -> Result<&[u8]> {
        self.key.as_deref().ok_or(Error::AuthenticationRequired)
    }

    fn apply(
        &self,
        method: CryptMethod,
        r: ObjectRef,
        data: &[u8],
        direction: Direction,
    ) -> Result<Vec<u8>> {
        let key = self.file_key()?;
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => {
                let object_key = derive_object_key(key, r, false);
                Ok(rc4::rc4_apply(&object_key, data))
            }
            CryptMethod::Aes128 => {
                let object_key = derive_object_key(key, r, true);
                self.aes_content(&object_key, data, direction, "AESV2")
            }
            CryptMethod::Aes256 => self.aes_content(key, data, direction, "AESV3"),
        }
    }

    fn aes_content(
        &self,
        key: &[u8],
        data: &[u8],
        direction: Direction,
        name: &str,
    ) -> Result<Vec<u8>> {
        let result = match direction {
            Direction::Decrypt => super::aes::cbc_decrypt_content(key, data),
            Direction::Encrypt => {
                let iv = random_iv()?;
                super::aes::cbc_encrypt_content(key, &iv, data)
            }
        };
        result.map_err(|reason| Error::FilterFailed {
            name: name.to_string(),
            reason,
        })
    }
}

/// Per-object key (V < 5): MD5 of the file key, the low three bytes of the
/// object number, the low two bytes of the generation, and `"sAlT"` for
/// AES; truncated to `min(n + 5, 16)`.
fn derive_object_key(file_key: &[u8], r: ObjectRef, aes: bool) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&r.num.to_le_bytes()[..3]);
    hasher.update(&r.gen.to_le_bytes()[..2]);
    if aes {
        hasher.update(b"sAlT");
    }
    let hash = hasher.finalize();
    hash[..(file_key.len() + 5).min(16)].to_vec()
}

fn random_iv() -> Result<[u8; 16]> {
    let mut iv = [0u8; 16];
    getrandom::getrandom(&mut iv).map_err(|e| Error::FilterFailed {
        name: "Crypt".to_string(),
        reason: format!("random IV unavailable: {}", e),
    })?;
    Ok(iv)
}
