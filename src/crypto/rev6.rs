//! AES-256 (V5) password authentication.
//!
//! Revision 6 uses the iterative hash of ISO 32000-2 Algorithm 2.B: an
//! initial SHA-256, then rounds that AES-128-CBC-encrypt a 64-fold
//! repetition of `password ‖ hash ‖ extra` and pick SHA-256/384/512 by the
//! first 16 ciphertext bytes modulo 3. At least 64 rounds run; the loop
//! then continues while the last ciphertext byte exceeds `round - 32`.
//! Revision 5 (the deprecated precursor) hashes once with SHA-256.
//!
//! The file key itself is unwrapped from `/UE` or `/OE` with
//! AES-256-CBC, zero IV, no padding.

use super::aes;
use crate::context::Context;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Passwords are capped at 127 bytes of UTF-8 for V5 handlers.
const MAX_PASSWORD: usize = 127;

/// The `hash ‖ validation-salt ‖ key-salt` split of `/U` and `/O`.
struct SaltedValue<'a> {
    hash: &'a [u8],
    validation_salt: &'a [u8],
    key_salt: &'a [u8],
}

fn split_value(value: &[u8]) -> Option<SaltedValue<'_>> {
    if value.len() < 48 {
        return None;
    }
    Some(SaltedValue {
        hash: &value[..32],
        validation_salt: &value[32..40],
        key_salt: &value[40..48],
    })
}

/// Hash for the given revision: SHA-256 for R5, Algorithm 2.B for R6.
fn password_hash(
    ctx: &Context,
    revision: i64,
    password: &[u8],
    salt: &[u8],
    extra: &[u8],
) -> Result<[u8; 32]> {
    if revision >= 6 {
        hash_2b(ctx, password, salt, extra)
    } else {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update(salt);
        hasher.update(extra);
        Ok(hasher.finalize().into())
    }
}

/// ISO 32000-2 Algorithm 2.B.
fn hash_2b(ctx: &Context, password: &[u8], salt: &[u8], extra: &[u8]) -> Result<[u8; 32]> {
    let mut k: Vec<u8> = {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update(salt);
        hasher.update(extra);
        hasher.finalize().to_vec()
    };

    let mut round: u32 = 0;
    let mut last_byte: u32 = 0;
    while round < 64 || last_byte > round.saturating_sub(32) {
        ctx.check()?;

        let mut block = Vec::with_capacity(password.len() + k.len() + extra.len());
        block.extend_from_slice(password);
        block.extend_from_slice(&k);
        block.extend_from_slice(extra);

        let mut k1 = Vec::with_capacity(block.len() * 64);
        for _ in 0..64 {
            k1.extend_from_slice(&block);
        }

        let encrypted = aes::cbc_encrypt_nopad(&k[..16], &k[16..32], &k1)
            .map_err(|reason| Error::FilterFailed {
                name: "AESV3".to_string(),
                reason,
            })?;

        // First 16 bytes as a big integer, modulo 3. Since 256 ≡ 1 (mod 3)
        // the byte sum has the same remainder.
        let remainder: u32 = encrypted[..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
        k = match remainder {
            0 => Sha256::digest(&encrypted).to_vec(),
            1 => Sha384::digest(&encrypted)[..32].to_vec(),
            _ => Sha512::digest(&encrypted)[..32].to_vec(),
        };

        last_byte = *encrypted.last().expect("ciphertext is never empty") as u32;
        round += 1;
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    Ok(out)
}

/// Authenticate a password against the V5 `/U`+`/UE` pair.
/// Returns the 32-byte file key on success.
pub fn authenticate_user(
    ctx: &Context,
    revision: i64,
    password: &[u8],
    u_value: &[u8],
    ue_value: &[u8],
) -> Result<Option<Vec<u8>>> {
    let password = &password[..password.len().min(MAX_PASSWORD)];
    let Some(parts) = split_value(u_value) else {
        return Ok(None);
    };

    let check = password_hash(ctx, revision, password, parts.validation_salt, &[])?;
    if !super::algorithms::constant_time_eq(&check, parts.hash) {
        return Ok(None);
    }

    let wrap_key = password_hash(ctx, revision, password, parts.key_salt, &[])?;
    let file_key = aes::cbc_decrypt_nopad(&wrap_key, &[0u8; 16], ue_value)
        .map_err(|reason| Error::FilterFailed {
            name: "AESV3".to_string(),
            reason,
        })?;
    Ok(Some(file_key[..32.min(file_key.len())].to_vec()))
}

/// Authenticate a password against the V5 `/O`+`/OE` pair. The owner hash
/// mixes in the first 48 bytes of `/U`.
pub fn authenticate_owner(
    ctx: &Context,
    revision: i64,
    password: &[u8],
    o_value: &[u8],
    oe_value: &[u8],
    u_value: &[u8],
) -> Result<Option<Vec<u8>>> {
    let password = &password[..password.len().min(MAX_PASSWORD)];
    let Some(parts) = split_value(o_value) else {
        return Ok(None);
    };
    if u_value.len() < 48 {
        return Ok(None);
    }
    let user_bytes = &u_value[..48];

    let check = password_hash(ctx, revision, password, parts.validation_salt, user_bytes)?;
    if !super::algorithms::constant_time_eq(&check, parts.hash) {
        return Ok(None);
    }

    let wrap_key = password_hash(ctx, revision, password, parts.key_salt, user_bytes)?;
    let file_key = aes::cbc_decrypt_nopad(&wrap_key, &[0u8; 16], oe_value)
        .map_err(|reason| Error::FilterFailed {
            name: "AESV3".to_string(),
            reason,
        })?;
    Ok(Some(file_key[..32.min(file_key.len())].to_vec()))
}

/// Decrypt and sanity-check the `/Perms` record against `/P`.
///
/// A record that fails the `adb` marker or disagrees with `/P` is logged,
/// not fatal: the key that decrypted it already authenticated.
pub fn check_perms(file_key: &[u8], perms: &[u8], p: i32, encrypt_metadata: bool) {
    let block = match aes::ecb256_decrypt_block(file_key, perms) {
        Ok(block) => block,
        Err(reason) => {
            log::warn!("unreadable /Perms record: {}", reason);
            return;
        }
    };

    if &block[9..12] != b"adb" {
        log::warn!("/Perms record lacks the 'adb' marker");
        return;
    }
    let recorded = i32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    if recorded != p {
        log::warn!("/Perms permissions {recorded:#010x} disagree with /P {p:#010x}");
    }
    let metadata_flag = block[8];
    let expected = if encrypt_metadata { b'T' } else { b'F' };
    if metadata_flag != expected {
        log::warn!("/Perms metadata flag {:?} disagrees with /EncryptMetadata", metadata_flag as char);
    }
}

/// Build the `U`/`UE` (or `O`/`OE`) pair for a password; the inverse of
/// authentication, used when writing encrypted files and by tests.
pub fn build_salted_value(
    ctx: &Context,
    revision: i64,
    password: &[u8],
    validation_salt: &[u8; 8],
    key_salt: &[u8; 8],
    extra: &[u8],
    file_key: &[u8],
) -> Result<(Vec<u8>, Vec<u8>)> {
    let password = &password[..password.len().min(MAX_PASSWORD)];

    let hash = password_hash(ctx, revision, password, validation_salt, extra)?;
    let mut value = Vec::with_capacity(48);
    value.extend_from_slice(&hash);
    value.extend_from_slice(validation_salt);
    value.extend_from_slice(key_salt);

    let wrap_key = password_hash(ctx, revision, password, key_salt, extra)?;
    let wrapped = aes::cbc_encrypt_nopad(&wrap_key, &[0u8; 16], file_key)
        .map_err(|reason| Error::FilterFailed {
            name: "AESV3".to_string(),
            reason,
        })?;
    Ok((value, wrapped))
}
