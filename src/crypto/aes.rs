//! AES primitives for the standard security handler.
//!
//! Content encryption is AES-CBC with a random 16-byte IV prepended to the
//! ciphertext and PKCS#7 padding. Key wrapping for V5 (`/UE`, `/OE`) is
//! AES-256-CBC with a zero IV and no padding, and the `/Perms` block is a
//! single AES-256-ECB block.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes256};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Errors from the AES layer, stringly typed; the handler wraps them.
pub type AesResult<T> = std::result::Result<T, String>;

fn check_iv(iv: &[u8]) -> AesResult<()> {
    if iv.len() != 16 {
        return Err(format!("IV must be 16 bytes, got {}", iv.len()));
    }
    Ok(())
}

fn check_blocks(data: &[u8]) -> AesResult<()> {
    if data.len() % 16 != 0 {
        return Err(format!("ciphertext length {} is not block-aligned", data.len()));
    }
    Ok(())
}

/// AES-CBC encrypt without padding; `data` must be block-aligned.
/// Key length selects AES-128 or AES-256.
pub fn cbc_encrypt_nopad(key: &[u8], iv: &[u8], data: &[u8]) -> AesResult<Vec<u8>> {
    check_iv(iv)?;
    check_blocks(data)?;
    let mut buffer = data.to_vec();
    let len = buffer.len();
    match key.len() {
        16 => {
            let cipher = Aes128CbcEnc::new_from_slices(key, iv).map_err(|e| e.to_string())?;
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
                .map_err(|e| e.to_string())?;
        }
        32 => {
            let cipher = Aes256CbcEnc::new_from_slices(key, iv).map_err(|e| e.to_string())?;
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
                .map_err(|e| e.to_string())?;
        }
        other => return Err(format!("unsupported AES key length {}", other)),
    }
    Ok(buffer)
}

/// AES-CBC decrypt without padding removal; `data` must be block-aligned.
pub fn cbc_decrypt_nopad(key: &[u8], iv: &[u8], data: &[u8]) -> AesResult<Vec<u8>> {
    check_iv(iv)?;
    check_blocks(data)?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut buffer = data.to_vec();
    match key.len() {
        16 => {
            let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|e| e.to_string())?;
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|e| e.to_string())?;
        }
        32 => {
            let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|e| e.to_string())?;
            cipher
                .decrypt_padded_mut::<NoPadding>(&mut buffer)
                .map_err(|e| e.to_string())?;
        }
        other => return Err(format!("unsupported AES key length {}", other)),
    }
    Ok(buffer)
}

/// Encrypt content: PKCS#7 pad, CBC encrypt, prepend the IV.
pub fn cbc_encrypt_content(key: &[u8], iv: &[u8; 16], plain: &[u8]) -> AesResult<Vec<u8>> {
    let pad = 16 - plain.len() % 16;
    let mut padded = Vec::with_capacity(plain.len() + pad);
    padded.extend_from_slice(plain);
    padded.extend(std::iter::repeat(pad as u8).take(pad));

    let ciphertext = cbc_encrypt_nopad(key, iv, &padded)?;
    let mut out = Vec::with_capacity(16 + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt content: split the leading IV, CBC decrypt, strip PKCS#7.
pub fn cbc_decrypt_content(key: &[u8], data: &[u8]) -> AesResult<Vec<u8>> {
    // Zero-length streams occur in the wild; there is nothing to decrypt.
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < 16 {
        return Err(format!("AES content of {} bytes has no room for an IV", data.len()));
    }
    let (iv, ciphertext) = data.split_at(16);
    let mut plain = cbc_decrypt_nopad(key, iv, ciphertext)?;

    let Some(&pad) = plain.last() else {
        return Ok(plain);
    };
    if pad == 0 || pad > 16 || pad as usize > plain.len() {
        return Err(format!("invalid PKCS#7 padding byte {}", pad));
    }
    let cut = plain.len() - pad as usize;
    if plain[cut..].iter().any(|&b| b != pad) {
        return Err("inconsistent PKCS#7 padding".to_string());
    }
    plain.truncate(cut);
    Ok(plain)
}

/// Decrypt one AES-256-ECB block (the `/Perms` record).
pub fn ecb256_decrypt_block(key: &[u8], block: &[u8]) -> AesResult<[u8; 16]> {
    if block.len() < 16 {
        return Err("Perms block shorter than 16 bytes".to_string());
    }
    let cipher = Aes256::new_from_slice(key).map_err(|e| e.to_string())?;
    let mut out = GenericArray::clone_from_slice(&block[..16]);
    cipher.decrypt_block(&mut out);
    Ok(out.into())
}

/// Encrypt one AES-256-ECB block (building a `/Perms` record).
pub fn ecb256_encrypt_block(key: &[u8], block: &[u8; 16]) -> AesResult<[u8; 16]> {
    let cipher = Aes256::new_from_slice(key).map_err(|e| e.to_string())?;
    let mut out = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    Ok(out.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cbc_content_round_trip_128() {
        let key = b"0123456789abcdef";
        let iv = *b"fedcba9876543210";
        let plain = b"some stream plaintext";
        let ct = cbc_encrypt_content(key, &iv, plain).unwrap();
        assert_eq!(&ct[..16], &iv);
        assert_eq!(cbc_decrypt_content(key, &ct).unwrap(), plain);
    }

    #[test]
    fn test_cbc_content_round_trip_256() {
        let key = &[0x42u8; 32];
        let iv = [7u8; 16];
        let plain = b"block-aligned!!!"; // exactly 16 bytes
        let ct = cbc_encrypt_content(key, &iv, plain).unwrap();
        // A full padding block is appended for aligned input.
        assert_eq!(ct.len(), 16 + 32);
        assert_eq!(cbc_decrypt_content(key, &ct).unwrap(), plain);
    }

    #[test]
    fn test_nopad_round_trip_zero_iv() {
        let key = [9u8; 32];
        let iv = [0u8; 16];
        let secret = [0xA5u8; 32];
        let wrapped = cbc_encrypt_nopad(&key, &iv, &secret).unwrap();
        assert_eq!(cbc_decrypt_nopad(&key, &iv, &wrapped).unwrap(), secret);
    }

    #[test]
    fn test_ecb_round_trip() {
        let key = [3u8; 32];
        let block = *b"abcdefghijklmnop";
        let ct = ecb256_encrypt_block(&key, &block).unwrap();
        assert_eq!(ecb256_decrypt_block(&key, &ct).unwrap(), block);
    }

    #[test]
    fn test_short_content_rejected() {
        assert!(cbc_decrypt_content(&[0u8; 16], b"short").is_err());
    }

    #[test]
    fn test_misaligned_rejected() {
        assert!(cbc_decrypt_nopad(&[0u8; 16], &[0u8; 16], &[1u8; 17]).is_err());
    }
}
