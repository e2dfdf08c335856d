//! Legacy (V < 5) key derivation and password algorithms.
//!
//! Implements Algorithms 2-7 of the PDF security spec: file-key derivation
//! from a padded password, computation and verification of the `/O` and
//! `/U` values, and owner-password authentication by unwrapping the user
//! password. All multi-byte values fed to MD5 here are little-endian.

use super::rc4::rc4_apply;
use md5::{Digest, Md5};

/// The 32-byte padding constant (Algorithm 2, step a).
pub const PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

/// Pad or truncate a password to exactly 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let n = password.len().min(32);
    padded[..n].copy_from_slice(&password[..n]);
    padded[n..].copy_from_slice(&PAD[..32 - n]);
    padded
}

/// Algorithm 2: derive the file encryption key from a user password.
pub fn compute_encryption_key(
    password: &[u8],
    owner_value: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: i64,
    key_length: usize,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(owner_value);
    hasher.update(permissions.to_le_bytes());
    hasher.update(file_id);
    if revision >= 4 && !encrypt_metadata {
        hasher.update([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut hash = hasher.finalize().to_vec();

    if revision >= 3 {
        for _ in 0..50 {
            let mut hasher = Md5::new();
            hasher.update(&hash[..key_length]);
            hash = hasher.finalize().to_vec();
        }
    }

    hash.truncate(key_length);
    hash
}

/// Algorithm 3: compute the `/O` value from the owner and user passwords.
pub fn compute_owner_value(
    owner_password: &[u8],
    user_password: &[u8],
    revision: i64,
    key_length: usize,
) -> Vec<u8> {
    let rc4_key = owner_rc4_key(owner_password, revision, key_length);

    let mut value = rc4_apply(&rc4_key, &pad_password(user_password));
    if revision >= 3 {
        for i in 1..=19u8 {
            let stage_key: Vec<u8> = rc4_key.iter().map(|&b| b ^ i).collect();
            value = rc4_apply(&stage_key, &value);
        }
    }
    value
}

/// The RC4 key used for the `/O` value (Algorithm 3, steps a-d).
fn owner_rc4_key(owner_password: &[u8], revision: i64, key_length: usize) -> Vec<u8> {
    let mut hash = Md5::digest(pad_password(owner_password)).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash).to_vec();
        }
    }
    hash.truncate(key_length);
    hash
}

/// Algorithms 4/5: compute the `/U` value from the file key.
pub fn compute_user_value(key: &[u8], file_id: &[u8], revision: i64) -> Vec<u8> {
    if revision == 2 {
        rc4_apply(key, &PAD)
    } else {
        let mut hasher = Md5::new();
        hasher.update(PAD);
        hasher.update(file_id);
        let mut value = hasher.finalize().to_vec();

        for i in 0..20u8 {
            let stage_key: Vec<u8> = key.iter().map(|&b| b ^ i).collect();
            value = rc4_apply(&stage_key, &value);
        }
        // Pad to 32 bytes; only the first 16 are significant.
        value.resize(32, 0);
        value
    }
}

/// Algorithms 4/5 (verification): derive the key from a candidate user
/// password and compare the `/U` value. Returns the file key on success.
#[allow(clippy::too_many_arguments)]
pub fn authenticate_user_password(
    password: &[u8],
    user_value: &[u8],
    owner_value: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: i64,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let key = compute_encryption_key(
        password,
        owner_value,
        permissions,
        file_id,
        revision,
        key_length,
        encrypt_metadata,
    );
    let expected = compute_user_value(&key, file_id, revision);

    let significant = if revision >= 3 { 16 } else { 32 };
    if user_value.len() < significant {
        return None;
    }
    if constant_time_eq(&user_value[..significant], &expected[..significant]) {
        Some(key)
    } else {
        None
    }
}

/// Algorithm 7: authenticate an owner password by unwrapping the user
/// password from `/O`, then running user authentication with it.
#[allow(clippy::too_many_arguments)]
pub fn authenticate_owner_password(
    password: &[u8],
    user_value: &[u8],
    owner_value: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: i64,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let rc4_key = owner_rc4_key(password, revision, key_length);

    let mut candidate = owner_value.to_vec();
    if revision == 2 {
        candidate = rc4_apply(&rc4_key, &candidate);
    } else {
        for i in (0..=19u8).rev() {
            let stage_key: Vec<u8> = rc4_key.iter().map(|&b| b ^ i).collect();
            candidate = rc4_apply(&stage_key, &candidate);
        }
    }

    // `candidate` is the padded user password; padding it again is a
    // no-op, so it can be fed straight back in.
    authenticate_user_password(
        &candidate,
        user_value,
        owner_value,
        permissions,
        file_id,
        revision,
        key_length,
        encrypt_metadata,
    )
}

/// Constant-time equality.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_password() {
        let padded = pad_password(b"test");
        assert_eq!(&padded[..4], b"test");
        assert_eq!(&padded[4..], &PAD[..28]);

        let exact = pad_password(&[7u8; 32]);
        assert_eq!(exact, [7u8; 32]);

        let long = pad_password(&[9u8; 40]);
        assert_eq!(long, [9u8; 32]);
    }

    #[test]
    fn test_key_length_respected() {
        let key = compute_encryption_key(b"pw", &[0u8; 32], -1, b"id", 2, 5, true);
        assert_eq!(key.len(), 5);
        let key = compute_encryption_key(b"pw", &[0u8; 32], -1, b"id", 3, 16, true);
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn test_user_auth_round_trip_r2() {
        let owner = compute_owner_value(b"owner", b"user", 2, 5);
        let key = compute_encryption_key(b"user", &owner, -4, b"fileid0", 2, 5, true);
        let user = compute_user_value(&key, b"fileid0", 2);

        let recovered =
            authenticate_user_password(b"user", &user, &owner, -4, b"fileid0", 2, 5, true);
        assert_eq!(recovered, Some(key));

        assert!(
            authenticate_user_password(b"wrong", &user, &owner, -4, b"fileid0", 2, 5, true)
                .is_none()
        );
    }

    #[test]
    fn test_user_auth_round_trip_r3() {
        let owner = compute_owner_value(b"owner", b"user", 3, 16);
        let key = compute_encryption_key(b"user", &owner, -44, b"fid", 3, 16, true);
        let user = compute_user_value(&key, b"fid", 3);

        assert!(
            authenticate_user_password(b"user", &user, &owner, -44, b"fid", 3, 16, true).is_some()
        );
        assert!(
            authenticate_user_password(b"", &user, &owner, -44, b"fid", 3, 16, true).is_none()
        );
    }

    #[test]
    fn test_owner_auth_unwraps_user_password() {
        for (revision, key_length) in [(2i64, 5usize), (3, 16)] {
            let owner = compute_owner_value(b"owner", b"user", revision, key_length);
            let key =
                compute_encryption_key(b"user", &owner, -4, b"fileid0", revision, key_length, true);
            let user = compute_user_value(&key, b"fileid0", revision);

            let via_owner = authenticate_owner_password(
                b"owner", &user, &owner, -4, b"fileid0", revision, key_length, true,
            );
            assert_eq!(via_owner, Some(key), "revision {}", revision);

            assert!(
                authenticate_owner_password(
                    b"user", &user, &owner, -4, b"fileid0", revision, key_length, true
                )
                .is_none(),
                "user password must not pass owner auth"
            );
        }
    }

    #[test]
    fn test_metadata_flag_changes_key_r4_only() {
        let owner = [1u8; 32];
        let with = compute_encryption_key(b"p", &owner, -1, b"id", 4, 16, true);
        let without = compute_encryption_key(b"p", &owner, -1, b"id", 4, 16, false);
        assert_ne!(with, without);

        let with_r3 = compute_encryption_key(b"p", &owner, -1, b"id", 3, 16, true);
        let without_r3 = compute_encryption_key(b"p", &owner, -1, b"id", 3, 16, false);
        assert_eq!(with_r3, without_r3);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
