//! Cryptographic primitives for the file pipeline.
//!
//! Provides password-based key derivation, the streaming block cipher
//! transform, and the sets of algorithm and digest names they accept.

pub mod cipher;
pub mod kdf;

pub use cipher::{Algorithm, CipherTransform, Mode};
pub use kdf::{DerivedKey, Digest, KdfParams, derive_key};

pub(crate) use cipher::KeyIv;

/// AES block length (16 bytes).
pub const BLOCK_LEN: usize = 16;
/// CBC initialization vector length (16 bytes).
pub const IV_LEN: usize = 16;

/// Names of every supported cipher algorithm.
pub fn algorithm_names() -> Vec<&'static str> {
    Algorithm::ALL.iter().map(|a| a.name()).collect()
}

/// Names of every supported key-derivation digest.
pub fn digest_names() -> Vec<&'static str> {
    Digest::ALL.iter().map(|d| d.name()).collect()
}

/// Derive the key for one operation and wire it into a cipher transform.
///
/// The derived key and the expanded key/IV are dropped (and zeroed) before
/// this returns; only the cipher state survives.
pub fn build_transform(
    mode: Mode,
    algorithm: Algorithm,
    password: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> crate::Result<CipherTransform> {
    let derived = derive_key(password, salt, kdf)?;
    let key_iv = KeyIv::expand(&derived, algorithm)?;
    CipherTransform::new(mode, algorithm, &key_iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_sets_are_unique_and_lowercase() {
        for names in [algorithm_names(), digest_names()] {
            let mut sorted = names.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), names.len());
            assert!(names.iter().all(|n| *n == n.to_ascii_lowercase()));
        }
    }

    #[test]
    fn wrong_password_fails_unpadding() {
        let kdf = KdfParams::new(10, 64, "sha1").unwrap();
        let mut ct = Vec::new();
        let mut enc =
            build_transform(Mode::Encrypt, Algorithm::Aes256Cbc, "alakazam", b"s", kdf).unwrap();
        enc.update(b"hello world", &mut ct);
        enc.finalize(&mut ct).unwrap();

        let mut pt = Vec::new();
        let mut dec =
            build_transform(Mode::Decrypt, Algorithm::Aes256Cbc, "wrong", b"s", kdf).unwrap();
        dec.update(&ct, &mut pt);
        let err = dec.finalize(&mut pt).unwrap_err();
        assert!(err.is_transform());
    }
}
