use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512, Sha512_224, Sha512_256};
use zeroize::Zeroizing;

use crate::defaults::MAX_KEYLEN;
use crate::error::{CipherError, Result};

/// HMAC digests accepted by the key deriver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Digest {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
}

impl Digest {
    pub const ALL: [Digest; 7] = [
        Digest::Sha1,
        Digest::Sha224,
        Digest::Sha256,
        Digest::Sha384,
        Digest::Sha512,
        Digest::Sha512_224,
        Digest::Sha512_256,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Digest::Sha1 => "sha1",
            Digest::Sha224 => "sha224",
            Digest::Sha256 => "sha256",
            Digest::Sha384 => "sha384",
            Digest::Sha512 => "sha512",
            Digest::Sha512_224 => "sha512-224",
            Digest::Sha512_256 => "sha512-256",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
    }
}

/// Parameters fed to PBKDF2 alongside the password and salt.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    iterations: u32,
    keylen: u32,
    digest: Digest,
}

impl KdfParams {
    pub fn new(iterations: u32, keylen: u32, digest: &str) -> Result<Self> {
        let digest = Digest::from_name(digest)
            .ok_or_else(|| CipherError::Derivation(format!("unsupported digest \"{digest}\"")))?;
        let params = Self {
            iterations,
            keylen,
            digest,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn keylen(&self) -> u32 {
        self.keylen
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations < 1 {
            return Err(CipherError::Derivation("iterations must be >= 1".into()));
        }
        if self.keylen < 1 {
            return Err(CipherError::Derivation("keylen must be >= 1".into()));
        }
        if self.keylen > MAX_KEYLEN {
            return Err(CipherError::Derivation(format!(
                "keylen must be <= {MAX_KEYLEN}"
            )));
        }
        Ok(())
    }
}

/// PBKDF2 output. Zeroed on drop and never printed.
pub struct DerivedKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive exactly `kdf.keylen()` bytes from the password with PBKDF2-HMAC.
///
/// Deterministic: the same password, salt and parameters always produce the
/// same key, which is what lets decryption reproduce it.
pub fn derive_key(password: &str, salt: &[u8], kdf: KdfParams) -> Result<DerivedKey> {
    kdf.validate()?;

    let mut bytes = Zeroizing::new(vec![0u8; kdf.keylen as usize]);
    let pw = password.as_bytes();
    let rounds = kdf.iterations;

    match kdf.digest {
        Digest::Sha1 => pbkdf2::<Hmac<Sha1>>(pw, salt, rounds, &mut bytes),
        Digest::Sha224 => pbkdf2::<Hmac<Sha224>>(pw, salt, rounds, &mut bytes),
        Digest::Sha256 => pbkdf2::<Hmac<Sha256>>(pw, salt, rounds, &mut bytes),
        Digest::Sha384 => pbkdf2::<Hmac<Sha384>>(pw, salt, rounds, &mut bytes),
        Digest::Sha512 => pbkdf2::<Hmac<Sha512>>(pw, salt, rounds, &mut bytes),
        Digest::Sha512_224 => pbkdf2::<Hmac<Sha512_224>>(pw, salt, rounds, &mut bytes),
        Digest::Sha512_256 => pbkdf2::<Hmac<Sha512_256>>(pw, salt, rounds, &mut bytes),
    }
    .map_err(|e| CipherError::Derivation(format!("PBKDF2 failed: {e}")))?;

    Ok(DerivedKey { bytes })
}
