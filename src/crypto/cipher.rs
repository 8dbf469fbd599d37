use aes::{Aes128, Aes192, Aes256, Block};
use cbc::cipher::block_padding::{Padding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use super::kdf::DerivedKey;
use super::{BLOCK_LEN, IV_LEN};
use crate::error::{CipherError, Result};

/// Block ciphers the pipeline can stream through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [
        Algorithm::Aes128Cbc,
        Algorithm::Aes192Cbc,
        Algorithm::Aes256Cbc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Aes128Cbc => "aes-128-cbc",
            Algorithm::Aes192Cbc => "aes-192-cbc",
            Algorithm::Aes256Cbc => "aes-256-cbc",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    pub fn key_len(self) -> usize {
        match self {
            Algorithm::Aes128Cbc => 16,
            Algorithm::Aes192Cbc => 24,
            Algorithm::Aes256Cbc => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Encrypt => f.write_str("encrypt"),
            Mode::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// Cipher key and IV for one operation, expanded from the whole derived key.
pub(crate) struct KeyIv {
    key: Zeroizing<Vec<u8>>,
    iv: [u8; IV_LEN],
}

impl Drop for KeyIv {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl KeyIv {
    /// HKDF-SHA256 over every byte of `derived`, bound to the algorithm name.
    pub(crate) fn expand(derived: &DerivedKey, algorithm: Algorithm) -> Result<Self> {
        let hkdf = Hkdf::<Sha256>::new(None, derived.as_bytes());
        let mut okm = Zeroizing::new(vec![0u8; algorithm.key_len() + IV_LEN]);
        hkdf.expand(algorithm.name().as_bytes(), &mut okm)
            .map_err(|e| CipherError::Derivation(format!("key expansion failed: {e}")))?;

        let (key, iv_bytes) = okm.split_at(algorithm.key_len());
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(iv_bytes);

        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
            iv,
        })
    }
}

enum CbcState {
    Enc128(cbc::Encryptor<Aes128>),
    Enc192(cbc::Encryptor<Aes192>),
    Enc256(cbc::Encryptor<Aes256>),
    Dec128(cbc::Decryptor<Aes128>),
    Dec192(cbc::Decryptor<Aes192>),
    Dec256(cbc::Decryptor<Aes256>),
}

impl CbcState {
    fn new(mode: Mode, algorithm: Algorithm, key_iv: &KeyIv) -> Result<Self> {
        let key = key_iv.key.as_slice();
        let iv = key_iv.iv.as_slice();
        let state = match (mode, algorithm) {
            (Mode::Encrypt, Algorithm::Aes128Cbc) => {
                CbcState::Enc128(cbc::Encryptor::new_from_slices(key, iv).map_err(invalid_key)?)
            }
            (Mode::Encrypt, Algorithm::Aes192Cbc) => {
                CbcState::Enc192(cbc::Encryptor::new_from_slices(key, iv).map_err(invalid_key)?)
            }
            (Mode::Encrypt, Algorithm::Aes256Cbc) => {
                CbcState::Enc256(cbc::Encryptor::new_from_slices(key, iv).map_err(invalid_key)?)
            }
            (Mode::Decrypt, Algorithm::Aes128Cbc) => {
                CbcState::Dec128(cbc::Decryptor::new_from_slices(key, iv).map_err(invalid_key)?)
            }
            (Mode::Decrypt, Algorithm::Aes192Cbc) => {
                CbcState::Dec192(cbc::Decryptor::new_from_slices(key, iv).map_err(invalid_key)?)
            }
            (Mode::Decrypt, Algorithm::Aes256Cbc) => {
                CbcState::Dec256(cbc::Decryptor::new_from_slices(key, iv).map_err(invalid_key)?)
            }
        };
        Ok(state)
    }

    fn apply(&mut self, block: &mut Block) {
        match self {
            CbcState::Enc128(c) => c.encrypt_block_mut(block),
            CbcState::Enc192(c) => c.encrypt_block_mut(block),
            CbcState::Enc256(c) => c.encrypt_block_mut(block),
            CbcState::Dec128(c) => c.decrypt_block_mut(block),
            CbcState::Dec192(c) => c.decrypt_block_mut(block),
            CbcState::Dec256(c) => c.decrypt_block_mut(block),
        }
    }
}

fn invalid_key(e: cbc::cipher::InvalidLength) -> CipherError {
    CipherError::Derivation(format!("cipher rejected key material: {e}"))
}

/// Incremental CBC transform with PKCS#7 padding.
///
/// Feed arbitrary chunks through [`update`](Self::update), then call
/// [`finalize`](Self::finalize) exactly once. When decrypting, the last full
/// block is always held back so unpadding runs on the real final block.
pub struct CipherTransform {
    mode: Mode,
    state: CbcState,
    pending: Zeroizing<Vec<u8>>,
}

impl CipherTransform {
    pub(crate) fn new(mode: Mode, algorithm: Algorithm, key_iv: &KeyIv) -> Result<Self> {
        Ok(Self {
            mode,
            state: CbcState::new(mode, algorithm, key_iv)?,
            pending: Zeroizing::new(Vec::with_capacity(BLOCK_LEN * 2)),
        })
    }

    /// Transform as many whole blocks of `input` as possible, appending the
    /// result to `out`.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);

        let mut ready = self.pending.len() - self.pending.len() % BLOCK_LEN;
        if self.mode == Mode::Decrypt && ready == self.pending.len() && ready > 0 {
            ready -= BLOCK_LEN;
        }

        for chunk in self.pending[..ready].chunks_exact_mut(BLOCK_LEN) {
            self.state.apply(Block::from_mut_slice(chunk));
        }
        out.extend_from_slice(&self.pending[..ready]);
        self.pending.drain(..ready);
    }

    /// Pad (encrypt) or check and strip padding (decrypt) on the final block.
    pub fn finalize(mut self, out: &mut Vec<u8>) -> Result<()> {
        let mut block = Block::default();
        match self.mode {
            Mode::Encrypt => {
                let n = self.pending.len();
                block[..n].copy_from_slice(&self.pending);
                Pkcs7::pad(&mut block, n);
                self.state.apply(&mut block);
                out.extend_from_slice(&block);
            }
            Mode::Decrypt => {
                if self.pending.len() != BLOCK_LEN {
                    return Err(CipherError::Transform(
                        "wrong final block length".into(),
                    ));
                }
                block.copy_from_slice(&self.pending);
                self.state.apply(&mut block);
                let unpadded = Pkcs7::unpad(&block).map(|plain| out.extend_from_slice(plain));
                block.as_mut_slice().zeroize();
                unpadded.map_err(|_| CipherError::Transform("invalid padding".into()))?;
                return Ok(());
            }
        }
        block.as_mut_slice().zeroize();
        Ok(())
    }
}
