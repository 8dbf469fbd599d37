//! Process-wide defaults applied to every option the caller leaves unset.

/// Salt used when none is given. Fixed so that default encryptions can be
/// reversed without storing anything besides the password.
pub const SALT: &str = "filecipher-default-salt";
/// PBKDF2 rounds.
pub const ITERATIONS: u32 = 1000;
/// Length in bytes of the PBKDF2 output.
pub const KEYLEN: u32 = 512;
/// Largest accepted `keylen`. PBKDF2 work grows linearly with the output
/// length, so the bound also caps derivation time.
pub const MAX_KEYLEN: u32 = 64 * 1024;
/// HMAC digest for PBKDF2.
pub const DIGEST: &str = "sha1";
/// Cipher used for the stream.
pub const ALGORITHM: &str = "aes-256-cbc";
/// Write output through a staging file.
pub const ATOMIC: bool = false;

/// Read buffer size for the streaming pipeline.
pub const CHUNK_SIZE: usize = 64 * 1024;
