//! Password-based file encryption over a streaming AES-CBC pipeline.
//!
//! Every entry point takes a raw JSON options object, validates it into a
//! [`CipherOptions`], derives a key with PBKDF2 and streams the input file
//! through the cipher into the output file. On success the resolved options
//! are handed back so the caller can store what is needed to reverse the
//! operation (everything but the password).
//!
//! Blocking: [`encrypt_sync`], [`decrypt_sync`]. Awaitable:
//! [`encrypt_async`], [`decrypt_async`]. Callback style, spawned on the
//! current Tokio runtime: [`encrypt`], [`decrypt`], [`encrypt_scoped`],
//! [`decrypt_scoped`].

pub mod crypto;
pub mod defaults;
mod error;
pub mod options;
pub mod params;
pub mod pipeline;
mod storage;

pub use crate::crypto::{Algorithm, Digest, Mode};
pub use crate::error::{CipherError, Result, ValidationError};
pub use crate::options::{CipherOptions, Salt, validate};
pub use crate::params::CipherParams;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

/// Encrypt on the current thread.
pub fn encrypt_sync(raw: &Value) -> Result<CipherOptions> {
    run_sync(Mode::Encrypt, raw)
}

/// Decrypt on the current thread. Fails with [`CipherError::Transform`]
/// when the password or parameters do not match the ciphertext.
pub fn decrypt_sync(raw: &Value) -> Result<CipherOptions> {
    run_sync(Mode::Decrypt, raw)
}

pub async fn encrypt_async(raw: &Value) -> Result<CipherOptions> {
    run_async(Mode::Encrypt, raw).await
}

pub async fn decrypt_async(raw: &Value) -> Result<CipherOptions> {
    run_async(Mode::Decrypt, raw).await
}

/// Spawn an encryption and report the outcome to `callback`.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn encrypt<F>(raw: Value, callback: F) -> JoinHandle<()>
where
    F: FnOnce(Result<CipherOptions>) + Send + 'static,
{
    spawn(Mode::Encrypt, raw, callback)
}

/// Spawn a decryption and report the outcome to `callback`.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn decrypt<F>(raw: Value, callback: F) -> JoinHandle<()>
where
    F: FnOnce(Result<CipherOptions>) + Send + 'static,
{
    spawn(Mode::Decrypt, raw, callback)
}

/// Like [`encrypt`], but the callback receives `scope` as its receiver.
/// The scope is handed back through the join handle.
pub fn encrypt_scoped<S, F>(raw: Value, scope: S, callback: F) -> JoinHandle<S>
where
    S: Send + 'static,
    F: FnOnce(&mut S, Result<CipherOptions>) + Send + 'static,
{
    spawn_scoped(Mode::Encrypt, raw, scope, callback)
}

/// Like [`decrypt`], but the callback receives `scope` as its receiver.
pub fn decrypt_scoped<S, F>(raw: Value, scope: S, callback: F) -> JoinHandle<S>
where
    S: Send + 'static,
    F: FnOnce(&mut S, Result<CipherOptions>) + Send + 'static,
{
    spawn_scoped(Mode::Decrypt, raw, scope, callback)
}

/// Supported cipher names.
pub fn list_algorithms() -> Vec<&'static str> {
    crypto::algorithm_names()
}

/// Supported key-derivation digest names.
pub fn list_hashes() -> Vec<&'static str> {
    crypto::digest_names()
}

fn run_sync(mode: Mode, raw: &Value) -> Result<CipherOptions> {
    debug!(%mode, "validating options");
    let options = validate(raw)?;
    pipeline::run_blocking(mode, &options)?;
    Ok(options)
}

async fn run_async(mode: Mode, raw: &Value) -> Result<CipherOptions> {
    debug!(%mode, "validating options");
    let options = validate(raw)?;
    pipeline::run(mode, &options).await?;
    Ok(options)
}

fn spawn<F>(mode: Mode, raw: Value, callback: F) -> JoinHandle<()>
where
    F: FnOnce(Result<CipherOptions>) + Send + 'static,
{
    tokio::spawn(async move { callback(run_async(mode, &raw).await) })
}

fn spawn_scoped<S, F>(mode: Mode, raw: Value, mut scope: S, callback: F) -> JoinHandle<S>
where
    S: Send + 'static,
    F: FnOnce(&mut S, Result<CipherOptions>) + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = run_async(mode, &raw).await;
        callback(&mut scope, outcome);
        scope
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn listings_match_supported_sets() {
        assert_eq!(list_algorithms(), vec!["aes-128-cbc", "aes-192-cbc", "aes-256-cbc"]);
        assert!(list_hashes().contains(&"sha1"));
        assert!(list_hashes().contains(&"sha512"));
        for name in list_algorithms() {
            assert!(Algorithm::from_name(name).is_some());
        }
        for name in list_hashes() {
            assert!(Digest::from_name(name).is_some());
        }
    }

    #[test]
    fn validation_runs_before_any_io() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.enc");
        let raw = json!({
            "input": "/definitely/missing",
            "output": out.to_str().unwrap(),
            "password": "pw",
            "algorithm": "aes-256-xyz",
        });

        let err = encrypt_sync(&raw).unwrap_err();
        assert!(err.is_validation());
        assert!(!out.exists());

        let mut raw = raw;
        raw["algorithm"] = json!("aes-256-cbc");
        raw["digest"] = json!("md4");
        match decrypt_sync(&raw) {
            Err(CipherError::Validation(v)) => assert_eq!(v.field(), "digest"),
            other => panic!("expected a digest validation error, got {other:?}"),
        }
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn callback_receives_resolved_options() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.txt");
        fs::write(&plain, b"hello world").unwrap();
        let raw = json!({
            "input": plain.to_str().unwrap(),
            "output": dir.path().join("plain.enc").to_str().unwrap(),
            "password": "alakazam",
        });

        let (tx, rx) = tokio::sync::oneshot::channel();
        encrypt(raw, move |result| {
            let _ = tx.send(result.map(|o| o.algorithm().to_string()));
        })
        .await
        .unwrap();

        assert_eq!(rx.await.unwrap().unwrap(), "aes-256-cbc");
    }

    #[tokio::test]
    async fn scoped_callback_gets_its_receiver() {
        let raw = json!({ "output": "x", "password": "pw" });

        let seen: Vec<String> = encrypt_scoped(raw, Vec::new(), |seen: &mut Vec<String>, result| {
            seen.push(result.unwrap_err().to_string());
        })
        .await
        .unwrap();

        assert_eq!(seen, vec!["\"input\" is required.".to_string()]);
    }
}
