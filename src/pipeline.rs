//! The streaming file pipeline: derive, open, stream, finish.
//!
//! Each run goes `Deriving → Streaming → Completed | Failed`. The transform
//! is shared; [`run_blocking`] drives it with `std::io` on the caller's
//! thread and [`run`] drives it with `tokio` I/O, yielding at every chunk.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto::{CipherTransform, Mode, build_transform};
use crate::defaults::CHUNK_SIZE;
use crate::error::{CipherError, Result, ValidationError};
use crate::options::CipherOptions;
use crate::storage::Storage;

/// Byte counts for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Encrypt or decrypt `options.input()` into `options.output()` on the
/// current thread.
pub fn run_blocking(mode: Mode, options: &CipherOptions) -> Result<Summary> {
    ensure_distinct(options.input(), options.output())?;

    debug!(%mode, algorithm = options.algorithm(), "deriving key");
    let mut transform = prepare(mode, options)?;

    let mut input = File::open(options.input()).map_err(|e| CipherError::io(options.input(), e))?;
    let storage = Storage::new(options.output().to_path_buf());
    let mut out = storage.create(options.atomic())?;
    let written_path = out.written_path(&storage).to_path_buf();

    debug!(%mode, input = %options.input().display(), output = %options.output().display(), "streaming");
    let mut buf = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
    let mut staged = Zeroizing::new(Vec::with_capacity(CHUNK_SIZE + 16));
    let mut summary = Summary::default();

    let streamed = (|| -> Result<()> {
        loop {
            let n = match input.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CipherError::io(options.input(), e)),
            };
            summary.bytes_read += n as u64;
            transform.update(&buf[..n], &mut staged);
            write_staged(&mut out.file, &mut staged, &written_path, &mut summary)?;
        }
        transform.finalize(&mut staged)?;
        write_staged(&mut out.file, &mut staged, &written_path, &mut summary)
    })();

    match streamed {
        Ok(()) => {
            storage.commit(out)?;
            info!(%mode, bytes_read = summary.bytes_read, bytes_written = summary.bytes_written, "completed");
            Ok(summary)
        }
        Err(e) => {
            storage.discard(out);
            debug!(%mode, error = %e, "failed");
            Err(e)
        }
    }
}

/// Async counterpart of [`run_blocking`]. Key derivation runs on the
/// blocking pool; file I/O suspends at each chunk.
pub async fn run(mode: Mode, options: &CipherOptions) -> Result<Summary> {
    ensure_distinct_async(options.input(), options.output()).await?;

    debug!(%mode, algorithm = options.algorithm(), "deriving key");
    let owned = options.clone();
    let mut transform = tokio::task::spawn_blocking(move || prepare(mode, &owned))
        .await
        .map_err(|e| CipherError::Task(e.to_string()))??;

    let mut input = tokio::fs::File::open(options.input())
        .await
        .map_err(|e| CipherError::io(options.input(), e))?;
    let storage = Storage::new(options.output().to_path_buf());
    let mut out = storage.create_async(options.atomic()).await?;
    let written_path = out.written_path(&storage).to_path_buf();

    debug!(%mode, input = %options.input().display(), output = %options.output().display(), "streaming");
    let mut buf = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
    let mut staged = Zeroizing::new(Vec::with_capacity(CHUNK_SIZE + 16));
    let mut summary = Summary::default();

    let streamed = async {
        loop {
            let n = input
                .read(&mut buf)
                .await
                .map_err(|e| CipherError::io(options.input(), e))?;
            if n == 0 {
                break;
            }
            summary.bytes_read += n as u64;
            transform.update(&buf[..n], &mut staged);
            out.file
                .write_all(&staged)
                .await
                .map_err(|e| CipherError::io(&written_path, e))?;
            summary.bytes_written += staged.len() as u64;
            staged.clear();
        }
        transform.finalize(&mut staged)?;
        out.file
            .write_all(&staged)
            .await
            .map_err(|e| CipherError::io(&written_path, e))?;
        summary.bytes_written += staged.len() as u64;
        staged.clear();
        Ok::<(), CipherError>(())
    }
    .await;

    match streamed {
        Ok(()) => {
            storage.commit_async(out).await?;
            info!(%mode, bytes_read = summary.bytes_read, bytes_written = summary.bytes_written, "completed");
            Ok(summary)
        }
        Err(e) => {
            storage.discard(out);
            debug!(%mode, error = %e, "failed");
            Err(e)
        }
    }
}

fn prepare(mode: Mode, options: &CipherOptions) -> Result<CipherTransform> {
    build_transform(
        mode,
        options.cipher(),
        options.password(),
        options.salt().as_bytes(),
        options.kdf_params()?,
    )
}

fn write_staged(
    file: &mut File,
    staged: &mut Vec<u8>,
    path: &Path,
    summary: &mut Summary,
) -> Result<()> {
    file.write_all(staged.as_slice()).map_err(|e| CipherError::io(path, e))?;
    summary.bytes_written += staged.len() as u64;
    staged.clear();
    Ok(())
}

/// Reading and writing the same file at once would destroy it.
fn ensure_distinct(input: &Path, output: &Path) -> Result<()> {
    if let (Ok(a), Ok(b)) = (input.canonicalize(), output.canonicalize()) {
        if a == b {
            return Err(ValidationError::SamePath.into());
        }
    }
    Ok(())
}

async fn ensure_distinct_async(input: &Path, output: &Path) -> Result<()> {
    let a = tokio::fs::canonicalize(input).await;
    let b = tokio::fs::canonicalize(output).await;
    if let (Ok(a), Ok(b)) = (a, b) {
        if a == b {
            return Err(ValidationError::SamePath.into());
        }
    }
    Ok(())
}
