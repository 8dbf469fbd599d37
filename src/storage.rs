//! Destination files: direct writes, staged (atomic) writes, and whole-file
//! atomic saves.

use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CipherError, Result};

/// A destination path on the filesystem.
///
/// In direct mode the file is created or truncated in place. In staged mode
/// bytes go to a sibling temporary file that replaces the destination only
/// once everything has been written.
#[derive(Clone, Debug)]
pub(crate) struct Storage {
    path: PathBuf,
}

/// An open destination handle plus the staging path, if any.
pub(crate) struct Output<F> {
    pub(crate) file: F,
    staging: Option<PathBuf>,
}

impl<F> Output<F> {
    /// Path the bytes are physically going to.
    pub(crate) fn written_path<'a>(&'a self, storage: &'a Storage) -> &'a Path {
        self.staging.as_deref().unwrap_or(storage.path.as_path())
    }
}

impl Storage {
    /// Creates a new Storage instance with the given path.
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the entire file into memory.
    pub(crate) fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| CipherError::io(&self.path, e))
    }

    /// Saves data using atomic write.
    ///
    /// Data goes to a randomly named temporary file which is synced and then
    /// renamed over the destination, followed by a sync of the parent
    /// directory. A crash leaves either the old or the new file, never a
    /// partial one. Parent directories are created if missing.
    pub(crate) fn save(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.parent() {
            fs::create_dir_all(parent).map_err(|e| CipherError::io(parent, e))?;
        }

        let mut out = self.create_staged()?;
        let tmp_path = out.written_path(self).to_path_buf();

        let written = out
            .file
            .write_all(data)
            .and_then(|_| out.file.sync_all())
            .map_err(|e| CipherError::io(&tmp_path, e));
        if let Err(e) = written {
            self.discard(out);
            return Err(e);
        }

        self.commit(out)?;
        self.sync_parent()
    }

    /// Opens the destination for a streaming write.
    pub(crate) fn create(&self, staged: bool) -> Result<Output<File>> {
        if staged {
            return self.create_staged();
        }
        let file = File::create(&self.path).map_err(|e| CipherError::io(&self.path, e))?;
        Ok(Output {
            file,
            staging: None,
        })
    }

    fn create_staged(&self) -> Result<Output<File>> {
        let tmp_path = self.random_tmp_path()?;

        // fail if exists
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .map_err(|e| CipherError::io(&tmp_path, e))?;

        Ok(Output {
            file,
            staging: Some(tmp_path),
        })
    }

    /// Flushes the handle and, for staged writes, moves the staging file over
    /// the destination.
    pub(crate) fn commit(&self, mut out: Output<File>) -> Result<()> {
        let written = out.written_path(self).to_path_buf();
        out.file
            .flush()
            .and_then(|_| out.file.sync_all())
            .map_err(|e| CipherError::io(&written, e))?;
        drop(out.file);

        if let Some(tmp_path) = out.staging {
            if let Err(e) = fs::rename(&tmp_path, &self.path) {
                let _ = fs::remove_file(&tmp_path);
                return Err(CipherError::io(&self.path, e));
            }
        }
        Ok(())
    }

    /// Drops the handle and removes the staging file, if any. Direct-mode
    /// output is left in place.
    pub(crate) fn discard<F>(&self, out: Output<F>) {
        drop(out.file);
        if let Some(tmp_path) = out.staging {
            if fs::remove_file(&tmp_path).is_err() {
                tracing::warn!(path = %tmp_path.display(), "could not remove staging file");
            }
        }
    }

    /// Async counterpart of [`create`](Self::create).
    pub(crate) async fn create_async(&self, staged: bool) -> Result<Output<tokio::fs::File>> {
        if staged {
            let tmp_path = self.random_tmp_path()?;
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)
                .await
                .map_err(|e| CipherError::io(&tmp_path, e))?;
            return Ok(Output {
                file,
                staging: Some(tmp_path),
            });
        }
        let file = tokio::fs::File::create(&self.path)
            .await
            .map_err(|e| CipherError::io(&self.path, e))?;
        Ok(Output {
            file,
            staging: None,
        })
    }

    /// Async counterpart of [`commit`](Self::commit).
    pub(crate) async fn commit_async(&self, mut out: Output<tokio::fs::File>) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let written = out.written_path(self).to_path_buf();
        out.file
            .flush()
            .await
            .map_err(|e| CipherError::io(&written, e))?;
        out.file
            .sync_all()
            .await
            .map_err(|e| CipherError::io(&written, e))?;
        drop(out.file);

        if let Some(tmp_path) = out.staging {
            if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(CipherError::io(&self.path, e));
            }
        }
        Ok(())
    }

    fn parent(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// Makes the rename durable.
    #[cfg(unix)]
    fn sync_parent(&self) -> Result<()> {
        if let Some(parent) = self.parent() {
            let dir = File::open(parent).map_err(|e| CipherError::io(parent, e))?;
            dir.sync_all().map_err(|e| CipherError::io(parent, e))?;
        }
        Ok(())
    }

    /// Directories cannot be opened as files here.
    #[cfg(not(unix))]
    fn sync_parent(&self) -> Result<()> {
        Ok(())
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        fill(&mut buf).map_err(|e| {
            let source = std::io::Error::other(format!("OS random generator unavailable: {e}"));
            CipherError::io(&self.path, source)
        })?;

        let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());

        let tmp_name = format!("{}.tmp.{}", file_name, rand_string);

        Ok(self.path.with_file_name(tmp_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // --------------------------------------------------
    // SAVE / LOAD
    // --------------------------------------------------

    #[test]
    fn load_returns_written_data() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("params.json"));
        storage.save(b"hello world").unwrap();

        assert_eq!(storage.load().unwrap(), b"hello world");
    }

    #[test]
    fn load_fails_if_file_does_not_exist() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("missing.json"));

        let err = storage.load().unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn save_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.json");
        let storage = Storage::new(path.clone());

        storage.save(b"first").unwrap();
        storage.save(b"second").unwrap();

        assert_eq!(fs::read(path).unwrap(), b"second");
        assert_eq!(file_names(dir.path()), vec!["params.json"]);
    }

    #[test]
    fn parent_directory_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("params.json");

        Storage::new(nested.clone()).save(b"data").unwrap();

        assert!(nested.exists());
    }

    // --------------------------------------------------
    // TMP PATHS
    // --------------------------------------------------

    #[test]
    fn random_tmp_path_is_a_unique_sibling() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.enc");
        let storage = Storage::new(path.clone());

        let a = storage.random_tmp_path().unwrap();
        let b = storage.random_tmp_path().unwrap();

        assert_eq!(a.parent(), path.parent());
        assert_ne!(a, path);
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("out.enc.tmp."));
    }

    // --------------------------------------------------
    // STREAMING OUTPUT
    // --------------------------------------------------

    #[test]
    fn staged_output_appears_only_on_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.enc");
        let storage = Storage::new(path.clone());

        let mut out = storage.create(true).unwrap();
        out.file.write_all(b"payload").unwrap();
        assert!(!path.exists());

        storage.commit(out).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"payload");
        assert_eq!(file_names(dir.path()), vec!["out.enc"]);
    }

    #[test]
    fn discarded_staged_output_leaves_destination_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.enc");
        fs::write(&path, b"previous").unwrap();
        let storage = Storage::new(path.clone());

        let mut out = storage.create(true).unwrap();
        out.file.write_all(b"half").unwrap();
        storage.discard(out);

        assert_eq!(fs::read(&path).unwrap(), b"previous");
        assert_eq!(file_names(dir.path()), vec!["out.enc"]);
    }

    #[test]
    fn direct_output_truncates_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.enc");
        fs::write(&path, b"a much longer previous content").unwrap();
        let storage = Storage::new(path.clone());

        let mut out = storage.create(false).unwrap();
        out.file.write_all(b"new").unwrap();
        storage.commit(out).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn create_in_missing_directory_names_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no").join("such").join("out.enc");

        let err = Storage::new(path).create(false).err().unwrap();
        assert!(err.is_io());
        assert!(err.to_string().contains("out.enc"));
    }

    #[tokio::test]
    async fn async_staged_output_commits() {
        use tokio::io::AsyncWriteExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("out.enc");
        let storage = Storage::new(path.clone());

        let mut out = storage.create_async(true).await.unwrap();
        out.file.write_all(b"async payload").await.unwrap();
        storage.commit_async(out).await.unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"async payload");
        assert_eq!(file_names(dir.path()), vec!["out.enc"]);
    }
}
