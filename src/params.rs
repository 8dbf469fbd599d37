//! Persisted cipher parameters.
//!
//! Everything needed to reverse an encryption except the password and the
//! file paths, stored as JSON next to the ciphertext (or anywhere else).

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CipherError, Result};
use crate::options::{CipherOptions, Salt};
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    pub salt: Salt,
    pub iterations: u32,
    pub keylen: u32,
    pub digest: String,
    pub algorithm: String,
}

impl From<&CipherOptions> for CipherParams {
    fn from(opts: &CipherOptions) -> Self {
        Self {
            salt: opts.salt().clone(),
            iterations: opts.iterations(),
            keylen: opts.keylen(),
            digest: opts.digest().to_string(),
            algorithm: opts.algorithm().to_string(),
        }
    }
}

impl CipherParams {
    pub fn load(path: &Path) -> Result<Self> {
        let data = Storage::new(path.to_path_buf()).load()?;
        serde_json::from_slice(&data).map_err(|e| {
            let source = std::io::Error::new(std::io::ErrorKind::InvalidData, e);
            CipherError::io(path, source)
        })
    }

    /// Atomically writes the parameters as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self).map_err(|e| {
            let source = std::io::Error::new(std::io::ErrorKind::InvalidData, e);
            CipherError::io(path, source)
        })?;
        Storage::new(path.to_path_buf()).save(&data)
    }

    /// Fills any of the five fields missing from a raw options object.
    /// Fields the caller already set are left alone.
    pub fn apply_defaults_to(&self, raw: &mut Value) {
        let Some(map) = raw.as_object_mut() else {
            return;
        };
        let fields = [
            ("salt", serde_json::to_value(&self.salt).unwrap_or(Value::Null)),
            ("iterations", Value::from(self.iterations)),
            ("keylen", Value::from(self.keylen)),
            ("digest", Value::from(self.digest.as_str())),
            ("algorithm", Value::from(self.algorithm.as_str())),
        ];
        for (key, value) in fields {
            if map.get(key).is_none_or(Value::is_null) {
                map.insert(key.to_string(), value);
            }
        }
    }
}
