//! Option validation and normalization.
//!
//! Callers hand over a loosely typed JSON object; [`validate`] is the only
//! place that reads it. Rules run in a fixed order and the first violation
//! is reported, so every error names exactly one field.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use zeroize::Zeroizing;

use crate::crypto::{Algorithm, Digest, KdfParams};
use crate::defaults;
use crate::error::{Result, ValidationError};

/// Key-derivation salt, kept in the form the caller supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Salt {
    Text(String),
    Bytes(Vec<u8>),
}

impl Salt {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Salt::Text(s) => s.as_bytes(),
            Salt::Bytes(b) => b,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Salt::Text(s) => Value::String(s.clone()),
            Salt::Bytes(b) => Value::Array(b.iter().map(|x| Value::from(*x)).collect()),
        }
    }
}

impl Default for Salt {
    fn default() -> Self {
        Salt::Text(defaults::SALT.to_string())
    }
}

impl From<&str> for Salt {
    fn from(s: &str) -> Self {
        Salt::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Salt {
    fn from(b: Vec<u8>) -> Self {
        Salt::Bytes(b)
    }
}

/// Fully resolved options for one encrypt or decrypt call.
///
/// Only produced by [`validate`]; every field is present and type-checked.
/// Serializing skips the password.
#[derive(Clone, Serialize)]
pub struct CipherOptions {
    input: String,
    output: String,
    #[serde(skip)]
    password: Zeroizing<String>,
    salt: Salt,
    iterations: u32,
    keylen: u32,
    digest: String,
    algorithm: String,
    #[serde(skip)]
    cipher: Algorithm,
    atomic: bool,
}

impl CipherOptions {
    pub fn input(&self) -> &Path {
        Path::new(&self.input)
    }

    pub fn output(&self) -> &Path {
        Path::new(&self.output)
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn keylen(&self) -> u32 {
        self.keylen
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn cipher(&self) -> Algorithm {
        self.cipher
    }

    pub fn atomic(&self) -> bool {
        self.atomic
    }

    /// PBKDF2 parameters. Fails if the digest is not supported.
    pub fn kdf_params(&self) -> Result<KdfParams> {
        KdfParams::new(self.iterations, self.keylen, &self.digest)
    }

    /// The options as a raw object again, password included, so a caller can
    /// tweak one field and revalidate.
    pub fn to_raw(&self) -> Value {
        let mut map = Map::new();
        map.insert("input".into(), Value::from(self.input.as_str()));
        map.insert("output".into(), Value::from(self.output.as_str()));
        map.insert("password".into(), Value::from(self.password.as_str()));
        map.insert("salt".into(), self.salt.to_value());
        map.insert("iterations".into(), Value::from(self.iterations));
        map.insert("keylen".into(), Value::from(self.keylen));
        map.insert("digest".into(), Value::from(self.digest.as_str()));
        map.insert("algorithm".into(), Value::from(self.algorithm.as_str()));
        map.insert("atomic".into(), Value::from(self.atomic));
        Value::Object(map)
    }
}

impl std::fmt::Debug for CipherOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherOptions")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("password", &"[REDACTED]")
            .field("salt", &self.salt)
            .field("iterations", &self.iterations)
            .field("keylen", &self.keylen)
            .field("digest", &self.digest)
            .field("algorithm", &self.algorithm)
            .field("atomic", &self.atomic)
            .finish()
    }
}

/// Check `raw` and fill unset optional fields from [`defaults`].
pub fn validate(raw: &Value) -> Result<CipherOptions, ValidationError> {
    let map = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let input = required_string(map, "input")?;
    let output = required_string(map, "output")?;
    let password = required_string(map, "password")?;
    if password.is_empty() {
        return Err(ValidationError::EmptyPassword);
    }

    let salt = match present(map, "salt") {
        None => Salt::default(),
        Some(Value::String(s)) => Salt::Text(s.clone()),
        Some(Value::Array(items)) => Salt::Bytes(byte_sequence(items)?),
        Some(_) => return Err(ValidationError::InvalidSalt),
    };

    let iterations = optional_u32(map, "iterations", defaults::ITERATIONS)?;
    let keylen = optional_u32(map, "keylen", defaults::KEYLEN)?;
    if keylen > defaults::MAX_KEYLEN {
        return Err(ValidationError::TooLarge("keylen", defaults::MAX_KEYLEN));
    }

    let digest = optional_string(map, "digest", defaults::DIGEST)?;
    if Digest::from_name(&digest).is_none() {
        return Err(ValidationError::UnknownDigest(digest));
    }

    let algorithm = optional_string(map, "algorithm", defaults::ALGORITHM)?;
    let cipher = Algorithm::from_name(&algorithm)
        .ok_or_else(|| ValidationError::UnknownAlgorithm(algorithm.clone()))?;

    let atomic = match present(map, "atomic") {
        None => defaults::ATOMIC,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(ValidationError::NotBoolean("atomic")),
    };

    if Path::new(&input) == Path::new(&output) {
        return Err(ValidationError::SamePath);
    }

    Ok(CipherOptions {
        input,
        output,
        password: Zeroizing::new(password),
        salt,
        iterations,
        keylen,
        digest,
        algorithm,
        cipher,
        atomic,
    })
}

/// A key set to `null` counts as absent.
fn present<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn required_string(map: &Map<String, Value>, key: &'static str) -> Result<String, ValidationError> {
    match present(map, key) {
        None => Err(ValidationError::Required(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::NotString(key)),
    }
}

fn optional_string(
    map: &Map<String, Value>,
    key: &'static str,
    default: &str,
) -> Result<String, ValidationError> {
    match present(map, key) {
        None => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::NotString(key)),
    }
}

fn optional_u32(
    map: &Map<String, Value>,
    key: &'static str,
    default: u32,
) -> Result<u32, ValidationError> {
    let n = match present(map, key) {
        None => return Ok(default),
        Some(Value::Number(n)) => integer(n).ok_or(ValidationError::NotInteger(key))?,
        Some(_) => return Err(ValidationError::NotInteger(key)),
    };
    match u32::try_from(n) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ValidationError::NotPositive(key)),
    }
}

/// Whole numbers only; `1000.0` counts, `1000.5` does not.
fn integer(n: &Number) -> Option<i128> {
    if let Some(i) = n.as_i64() {
        return Some(i128::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(i128::from(u));
    }
    n.as_f64()
        .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 1e30)
        .map(|f| f as i128)
}

fn byte_sequence(items: &[Value]) -> Result<Vec<u8>, ValidationError> {
    items
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or(ValidationError::InvalidSalt)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({ "input": "in.txt", "output": "out.enc", "password": "alakazam" })
    }

    fn with(key: &str, value: Value) -> Value {
        let mut raw = base();
        raw.as_object_mut().unwrap().insert(key.into(), value);
        raw
    }

    fn without(key: &str) -> Value {
        let mut raw = base();
        raw.as_object_mut().unwrap().remove(key);
        raw
    }

    fn message(raw: &Value) -> String {
        validate(raw).unwrap_err().to_string()
    }

    #[test]
    fn defaults_are_filled() {
        let opts = validate(&base()).unwrap();
        assert_eq!(opts.input(), Path::new("in.txt"));
        assert_eq!(opts.output(), Path::new("out.enc"));
        assert_eq!(opts.password(), "alakazam");
        assert_eq!(opts.salt(), &Salt::Text(defaults::SALT.into()));
        assert_eq!(opts.iterations(), defaults::ITERATIONS);
        assert_eq!(opts.keylen(), defaults::KEYLEN);
        assert_eq!(opts.digest(), defaults::DIGEST);
        assert_eq!(opts.algorithm(), defaults::ALGORITHM);
        assert_eq!(opts.cipher(), Algorithm::Aes256Cbc);
        assert!(!opts.atomic());
    }

    #[test]
    fn custom_values_are_kept() {
        let raw = json!({
            "input": "a", "output": "b", "password": "pw",
            "salt": "abracadabra", "iterations": 1001, "keylen": 256,
            "digest": "sha256", "algorithm": "aes-128-cbc", "atomic": true,
        });
        let opts = validate(&raw).unwrap();
        assert_eq!(opts.salt(), &Salt::Text("abracadabra".into()));
        assert_eq!(opts.iterations(), 1001);
        assert_eq!(opts.keylen(), 256);
        assert_eq!(opts.digest(), "sha256");
        assert_eq!(opts.cipher(), Algorithm::Aes128Cbc);
        assert!(opts.atomic());
    }

    #[test]
    fn salt_accepts_bytes() {
        let opts = validate(&with("salt", json!([1, 2, 255]))).unwrap();
        assert_eq!(opts.salt().as_bytes(), &[1, 2, 255]);

        assert_eq!(message(&with("salt", json!([1, 256]))), "\"salt\" must be a string or buffer.");
        assert_eq!(message(&with("salt", json!(42))), "\"salt\" must be a string or buffer.");
    }

    #[test]
    fn missing_required_fields_name_only_that_field() {
        for field in ["input", "output", "password"] {
            let err = validate(&without(field)).unwrap_err();
            assert_eq!(err.to_string(), format!("\"{field}\" is required."));
            assert_eq!(err.field(), field);
        }
    }

    #[test]
    fn required_fields_must_be_strings() {
        for field in ["input", "output", "password"] {
            assert_eq!(
                message(&with(field, json!(12))),
                format!("\"{field}\" must be a string.")
            );
        }
    }

    #[test]
    fn optional_fields_are_type_checked() {
        assert_eq!(message(&with("iterations", json!("many"))), "\"iterations\" must be an integer.");
        assert_eq!(message(&with("iterations", json!(1.5))), "\"iterations\" must be an integer.");
        assert_eq!(message(&with("keylen", json!(true))), "\"keylen\" must be an integer.");
        assert_eq!(message(&with("digest", json!(256))), "\"digest\" must be a string.");
        assert_eq!(message(&with("algorithm", json!({}))), "\"algorithm\" must be a string.");
        assert_eq!(message(&with("atomic", json!("yes"))), "\"atomic\" must be a boolean.");
    }

    #[test]
    fn integers_must_be_positive() {
        assert_eq!(message(&with("iterations", json!(0))), "\"iterations\" must be a positive integer.");
        assert_eq!(message(&with("keylen", json!(-4))), "\"keylen\" must be a positive integer.");
        assert_eq!(
            message(&with("keylen", json!(u64::from(u32::MAX) + 1))),
            "\"keylen\" must be a positive integer."
        );
        assert_eq!(validate(&with("iterations", json!(2000.0))).unwrap().iterations(), 2000);
    }

    #[test]
    fn unknown_algorithm_is_quoted() {
        assert_eq!(
            message(&with("algorithm", json!("rot13"))),
            "\"rot13\" is not a valid cipher algorithm."
        );
    }

    #[test]
    fn unknown_digest_is_attributed_to_digest() {
        let err = validate(&with("digest", json!("whirlpool"))).unwrap_err();
        assert_eq!(err, ValidationError::UnknownDigest("whirlpool".into()));
        assert_eq!(err.field(), "digest");
        assert_eq!(err.to_string(), "\"whirlpool\" is not a valid digest.");

        let opts = validate(&with("digest", json!("SHA512"))).unwrap();
        assert_eq!(opts.digest(), "SHA512");
        assert!(opts.kdf_params().is_ok());
    }

    #[test]
    fn keylen_is_bounded() {
        let opts = validate(&with("keylen", json!(defaults::MAX_KEYLEN))).unwrap();
        assert_eq!(opts.keylen(), defaults::MAX_KEYLEN);

        assert_eq!(
            message(&with("keylen", json!(defaults::MAX_KEYLEN + 1))),
            format!("\"keylen\" must not exceed {}.", defaults::MAX_KEYLEN)
        );
        assert_eq!(
            validate(&with("keylen", json!(u32::MAX))).unwrap_err(),
            ValidationError::TooLarge("keylen", defaults::MAX_KEYLEN)
        );
    }

    #[test]
    fn first_violation_wins() {
        let raw = json!({ "output": 1, "salt": 2 });
        assert_eq!(message(&raw), "\"input\" is required.");

        let raw = json!({ "input": "a", "output": "b", "password": "p", "salt": 2, "keylen": "x" });
        assert_eq!(message(&raw), "\"salt\" must be a string or buffer.");
    }

    #[test]
    fn empty_password_and_same_path_are_rejected() {
        assert_eq!(message(&with("password", json!(""))), "\"password\" must not be empty.");
        assert_eq!(validate(&with("output", json!("in.txt"))).unwrap_err(), ValidationError::SamePath);
    }

    #[test]
    fn null_counts_as_absent() {
        assert_eq!(validate(&with("salt", Value::Null)).unwrap().salt(), &Salt::default());
        assert_eq!(message(&with("input", Value::Null)), "\"input\" is required.");
    }

    #[test]
    fn non_object_is_rejected() {
        assert_eq!(validate(&json!("in.txt")).unwrap_err(), ValidationError::NotAnObject);
    }

    #[test]
    fn serialized_options_omit_password() {
        let opts = validate(&base()).unwrap();
        let text = serde_json::to_string(&opts).unwrap();
        assert!(!text.contains("alakazam"));
        assert!(!format!("{opts:?}").contains("alakazam"));
    }

    #[test]
    fn to_raw_revalidates_to_the_same_options() {
        let opts = validate(&with("salt", json!([9, 8, 7]))).unwrap();
        let again = validate(&opts.to_raw()).unwrap();
        assert_eq!(again.salt(), opts.salt());
        assert_eq!(again.password(), opts.password());
        assert_eq!(again.algorithm(), opts.algorithm());
    }
}
