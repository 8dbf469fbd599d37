use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
mod auth;
use filecipher::{CipherParams, decrypt_sync, encrypt_sync, list_algorithms, list_hashes};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Args)]
struct CipherArgs {
    /// Cipher algorithm (default: aes-256-cbc)
    #[arg(long, env = "FILECIPHER_ALGORITHM")]
    algorithm: Option<String>,

    /// PBKDF2 digest (default: sha1)
    #[arg(long, env = "FILECIPHER_DIGEST")]
    digest: Option<String>,

    /// PBKDF2 iterations (default: 1000)
    #[arg(long, env = "FILECIPHER_ITERATIONS")]
    iterations: Option<u32>,

    /// Derived key length in bytes (default: 512)
    #[arg(long, env = "FILECIPHER_KEYLEN")]
    keylen: Option<u32>,

    /// Key derivation salt
    #[arg(long, env = "FILECIPHER_SALT")]
    salt: Option<String>,

    /// Write through a temporary file and rename on success
    #[arg(long, default_value_t = false)]
    atomic: bool,
}

impl CipherArgs {
    fn to_raw(&self, input: &str, output: &str, password: &str) -> Value {
        let mut map = Map::new();
        map.insert("input".into(), Value::from(input));
        map.insert("output".into(), Value::from(output));
        map.insert("password".into(), Value::from(password));
        if let Some(a) = &self.algorithm {
            map.insert("algorithm".into(), Value::from(a.as_str()));
        }
        if let Some(d) = &self.digest {
            map.insert("digest".into(), Value::from(d.as_str()));
        }
        if let Some(i) = self.iterations {
            map.insert("iterations".into(), Value::from(i));
        }
        if let Some(k) = self.keylen {
            map.insert("keylen".into(), Value::from(k));
        }
        if let Some(s) = &self.salt {
            map.insert("salt".into(), Value::from(s.as_str()));
        }
        map.insert("atomic".into(), Value::from(self.atomic));
        Value::Object(map)
    }
}

#[derive(Debug, Parser)]
#[command(name = "filecipher")]
#[command(
    version,
    about = "Encrypt and decrypt files with a password-derived key."
)]
struct Cli {
    /// Log pipeline steps to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encrypts INPUT into OUTPUT
    #[command(arg_required_else_help = true)]
    Encrypt {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        cipher: CipherArgs,
        /// Save the parameters needed for decryption to this file
        #[arg(long, value_name = "FILE")]
        params_out: Option<PathBuf>,
    },

    /// Decrypts INPUT into OUTPUT
    #[command(arg_required_else_help = true)]
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        cipher: CipherArgs,
        /// Read parameters saved by `encrypt --params-out`
        #[arg(long, value_name = "FILE")]
        params: Option<PathBuf>,
    },

    /// Lists supported cipher algorithms
    Algorithms,

    /// Lists supported key-derivation digests
    Hashes,
}

/// Options carry paths as JSON strings, so a path that is not valid UTF-8
/// cannot be passed through without changing it.
fn utf8_path(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("path is not valid UTF-8: {}", path.display()))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("filecipher=debug")
    } else {
        EnvFilter::try_from_env("FILECIPHER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Encrypt {
            input,
            output,
            cipher,
            params_out,
        } => {
            let (src, dst) = (utf8_path(&input)?, utf8_path(&output)?);
            let password = auth::read_password(true)?;
            let raw = cipher.to_raw(src, dst, &password);
            drop(password);

            let options = encrypt_sync(&raw)
                .with_context(|| format!("failed to encrypt {}", input.display()))?;
            if let Some(path) = params_out {
                CipherParams::from(&options)
                    .save(&path)
                    .context("failed to save parameters")?;
            }
            println!("encrypted {} -> {}", input.display(), output.display());
        }
        Commands::Decrypt {
            input,
            output,
            cipher,
            params,
        } => {
            let (src, dst) = (utf8_path(&input)?, utf8_path(&output)?);
            let password = auth::read_password(false)?;
            let mut raw = cipher.to_raw(src, dst, &password);
            drop(password);

            if let Some(path) = params {
                let saved = CipherParams::load(&path).context("failed to load parameters")?;
                saved.apply_defaults_to(&mut raw);
            }

            decrypt_sync(&raw)
                .with_context(|| format!("failed to decrypt {}", input.display()))?;
            println!("decrypted {} -> {}", input.display(), output.display());
        }
        Commands::Algorithms => {
            for name in list_algorithms() {
                println!("{name}");
            }
        }
        Commands::Hashes => {
            for name in list_hashes() {
                println!("{name}");
            }
        }
    }

    Ok(())
}
