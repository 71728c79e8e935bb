//! OpenSSL password-based encryption of credential files
//!
//! Files are transformed in place inside the working directory with
//! `openssl enc -aes-256-cbc -pbkdf2`. The password travels to the child
//! process through an environment variable so it never appears in the
//! process table.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use gantry_core::layout::is_credential_file;

use crate::error::{CryptoError, Result};

const PASSWORD_ENV: &str = "GANTRY_OPENSSL_PASS";

/// The closed set of encryption variants
pub enum EncryptionBackend {
    /// AES-256-CBC via the `openssl` binary, keyed by a shared password
    Openssl(OpensslEncryption),
    /// Pass-through for repositories that are already access-controlled
    None,
}

impl EncryptionBackend {
    /// Decrypt every credential file in the working directory, in place
    pub fn decrypt_files(&self, work_dir: &Path) -> Result<()> {
        match self {
            Self::Openssl(backend) => backend.transform_all(work_dir, Direction::Decrypt),
            Self::None => Ok(()),
        }
    }

    /// Encrypt the given files (relative to the working directory), in place
    ///
    /// Applied only to files about to be committed; the rest of the working
    /// copy is discarded anyway.
    pub fn encrypt_files(&self, work_dir: &Path, files: &[PathBuf]) -> Result<()> {
        match self {
            Self::Openssl(backend) => {
                for file in files {
                    let path = work_dir.join(file);
                    if is_credential_file(&path) {
                        backend.transform(&path, Direction::Encrypt)?;
                    }
                }
                Ok(())
            }
            Self::None => Ok(()),
        }
    }
}

/// Object-safe view of an encryption backend
///
/// Runs hold their cipher behind this trait so the transformation can be
/// driven without the `openssl` binary in tests.
pub trait Cipher: Send + Sync {
    /// Decrypt every credential file in the working directory, in place
    fn decrypt_files(&self, work_dir: &Path) -> Result<()>;

    /// Encrypt the given files (relative to the working directory), in place
    fn encrypt_files(&self, work_dir: &Path, files: &[PathBuf]) -> Result<()>;
}

impl Cipher for EncryptionBackend {
    fn decrypt_files(&self, work_dir: &Path) -> Result<()> {
        EncryptionBackend::decrypt_files(self, work_dir)
    }

    fn encrypt_files(&self, work_dir: &Path, files: &[PathBuf]) -> Result<()> {
        EncryptionBackend::encrypt_files(self, work_dir, files)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Password-based file encryption through the system `openssl` binary
pub struct OpensslEncryption {
    password: String,
}

impl OpensslEncryption {
    /// Create a backend with a resolved password
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    fn transform_all(&self, work_dir: &Path, direction: Direction) -> Result<()> {
        let files: Vec<PathBuf> = walkdir::WalkDir::new(work_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_credential_file(p))
            .collect();

        info!(count = files.len(), ?direction, "Transforming credential files");
        for file in files {
            self.transform(&file, direction)?;
        }
        Ok(())
    }

    fn transform(&self, path: &Path, direction: Direction) -> Result<()> {
        debug!(file = %path.display(), ?direction, "openssl enc");

        let tmp = path.with_extension(match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{ext}.tmp"),
            None => "tmp".to_string(),
        });

        let mut args: Vec<&str> = vec!["enc", "-aes-256-cbc", "-salt", "-pbkdf2", "-md", "sha256"];
        if direction == Direction::Decrypt {
            args.push("-d");
        }

        let in_arg = path.as_os_str();
        let out_arg = tmp.as_os_str();

        let output = Command::new("openssl")
            .args(&args)
            .arg("-pass")
            .arg(format!("env:{PASSWORD_ENV}"))
            .arg("-in")
            .arg(in_arg)
            .arg("-out")
            .arg(out_arg)
            .env(PASSWORD_ENV, &self.password)
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    CryptoError::Unavailable("openssl binary not found on PATH".into())
                } else {
                    CryptoError::Io(e)
                }
            })?;

        if !output.status.success() {
            // Clean up the partial output before reporting.
            let _ = std::fs::remove_file(&tmp);
            if direction == Direction::Decrypt {
                // A bad password is the overwhelmingly common cause of a
                // failed decrypt; never hand back garbage plaintext.
                return Err(CryptoError::WrongPassword);
            }
            return Err(CryptoError::Command {
                command: format!("openssl {}", args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
