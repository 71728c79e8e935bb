//! Encryption backends for the shared credential medium
//!
//! Credential files only ever exist in plaintext inside the ephemeral
//! working directory; everything persisted to the shared medium is
//! ciphertext. The password is keyed by the storage identifier and resolved
//! from the environment, the OS secret store, or an interactive prompt.

pub mod error;
pub mod openssl;
pub mod password;

pub use error::{CryptoError, Result};
pub use openssl::{Cipher, EncryptionBackend, OpensslEncryption};
pub use password::{PasswordSource, PasswordStore};
