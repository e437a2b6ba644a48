//! Error types for oracle operations.

use thiserror::Error;

/// Errors that can occur while sealing or resolving a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("Unknown handle: {0}")]
    UnknownHandle(String),

    #[error("Party not authorized to resolve handle")]
    Unauthorized,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid plaintext length: {0}")]
    InvalidPlaintext(usize),

    #[error("Key derivation failed")]
    KeyDerivationFailed,

    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}
