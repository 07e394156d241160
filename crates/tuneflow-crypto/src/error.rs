//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key material is missing or malformed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed - wrong key or corrupted data.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Sealed value is not valid base64 or too short.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for tuneflow_core::Error {
    fn from(e: CryptoError) -> Self {
        tuneflow_core::Error::Crypto(e.to_string())
    }
}
