//! Sealing of credentials stored in the database.
//!
//! A sealed value is `base64(nonce || ciphertext || tag)`, encrypted with a
//! key derived from the operator's master secret via HKDF-SHA256.

use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use tuneflow_core::{CredentialOpener, WebDavConfig, WebDavCredentials};

use crate::cipher::{aes_gcm_decrypt, aes_gcm_encrypt, generate_nonce, NONCE_LEN, TAG_LEN};
use crate::error::{CryptoError, CryptoResult};

/// HKDF context string binding derived keys to credential sealing.
const KEY_INFO: &[u8] = b"tuneflow/credentials/v1";

/// Minimum master secret length in bytes.
pub const MIN_MASTER_SECRET_LEN: usize = 32;

#[derive(Zeroize, ZeroizeOnDrop)]
struct SealKey([u8; 32]);

/// Seals and opens short secrets (usernames, passwords).
pub struct CredentialSealer {
    key: SealKey,
}

impl CredentialSealer {
    /// Derive the sealing key from a master secret.
    pub fn from_master_secret(secret: &[u8]) -> CryptoResult<Self> {
        if secret.len() < MIN_MASTER_SECRET_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "master secret must be at least {} bytes",
                MIN_MASTER_SECRET_LEN
            )));
        }
        let hkdf = Hkdf::<Sha256>::new(None, secret);
        let mut key = [0u8; 32];
        hkdf.expand(KEY_INFO, &mut key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key: SealKey(key) })
    }

    /// Create from the base64 `CREDENTIALS_KEY` environment variable.
    pub fn from_env() -> CryptoResult<Self> {
        let encoded = std::env::var("CREDENTIALS_KEY")
            .map_err(|_| CryptoError::InvalidKey("CREDENTIALS_KEY is not set".to_string()))?;
        let mut secret = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("CREDENTIALS_KEY: {}", e)))?;
        let sealer = Self::from_master_secret(&secret);
        secret.zeroize();
        sealer
    }

    pub fn seal(&self, plaintext: &str) -> CryptoResult<String> {
        let nonce = generate_nonce();
        let ciphertext = aes_gcm_encrypt(&self.key.0, &nonce, plaintext.as_bytes())?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn open(&self, sealed: &str) -> CryptoResult<String> {
        let raw = STANDARD
            .decode(sealed.trim())
            .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::InvalidFormat("sealed value too short".to_string()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce);

        let plaintext = aes_gcm_decrypt(&self.key.0, &nonce_bytes, ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".to_string()))
    }
}

impl CredentialOpener for CredentialSealer {
    fn open(&self, config: &WebDavConfig) -> tuneflow_core::Result<WebDavCredentials> {
        Ok(WebDavCredentials {
            url: config.url.clone(),
            username: CredentialSealer::open(self, &config.sealed_username)?,
            password: CredentialSealer::open(self, &config.sealed_password)?,
        })
    }
}
