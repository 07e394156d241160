//! # tuneflow-crypto
//!
//! AES-256-GCM sealing of credentials stored at rest (WebDAV usernames and
//! passwords). Keys are derived from an operator master secret with
//! HKDF-SHA256.

pub mod cipher;
pub mod error;
pub mod sealer;

pub use error::{CryptoError, CryptoResult};
pub use sealer::CredentialSealer;
