//! Sealing and opening of the session cookie payload.
//!
//! Wire format: `base64(nonce || ciphertext || tag)` using the standard
//! alphabet with canonical padding. The nonce is 96 random bits drawn per
//! call, so sealing the same payload twice never yields the same string.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use thiserror::Error;

use shared::config::TOKEN_KEY_LEN;
use shared::types::SessionToken;

/// ChaCha20-Poly1305 nonce length.
const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("token is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token is shorter than its nonce")]
    Truncated,

    #[error("token failed authentication")]
    Authentication,

    #[error("token payload is malformed: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("failed to seal token: {0}")]
    Seal(String),

    #[error("token key must be base64 of exactly 32 bytes")]
    Key,
}

#[derive(Clone)]
pub struct TokenCodec {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(key: &[u8; TOKEN_KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Build from the base64 key found in configuration.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CodecError> {
        let bytes = STANDARD.decode(encoded.trim()).map_err(|_| CodecError::Key)?;
        let key: [u8; TOKEN_KEY_LEN] = bytes.try_into().map_err(|_| CodecError::Key)?;
        Ok(Self::new(&key))
    }

    /// Fresh key for this process only.
    pub fn random() -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(&ChaCha20Poly1305::generate_key(&mut OsRng)),
        }
    }

    pub fn encode(&self, payload: &SessionToken) -> Result<String, CodecError> {
        let plaintext =
            serde_json::to_vec(payload).map_err(|e| CodecError::Seal(e.to_string()))?;

        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| CodecError::Seal(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + sealed.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&sealed);

        Ok(STANDARD.encode(combined))
    }

    pub fn decode(&self, transport: &str) -> Result<SessionToken, CodecError> {
        let combined = STANDARD.decode(transport)?;

        if combined.len() < NONCE_LEN {
            return Err(CodecError::Truncated);
        }

        let (nonce, sealed) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CodecError::Authentication)?;

        serde_json::from_slice(&plaintext).map_err(CodecError::Payload)
    }

    /// Seal arbitrary bytes; only used to build payloads the decoder must reject.
    #[cfg(test)]
    fn seal_raw(&self, plaintext: &[u8]) -> String {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self.cipher.encrypt(&nonce, plaintext).unwrap();
        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&sealed);
        STANDARD.encode(combined)
    }
}
