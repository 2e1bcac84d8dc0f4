//! Symmetric encryption of single string secrets.
//!
//! Secrets travel through environment variables as base64 tokens of the form
//! `<12-byte nonce><AES-256-GCM ciphertext>`. The key is the SHA-256 digest of
//! an operator-supplied passphrase, so the same passphrase always yields the
//! same key.
//!
//! Before decoding, tokens are sanitized: whitespace and literal `%` characters
//! are stripped and `=` padding is appended up to a multiple of four. This
//! tolerates tokens mangled by copy/paste or URL transport. A consequence is
//! that tokens carrying a meaningful `%` or internal whitespace are not
//! supported.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// Nonce size for AES-256-GCM (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Errors produced by [`SecretCodec`]. None of them are retryable.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Ciphertext too short: {len} bytes (minimum {NONCE_SIZE})")]
    TooShort { len: usize },

    #[error("Failed to decrypt: authentication failed")]
    AuthenticationFailed,

    #[error("Failed to decode base64: {0}")]
    DecodeError(#[from] base64::DecodeError),

    #[error("Decrypted secret is not valid UTF-8")]
    InvalidUtf8,

    #[error("Encryption error: {0}")]
    EncryptionError(String),
}

/// Result type for secret operations.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Passphrase-keyed AES-256-GCM codec.
pub struct SecretCodec {
    cipher: Aes256Gcm,
}

impl SecretCodec {
    /// Derives the key from `passphrase` and builds the cipher.
    pub fn new(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypts `plaintext` with a fresh random nonce and returns a base64 token.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes = rand_bytes::<NONCE_SIZE>()?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SecretError::EncryptionError(e.to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);

        Ok(STANDARD.encode(combined))
    }

    /// Decrypts a token produced by [`SecretCodec::encrypt`].
    pub fn decrypt(&self, token: &str) -> Result<String> {
        let combined = STANDARD.decode(sanitize_token(token))?;

        if combined.len() < NONCE_SIZE {
            return Err(SecretError::TooShort {
                len: combined.len(),
            });
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext_bytes = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SecretError::AuthenticationFailed)?;

        String::from_utf8(plaintext_bytes).map_err(|_| SecretError::InvalidUtf8)
    }
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}

/// Strips whitespace and `%`, then pads with `=` to a multiple of four.
fn sanitize_token(token: &str) -> String {
    let mut cleaned: String = token
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%')
        .collect();

    while cleaned.len() % 4 != 0 {
        cleaned.push('=');
    }

    cleaned
}

/// Generates random bytes using getrandom.
fn rand_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes).map_err(|e| {
        SecretError::EncryptionError(format!("Failed to generate random nonce: {}", e))
    })?;
    Ok(bytes)
}
