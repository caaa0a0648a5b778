//! Authenticated encryption of marker tokens.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Encryption errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("token is not valid base64")]
    MalformedToken,

    #[error("token is too short to contain a nonce")]
    TruncatedToken,

    #[error("token failed authentication")]
    AuthenticationFailed,

    #[error("decrypted token is not valid UTF-8")]
    InvalidUtf8,

    #[error("encryption failed")]
    EncryptionFailed,
}

/// Encrypt/decrypt capability used to seal marker tokens.
///
/// Encrypted output must be plain text that never contains `#`, `<` or `>`,
/// so it can sit inside an HTML comment.
pub trait Encryptor: Send + Sync {
    /// Encrypt plain text into an opaque token.
    fn encrypt(&self, plain: &str) -> Result<String, CryptoError>;

    /// Recover the plain text of a token produced by `encrypt`.
    fn decrypt(&self, token: &str) -> Result<String, CryptoError>;
}

/// ChaCha20-Poly1305 encryptor producing URL-safe base64 tokens.
///
/// Each token is `base64url(nonce || ciphertext || tag)` with a fresh random
/// nonce, so equal inputs produce different tokens. Tampered tokens fail
/// authentication instead of decrypting to garbage.
#[derive(Clone)]
pub struct SealingEncryptor {
    cipher: ChaCha20Poly1305,
}

impl SealingEncryptor {
    /// Create an encryptor from raw key bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }

        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Create an encryptor from a standard base64 key.
    pub fn from_base64_key(key: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(key.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::new(&bytes)
    }

    /// Create an encryptor with a random key.
    ///
    /// Tokens sealed with a generated key cannot be opened by another process,
    /// so cached markup sealed this way must not outlive the process.
    pub fn generate() -> Self {
        let key = generate_key();
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }
}

impl std::fmt::Debug for SealingEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealingEncryptor").finish_non_exhaustive()
    }
}

impl Encryptor for SealingEncryptor {
    fn encrypt(&self, plain: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plain.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CryptoError::MalformedToken)?;

        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::TruncatedToken);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        String::from_utf8(plain).map_err(|_| CryptoError::InvalidUtf8)
    }
}

/// Generate a random key.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random key encoded as standard base64, suitable for config files.
pub fn generate_base64_key() -> String {
    STANDARD.encode(generate_key())
}
