//! Deterministic field encryption for sensitive identifiers
//!
//! AES-128 in ECB mode with PKCS#7 padding, Base64 (standard alphabet) output.
//! ECB is deterministic: equal plaintexts always produce equal ciphertexts under
//! the same key, which keeps retried chunks byte-identical.
//!
//! The key is derived by truncating or `'0'`-padding a passphrase to 16
//! characters. That construction is weak (no KDF, low entropy, ECB leaks
//! equality) and is kept only for compatibility with existing ciphertext.

use crate::customer::trim_field;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

type Aes128EcbEnc = ecb::Encryptor<aes::Aes128>;
type Aes128EcbDec = ecb::Decryptor<aes::Aes128>;

/// Required key size in bytes
pub const KEY_LEN: usize = 16;

const KEY_PAD_CHAR: char = '0';

/// Codec failures. Never retried: the same input fails the same way.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Ciphertext is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Ciphertext padding is invalid (wrong key or corrupted value)")]
    Unpad,

    #[error("Decrypted value is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Symmetric codec for aadhaar and PAN numbers
#[derive(Clone)]
pub struct EncryptionService {
    key: Vec<u8>,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl EncryptionService {
    /// Build a codec from a passphrase.
    ///
    /// Fails when the derived key is not exactly 16 bytes, which happens when
    /// the first 16 characters include multi-byte UTF-8 characters.
    pub fn new(secret: &str) -> Result<Self, CryptoError> {
        let key = derive_key(secret);
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(key.len()));
        }

        Ok(Self {
            key: key.into_bytes(),
        })
    }

    /// Encrypt `plaintext`. Blank input is returned unchanged.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if trim_field(plaintext).is_empty() {
            return Ok(plaintext.to_owned());
        }

        let cipher = Aes128EcbEnc::new_from_slice(&self.key)
            .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(STANDARD.encode(ciphertext))
    }

    /// Inverse of [`encrypt`](Self::encrypt). Blank input is returned unchanged.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        if trim_field(ciphertext).is_empty() {
            return Ok(ciphertext.to_owned());
        }

        let bytes = STANDARD.decode(trim_field(ciphertext))?;
        let cipher = Aes128EcbDec::new_from_slice(&self.key)
            .map_err(|_| CryptoError::InvalidKeyLength(self.key.len()))?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
            .map_err(|_| CryptoError::Unpad)?;

        Ok(String::from_utf8(plaintext)?)
    }

    /// Encrypt an optional field, passing `None` through
    pub fn encrypt_field(&self, value: Option<&str>) -> Result<Option<String>, CryptoError> {
        value.map(|v| self.encrypt(v)).transpose()
    }
}

/// Truncate or right-pad `secret` to 16 characters
fn derive_key(secret: &str) -> String {
    let mut key: String = secret.chars().take(KEY_LEN).collect();
    let missing = KEY_LEN.saturating_sub(key.chars().count());
    key.extend(std::iter::repeat(KEY_PAD_CHAR).take(missing));
    key
}
