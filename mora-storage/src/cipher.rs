//! AES-256-CBC payload cipher.
//!
//! # Format
//!
//! ```text
//! [IV: 16 bytes] [AES-256-CBC ciphertext of PKCS#7-padded plaintext]
//! ```
//!
//! # Security
//!
//! - A fresh random IV per payload.
//! - No authentication tag: a wrong key or a tampered payload either fails
//!   the padding check or decrypts to garbage. Consumers must not treat a
//!   successful decrypt as proof of integrity.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Result, StorageError};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Key size for AES-256 (256 bits)
pub const KEY_SIZE: usize = 32;

/// IV size, one AES block
pub const IV_SIZE: usize = 16;

const BLOCK_SIZE: usize = 16;

/// Key material for the payload cipher.
#[derive(Clone)]
pub struct EncryptionConfig {
    key: [u8; KEY_SIZE],
    /// Key identifier (for logging, not the actual key)
    key_id: String,
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("key_id", &self.key_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl EncryptionConfig {
    pub fn from_key(key: [u8; KEY_SIZE], key_id: impl Into<String>) -> Self {
        Self {
            key,
            key_id: key_id.into(),
        }
    }

    /// Create config from a base64-encoded 32-byte key.
    pub fn from_base64(b64_key: &str, key_id: impl Into<String>) -> Result<Self> {
        let bytes = STANDARD
            .decode(b64_key.trim())
            .map_err(|e| StorageError::Encryption(format!("Invalid base64 key: {}", e)))?;

        if bytes.len() != KEY_SIZE {
            return Err(StorageError::Encryption(format!(
                "Key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self::from_key(key, key_id))
    }

    /// Create config from an environment variable holding a base64 key.
    pub fn from_env(env_var: &str) -> Result<Self> {
        let b64_key = std::env::var(env_var).map_err(|_| {
            StorageError::Encryption(format!("Environment variable '{}' not set", env_var))
        })?;
        Self::from_base64(&b64_key, format!("env:{}", env_var))
    }

    /// Generate a new random key.
    pub fn generate(key_id: impl Into<String>) -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self::from_key(key, key_id)
    }

    /// Export the key as base64.
    ///
    /// The returned string is raw key material.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.key)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Encrypts and decrypts payloads in the IV-prefixed CBC format.
#[derive(Clone)]
pub struct PayloadCipher {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCipher")
            .field("algorithm", &"AES-256-CBC")
            .finish()
    }
}

impl PayloadCipher {
    pub fn new(config: &EncryptionConfig) -> Self {
        Self { key: config.key }
    }

    /// Encrypt with a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        self.encrypt_with_iv(plaintext, iv)
    }

    /// Encrypt with a caller-chosen IV. Reusing an IV under one key leaks
    /// equality of plaintext prefixes.
    pub fn encrypt_with_iv(&self, plaintext: &[u8], iv: [u8; IV_SIZE]) -> Vec<u8> {
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut output = Vec::with_capacity(IV_SIZE + ciphertext.len());
        output.extend_from_slice(&iv);
        output.extend_from_slice(&ciphertext);
        output
    }

    /// Decrypt an IV-prefixed payload.
    ///
    /// Fails when the input is shorter than IV plus one block, is not block
    /// aligned, or does not unpad cleanly.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < IV_SIZE + BLOCK_SIZE {
            return Err(StorageError::Encryption(format!(
                "Ciphertext too short: {} bytes",
                data.len()
            )));
        }
        let (iv_bytes, ciphertext) = data.split_at(IV_SIZE);
        if ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(StorageError::Encryption(format!(
                "Ciphertext length {} is not a multiple of {}",
                ciphertext.len(),
                BLOCK_SIZE
            )));
        }

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(iv_bytes);

        Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| {
                StorageError::Encryption(
                    "Decryption failed (wrong key or corrupted data)".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38A, F.2.5 CBC-AES256.Encrypt
    const NIST_KEY: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";
    const NIST_IV: &str = "000102030405060708090a0b0c0d0e0f";
    const NIST_PLAIN: &str = "6bc1bee22e409f96e93d7e117393172a";
    const NIST_CIPHER: &str = "f58c4c04d6e5f1ba779eabfb5f7bfbd6";

    fn nist_cipher() -> PayloadCipher {
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&hex::decode(NIST_KEY).unwrap());
        PayloadCipher::new(&EncryptionConfig::from_key(key, "nist"))
    }

    #[test]
    fn test_known_answer_first_block() {
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&hex::decode(NIST_IV).unwrap());
        let plain = hex::decode(NIST_PLAIN).unwrap();

        let out = nist_cipher().encrypt_with_iv(&plain, iv);
        // IV, the NIST block, then one full block of padding
        assert_eq!(out.len(), IV_SIZE + 2 * BLOCK_SIZE);
        assert_eq!(&out[..IV_SIZE], &iv);
        assert_eq!(hex::encode(&out[IV_SIZE..IV_SIZE + BLOCK_SIZE]), NIST_CIPHER);

        assert_eq!(nist_cipher().decrypt(&out).unwrap(), plain);
    }

    #[test]
    fn test_roundtrip_with_random_iv() {
        let cipher = PayloadCipher::new(&EncryptionConfig::generate("test"));
        let plain = b"\x89PNG\r\n\x1a\n not really a png";
        let encrypted = cipher.encrypt(plain);
        assert_eq!((encrypted.len() - IV_SIZE) % BLOCK_SIZE, 0);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), plain);
    }

    #[test]
    fn test_empty_plaintext_pads_to_one_block() {
        let cipher = PayloadCipher::new(&EncryptionConfig::generate("test"));
        let encrypted = cipher.encrypt(b"");
        assert_eq!(encrypted.len(), IV_SIZE + BLOCK_SIZE);
        assert!(cipher.decrypt(&encrypted).unwrap().is_empty());
    }

    #[test]
    fn test_unique_ivs() {
        let cipher = PayloadCipher::new(&EncryptionConfig::generate("test"));
        let a = cipher.encrypt(b"same data");
        let b = cipher.encrypt(b"same data");
        assert_ne!(&a[..IV_SIZE], &b[..IV_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_rejects_short_and_misaligned_input() {
        let cipher = PayloadCipher::new(&EncryptionConfig::generate("test"));
        assert!(cipher.decrypt(&[0u8; 31]).is_err());
        assert!(cipher.decrypt(&[0u8; 33]).is_err());
        assert!(cipher.decrypt(&[]).is_err());
    }

    #[test]
    fn test_wrong_key_never_returns_plaintext() {
        let plain = b"sensitive scan bytes that should stay private";
        let encrypted = PayloadCipher::new(&EncryptionConfig::generate("a")).encrypt(plain);
        let other = PayloadCipher::new(&EncryptionConfig::generate("b"));

        match other.decrypt(&encrypted) {
            Err(e) => assert!(e.to_string().contains("Decryption failed")),
            Ok(garbage) => assert_ne!(garbage, plain),
        }
    }

    #[test]
    fn test_config_base64_roundtrip() {
        let config = EncryptionConfig::generate("k1");
        let restored = EncryptionConfig::from_base64(&config.to_base64(), "k1").unwrap();
        assert_eq!(restored.to_base64(), config.to_base64());
        assert_eq!(restored.key_id(), "k1");
    }

    #[test]
    fn test_config_from_base64_invalid() {
        assert!(EncryptionConfig::from_base64("not base64!!", "k").is_err());
        let short = STANDARD.encode([1u8; 16]);
        let err = EncryptionConfig::from_base64(&short, "k").unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_config_from_env() {
        let config = EncryptionConfig::generate("src");
        std::env::set_var("MORA_STORAGE_TEST_KEY", config.to_base64());
        let loaded = EncryptionConfig::from_env("MORA_STORAGE_TEST_KEY").unwrap();
        assert_eq!(loaded.key_id(), "env:MORA_STORAGE_TEST_KEY");
        assert!(EncryptionConfig::from_env("MORA_STORAGE_TEST_UNSET").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = EncryptionConfig::generate("test");
        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains(&config.to_base64()));
    }
}
