//! Payload key generation and file encrypt/decrypt.
//!
//! Files use the same layout as scan uploads: a 16-byte IV followed by the
//! AES-256-CBC ciphertext.

use anyhow::{Context, Result};
use mora_storage::{EncryptionConfig, PayloadCipher};
use std::path::{Path, PathBuf};

/// Resolve the key from an inline base64 value or an environment variable.
pub fn resolve_key(key: Option<&str>, key_env: &str) -> Result<EncryptionConfig> {
    match key {
        Some(k) => EncryptionConfig::from_base64(k, "cli").context("Invalid --key"),
        None => EncryptionConfig::from_env(key_env)
            .with_context(|| format!("No --key given and ${} is not a valid key", key_env)),
    }
}

pub fn run_keygen(output: Option<PathBuf>) -> Result<()> {
    let key = EncryptionConfig::generate("generated").to_base64();
    match output {
        Some(path) => {
            std::fs::write(&path, format!("{}\n", key))
                .with_context(|| format!("Failed to write key to {:?}", path))?;
            println!("Key written to {:?}", path);
            println!("Export it with: export ENCRYPTION_KEY=$(cat {})", path.display());
        }
        None => println!("{}", key),
    }
    Ok(())
}

fn default_output(input: &Path, encrypting: bool) -> PathBuf {
    if encrypting {
        let mut name = input.as_os_str().to_os_string();
        name.push(".enc");
        PathBuf::from(name)
    } else if input.extension().is_some_and(|e| e == "enc") {
        input.with_extension("")
    } else {
        let mut name = input.as_os_str().to_os_string();
        name.push(".dec");
        PathBuf::from(name)
    }
}

pub fn run_encrypt(
    input: &Path,
    output: Option<PathBuf>,
    key: &EncryptionConfig,
) -> Result<PathBuf> {
    let plaintext =
        std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let output = output.unwrap_or_else(|| default_output(input, true));
    let encrypted = PayloadCipher::new(key).encrypt(&plaintext);
    std::fs::write(&output, &encrypted)
        .with_context(|| format!("Failed to write {:?}", output))?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        bytes = encrypted.len(),
        "Encrypted file"
    );
    Ok(output)
}

pub fn run_decrypt(
    input: &Path,
    output: Option<PathBuf>,
    key: &EncryptionConfig,
) -> Result<PathBuf> {
    let data = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let output = output.unwrap_or_else(|| default_output(input, false));
    let plaintext = PayloadCipher::new(key)
        .decrypt(&data)
        .with_context(|| format!("Failed to decrypt {:?}", input))?;
    std::fs::write(&output, &plaintext)
        .with_context(|| format!("Failed to write {:?}", output))?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        bytes = plaintext.len(),
        "Decrypted file"
    );
    Ok(output)
}
