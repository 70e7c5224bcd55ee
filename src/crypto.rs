//! Sealing of encrypted-text field values.
//!
//! Values are sealed with AES-256-GCM under a per-field data key: the
//! deployment master secret from `POLYSTORE_MASTER_KEY` is stretched with
//! SHA-256 over the field's query path, so a sealed value taken from one
//! field cannot be opened as another field's value. The field path is also
//! authenticated as associated data. The sealed wire form is versioned:
//! one format byte, the 12-byte nonce, then the ciphertext and tag,
//! hex-encoded at rest.

use aes_gcm::aead::{Aead, OsRng, Payload, rand_core::RngCore};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Current sealed-value format version.
const SEAL_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length; a ciphertext can never be shorter.
const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Master key secret is not configured (POLYSTORE_MASTER_KEY)")]
    NoMasterKey,
    #[error("Cannot seal the field value: {0}")]
    Seal(String),
    #[error("Cannot open the sealed field value: {0}")]
    Open(String),
    #[error("Sealed value format is not valid")]
    InvalidFormat,
    #[error("Sealed value format version {0} is not supported")]
    UnsupportedVersion(u8),
}

/// Derive the per-field cipher: SHA-256 over the format version, the master
/// secret, and the field's query path.
fn field_cipher(field_path: &str) -> Result<Aes256Gcm, EncryptionError> {
    let secret = std::env::var("POLYSTORE_MASTER_KEY")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(EncryptionError::NoMasterKey)?;

    let mut hasher = Sha256::new();
    hasher.update([SEAL_VERSION]);
    hasher.update(secret.as_bytes());
    hasher.update([0u8]);
    hasher.update(field_path.as_bytes());
    let key = hasher.finalize();

    Aes256Gcm::new_from_slice(&key).map_err(|e| EncryptionError::Seal(e.to_string()))
}

/// Seal a field value, returning the hex-encoded wire form.
pub fn encrypt_field_value(field_path: &str, plaintext: &str) -> Result<String, EncryptionError> {
    let cipher = field_cipher(field_path)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext.as_bytes(),
                aad: field_path.as_bytes(),
            },
        )
        .map_err(|e| EncryptionError::Seal(e.to_string()))?;

    let mut sealed = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    sealed.push(SEAL_VERSION);
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(hex::encode(sealed))
}

/// Open a sealed field value produced by [`encrypt_field_value`] for the
/// same field path.
pub fn decrypt_field_value(field_path: &str, sealed_hex: &str) -> Result<String, EncryptionError> {
    let sealed = hex::decode(sealed_hex).map_err(|_| EncryptionError::InvalidFormat)?;
    if sealed.len() < 1 + NONCE_LEN + TAG_LEN {
        return Err(EncryptionError::InvalidFormat);
    }
    if sealed[0] != SEAL_VERSION {
        return Err(EncryptionError::UnsupportedVersion(sealed[0]));
    }
    let (nonce, ciphertext) = sealed[1..].split_at(NONCE_LEN);

    let cipher = field_cipher(field_path)?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: field_path.as_bytes(),
            },
        )
        .map_err(|e| EncryptionError::Open(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|e| EncryptionError::Open(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests mutate the process environment; serialize them.
    static MASTER_KEY_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn round_trip_is_identity() {
        let _guard = MASTER_KEY_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("POLYSTORE_MASTER_KEY", "unit-test-secret") };

        let sealed = encrypt_field_value("users.ssn", "top secret value").unwrap();
        assert_ne!(sealed, "top secret value");
        assert_eq!(
            decrypt_field_value("users.ssn", &sealed).unwrap(),
            "top secret value"
        );
    }

    #[test]
    fn sealed_values_are_bound_to_their_field() {
        let _guard = MASTER_KEY_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("POLYSTORE_MASTER_KEY", "unit-test-secret") };

        let sealed = encrypt_field_value("users.ssn", "4511...").unwrap();
        assert!(matches!(
            decrypt_field_value("users.iban", &sealed),
            Err(EncryptionError::Open(_))
        ));
    }

    #[test]
    fn distinct_nonces_per_seal() {
        let _guard = MASTER_KEY_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("POLYSTORE_MASTER_KEY", "unit-test-secret") };

        let first = encrypt_field_value("users.ssn", "same input").unwrap();
        let second = encrypt_field_value("users.ssn", "same input").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn unknown_format_versions_are_rejected() {
        let _guard = MASTER_KEY_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("POLYSTORE_MASTER_KEY", "unit-test-secret") };

        let sealed = encrypt_field_value("users.ssn", "value").unwrap();
        let mut bytes = hex::decode(&sealed).unwrap();
        bytes[0] = 9;
        let tampered = hex::encode(bytes);
        assert!(matches!(
            decrypt_field_value("users.ssn", &tampered),
            Err(EncryptionError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn missing_master_key_is_reported() {
        let _guard = MASTER_KEY_MUTEX.lock().unwrap();
        unsafe { std::env::remove_var("POLYSTORE_MASTER_KEY") };

        assert!(matches!(
            encrypt_field_value("users.ssn", "anything"),
            Err(EncryptionError::NoMasterKey)
        ));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let _guard = MASTER_KEY_MUTEX.lock().unwrap();
        unsafe { std::env::set_var("POLYSTORE_MASTER_KEY", "unit-test-secret") };

        assert!(matches!(
            decrypt_field_value("users.ssn", "zz-not-hex"),
            Err(EncryptionError::InvalidFormat)
        ));
        // Too short to hold version, nonce, and tag.
        assert!(matches!(
            decrypt_field_value("users.ssn", "01ffee"),
            Err(EncryptionError::InvalidFormat)
        ));
    }
}
