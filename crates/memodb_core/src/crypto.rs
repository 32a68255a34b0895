//! Hashing and authenticated encryption.
//!
//! Changelog entries and full database snapshots leave the device only as
//! AES-256-GCM ciphertext (`nonce || ciphertext || tag`). Attachment bytes
//! are addressed by their SHA-256 digest.

use crate::error::{CoreError, CoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Wire name of the account key type.
pub const KEY_TYPE: &str = "aes256gcm-v1";

const KDF_INFO: &[u8] = b"memodb-account-key-v1";
const FINGERPRINT_DOMAIN: &[u8] = b"memodb-key-fingerprint-v1";

/// Computes 32-byte digests of attachment payloads.
pub trait Hasher: Send + Sync {
    /// Returns the digest of `data`.
    fn sum(&self, data: &[u8]) -> CoreResult<[u8; 32]>;
}

/// SHA-256 [`Hasher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn sum(&self, data: &[u8]) -> CoreResult<[u8; 32]> {
        Ok(Sha256::digest(data).into())
    }
}

/// Account encryption key.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a crypto error unless `bytes` is exactly 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CoreError::crypto(format!(
                "invalid key size: expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Derives a key from a passphrase with HKDF-SHA256.
    ///
    /// Every client of an account must use the same passphrase and salt;
    /// the username is a natural salt.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> CoreResult<Self> {
        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(KDF_INFO, &mut bytes)
            .map_err(|_| CoreError::crypto("key derivation failed"))?;
        Ok(Self { bytes })
    }

    /// Returns the raw key bytes. Never log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Returns a one-way fingerprint that identifies the key without
    /// revealing it.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(self.bytes);
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypts and decrypts with the account key.
pub struct CryptoManager {
    cipher: Aes256Gcm,
    fingerprint: [u8; 32],
}

impl CryptoManager {
    /// Creates a manager for `key`.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self {
            cipher,
            fingerprint: key.fingerprint(),
        }
    }

    /// Fingerprint of the key this manager was built from.
    pub fn key_fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// Output layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
    pub fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CoreError::crypto("encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend(ciphertext);
        Ok(out)
    }

    /// Decrypts data produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Fails with a crypto error on a wrong key, truncation or tampering.
    pub fn decrypt(&self, data: &[u8]) -> CoreResult<Vec<u8>> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::crypto("ciphertext too short"));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::crypto("decryption failed"))
    }
}

impl std::fmt::Debug for CryptoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoManager")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn sha256_known_vector() {
        let digest = Sha256Hasher.sum(b"abc").unwrap();
        assert_eq!(digest[0], 0xba);
        assert_eq!(digest[31], 0xad);
    }

    #[test]
    fn key_wrong_size() {
        let err = EncryptionKey::from_bytes(&[0u8; 16]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Crypto);
        assert!(EncryptionKey::from_bytes(&[0u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn roundtrip_and_fresh_nonces() {
        let manager = CryptoManager::new(&EncryptionKey::generate());
        let a = manager.encrypt(b"memo").unwrap();
        let b = manager.encrypt(b"memo").unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.decrypt(&a).unwrap(), b"memo");
    }

    #[test]
    fn wrong_key_or_tampering_fails() {
        let one = CryptoManager::new(&EncryptionKey::generate());
        let two = CryptoManager::new(&EncryptionKey::generate());
        let mut ct = one.encrypt(b"secret").unwrap();
        assert!(two.decrypt(&ct).is_err());

        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        assert!(one.decrypt(&ct).is_err());
        assert!(one.decrypt(&[0u8; 8]).is_err());
    }

    #[test]
    fn passphrase_derivation_is_deterministic() {
        let a = EncryptionKey::derive_from_passphrase(b"hunter2", b"alice").unwrap();
        let b = EncryptionKey::derive_from_passphrase(b"hunter2", b"alice").unwrap();
        let c = EncryptionKey::derive_from_passphrase(b"hunter2", b"bob").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), *a.as_bytes());
    }

    #[test]
    fn debug_redacts_key() {
        let key = EncryptionKey::from_bytes(&[0x41; KEY_SIZE]).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
