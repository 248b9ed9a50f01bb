//! Authenticated sealing of byte strings.
//!
//! One format everywhere, on the wire and at rest:
//! `nonce(12) ‖ ciphertext ‖ tag(16)`, AES-256-GCM with a fresh random
//! nonce per call. Keys of any length are accepted; the working key is
//! their SHA-256 digest.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

/// Nonce length prepended to every sealed blob.
pub const NONCE_LEN: usize = 12;
/// GCM authentication tag length appended to every sealed blob.
pub const TAG_LEN: usize = 16;
/// Smallest well-formed sealed blob (empty plaintext).
pub const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

/// Errors from [`Sealer::open`].
#[derive(Clone, Debug, PartialEq)]
pub enum SealError {
    /// Input shorter than [`MIN_SEALED_LEN`].
    TooShort { len: usize },
    /// Authentication tag mismatch or malformed ciphertext.
    BadSeal,
}

impl std::fmt::Display for SealError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "sealed blob of {len} bytes is too short"),
            Self::BadSeal => write!(f, "seal verification failed"),
        }
    }
}
impl std::error::Error for SealError {}

/// AES-256-GCM sealer. Stateless beyond its key; safe to share across tasks.
#[derive(Clone)]
pub struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    /// Build a sealer from key material of any length.
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        let digest = crate::sha256!(key.as_ref());
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&digest));
        Self { cipher }
    }

    /// Seal `plaintext` into `nonce ‖ ciphertext ‖ tag`.
    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce).expect("getrandom failed");

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .expect("AES-GCM encrypt on in-memory buffer");

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        out
    }

    /// Open a sealed blob, verifying its tag.
    pub fn open(&self, blob: &[u8]) -> Result<Vec<u8>, SealError> {
        if blob.len() < MIN_SEALED_LEN {
            return Err(SealError::TooShort { len: blob.len() });
        }
        let (nonce, rest) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), rest)
            .map_err(|_| SealError::BadSeal)
    }
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sealer(aes-256-gcm)")
    }
}

/// Generate `len` bytes of key material from the system CSPRNG.
pub fn gen_key(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf).expect("getrandom failed");
    buf
}
