//! DH parameter cache and private-key pool.
//!
//! Key generation dominates handshake cost at the protocol's parameter
//! sizes, so the parameter set is generated once per process and a bounded
//! queue of private keys is filled ahead of time. Taking from an empty
//! pool never blocks; it falls back to generating a fresh key.

use std::sync::{Arc, OnceLock};

use blake2::{Blake2b512, Digest};
use crossbeam_queue::ArrayQueue;
use num_bigint::BigUint;
use num_traits::One;

use crate::primes::{gen_safe_prime, rand_below};

/// Protocol-level prime size in bits. Deliberately small; handshake
/// latency is part of the wire contract, not a tunable.
pub const DEFAULT_KEY_SIZE: usize = 512;
/// Pre-generated private keys held per process.
pub const DEFAULT_POOL_SIZE: usize = 128;

/// Errors from session-key derivation.
#[derive(Clone, Debug, PartialEq)]
pub enum DhError {
    /// Peer public value outside the open interval `(1, p-1)`.
    PublicOutOfRange,
}

impl std::fmt::Display for DhError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PublicOutOfRange => write!(f, "peer DH public value out of range"),
        }
    }
}
impl std::error::Error for DhError {}

/// A pooled DH private exponent. Opaque; only usable through [`DhPool`].
pub struct DhPrivate {
    x: BigUint,
}

/// Cached DH parameter set plus the private-key pool.
pub struct DhPool {
    p: BigUint,
    g: BigUint,
    key_size: usize,
    keys: ArrayQueue<DhPrivate>,
}

impl DhPool {
    /// Generate the parameter set (generator 2, `key_size`-bit safe prime)
    /// and fill the pool. Expensive; callers share one instance via
    /// [`global_pool`].
    pub fn new(key_size: usize, pool_size: usize) -> Self {
        log::info!("initializing DH parameters with a key size of {key_size} bits");
        let p = gen_safe_prime(key_size);
        let g = BigUint::from(2u32);

        log::debug!("generating pool of {pool_size} private keys");
        let keys = ArrayQueue::new(pool_size);
        for _ in 0..pool_size {
            let _ = keys.push(Self::gen_private(&p));
        }
        log::debug!("DH parameters and key pool initialized");

        Self { p, g, key_size, keys }
    }

    // x uniform in [2, p-2]
    fn gen_private(p: &BigUint) -> DhPrivate {
        let two = BigUint::from(2u32);
        let span = p - BigUint::from(3u32);
        DhPrivate { x: two + rand_below(&span) }
    }

    /// The parameter numbers `(p, g)`.
    pub fn parameter_numbers(&self) -> (&BigUint, &BigUint) {
        (&self.p, &self.g)
    }

    /// Minimal-length big-endian encodings of `(p, g)` for the handshake.
    pub fn parameter_bytes(&self) -> (Vec<u8>, Vec<u8>) {
        (self.p.to_bytes_be(), self.g.to_bytes_be())
    }

    /// Prime size in bits.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Keys currently sitting in the pool.
    pub fn pooled_keys(&self) -> usize {
        self.keys.len()
    }

    /// Non-blocking pop; an empty pool generates a fresh key instead.
    pub fn take_private_key(&self) -> DhPrivate {
        match self.keys.pop() {
            Some(key) => key,
            None => {
                log::warn!("private key pool is empty, generating new key");
                Self::gen_private(&self.p)
            }
        }
    }

    /// Best-effort recycling; a full pool drops the key silently.
    pub fn return_private_key(&self, key: DhPrivate) {
        let _ = self.keys.push(key);
    }

    /// Minimal-length big-endian `y = g^x mod p` for a pooled private key.
    pub fn public_bytes(&self, key: &DhPrivate) -> Vec<u8> {
        self.g.modpow(&key.x, &self.p).to_bytes_be()
    }

    /// Derive the 32-byte session key from our private key and the peer's
    /// public value.
    ///
    /// The shared secret `peer^x mod p` is encoded big-endian, left-padded
    /// to the prime length, then hashed with BLAKE2b-512 and truncated.
    pub fn derive(&self, key: &DhPrivate, peer_public: &BigUint) -> Result<[u8; 32], DhError> {
        let one = BigUint::one();
        let upper = &self.p - &one;
        if peer_public <= &one || peer_public >= &upper {
            return Err(DhError::PublicOutOfRange);
        }

        let shared = peer_public.modpow(&key.x, &self.p);
        let mut buf = vec![0u8; self.key_size.div_ceil(8)];
        let raw = shared.to_bytes_be();
        let off = buf.len() - raw.len();
        buf[off..].copy_from_slice(&raw);

        let mut h = Blake2b512::new();
        h.update(&buf);
        let digest = h.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..32]);
        Ok(out)
    }
}

static GLOBAL_POOL: OnceLock<Arc<DhPool>> = OnceLock::new();

/// Process-wide pool, created on first call. Concurrent first callers
/// observe exactly one parameter generation; later calls return the same
/// instance regardless of the sizes passed.
pub fn global_pool(key_size: usize, pool_size: usize) -> Arc<DhPool> {
    GLOBAL_POOL
        .get_or_init(|| Arc::new(DhPool::new(key_size, pool_size)))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small parameters keep the tests fast; the arithmetic is size-blind.
    fn test_pool(pool_size: usize) -> DhPool {
        DhPool::new(128, pool_size)
    }

    #[test]
    fn both_sides_agree() {
        let pool = test_pool(2);

        let server_priv = pool.take_private_key();
        let server_pub = BigUint::from_bytes_be(&pool.public_bytes(&server_priv));

        let client_priv = pool.take_private_key();
        let client_pub = BigUint::from_bytes_be(&pool.public_bytes(&client_priv));

        let k1 = pool.derive(&server_priv, &client_pub).unwrap();
        let k2 = pool.derive(&client_priv, &server_pub).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 32);
    }

    #[test]
    fn pool_is_bounded_and_never_blocks() {
        let pool = test_pool(4);
        assert_eq!(pool.pooled_keys(), 4);

        let mut taken: Vec<_> = (0..6).map(|_| pool.take_private_key()).collect();
        assert_eq!(pool.pooled_keys(), 0);

        for key in taken.drain(..) {
            pool.return_private_key(key);
        }
        // Two of the six returns were dropped at the cap.
        assert_eq!(pool.pooled_keys(), 4);
    }

    #[test]
    fn out_of_range_publics_rejected() {
        let pool = test_pool(1);
        let key = pool.take_private_key();
        let (p, _) = pool.parameter_numbers();

        let too_low = BigUint::one();
        let too_high = p - BigUint::one();
        assert_eq!(pool.derive(&key, &too_low), Err(DhError::PublicOutOfRange));
        assert_eq!(pool.derive(&key, &too_high), Err(DhError::PublicOutOfRange));
    }

    #[test]
    fn parameter_bytes_are_minimal() {
        let pool = test_pool(1);
        let (p_bytes, g_bytes) = pool.parameter_bytes();
        assert_ne!(p_bytes[0], 0);
        assert_eq!(g_bytes, vec![2]);
        assert_eq!(p_bytes.len(), 16); // 128-bit prime
    }
}
