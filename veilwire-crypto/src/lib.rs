//! Cryptographic primitives for the veilwire protocol.
//!
//! Provides:
//! - [`Sealer`] — AES-256-GCM authenticated sealing under a hashed key
//! - SHA-256 hash macro
//! - Probabilistic safe-prime generation (Miller–Rabin)
//! - [`DhPool`] — cached DH parameter set plus a pre-generated private-key pool
//! - Session key derivation (BLAKE2b-512, truncated to 32 bytes)

#![deny(unsafe_code)]

pub mod dh;
mod primes;
mod sealer;
mod sha;

pub use dh::{DhError, DhPool, DhPrivate, global_pool};
pub use primes::gen_safe_prime;
pub use sealer::{MIN_SEALED_LEN, NONCE_LEN, SealError, Sealer, TAG_LEN, gen_key};
