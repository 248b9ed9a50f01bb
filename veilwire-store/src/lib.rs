//! Encrypted-at-rest key/value store.
//!
//! A storage unit is one file, `stg_<name>.stg`, holding a single AEAD
//! unit (`nonce ‖ ciphertext ‖ tag`) whose plaintext is a CBOR map of
//! named entries. Every mutation is a read-modify-write of the whole
//! file under a fresh nonce. A reserved `"_stg_keys"` entry carries one
//! 32-byte key per named entry, generated lazily, for callers that seal
//! individual values a second time.
//!
//! Corruption policy: a file that fails to decrypt or decode is treated
//! as "no data" on reads, and is overwritten wholesale on the next
//! write. Availability wins over recovery here.

#![deny(unsafe_code)]

mod store;

pub use ciborium::value::Value;
pub use store::{KEYS_ENTRY, SealedStore, StoreError};
