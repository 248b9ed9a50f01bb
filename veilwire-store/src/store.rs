//! Whole-file sealed map store.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use ciborium::value::Value;
use veilwire_crypto::{MIN_SEALED_LEN, Sealer, gen_key};

/// Reserved entry holding the per-entry key table.
pub const KEYS_ENTRY: &str = "_stg_keys";

// The version suffix is the format version: a blob sealed under any other
// constant fails authentication and reads as "no data".
const MASTER_KEY: &[u8] = b"veilwire_master_key_v1";

type Map = BTreeMap<String, Value>;

/// I/O-level store failure. Corrupt files are not errors; they read as
/// absent data.
#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    /// CBOR encoding of the plaintext map failed.
    Encode(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "storage I/O error: {e}"),
            Self::Encode(e) => write!(f, "storage encode error: {e}"),
        }
    }
}
impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A named, sealed, single-file map store.
///
/// All operations serialize on an internal mutex, making the single
/// writer per file an enforced invariant rather than a usage convention.
pub struct SealedStore {
    path: PathBuf,
    master: Sealer,
    lock: Mutex<()>,
}

impl SealedStore {
    /// Open (or prepare) the store `stg_<name>.stg` under `dir`. The
    /// directory is created if missing; the file itself is created on
    /// first write.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("stg_{name}.stg")),
            master: Sealer::new(MASTER_KEY),
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Whole-map operations ─────────────────────────────────────────────

    /// All entries except the reserved key table. `None` when the file is
    /// missing, empty, truncated, or corrupt.
    pub fn load(&self) -> Result<Option<Map>, StoreError> {
        let _guard = self.guard();
        Ok(self.read_map()?.map(|mut map| {
            map.remove(KEYS_ENTRY);
            map
        }))
    }

    /// Merge `data` over the stored map and re-seal. Entries not named in
    /// `data` survive; a corrupt existing file is replaced outright.
    pub fn save(&self, data: Map) -> Result<(), StoreError> {
        let _guard = self.guard();
        let mut map = self.read_map()?.unwrap_or_default();
        for (k, v) in data {
            map.insert(k, v);
        }
        self.write_map(&map)
    }

    /// Names of all entries, reserved key table excluded.
    pub fn list_entries(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.guard();
        Ok(match self.read_map()? {
            Some(map) => map.into_keys().filter(|k| k != KEYS_ENTRY).collect(),
            None => Vec::new(),
        })
    }

    // ── Single-entry operations ──────────────────────────────────────────

    /// Raw entry read; the reserved key table is reachable by name.
    pub fn read_entry(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let _guard = self.guard();
        Ok(self.read_map()?.and_then(|mut map| map.remove(name)))
    }

    /// Read-modify-write of one entry.
    pub fn write_entry(&self, name: &str, value: Value) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let mut map = self.read_map()?.unwrap_or_default();
        map.insert(name.to_owned(), value);
        self.write_map(&map)?;
        Ok(true)
    }

    /// Like [`write_entry`](Self::write_entry) but a no-op returning
    /// `false` when the entry already exists.
    pub fn write_entry_if_absent(&self, name: &str, value: Value) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let mut map = self.read_map()?.unwrap_or_default();
        if map.contains_key(name) {
            return Ok(false);
        }
        map.insert(name.to_owned(), value);
        self.write_map(&map)?;
        Ok(true)
    }

    /// Remove an entry and its per-entry key. Absent entries (and absent
    /// or corrupt files) count as success.
    pub fn delete_entry(&self, name: &str) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let Some(mut map) = self.read_map()? else {
            return Ok(true);
        };
        if map.remove(name).is_none() {
            return Ok(true);
        }
        let mut keys = keys_of(&map);
        if keys.remove(name).is_some() {
            set_keys(&mut map, keys);
        }
        self.write_map(&map)?;
        Ok(true)
    }

    pub fn entry_exists(&self, name: &str) -> Result<bool, StoreError> {
        let _guard = self.guard();
        Ok(self
            .read_map()?
            .is_some_and(|map| map.contains_key(name)))
    }

    // ── Per-entry key table ──────────────────────────────────────────────

    /// The stable 32-byte key for `name`, generated and persisted on
    /// first request.
    pub fn get_or_create_entry_key(&self, name: &str) -> Result<[u8; 32], StoreError> {
        let _guard = self.guard();
        let mut map = self.read_map()?.unwrap_or_default();
        let mut keys = keys_of(&map);

        if let Some(existing) = keys.get(name) {
            if let Ok(key) = <[u8; 32]>::try_from(existing.as_slice()) {
                return Ok(key);
            }
            // Wrong-sized key is corrupt; fall through and replace it.
        }

        let seed = gen_key(32);
        let key = veilwire_crypto::sha256!(name.as_bytes(), b"_", hex::encode(&seed).as_bytes());
        keys.insert(name.to_owned(), key.to_vec());
        set_keys(&mut map, keys);
        self.write_map(&map)?;
        Ok(key)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Missing, empty, truncated and corrupt files all read as None.
    fn read_map(&self) -> Result<Option<Map>, StoreError> {
        let sealed = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if sealed.len() < MIN_SEALED_LEN {
            return Ok(None);
        }
        let Ok(plain) = self.master.open(&sealed) else {
            log::warn!("sealed store {:?} failed authentication, treating as empty", self.path);
            return Ok(None);
        };
        match ciborium::from_reader::<Map, _>(plain.as_slice()) {
            Ok(map) => Ok(Some(map)),
            Err(e) => {
                log::warn!("sealed store {:?} failed to decode: {e}", self.path);
                Ok(None)
            }
        }
    }

    // Seal with a fresh nonce and replace the file atomically.
    fn write_map(&self, map: &Map) -> Result<(), StoreError> {
        let mut plain = Vec::new();
        ciborium::into_writer(map, &mut plain).map_err(|e| StoreError::Encode(e.to_string()))?;
        let sealed = self.master.seal(&plain);

        let tmp = self.path.with_extension("stg.tmp");
        fs::write(&tmp, &sealed)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn keys_of(map: &Map) -> BTreeMap<String, Vec<u8>> {
    let Some(Value::Map(pairs)) = map.get(KEYS_ENTRY) else {
        return BTreeMap::new();
    };
    pairs
        .iter()
        .filter_map(|(k, v)| match (k, v) {
            (Value::Text(name), Value::Bytes(key)) => Some((name.clone(), key.clone())),
            _ => None,
        })
        .collect()
}

fn set_keys(map: &mut Map, keys: BTreeMap<String, Vec<u8>>) {
    let pairs = keys
        .into_iter()
        .map(|(name, key)| (Value::Text(name), Value::Bytes(key)))
        .collect();
    map.insert(KEYS_ENTRY.to_owned(), Value::Map(pairs));
}
