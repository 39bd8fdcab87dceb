//! Persistent state store
//!
//! Each entity type lives in one JSON array document. A task loads the
//! document into a [`Ledger`], mutates it in memory and rewrites the whole
//! document after every wallet.
//!
//! ```text
//! Backend (file | memory) → JsonStore<T> → Ledger<T> (keyed by address)
//! ```

pub mod backend;
pub mod records;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::config::FilesConfig;
use crate::error::{Error, Result};
use crate::wallet::Wallet;

pub use backend::{Backend, FileBackend, MemoryBackend};
pub use records::{
    validate_proof_text, ActivationRecord, Keyed, ProofRecord, RegistrationRecord,
    ACTIVATION_COOLDOWN_MS, MAX_PROOF_CHARS,
};

/// Typed JSON array document over a backend
pub struct JsonStore<T> {
    backend: Arc<dyn Backend>,
    _marker: PhantomData<T>,
}

impl<T> Clone for JsonStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> JsonStore<T> {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            _marker: PhantomData,
        }
    }

    pub fn file(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Arc::new(FileBackend::new(path)))
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Load every item; an empty document reads as no items
    pub fn load(&self) -> Result<Vec<T>> {
        let raw = self.backend.read()?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            Error::Deserialization(format!("{}: {}", self.backend.describe(), e))
        })
    }

    /// Replace the document with `items`
    pub fn save(&self, items: &[T]) -> Result<()> {
        let json = serde_json::to_string_pretty(items)?;
        self.backend.write(&json)?;
        debug!("Saved {} records to {}", items.len(), self.backend.describe());
        Ok(())
    }
}

/// In-memory view of a keyed store, rewritten wholesale on save
pub struct Ledger<T> {
    store: JsonStore<T>,
    records: Vec<T>,
}

impl<T: Keyed + Clone + Serialize + DeserializeOwned> Ledger<T> {
    pub fn load(store: &JsonStore<T>) -> Result<Self> {
        Ok(Self {
            store: store.clone(),
            records: store.load()?,
        })
    }

    pub fn get(&self, address: &str) -> Option<&T> {
        self.records.iter().find(|r| r.matches(address))
    }

    /// Replace the record for the same address, or append
    pub fn upsert(&mut self, record: T) {
        match self
            .records
            .iter_mut()
            .find(|r| r.matches(record.address()))
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.store.save(&self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Every store one run needs, constructed once and passed to the tasks
#[derive(Clone)]
pub struct StateStore {
    pub wallets: JsonStore<Wallet>,
    pub registrations: JsonStore<RegistrationRecord>,
    pub activations: JsonStore<ActivationRecord>,
    pub proofs: JsonStore<ProofRecord>,
}

impl StateStore {
    pub fn from_files(files: &FilesConfig) -> Self {
        Self {
            wallets: JsonStore::file(&files.wallets),
            registrations: JsonStore::file(&files.registered),
            activations: JsonStore::file(&files.activations),
            proofs: JsonStore::file(&files.proofs),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            wallets: JsonStore::memory(),
            registrations: JsonStore::memory(),
            activations: JsonStore::memory(),
            proofs: JsonStore::memory(),
        }
    }

    /// Load wallets in list order, rejecting ids of zero and duplicates
    pub fn load_wallets(&self) -> Result<Vec<Wallet>> {
        let wallets = self.wallets.load()?;
        let mut seen = std::collections::HashSet::new();
        for wallet in &wallets {
            if wallet.id == 0 {
                return Err(Error::Config(format!(
                    "wallet {} has id 0; ids start at 1",
                    wallet.address
                )));
            }
            if !seen.insert(wallet.id) {
                return Err(Error::Config(format!("duplicate wallet id {}", wallet.id)));
            }
        }
        Ok(wallets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_proof_record_round_trip() {
        let dir = tempdir().unwrap();
        let store: JsonStore<ProofRecord> = JsonStore::file(dir.path().join("proofs.json"));

        let mut record = ProofRecord::new("0xAbC", "my proof").unwrap();
        record.mark_submitted();
        store.save(&[record.clone()]).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, vec![record]);
        assert!(reloaded[0].is_submitted);
        assert!(!reloaded[0].is_verified);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store: JsonStore<RegistrationRecord> =
            JsonStore::file(dir.path().join("registered.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registered.json");
        std::fs::write(&path, "{not json").unwrap();
        let store: JsonStore<RegistrationRecord> = JsonStore::file(&path);
        assert!(matches!(store.load(), Err(Error::Deserialization(_))));
    }

    #[test]
    fn test_ledger_upsert_is_case_insensitive() {
        let store: JsonStore<ActivationRecord> = JsonStore::memory();
        let mut ledger = Ledger::load(&store).unwrap();
        ledger.upsert(ActivationRecord {
            address: "0xABC".into(),
            last_activation: 1,
        });
        ledger.upsert(ActivationRecord {
            address: "0xabc".into(),
            last_activation: 2,
        });
        ledger.save().unwrap();

        let reloaded = Ledger::load(&store).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("0xAbc").unwrap().last_activation, 2);
    }

    #[test]
    fn test_load_wallets_rejects_duplicates() {
        let state = StateStore::in_memory();
        let wallet = Wallet {
            id: 1,
            address: "0xabc".into(),
            private_key: "0x01".into(),
            proxy: None,
        };
        state.wallets.save(&[wallet.clone(), wallet]).unwrap();
        assert!(matches!(state.load_wallets(), Err(Error::Config(_))));
    }
}
