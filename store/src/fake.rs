//! An in-memory store. Nothing survives the process, which makes it the store of choice for tests.

use crate::object::{Key, Kind, RawStore, Store};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub type FakeStore = Store<Memory>;

pub fn new() -> FakeStore {
    Store::new(Memory::default())
}

#[derive(Debug, Clone, Default)]
pub struct Memory {
    records: Arc<Mutex<BTreeMap<Key, Vec<u8>>>>,
}

impl Memory {
    fn records(&self) -> MutexGuard<'_, BTreeMap<Key, Vec<u8>>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RawStore for Memory {
    async fn read(&self, key: &Key) -> Result<Option<Vec<u8>>> {
        Ok(self.records().get(key).cloned())
    }

    async fn write(&self, key: &Key, data: Vec<u8>) -> Result<()> {
        self.records().insert(key.clone(), data);
        Ok(())
    }

    async fn remove(&self, key: &Key) -> Result<bool> {
        Ok(self.records().remove(key).is_some())
    }

    async fn list(&self, kind: Kind, scope: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .records()
            .iter()
            .filter(|(key, _)| key.kind == kind && key.scope == scope)
            .map(|(_, data)| data.clone())
            .collect())
    }
}
