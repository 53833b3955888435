use crate::error::BridgeError;
use crate::value::StoreValue;
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// The key-value namespace both processes can see.
///
/// Every operation is independent; there are no transactions. Implementations
/// must be callable from any thread.
pub trait SharedStore: Send + Sync {
    /// Fails when the namespace cannot be opened at all (misconfigured group).
    fn check(&self) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<StoreValue>>;

    fn set(&self, key: &str, value: StoreValue) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;

    /// Text read with numeric fallback.
    fn get_text(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key)?.map(|v| v.as_text()))
    }

    fn remove_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Both actors share it through an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, StoreValue>>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation fails, standing in for a missing group.
    pub fn unavailable() -> Self {
        Self {
            entries: Mutex::default(),
            unavailable: true,
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut BTreeMap<String, StoreValue>) -> T) -> Result<T> {
        if self.unavailable {
            return Err(BridgeError::StoreUnavailable("memory store disabled".into()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| BridgeError::Store("memory store lock poisoned".into()))?;
        Ok(f(&mut entries))
    }
}

impl SharedStore for MemoryStore {
    fn check(&self) -> Result<()> {
        self.with(|_| ())
    }

    fn get(&self, key: &str) -> Result<Option<StoreValue>> {
        self.with(|m| m.get(key).cloned())
    }

    fn set(&self, key: &str, value: StoreValue) -> Result<()> {
        self.with(|m| {
            m.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with(|m| {
            m.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.with(|m| m.keys().cloned().collect())
    }
}
