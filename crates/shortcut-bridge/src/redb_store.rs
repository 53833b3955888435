//! Shared namespace backed by a redb file inside the group container.
//!
//! redb holds an exclusive lock while a `Database` is open, so the file is
//! opened per operation and dropped straight after. A peer that finds it
//! locked backs off briefly and retries.

use std::path::PathBuf;
use std::time::Duration;

use redb::{Database, DatabaseError, ReadableTable, TableDefinition, TableError};

use crate::error::BridgeError;
use crate::store::SharedStore;
use crate::value::StoreValue;
use crate::Result;

/// Key: namespace key. Value: JSON-encoded `StoreValue`.
const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

pub const STORE_FILE: &str = "shared.redb";

const OPEN_ATTEMPTS: u32 = 50;
const OPEN_BACKOFF: Duration = Duration::from_millis(10);

fn store_err(e: impl std::fmt::Display) -> BridgeError {
    BridgeError::Store(e.to_string())
}

#[derive(Debug, Clone)]
pub struct RedbStore {
    dir: PathBuf,
}

impl RedbStore {
    /// `dir` is the shared container; it must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    fn open(&self) -> Result<Database> {
        if !self.dir.is_dir() {
            return Err(BridgeError::StoreUnavailable(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        let path = self.path();
        let mut attempt = 0;
        loop {
            match Database::create(&path) {
                Ok(db) => return Ok(db),
                Err(DatabaseError::DatabaseAlreadyOpen) if attempt + 1 < OPEN_ATTEMPTS => {
                    attempt += 1;
                    std::thread::sleep(OPEN_BACKOFF);
                }
                Err(e) => return Err(BridgeError::StoreUnavailable(e.to_string())),
            }
        }
    }

    fn read<T>(
        &self,
        empty: T,
        f: impl FnOnce(&redb::ReadOnlyTable<&'static str, &'static [u8]>) -> Result<T>,
    ) -> Result<T> {
        let db = self.open()?;
        let rt = db.begin_read().map_err(store_err)?;
        match rt.open_table(ENTRIES) {
            Ok(table) => f(&table),
            // Nothing has been written yet.
            Err(TableError::TableDoesNotExist(_)) => Ok(empty),
            Err(e) => Err(store_err(e)),
        }
    }

    fn write(
        &self,
        f: impl FnOnce(&mut redb::Table<'_, &'static str, &'static [u8]>) -> Result<()>,
    ) -> Result<()> {
        let db = self.open()?;
        let wt = db.begin_write().map_err(store_err)?;
        {
            let mut table = wt.open_table(ENTRIES).map_err(store_err)?;
            f(&mut table)?;
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }
}

impl SharedStore for RedbStore {
    fn check(&self) -> Result<()> {
        self.open().map(drop)
    }

    fn get(&self, key: &str) -> Result<Option<StoreValue>> {
        self.read(None, |table| {
            match table.get(key).map_err(store_err)? {
                Some(raw) => Ok(Some(serde_json::from_slice(raw.value())?)),
                None => Ok(None),
            }
        })
    }

    fn set(&self, key: &str, value: StoreValue) -> Result<()> {
        let encoded = serde_json::to_vec(&value)?;
        self.write(|table| {
            table.insert(key, encoded.as_slice()).map_err(store_err)?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.write(|table| {
            table.remove(key).map_err(store_err)?;
            Ok(())
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.read(Vec::new(), |table| {
            let mut keys = Vec::new();
            for entry in table.iter().map_err(store_err)? {
                let (k, _) = entry.map_err(store_err)?;
                keys.push(k.value().to_string());
            }
            Ok(keys)
        })
    }

    fn remove_many(&self, keys: &[String]) -> Result<()> {
        self.write(|table| {
            for key in keys {
                table.remove(key.as_str()).map_err(store_err)?;
            }
            Ok(())
        })
    }
}
