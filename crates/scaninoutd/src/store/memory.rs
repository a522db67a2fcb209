use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use scaninout_proto::{Record, Value};

use super::{ID_FIELD, Persistence, StoreError, Transaction};

#[derive(Debug, Default, Clone)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, Record>,
}

type Tables = HashMap<String, Table>;

/// An in-process store.
///
/// Transactions are serialised: [`Persistence::begin`] holds the store lock
/// until the transaction ends, and writes go to a private copy of the tables
/// that replaces the shared state only on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of `table`, in id order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock()
            .get(table)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    // Commit is a single assignment, so a panic mid-transaction never leaves
    // the shared tables half-written and the poison flag can be ignored.
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Persistence for MemoryStore {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        let guard = self.lock();
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, Tables>,
    working: Tables,
}

fn record_id(record: &Record) -> Option<i64> {
    record.int(ID_FIELD)
}

impl Transaction for MemoryTransaction<'_> {
    fn insert(&mut self, mut record: Record) -> Result<Record, StoreError> {
        let table = self
            .working
            .entry(record.schema().name().to_owned())
            .or_default();
        let id = table.last_id.saturating_add(1);
        record.set(ID_FIELD, Some(Value::Int(id)))?;
        table.last_id = id;
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    fn update(&mut self, record: Record) -> Result<Record, StoreError> {
        let name = record.schema().name();
        let id = record_id(&record).ok_or_else(|| StoreError::MissingId {
            table: name.to_owned(),
        })?;
        let row = self
            .working
            .get_mut(name)
            .and_then(|table| table.rows.get_mut(&id))
            .ok_or_else(|| StoreError::NotFound {
                table: name.to_owned(),
                id,
            })?;
        *row = record.clone();
        Ok(record)
    }

    fn delete(&mut self, table: &str, id: i64) -> Result<bool, StoreError> {
        Ok(self
            .working
            .get_mut(table)
            .and_then(|rows| rows.rows.remove(&id))
            .is_some())
    }

    fn get(&self, table: &str, id: i64) -> Result<Option<Record>, StoreError> {
        Ok(self
            .working
            .get(table)
            .and_then(|rows| rows.rows.get(&id))
            .cloned())
    }

    fn all(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .working
            .get(table)
            .map(|rows| rows.rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn find_by(&self, table: &str, field: &str, value: &Value) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .working
            .get(table)
            .map(|rows| {
                rows.rows
                    .values()
                    .filter(|record| record.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    fn rollback(self: Box<Self>) {}
}
