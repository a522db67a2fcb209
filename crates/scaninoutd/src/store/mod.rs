//! Persistence collaborator used by command handlers.
//!
//! Records are stored whole, one table per record schema: a `Member` record
//! lives in the `Member` table. Every table row is keyed by the record's
//! integer `id` field, which [`Transaction::insert`] assigns.
//!
//! The dispatcher opens one [`Transaction`] per request and either commits it
//! after the response has been encoded or rolls it back. Nothing written
//! through a transaction is observable by other transactions before commit.

mod memory;

use scaninout_proto::{Record, SchemaError, Value};
use thiserror::Error;

pub use self::memory::MemoryStore;

/// Name of the key field every stored record carries.
pub const ID_FIELD: &str = "id";

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An update named a record without an id.
    #[error("record in table '{table}' has no id")]
    MissingId { table: String },
    /// An update named a row that does not exist.
    #[error("no row {id} in table '{table}'")]
    NotFound { table: String, id: i64 },
    /// Assigning the key field failed.
    #[error("failed to assign record key: {0}")]
    Record(#[from] SchemaError),
}

/// A unit of work against the store.
///
/// Dropping a transaction without calling [`Transaction::commit`] discards
/// its writes.
pub trait Transaction {
    /// Stores `record` under a fresh id and returns the stored copy.
    ///
    /// # Errors
    ///
    /// Fails when the record's schema declares no `id` field.
    fn insert(&mut self, record: Record) -> Result<Record, StoreError>;

    /// Replaces the row whose id matches `record`.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::MissingId`] or [`StoreError::NotFound`].
    fn update(&mut self, record: Record) -> Result<Record, StoreError>;

    /// Removes row `id`; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn delete(&mut self, table: &str, id: i64) -> Result<bool, StoreError>;

    /// Fetches row `id`.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get(&self, table: &str, id: i64) -> Result<Option<Record>, StoreError>;

    /// Every row of `table` in id order.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn all(&self, table: &str) -> Result<Vec<Record>, StoreError>;

    /// Rows of `table` whose `field` equals `value`, in id order. Rows where
    /// the field is absent never match.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn find_by(&self, table: &str, field: &str, value: &Value) -> Result<Vec<Record>, StoreError>;

    /// Publishes every write made through this transaction.
    ///
    /// # Errors
    ///
    /// Backend failures only; the writes are discarded in that case.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discards every write made through this transaction.
    fn rollback(self: Box<Self>);
}

/// A store that hands out transactions.
pub trait Persistence: Send + Sync {
    /// Opens a transaction. Implementations may block until other
    /// transactions finish.
    ///
    /// # Errors
    ///
    /// Fails when the backend is unavailable.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError>;
}
