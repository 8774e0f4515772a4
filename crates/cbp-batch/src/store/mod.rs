//! Customer persistence
//!
//! The pipeline only needs `persist`, `flush` and `clear`; the query methods
//! exist for operators and tests. Implementations are synchronous.

pub mod schema;
pub mod sqlite;

use crate::customer::Customer;
use thiserror::Error;

pub use sqlite::SqliteCustomerStore;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage failures. The writer treats every variant as transient.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to acquire database lock: {0}")]
    Lock(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Persistence collaborator used by the record writer
pub trait CustomerRepository: Send + Sync {
    /// Stage one customer and return its assigned id
    fn persist(&self, customer: &Customer) -> Result<i64>;

    /// Push staged rows to the datastore
    fn flush(&self) -> Result<()>;

    /// Drop buffered state after a chunk
    fn clear(&self);

    fn count(&self) -> Result<u64>;

    fn find_by_email(&self, email: &str) -> Result<Option<Customer>>;

    fn list(&self) -> Result<Vec<Customer>>;
}
