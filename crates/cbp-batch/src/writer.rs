//! Chunk writers: the persisting customer writer and the dry-run discard writer

use crate::customer::Customer;
use crate::error::{BatchError, Result};
use crate::framework::item::ItemWriter;
use crate::store::CustomerRepository;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Persists each customer of a chunk, then flushes and clears the store.
///
/// Any store failure aborts the rest of the chunk and is reported as
/// retryable; the engine rolls the transaction back and re-runs the whole chunk.
pub struct CustomerItemWriter {
    repository: Arc<dyn CustomerRepository>,
    duplicate_check: bool,
}

impl CustomerItemWriter {
    pub fn new(repository: Arc<dyn CustomerRepository>) -> Self {
        Self {
            repository,
            duplicate_check: false,
        }
    }

    /// Warn (never reject) when an email is already stored
    pub fn with_duplicate_check(mut self, enabled: bool) -> Self {
        self.duplicate_check = enabled;
        self
    }

    fn warn_if_duplicate(&self, customer: &Customer) {
        let Some(email) = customer.email.as_deref() else {
            return;
        };

        match self.repository.find_by_email(email) {
            Ok(Some(existing)) => warn!(
                email,
                existing_id = existing.id.unwrap_or_default(),
                customer = %customer.display_name(),
                "Customer with this email already exists"
            ),
            Ok(None) => {},
            Err(e) => debug!(email, error = %e, "Duplicate check skipped"),
        }
    }
}

#[async_trait]
impl ItemWriter<Customer> for CustomerItemWriter {
    async fn write(&self, items: &[Customer]) -> Result<()> {
        for customer in items {
            if self.duplicate_check {
                self.warn_if_duplicate(customer);
            }

            let id = self.repository.persist(customer).map_err(|e| {
                BatchError::retryable(
                    format!("Failed to persist customer '{}'", customer.display_name()),
                    e,
                )
            })?;
            debug!(id, customer = %customer.display_name(), "Persisted customer");
        }

        self.repository
            .flush()
            .map_err(|e| BatchError::retryable("Failed to flush customer batch", e))?;
        self.repository.clear();

        debug!(records = items.len(), "Customer chunk written");
        Ok(())
    }
}

/// Discards every chunk. Used by the validation step.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpWriter;

#[async_trait]
impl ItemWriter<Customer> for NoOpWriter {
    async fn write(&self, items: &[Customer]) -> Result<()> {
        debug!(records = items.len(), "Dry run chunk validated");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::{SqliteCustomerStore, StoreError};
    use std::sync::Mutex;

    fn customer(name: &str, email: &str) -> Customer {
        Customer {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
            ..Customer::default()
        }
    }

    /// Repository whose `persist` fails for one email
    struct RejectingRepository {
        inner: SqliteCustomerStore,
        reject: String,
        flushed: Mutex<u32>,
    }

    impl CustomerRepository for RejectingRepository {
        fn persist(&self, customer: &Customer) -> crate::store::Result<i64> {
            if customer.email.as_deref() == Some(self.reject.as_str()) {
                return Err(StoreError::unavailable("constraint violated"));
            }
            self.inner.persist(customer)
        }

        fn flush(&self) -> crate::store::Result<()> {
            *self.flushed.lock().unwrap() += 1;
            self.inner.flush()
        }

        fn clear(&self) {
            self.inner.clear()
        }

        fn count(&self) -> crate::store::Result<u64> {
            self.inner.count()
        }

        fn find_by_email(&self, email: &str) -> crate::store::Result<Option<Customer>> {
            self.inner.find_by_email(email)
        }

        fn list(&self) -> crate::store::Result<Vec<Customer>> {
            self.inner.list()
        }
    }

    #[tokio::test]
    async fn test_write_persists_chunk() {
        let store = Arc::new(SqliteCustomerStore::open_in_memory().unwrap());
        let writer = CustomerItemWriter::new(store.clone());

        writer
            .write(&[customer("A", "a@x.com"), customer("B", "b@x.com")])
            .await
            .unwrap();

        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.staged(), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_is_retryable_and_stops_chunk() {
        let repository = Arc::new(RejectingRepository {
            inner: SqliteCustomerStore::open_in_memory().unwrap(),
            reject: "b@x.com".to_string(),
            flushed: Mutex::new(0),
        });
        let writer = CustomerItemWriter::new(repository.clone());

        let err = writer
            .write(&[
                customer("A", "a@x.com"),
                customer("B", "b@x.com"),
                customer("C", "c@x.com"),
            ])
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Failed to persist customer 'B'");
        // C was never attempted and nothing was flushed
        assert_eq!(repository.count().unwrap(), 1);
        assert_eq!(*repository.flushed.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_check_is_advisory() {
        let store = Arc::new(SqliteCustomerStore::open_in_memory().unwrap());
        let writer = CustomerItemWriter::new(store.clone()).with_duplicate_check(true);

        writer.write(&[customer("A", "a@x.com")]).await.unwrap();
        writer.write(&[customer("A again", "a@x.com")]).await.unwrap();

        assert_eq!(store.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_noop_writer_discards() {
        NoOpWriter
            .write(&[customer("A", "a@x.com")])
            .await
            .unwrap();
    }
}
