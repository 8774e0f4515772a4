//! Test helpers for customer import integration tests
//!
//! This module provides:
//! - CSV fixtures written to temporary files
//! - A repository that injects persist failures in front of a real SQLite store
//! - A status sink that records every snapshot it receives
//! - A writer wrapper counting chunk write invocations

#![allow(dead_code)]

pub mod fixtures;

use async_trait::async_trait;
use cbp_batch::framework::{ItemWriter, TransactionManager};
use cbp_batch::store::{self, CustomerRepository, SqliteCustomerStore, StoreError};
use cbp_batch::{BatchConfig, Customer, JobExecution, StatusSink, StepExecution};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// Re-export fixtures for convenience
pub use fixtures::*;

/// Config with small chunks and the given retry limit
pub fn test_config(chunk_size: usize, retry_limit: u32) -> BatchConfig {
    BatchConfig {
        chunk_size,
        retry_limit,
        progress_interval: 1,
        ..BatchConfig::default()
    }
}

/// SQLite-backed repository that fails `persist` on demand.
///
/// Also acts as the transaction manager by delegating to the wrapped store, so
/// injected failures exercise the real rollback path.
pub struct FlakyRepository {
    inner: Arc<SqliteCustomerStore>,
    fail_next: AtomicU32,
    fail_email: Mutex<Option<String>>,
    persist_calls: AtomicU32,
}

impl FlakyRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(SqliteCustomerStore::open_in_memory().expect("in-memory store")),
            fail_next: AtomicU32::new(0),
            fail_email: Mutex::new(None),
            persist_calls: AtomicU32::new(0),
        })
    }

    /// Fail the next `times` persist calls
    pub fn fail_next(&self, times: u32) {
        self.fail_next.store(times, Ordering::SeqCst);
    }

    /// Fail every persist of a customer with this email
    pub fn fail_on_email(&self, email: &str) {
        *self.fail_email.lock().expect("lock") = Some(email.to_string());
    }

    pub fn persist_calls(&self) -> u32 {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &SqliteCustomerStore {
        &self.inner
    }

    fn should_fail(&self, customer: &Customer) -> bool {
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return true;
        }

        let fail_email = self.fail_email.lock().expect("lock");
        fail_email.is_some() && fail_email.as_deref() == customer.email.as_deref()
    }
}

impl CustomerRepository for FlakyRepository {
    fn persist(&self, customer: &Customer) -> store::Result<i64> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail(customer) {
            return Err(StoreError::unavailable("injected persist failure"));
        }
        self.inner.persist(customer)
    }

    fn flush(&self) -> store::Result<()> {
        self.inner.flush()
    }

    fn clear(&self) {
        self.inner.clear()
    }

    fn count(&self) -> store::Result<u64> {
        self.inner.count()
    }

    fn find_by_email(&self, email: &str) -> store::Result<Option<Customer>> {
        self.inner.find_by_email(email)
    }

    fn list(&self) -> store::Result<Vec<Customer>> {
        self.inner.list()
    }
}

impl TransactionManager for FlakyRepository {
    fn begin(&self) -> store::Result<()> {
        self.inner.begin()
    }

    fn commit(&self) -> store::Result<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> store::Result<()> {
        self.inner.rollback()
    }
}

/// Keeps every snapshot pushed by the engine
#[derive(Default)]
pub struct RecordingStatusSink {
    steps: Mutex<Vec<StepExecution>>,
    jobs: Mutex<Vec<JobExecution>>,
}

impl RecordingStatusSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn steps(&self) -> Vec<StepExecution> {
        self.steps.lock().expect("lock").clone()
    }

    pub fn jobs(&self) -> Vec<JobExecution> {
        self.jobs.lock().expect("lock").clone()
    }
}

impl StatusSink for RecordingStatusSink {
    fn step_updated(&self, execution: &StepExecution) {
        self.steps.lock().expect("lock").push(execution.clone());
    }

    fn job_updated(&self, execution: &JobExecution) {
        self.jobs.lock().expect("lock").push(execution.clone());
    }
}

/// Counts `write` invocations of the wrapped writer
pub struct CountingWriter<W> {
    inner: W,
    calls: Arc<AtomicU32>,
}

impl<W> CountingWriter<W> {
    pub fn new(inner: W) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl<W: ItemWriter<Customer>> ItemWriter<Customer> for CountingWriter<W> {
    async fn write(&self, items: &[Customer]) -> cbp_batch::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.write(items).await
    }
}
