//! Chunk transaction boundary

use crate::store::StoreError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Begins, commits and rolls back one chunk's writes.
///
/// The chunk engine calls `begin` before every write attempt and exactly one of
/// `commit` / `rollback` after it. `begin` and `commit` failures are retried
/// like write failures; a `rollback` failure ends the step.
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> Result<(), StoreError>;

    fn commit(&self) -> Result<(), StoreError>;

    fn rollback(&self) -> Result<(), StoreError>;
}

/// Resourceless manager for steps that never touch storage
#[derive(Debug, Default)]
pub struct NoTransaction {
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl NoTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }
}

impl TransactionManager for NoTransaction {
    fn begin(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rollback(&self) -> Result<(), StoreError> {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
