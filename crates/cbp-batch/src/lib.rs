//! CBP Batch - chunk-oriented customer import
//!
//! Reads a comma-separated customer file, validates and normalizes every field,
//! encrypts the aadhaar and PAN numbers and persists the records in
//! transactional chunks.
//!
//! # Example
//!
//! ```no_run
//! use cbp_batch::{BatchConfig, CustomerImportJob, SqliteCustomerStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BatchConfig::from_env()?;
//! let store = Arc::new(SqliteCustomerStore::open(&config.database_path)?);
//! let job = CustomerImportJob::with_sqlite(config, store)?;
//!
//! let result = job.run_job("customers.csv").await;
//! println!("{}: {}", result.status, result.message);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod crypto;
pub mod customer;
pub mod error;
pub mod framework;
pub mod job;
pub mod processor;
pub mod reader;
pub mod status;
pub mod store;
pub mod validator;
pub mod writer;

pub use config::BatchConfig;
pub use crypto::{CryptoError, EncryptionService};
pub use customer::Customer;
pub use error::{BatchError, FatalError, ReadError, Result, ValidationError};
pub use framework::{BatchStatus, ChunkState, JobExecution, StepExecution, StepPolicy};
pub use job::{CustomerImportJob, JobResult};
pub use status::{StatusSink, TracingStatusSink};
pub use store::{CustomerRepository, SqliteCustomerStore, StoreError};
pub use validator::{CustomerValidator, Field, ValidationReport};
