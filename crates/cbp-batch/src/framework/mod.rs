//! Chunk-oriented step framework
//!
//! A step pulls items from an [`ItemReader`], pushes each through an
//! [`ItemProcessor`] and hands fixed-size chunks to an [`ItemWriter`] inside a
//! transaction. Retry, skip and start limits come from a [`StepPolicy`].

pub mod item;
pub mod step;
pub mod transaction;
pub mod types;

// Re-export commonly used types
pub use item::{ItemProcessor, ItemReader, ItemWriter};
pub use step::{ChunkStep, StartRegistry, StepBuilder, StepOutcome};
pub use transaction::{NoTransaction, TransactionManager};
pub use types::{BatchStatus, ChunkState, JobExecution, StepExecution, StepPolicy};
