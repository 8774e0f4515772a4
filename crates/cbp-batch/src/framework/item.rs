//! Reader, processor and writer seams of a chunk step

use crate::error::Result;
use async_trait::async_trait;

/// Lazy, finite source of items
///
/// `open` positions the reader at the first item; calling it again restarts
/// from the beginning. A single reader is never shared between steps.
#[async_trait]
pub trait ItemReader<T: Send + 'static>: Send {
    /// Acquire the underlying resource
    async fn open(&mut self) -> Result<()>;

    /// Next item, or `None` once the source is exhausted
    ///
    /// A [`BatchError::Read`](crate::error::BatchError::Read) concerns only the
    /// current item; the reader stays usable afterwards.
    async fn read(&mut self) -> Result<Option<T>>;

    /// Release the underlying resource
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Transforms one item, or rejects it
#[async_trait]
pub trait ItemProcessor<I: Send + 'static, O: Send + 'static>: Send + Sync {
    async fn process(&self, item: I) -> Result<O>;
}

/// Writes a whole chunk
///
/// A failed `write` must leave nothing behind once the surrounding transaction
/// rolls back; the engine may call it again with the same chunk.
#[async_trait]
pub trait ItemWriter<T: Send + Sync + 'static>: Send + Sync {
    async fn write(&self, items: &[T]) -> Result<()>;

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
