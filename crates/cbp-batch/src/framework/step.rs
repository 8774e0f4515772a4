//! Chunk step: the read → process → write loop with retry, skip and start limits

use super::item::{ItemProcessor, ItemReader, ItemWriter};
use super::transaction::{NoTransaction, TransactionManager};
use super::types::{ChunkState, StepExecution, StepPolicy};
use crate::error::{BatchError, FatalError, Result};
use crate::status::StatusSink;
use cbp_common::root_cause_message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, trace, warn};

/// Counts step starts per (step, source) since the step last completed
#[derive(Debug, Default)]
pub struct StartRegistry {
    starts: Mutex<HashMap<(String, String), u32>>,
}

impl StartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a start. Fails without recording when `limit` starts already happened.
    pub fn register_start(&self, step: &str, source: &str, limit: u32) -> Result<u32> {
        let mut starts = self.starts.lock().map_err(|e| {
            BatchError::step_configuration(format!("start registry lock poisoned: {}", e))
        })?;

        let count = starts
            .entry((step.to_string(), source.to_string()))
            .or_insert(0);
        if *count >= limit {
            return Err(FatalError::StartLimitExceeded {
                step: step.to_string(),
                limit,
            }
            .into());
        }

        *count += 1;
        Ok(*count)
    }

    /// Forget previous starts after a successful run
    pub fn record_success(&self, step: &str, source: &str) {
        if let Ok(mut starts) = self.starts.lock() {
            starts.remove(&(step.to_string(), source.to_string()));
        }
    }

    pub fn starts(&self, step: &str, source: &str) -> u32 {
        self.starts
            .lock()
            .ok()
            .and_then(|starts| {
                starts
                    .get(&(step.to_string(), source.to_string()))
                    .copied()
            })
            .unwrap_or_default()
    }
}

/// Final execution record of a step plus the error that ended it, if any
#[derive(Debug)]
pub struct StepOutcome {
    pub execution: StepExecution,
    pub result: Result<()>,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// A configured chunk-oriented step
pub struct ChunkStep<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    name: String,
    source: String,
    reader: Box<dyn ItemReader<I>>,
    processor: Box<dyn ItemProcessor<I, O>>,
    writer: Box<dyn ItemWriter<O>>,
    transactions: Arc<dyn TransactionManager>,
    policy: StepPolicy,
    registry: Arc<StartRegistry>,
}

impl<I, O> ChunkStep<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    /// Run the step to completion. Never panics on pipeline errors; they are
    /// returned in the outcome alongside the execution record.
    pub async fn execute(&mut self, sink: &dyn StatusSink) -> StepOutcome {
        let mut execution = StepExecution::new(&self.name);
        sink.step_updated(&execution);

        let result = self.run(&mut execution, sink).await;
        match &result {
            Ok(()) => {
                execution.complete();
                self.registry.record_success(&self.name, &self.source);
            },
            Err(err) => {
                error!(step = %self.name, error = %err, "Step failed");
                execution.fail(root_cause_message(err));
            },
        }

        sink.step_updated(&execution);
        StepOutcome { execution, result }
    }

    async fn run(&mut self, execution: &mut StepExecution, sink: &dyn StatusSink) -> Result<()> {
        let start = self
            .registry
            .register_start(&self.name, &self.source, self.policy.start_limit)?;

        execution.start();
        sink.step_updated(execution);
        info!(
            step = %self.name,
            source = %self.source,
            start,
            chunk_size = self.policy.chunk_size,
            retry_limit = self.policy.retry_limit,
            "Starting step"
        );

        self.reader.open().await?;
        if let Err(err) = self.writer.open().await {
            if let Err(close_err) = self.reader.close().await {
                warn!(step = %self.name, error = %close_err, "Failed to close reader");
            }
            return Err(err);
        }

        let result = self.process_chunks(execution, sink).await;
        let closed = self.close().await;
        result.and(closed)
    }

    /// Release reader and writer. Both are always attempted.
    async fn close(&mut self) -> Result<()> {
        let reader = self.reader.close().await;
        let writer = self.writer.close().await;

        if let Err(err) = &reader {
            warn!(step = %self.name, error = %err, "Failed to close reader");
        }
        if let Err(err) = &writer {
            warn!(step = %self.name, error = %err, "Failed to close writer");
        }
        reader.and(writer)
    }

    async fn process_chunks(
        &mut self,
        execution: &mut StepExecution,
        sink: &dyn StatusSink,
    ) -> Result<()> {
        let chunk_size = self.policy.chunk_size;
        let mut chunk_number: u64 = 0;

        loop {
            transition(execution, ChunkState::Reading)?;

            let mut chunk: Vec<O> = Vec::with_capacity(chunk_size);
            let mut exhausted = false;

            while chunk.len() < chunk_size {
                let item = match self.reader.read().await {
                    Ok(Some(item)) => item,
                    Ok(None) => {
                        exhausted = true;
                        break;
                    },
                    Err(err)
                        if err.is_skippable()
                            && execution.skip_count < u64::from(self.policy.skip_limit) =>
                    {
                        execution.skip_count += 1;
                        warn!(
                            step = %self.name,
                            skipped = execution.skip_count,
                            skip_limit = self.policy.skip_limit,
                            error = %err,
                            "Skipping unreadable item"
                        );
                        continue;
                    },
                    Err(err) => return Err(abort(execution, err)),
                };

                execution.read_count += 1;
                transition(execution, ChunkState::Processing)?;

                match self.processor.process(item).await {
                    Ok(output) => chunk.push(output),
                    Err(err) => return Err(abort(execution, err)),
                }

                transition(execution, ChunkState::Reading)?;
                self.log_progress(execution);
            }

            if chunk.is_empty() {
                transition(execution, ChunkState::Idle)?;
                break;
            }

            chunk_number += 1;
            self.write_chunk(&chunk, chunk_number, execution).await?;
            sink.step_updated(execution);
            transition(execution, ChunkState::Idle)?;

            if exhausted {
                break;
            }
        }

        Ok(())
    }

    /// Write one chunk, re-running the whole write on retryable failures
    async fn write_chunk(
        &self,
        chunk: &[O],
        chunk_number: u64,
        execution: &mut StepExecution,
    ) -> Result<()> {
        let max_attempts = self.policy.retry_limit;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            transition(execution, ChunkState::Writing)?;

            match self.write_in_transaction(chunk, execution).await {
                Ok(()) => {
                    transition(execution, ChunkState::Committed)?;
                    execution.commit_count += 1;
                    execution.write_count += chunk.len() as u64;
                    debug!(
                        step = %self.name,
                        chunk = chunk_number,
                        records = chunk.len(),
                        attempt,
                        "Chunk committed"
                    );
                    return Ok(());
                },
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    execution.retry_count += 1;
                    transition(execution, ChunkState::Retrying)?;
                    warn!(
                        step = %self.name,
                        chunk = chunk_number,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Chunk write failed, retrying"
                    );
                },
                Err(err) if err.is_retryable() => {
                    error!(
                        step = %self.name,
                        chunk = chunk_number,
                        attempts = attempt,
                        error = %err,
                        "Chunk write retries exhausted"
                    );
                    let exhausted = FatalError::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    };
                    return Err(abort(execution, exhausted.into()));
                },
                Err(err) => return Err(abort(execution, err)),
            }
        }
    }

    /// `begin → write → commit`, rolling back on any failure
    async fn write_in_transaction(&self, chunk: &[O], execution: &mut StepExecution) -> Result<()> {
        self.transactions
            .begin()
            .map_err(|e| BatchError::retryable("Failed to begin chunk transaction", e))?;

        let written = match self.writer.write(chunk).await {
            Ok(()) => self
                .transactions
                .commit()
                .map_err(|e| BatchError::retryable("Failed to commit chunk", e)),
            Err(err) => Err(err),
        };

        if let Err(err) = written {
            execution.rollback_count += 1;
            if let Err(rollback_err) = self.transactions.rollback() {
                error!(step = %self.name, error = %rollback_err, "Chunk rollback failed");
                return Err(FatalError::Transaction(rollback_err).into());
            }
            return Err(err);
        }

        Ok(())
    }

    fn log_progress(&self, execution: &StepExecution) {
        let interval = self.policy.progress_interval;
        if interval > 0 && execution.read_count % interval == 0 {
            info!(
                step = %self.name,
                records = execution.read_count,
                written = execution.write_count,
                "Progress"
            );
        }
    }
}

fn transition(execution: &mut StepExecution, next: ChunkState) -> Result<()> {
    let current = execution.chunk_state;
    if !current.can_transition_to(next) {
        return Err(BatchError::step_configuration(format!(
            "illegal chunk transition {} -> {}",
            current.as_str(),
            next.as_str()
        )));
    }

    trace!(from = current.as_str(), to = next.as_str(), "Chunk state");
    execution.chunk_state = next;
    Ok(())
}

fn abort(execution: &mut StepExecution, err: BatchError) -> BatchError {
    execution.chunk_state = ChunkState::Failed;
    err
}

/// Assembles a [`ChunkStep`]
pub struct StepBuilder<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    name: String,
    source: String,
    reader: Option<Box<dyn ItemReader<I>>>,
    processor: Option<Box<dyn ItemProcessor<I, O>>>,
    writer: Option<Box<dyn ItemWriter<O>>>,
    transactions: Option<Arc<dyn TransactionManager>>,
    policy: StepPolicy,
    registry: Option<Arc<StartRegistry>>,
}

impl<I, O> StepBuilder<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: String::new(),
            reader: None,
            processor: None,
            writer: None,
            transactions: None,
            policy: StepPolicy::default(),
            registry: None,
        }
    }

    /// Key under which starts are counted (usually the input path)
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn reader(mut self, reader: impl ItemReader<I> + 'static) -> Self {
        self.reader = Some(Box::new(reader));
        self
    }

    pub fn processor(mut self, processor: impl ItemProcessor<I, O> + 'static) -> Self {
        self.processor = Some(Box::new(processor));
        self
    }

    pub fn writer(mut self, writer: impl ItemWriter<O> + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    pub fn transaction_manager(mut self, transactions: Arc<dyn TransactionManager>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.policy.chunk_size = chunk_size;
        self
    }

    pub fn start_registry(mut self, registry: Arc<StartRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<ChunkStep<I, O>> {
        let missing = |part: &str| {
            BatchError::step_configuration(format!("step '{}' has no {}", self.name, part))
        };

        if self.policy.chunk_size == 0 {
            return Err(missing("positive chunk size"));
        }
        if self.policy.retry_limit == 0 {
            return Err(missing("positive retry limit"));
        }
        if self.policy.start_limit == 0 {
            return Err(missing("positive start limit"));
        }

        let reader = self.reader.ok_or_else(|| missing("reader"))?;
        let processor = self.processor.ok_or_else(|| missing("processor"))?;
        let writer = self.writer.ok_or_else(|| missing("writer"))?;

        Ok(ChunkStep {
            reader,
            processor,
            writer,
            transactions: self
                .transactions
                .unwrap_or_else(|| Arc::new(NoTransaction::new())),
            registry: self.registry.unwrap_or_default(),
            policy: self.policy,
            source: self.source,
            name: self.name,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::{ReadError, ValidationError};
    use crate::status::TracingStatusSink;
    use crate::store::StoreError;
    use crate::validator::Field;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct VecReader {
        items: Vec<std::result::Result<i32, ReadError>>,
        position: usize,
    }

    impl VecReader {
        fn new(items: Vec<std::result::Result<i32, ReadError>>) -> Self {
            Self { items, position: 0 }
        }

        fn range(n: i32) -> Self {
            Self::new((1..=n).map(Ok).collect())
        }
    }

    #[async_trait]
    impl ItemReader<i32> for VecReader {
        async fn open(&mut self) -> Result<()> {
            self.position = 0;
            Ok(())
        }

        async fn read(&mut self) -> Result<Option<i32>> {
            let Some(item) = self.items.get(self.position).cloned() else {
                return Ok(None);
            };
            self.position += 1;
            Ok(Some(item?))
        }
    }

    /// Doubles items; rejects negatives as a validation failure
    struct Doubler;

    #[async_trait]
    impl ItemProcessor<i32, i32> for Doubler {
        async fn process(&self, item: i32) -> Result<i32> {
            if item < 0 {
                return Err(ValidationError {
                    field: Field::Name,
                    value: item.to_string(),
                    record: item.to_string(),
                }
                .into());
            }
            Ok(item * 2)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingWriter {
        calls: Arc<Mutex<Vec<Vec<i32>>>>,
        failures_left: Arc<AtomicU32>,
    }

    impl RecordingWriter {
        fn failing(times: u32) -> Self {
            let writer = Self::default();
            writer.failures_left.store(times, Ordering::SeqCst);
            writer
        }

        fn calls(&self) -> Vec<Vec<i32>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ItemWriter<i32> for RecordingWriter {
        async fn write(&self, items: &[i32]) -> Result<()> {
            self.calls.lock().unwrap().push(items.to_vec());
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(BatchError::retryable(
                    "write failed",
                    StoreError::unavailable("flaky"),
                ));
            }
            Ok(())
        }
    }

    fn policy(chunk_size: usize, retry_limit: u32) -> StepPolicy {
        StepPolicy {
            chunk_size,
            retry_limit,
            ..StepPolicy::default()
        }
    }

    fn step(
        reader: VecReader,
        writer: RecordingWriter,
        policy: StepPolicy,
        tx: Arc<NoTransaction>,
    ) -> ChunkStep<i32, i32> {
        StepBuilder::new("testStep")
            .source("memory")
            .reader(reader)
            .processor(Doubler)
            .writer(writer)
            .transaction_manager(tx)
            .policy(policy)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_items_are_written_in_chunks() {
        let writer = RecordingWriter::default();
        let tx = Arc::new(NoTransaction::new());
        let mut step = step(VecReader::range(5), writer.clone(), policy(2, 3), tx.clone());

        let outcome = step.execute(&TracingStatusSink).await;

        assert!(outcome.is_success());
        assert_eq!(writer.calls(), vec![vec![2, 4], vec![6, 8], vec![10]]);
        assert_eq!(outcome.execution.read_count, 5);
        assert_eq!(outcome.execution.write_count, 5);
        assert_eq!(outcome.execution.commit_count, 3);
        assert_eq!(outcome.execution.chunk_state, ChunkState::Idle);
        assert_eq!(tx.commits(), 3);
    }

    #[tokio::test]
    async fn test_empty_input_completes() {
        let writer = RecordingWriter::default();
        let mut step = step(
            VecReader::range(0),
            writer.clone(),
            policy(2, 3),
            Arc::new(NoTransaction::new()),
        );

        let outcome = step.execute(&TracingStatusSink).await;

        assert!(outcome.is_success());
        assert!(writer.calls().is_empty());
        assert_eq!(outcome.execution.commit_count, 0);
    }

    #[tokio::test]
    async fn test_validation_failure_never_reaches_writer() {
        let writer = RecordingWriter::default();
        let reader = VecReader::new(vec![Ok(1), Ok(-2), Ok(3)]);
        let mut step = step(reader, writer.clone(), policy(10, 3), Arc::new(NoTransaction::new()));

        let outcome = step.execute(&TracingStatusSink).await;

        assert!(matches!(outcome.result, Err(BatchError::Validation(_))));
        assert!(writer.calls().is_empty());
        assert_eq!(outcome.execution.retry_count, 0);
        assert_eq!(outcome.execution.chunk_state, ChunkState::Failed);
        assert!(outcome
            .execution
            .failure_message
            .unwrap()
            .contains("Invalid name"));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let writer = RecordingWriter::failing(2);
        let tx = Arc::new(NoTransaction::new());
        let mut step = step(VecReader::range(2), writer.clone(), policy(10, 3), tx.clone());

        let outcome = step.execute(&TracingStatusSink).await;

        assert!(outcome.is_success());
        assert_eq!(writer.calls().len(), 3);
        assert!(writer.calls().iter().all(|c| c == &vec![2, 4]));
        assert_eq!(outcome.execution.retry_count, 2);
        assert_eq!(outcome.execution.rollback_count, 2);
        assert_eq!(outcome.execution.write_count, 2);
        assert_eq!(tx.rollbacks(), 2);
        assert_eq!(tx.commits(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_fatal() {
        let writer = RecordingWriter::failing(u32::MAX);
        let mut step = step(
            VecReader::range(2),
            writer.clone(),
            policy(10, 2),
            Arc::new(NoTransaction::new()),
        );

        let outcome = step.execute(&TracingStatusSink).await;

        assert!(matches!(
            outcome.result,
            Err(BatchError::Fatal(FatalError::RetryExhausted { attempts: 2, .. }))
        ));
        assert_eq!(writer.calls().len(), 2);
        assert_eq!(outcome.execution.write_count, 0);
        assert_eq!(outcome.execution.chunk_state, ChunkState::Failed);
        assert_eq!(
            outcome.execution.failure_message.as_deref(),
            Some("Store unavailable: flaky")
        );
    }

    #[tokio::test]
    async fn test_read_errors_skipped_within_limit() {
        let unreadable = || -> std::result::Result<i32, ReadError> {
            Err(ReadError {
                line: 3,
                message: "invalid UTF-8".to_string(),
            })
        };
        let writer = RecordingWriter::default();
        let reader = VecReader::new(vec![Ok(1), unreadable(), Ok(2)]);
        let mut step = step(
            reader,
            writer.clone(),
            StepPolicy {
                skip_limit: 1,
                ..policy(10, 1)
            },
            Arc::new(NoTransaction::new()),
        );

        let outcome = step.execute(&TracingStatusSink).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.execution.skip_count, 1);
        assert_eq!(writer.calls(), vec![vec![2, 4]]);

        let reader = VecReader::new(vec![Ok(1), unreadable(), Ok(2)]);
        let mut strict = step_with_reader(reader);
        let outcome = strict.execute(&TracingStatusSink).await;
        assert!(matches!(outcome.result, Err(BatchError::Read(_))));
    }

    fn step_with_reader(reader: VecReader) -> ChunkStep<i32, i32> {
        step(
            reader,
            RecordingWriter::default(),
            policy(10, 1),
            Arc::new(NoTransaction::new()),
        )
    }

    #[tokio::test]
    async fn test_start_limit() {
        let registry = Arc::new(StartRegistry::new());
        let build = |writer: RecordingWriter| {
            StepBuilder::new("limitedStep")
                .source("input.csv")
                .reader(VecReader::range(1))
                .processor(Doubler)
                .writer(writer)
                .policy(StepPolicy {
                    start_limit: 2,
                    ..policy(10, 1)
                })
                .start_registry(registry.clone())
                .build()
                .unwrap()
        };

        for _ in 0..2 {
            let outcome = build(RecordingWriter::failing(1)).execute(&TracingStatusSink).await;
            assert!(!outcome.is_success());
        }
        assert_eq!(registry.starts("limitedStep", "input.csv"), 2);

        let writer = RecordingWriter::default();
        let outcome = build(writer.clone()).execute(&TracingStatusSink).await;
        assert!(matches!(
            outcome.result,
            Err(BatchError::Fatal(FatalError::StartLimitExceeded { limit: 2, .. }))
        ));
        // Refused before the reader was opened
        assert!(writer.calls().is_empty());
        assert_eq!(outcome.execution.read_count, 0);
    }

    #[tokio::test]
    async fn test_success_resets_start_count() {
        let registry = Arc::new(StartRegistry::new());
        registry.register_start("s", "a.csv", 5).unwrap();
        registry.register_start("s", "b.csv", 5).unwrap();

        let mut step = StepBuilder::new("s")
            .source("a.csv")
            .reader(VecReader::range(1))
            .processor(Doubler)
            .writer(RecordingWriter::default())
            .start_registry(registry.clone())
            .build()
            .unwrap();
        assert!(step.execute(&TracingStatusSink).await.is_success());

        assert_eq!(registry.starts("s", "a.csv"), 0);
        assert_eq!(registry.starts("s", "b.csv"), 1);
    }

    #[test]
    fn test_builder_requires_reader() {
        let result = StepBuilder::<i32, i32>::new("incomplete")
            .processor(Doubler)
            .writer(RecordingWriter::default())
            .build();

        match result {
            Err(BatchError::Fatal(FatalError::StepConfiguration(msg))) => {
                assert!(msg.contains("reader"))
            },
            _ => panic!("expected configuration error"),
        }
    }

    #[test]
    fn test_builder_rejects_zero_chunk_size() {
        let result = StepBuilder::new("zero")
            .reader(VecReader::range(1))
            .processor(Doubler)
            .writer(RecordingWriter::default())
            .chunk_size(0)
            .build();
        assert!(result.is_err());
    }
}
