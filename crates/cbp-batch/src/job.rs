//! Customer import job
//!
//! Two steps over the same file:
//!
//! 1. `validationStep`: read, validate and normalize every row, discard the output.
//!    Any invalid row fails the job before storage is touched.
//! 2. `processingStep`: re-read the file from the start, validate, encrypt the
//!    aadhaar and PAN numbers and persist chunk by chunk.
//!
//! The job is the only place where an error chain becomes user-facing text: the
//! deepest cause of the first failure plus a retry hint.

use crate::config::BatchConfig;
use crate::crypto::EncryptionService;
use crate::customer::Customer;
use crate::error::{BatchError, Result};
use crate::framework::step::{ChunkStep, StartRegistry, StepBuilder};
use crate::framework::transaction::{NoTransaction, TransactionManager};
use crate::framework::types::{BatchStatus, JobExecution, StepExecution};
use crate::processor::CustomerItemProcessor;
use crate::reader::CsvCustomerReader;
use crate::status::{StatusSink, TracingStatusSink};
use crate::store::{CustomerRepository, SqliteCustomerStore};
use crate::validator::CustomerValidator;
use crate::writer::{CustomerItemWriter, NoOpWriter};
use cbp_common::root_cause_message;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub const JOB_NAME: &str = "customerImportJob";
pub const VALIDATION_STEP: &str = "validationStep";
pub const PROCESSING_STEP: &str = "processingStep";

const RETRY_HINT: &str = "Please fix the file and re-upload";

/// Terminal outcome reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: Uuid,
    pub status: BatchStatus,
    pub message: String,
    pub steps: Vec<StepExecution>,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Completed
    }

    pub fn step(&self, name: &str) -> Option<&StepExecution> {
        self.steps.iter().find(|s| s.step_name == name)
    }
}

pub struct CustomerImportJob {
    config: BatchConfig,
    validator: Arc<CustomerValidator>,
    encryption: Arc<EncryptionService>,
    repository: Arc<dyn CustomerRepository>,
    transactions: Arc<dyn TransactionManager>,
    sink: Arc<dyn StatusSink>,
    registry: Arc<StartRegistry>,
}

impl CustomerImportJob {
    /// Build a job writing through `repository` inside `transactions`.
    ///
    /// Both usually point at the same store so chunk inserts share its transaction.
    pub fn new(
        config: BatchConfig,
        repository: Arc<dyn CustomerRepository>,
        transactions: Arc<dyn TransactionManager>,
    ) -> Result<Self> {
        let validator = CustomerValidator::new().map_err(|e| {
            BatchError::step_configuration(format!("invalid validation pattern: {}", e))
        })?;
        let encryption = EncryptionService::new(&config.encryption_secret_key)?;

        Ok(Self {
            config,
            validator: Arc::new(validator),
            encryption: Arc::new(encryption),
            repository,
            transactions,
            sink: Arc::new(TracingStatusSink),
            registry: Arc::new(StartRegistry::new()),
        })
    }

    pub fn with_sqlite(config: BatchConfig, store: Arc<SqliteCustomerStore>) -> Result<Self> {
        Self::new(config, store.clone(), store)
    }

    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn start_registry(&self) -> &Arc<StartRegistry> {
        &self.registry
    }

    /// Validate the whole file, then import it
    pub async fn run_job(&self, path: impl AsRef<Path>) -> JobResult {
        self.launch(path.as_ref(), true).await
    }

    /// Run only the validation step; storage is never touched
    pub async fn validate_file(&self, path: impl AsRef<Path>) -> JobResult {
        self.launch(path.as_ref(), false).await
    }

    async fn launch(&self, path: &Path, import: bool) -> JobResult {
        let mut job = JobExecution::new(JOB_NAME);
        self.sink.job_updated(&job);

        job.start();
        self.sink.job_updated(&job);
        info!(
            job_id = %job.id,
            path = %path.display(),
            import,
            "Starting customer job"
        );

        let result = self.run_steps(path, import, &mut job).await;
        self.finish(job, result, import)
    }

    async fn run_steps(&self, path: &Path, import: bool, job: &mut JobExecution) -> Result<()> {
        let mut validation = self.validation_step(path)?;
        let outcome = validation.execute(self.sink.as_ref()).await;
        job.steps.push(outcome.execution);
        outcome.result?;

        if !import {
            return Ok(());
        }

        let mut processing = self.processing_step(path)?;
        let outcome = processing.execute(self.sink.as_ref()).await;
        job.steps.push(outcome.execution);
        outcome.result
    }

    fn finish(&self, mut job: JobExecution, result: Result<()>, import: bool) -> JobResult {
        match result {
            Ok(()) => {
                let message = if import {
                    let written = job
                        .step(PROCESSING_STEP)
                        .map(|s| s.write_count)
                        .unwrap_or_default();
                    format!("Successfully imported {} customers", written)
                } else {
                    let read = job
                        .step(VALIDATION_STEP)
                        .map(|s| s.read_count)
                        .unwrap_or_default();
                    format!("Validated {} customers, no errors found", read)
                };
                info!(job_id = %job.id, %message, "Customer job completed");
                job.finish(BatchStatus::Completed, message);
            },
            Err(err) => {
                let message = failure_message(&err);
                error!(job_id = %job.id, error = %err, %message, "Customer job failed");
                job.finish(BatchStatus::Failed, message);
            },
        }

        self.sink.job_updated(&job);
        JobResult {
            id: job.id,
            status: job.status,
            message: job.exit_message.unwrap_or_default(),
            steps: job.steps,
        }
    }

    fn validation_step(&self, path: &Path) -> Result<ChunkStep<Customer, Customer>> {
        StepBuilder::new(VALIDATION_STEP)
            .source(path.display().to_string())
            .reader(CsvCustomerReader::new(path))
            .processor(CustomerItemProcessor::validating(self.validator.clone()))
            .writer(NoOpWriter)
            .transaction_manager(Arc::new(NoTransaction::new()))
            .policy(self.config.step_policy())
            // Dry run: only the processing step is start-limited
            .start_registry(Arc::new(StartRegistry::new()))
            .build()
    }

    fn processing_step(&self, path: &Path) -> Result<ChunkStep<Customer, Customer>> {
        let writer = CustomerItemWriter::new(self.repository.clone())
            .with_duplicate_check(self.config.duplicate_email_check);

        StepBuilder::new(PROCESSING_STEP)
            .source(path.display().to_string())
            .reader(CsvCustomerReader::new(path))
            .processor(CustomerItemProcessor::encrypting(
                self.validator.clone(),
                self.encryption.clone(),
            ))
            .writer(writer)
            .transaction_manager(self.transactions.clone())
            .policy(self.config.step_policy())
            .start_registry(self.registry.clone())
            .build()
    }
}

/// `<deepest cause>. Please fix the file and re-upload`
pub fn failure_message(err: &BatchError) -> String {
    let cause = root_cause_message(err);
    format!("{}. {}", cause.trim_end_matches('.'), RETRY_HINT)
}
