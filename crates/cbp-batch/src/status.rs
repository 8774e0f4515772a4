//! Status reporting for step and job executions

use crate::framework::types::{BatchStatus, JobExecution, StepExecution};
use tracing::{debug, info, warn};

/// Receives execution snapshots as they change.
///
/// Write-only from the engine's point of view: nothing is ever read back.
pub trait StatusSink: Send + Sync {
    fn step_updated(&self, execution: &StepExecution);

    fn job_updated(&self, execution: &JobExecution);
}

/// Default sink: logs every transition through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn step_updated(&self, execution: &StepExecution) {
        match execution.status {
            BatchStatus::Failed => warn!(
                step = %execution.step_name,
                read = execution.read_count,
                written = execution.write_count,
                skipped = execution.skip_count,
                rollbacks = execution.rollback_count,
                error = execution.failure_message.as_deref().unwrap_or_default(),
                "Step failed"
            ),
            BatchStatus::Completed => info!(
                step = %execution.step_name,
                read = execution.read_count,
                written = execution.write_count,
                skipped = execution.skip_count,
                commits = execution.commit_count,
                retries = execution.retry_count,
                duration_ms = execution.duration_ms().unwrap_or_default(),
                "Step completed"
            ),
            _ => debug!(
                step = %execution.step_name,
                status = %execution.status,
                chunk_state = execution.chunk_state.as_str(),
                read = execution.read_count,
                written = execution.write_count,
                "Step updated"
            ),
        }
    }

    fn job_updated(&self, execution: &JobExecution) {
        info!(
            job_id = %execution.id,
            job = %execution.job_name,
            status = %execution.status,
            steps = execution.steps.len(),
            message = execution.exit_message.as_deref().unwrap_or_default(),
            "Job status changed"
        );
    }
}
