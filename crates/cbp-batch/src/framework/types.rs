//! Core types for the chunk framework

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a step or job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Starting,
    Started,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BatchStatus::Starting => "STARTING",
            BatchStatus::Started => "STARTED",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-chunk state machine
///
/// ```text
/// Idle -> Reading <-> Processing
///           |             |
///           +--> Writing <+--> Retrying
///                  |              |
///              Committed       Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    Idle,
    Reading,
    Processing,
    Writing,
    Retrying,
    Committed,
    Failed,
}

impl ChunkState {
    pub fn as_str(&self) -> &str {
        match self {
            ChunkState::Idle => "idle",
            ChunkState::Reading => "reading",
            ChunkState::Processing => "processing",
            ChunkState::Writing => "writing",
            ChunkState::Retrying => "retrying",
            ChunkState::Committed => "committed",
            ChunkState::Failed => "failed",
        }
    }

    /// Whether the engine may move from `self` to `next`
    pub fn can_transition_to(self, next: ChunkState) -> bool {
        use ChunkState::*;

        matches!(
            (self, next),
            (Idle, Reading)
                | (Reading, Processing)
                | (Reading, Writing)
                | (Reading, Idle)
                | (Reading, Failed)
                | (Processing, Reading)
                | (Processing, Writing)
                | (Processing, Failed)
                | (Writing, Committed)
                | (Writing, Retrying)
                | (Writing, Failed)
                | (Retrying, Writing)
                | (Retrying, Failed)
                | (Committed, Idle)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ChunkState::Failed
    }
}

/// Limits applied to one chunk step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPolicy {
    /// Items per chunk (commit interval)
    pub chunk_size: usize,
    /// Maximum write attempts per chunk, including the first
    pub retry_limit: u32,
    /// Unreadable items tolerated per step
    pub skip_limit: u32,
    /// Maximum starts of the step per source since its last success
    pub start_limit: u32,
    /// Items between progress log lines (0 disables them)
    pub progress_interval: u64,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            retry_limit: 3,
            skip_limit: 0,
            start_limit: 5,
            progress_interval: 1000,
        }
    }
}

/// Counters and timestamps of one step run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_name: String,
    pub status: BatchStatus,
    pub read_count: u64,
    pub write_count: u64,
    pub skip_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
    pub retry_count: u64,
    pub chunk_state: ChunkState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub failure_message: Option<String>,
}

impl StepExecution {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: BatchStatus::Starting,
            read_count: 0,
            write_count: 0,
            skip_count: 0,
            commit_count: 0,
            rollback_count: 0,
            retry_count: 0,
            chunk_state: ChunkState::Idle,
            start_time: None,
            end_time: None,
            failure_message: None,
        }
    }

    pub fn start(&mut self) {
        self.status = BatchStatus::Started;
        self.start_time = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = BatchStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = BatchStatus::Failed;
        self.end_time = Some(Utc::now());
        self.failure_message = Some(message.into());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// One job run and the steps it executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_name: String,
    pub status: BatchStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub steps: Vec<StepExecution>,
    pub exit_message: Option<String>,
}

impl JobExecution {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.into(),
            status: BatchStatus::Starting,
            start_time: None,
            end_time: None,
            steps: Vec::new(),
            exit_message: None,
        }
    }

    pub fn start(&mut self) {
        self.status = BatchStatus::Started;
        self.start_time = Some(Utc::now());
    }

    pub fn finish(&mut self, status: BatchStatus, message: impl Into<String>) {
        self.status = status;
        self.end_time = Some(Utc::now());
        self.exit_message = Some(message.into());
    }

    pub fn step(&self, name: &str) -> Option<&StepExecution> {
        self.steps.iter().find(|s| s.step_name == name)
    }
}
