//! Execution records and the append-only execution history.

use crate::operations::OperationType;
use crate::stages::StageId;
use crate::utils::Timestamp;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Final (or in-flight) status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Execution in flight.
    Running,
    /// Every group finished.
    Completed,
    /// A critical stage aborted the run.
    Failed,
}

/// A contained, non-critical stage failure inside one execution.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    /// The stage that failed.
    pub stage: StageId,
    /// The error message.
    pub error: String,
    /// When the failure settled.
    pub timestamp: Timestamp,
}

/// The record of one pipeline execution.
///
/// Created when `execute_pipeline` starts, mutated in place as groups
/// complete, then frozen and appended to [`ExecutionHistory`].
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    /// Unique run identifier.
    pub id: Uuid,
    /// The operation that was executed.
    pub operation: OperationType,
    /// Current status.
    pub status: ExecutionStatus,
    /// Per-stage results, keyed by stage wire name. Failed stages never
    /// appear here.
    pub results: HashMap<String, serde_json::Value>,
    /// When the execution started.
    pub started_at: Timestamp,
    /// When the execution settled.
    pub ended_at: Option<Timestamp>,
    /// The critical error that aborted the run, if any.
    pub error: Option<String>,
    /// Contained non-critical stage failures.
    pub stage_errors: Vec<StageFailure>,
}

impl ExecutionRecord {
    /// Creates a fresh running record for an operation.
    #[must_use]
    pub fn start(operation: OperationType) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            status: ExecutionStatus::Running,
            results: HashMap::new(),
            started_at: crate::utils::now_utc(),
            ended_at: None,
            error: None,
            stage_errors: Vec::new(),
        }
    }

    /// Wall-clock duration of the execution in milliseconds, zero while
    /// still running.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0))
            .map_or(0, |ms| u64::try_from(ms).unwrap_or(0))
    }
}

/// Append-only record of past executions.
#[derive(Debug, Default)]
pub struct ExecutionHistory {
    records: Vec<ExecutionRecord>,
}

impl ExecutionHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a settled record.
    pub fn push(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    /// Returns the number of recorded executions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns all records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// Returns up to `n` most recent records, newest last.
    #[must_use]
    pub fn recent(&self, n: usize) -> &[ExecutionRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// Returns the most recent record, if any.
    #[must_use]
    pub fn last(&self) -> Option<&ExecutionRecord> {
        self.records.last()
    }
}
