//! Typed pipeline lifecycle events and event sinks.
//!
//! The engine publishes a fixed set of events through an [`EventSink`].
//! Sinks must never block or fail; errors are logged and suppressed.

use crate::history::ExecutionRecord;
use crate::stages::StageId;
use serde::Serialize;
use tracing::info;

/// A lifecycle event emitted by the engine during execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum PipelineEvent {
    /// Execution started.
    #[serde(rename = "pipeline:start")]
    PipelineStart {
        /// The operation being executed.
        operation: String,
        /// The record status at start (`running`).
        status: String,
    },
    /// Execution finished successfully.
    #[serde(rename = "pipeline:complete")]
    PipelineComplete {
        /// The operation that was executed.
        operation: String,
        /// The record status at completion (`completed`).
        status: String,
        /// Wall-clock duration of the execution.
        duration_ms: u64,
        /// The frozen execution record, results and timestamps included.
        execution: ExecutionRecord,
    },
    /// A critical stage failure aborted the execution.
    #[serde(rename = "pipeline:error")]
    PipelineError {
        /// The operation that was executing.
        operation: String,
        /// The error that aborted the run.
        error: String,
        /// The frozen execution record at the point of failure.
        execution: ExecutionRecord,
    },
    /// A stage body is about to run.
    #[serde(rename = "stage:start")]
    StageStart {
        /// The stage being started.
        stage: StageId,
    },
    /// A stage body returned successfully.
    #[serde(rename = "stage:complete")]
    StageComplete {
        /// The stage that completed.
        stage: StageId,
        /// The stage result, as stored in the results map.
        result: serde_json::Value,
    },
    /// A stage body failed.
    #[serde(rename = "stage:failed")]
    StageFailed {
        /// The stage that failed.
        stage: StageId,
        /// The error message.
        error: String,
    },
    /// A concurrent group of stages is being launched.
    #[serde(rename = "stages:parallel:start")]
    ParallelStart {
        /// The stages launched together.
        stages: Vec<StageId>,
    },
    /// Every stage of a concurrent group has settled.
    #[serde(rename = "stages:parallel:complete")]
    ParallelComplete {
        /// The stages that ran together.
        stages: Vec<StageId>,
    },
}

impl PipelineEvent {
    /// Returns the wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PipelineStart { .. } => "pipeline:start",
            Self::PipelineComplete { .. } => "pipeline:complete",
            Self::PipelineError { .. } => "pipeline:error",
            Self::StageStart { .. } => "stage:start",
            Self::StageComplete { .. } => "stage:complete",
            Self::StageFailed { .. } => "stage:failed",
            Self::ParallelStart { .. } => "stages:parallel:start",
            Self::ParallelComplete { .. } => "stages:parallel:complete",
        }
    }
}

/// Trait for sinks receiving pipeline events.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Must not block or fail.
    fn emit(&self, event: &PipelineEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// A sink that forwards events through the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        info!(event_name = %event.name(), event = ?event, "Pipeline event");
    }
}

/// A sink that records every event, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the names of collected events, in emission order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events.read().iter().map(PipelineEvent::name).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}
