//! The setup engine: builds pipelines and executes them group by group.
//!
//! Groups run in dependency order; stages inside a group are launched
//! together and joined before the next group starts. A critical stage
//! failure aborts the run, a non-critical failure is contained and the
//! pipeline continues. The engine is a single-flight resource: one
//! execution at a time, guarded by an atomic flag that is always cleared,
//! on success and on failure alike.

use crate::errors::SetupError;
use crate::events::{EventSink, LoggingEventSink, PipelineEvent};
use crate::history::{ExecutionHistory, ExecutionRecord, ExecutionStatus, StageFailure};
use crate::operations::{self, OperationType};
use crate::pipeline::{self, PipelineDefinition};
use crate::progress::{ProgressSummary, ProgressTracker, StatusSnapshot};
use crate::recovery::{ErrorContext, ErrorHandler};
use crate::services::{Collaborators, PrereqReport, ProgressFn, StageOptions};
use crate::stages::{self, spec, StageId, StageInfo};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback invoked with aggregate progress after each stage settles.
pub type ProgressCallback = Box<dyn Fn(ProgressSummary) + Send + Sync>;

/// Orchestrates setup pipelines against a set of collaborator services.
pub struct SetupEngine {
    services: Collaborators,
    sink: Arc<dyn EventSink>,
    errors: ErrorHandler,
    running: AtomicBool,
    current: RwLock<Option<ExecutionRecord>>,
    last_operation: RwLock<Option<OperationType>>,
    progress: Arc<RwLock<ProgressTracker>>,
    history: RwLock<ExecutionHistory>,
}

impl std::fmt::Debug for SetupEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupEngine")
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Clears the single-flight flag and the current record on every exit path.
struct FlightGuard<'a> {
    engine: &'a SetupEngine,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        *self.engine.current.write() = None;
        self.engine.running.store(false, Ordering::SeqCst);
    }
}

impl SetupEngine {
    /// Creates an engine over the given collaborators, logging events
    /// through tracing.
    #[must_use]
    pub fn new(services: Collaborators) -> Self {
        Self {
            services,
            sink: Arc::new(LoggingEventSink),
            errors: ErrorHandler::new(),
            running: AtomicBool::new(false),
            current: RwLock::new(None),
            last_operation: RwLock::new(None),
            progress: Arc::new(RwLock::new(ProgressTracker::new())),
            history: RwLock::new(ExecutionHistory::new()),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Lists every registered stage.
    #[must_use]
    pub fn available_stages() -> Vec<StageInfo> {
        stages::available_stages()
    }

    /// Lists every operation type by wire name.
    #[must_use]
    pub fn operation_types() -> Vec<&'static str> {
        operations::operation_types()
    }

    /// Builds a pipeline for a named operation.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::UnknownOperation`] for an unrecognized name and
    /// [`SetupError::CircularDependency`] if the stage subset cannot be
    /// ordered.
    pub fn build_pipeline(
        &self,
        operation: &str,
        options: StageOptions,
    ) -> Result<PipelineDefinition, SetupError> {
        let operation: OperationType = operation.parse()?;
        pipeline::build_pipeline(operation, options)
    }

    /// Executes a pipeline, returning the per-stage results map.
    ///
    /// Emits lifecycle events throughout, updates progress as stages settle
    /// and appends the finished record to history. On a critical stage
    /// failure the run is aborted and the stage's error is returned; results
    /// of already-completed stages stay visible on the history record.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::AlreadyRunning`] when another execution is in
    /// flight, or the failing stage's error after a critical failure.
    pub async fn execute_pipeline(
        &self,
        pipeline: PipelineDefinition,
        on_progress: Option<ProgressCallback>,
    ) -> Result<HashMap<String, serde_json::Value>, SetupError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SetupError::AlreadyRunning);
        }
        let _guard = FlightGuard { engine: self };

        *self.current.write() = Some(ExecutionRecord::start(pipeline.operation));
        *self.last_operation.write() = Some(pipeline.operation);
        self.progress.write().reset(&pipeline.stages);

        tracing::info!(
            operation = %pipeline.operation,
            stages = pipeline.stages.len(),
            groups = pipeline.execution_plan.len(),
            "Starting pipeline execution"
        );
        self.sink.emit(&PipelineEvent::PipelineStart {
            operation: pipeline.operation.to_string(),
            status: "running".to_string(),
        });

        let options = &pipeline.options;
        for group in &pipeline.execution_plan {
            let is_parallel = group.len() > 1;
            if is_parallel {
                self.sink.emit(&PipelineEvent::ParallelStart {
                    stages: group.clone(),
                });
            }

            let mut in_flight = FuturesUnordered::new();
            for id in group {
                let id = *id;
                self.progress.write().start(id);
                self.sink.emit(&PipelineEvent::StageStart { stage: id });
                in_flight.push(async move { (id, self.run_stage(id, options).await) });
            }

            let mut aborted: Option<SetupError> = None;
            while let Some((id, result)) = in_flight.next().await {
                match result {
                    Ok(value) => {
                        self.progress.write().complete(id);
                        if let Some(record) = self.current.write().as_mut() {
                            record
                                .results
                                .insert(id.as_str().to_string(), value.clone());
                        }
                        tracing::info!(stage = %id, "Stage completed");
                        self.sink.emit(&PipelineEvent::StageComplete {
                            stage: id,
                            result: value,
                        });
                    }
                    Err(error) => {
                        self.progress.write().fail(id);
                        self.sink.emit(&PipelineEvent::StageFailed {
                            stage: id,
                            error: error.to_string(),
                        });

                        if spec(id).critical {
                            tracing::error!(stage = %id, error = %error, "Critical stage failed");
                            aborted = Some(self.handle_execution_failure(id, error));
                        } else {
                            // Contained: logged, excluded from results,
                            // siblings and later groups proceed.
                            tracing::warn!(stage = %id, error = %error, "Non-critical stage failed");
                            self.errors.record(
                                &error,
                                ErrorContext::new()
                                    .with_stage(id.as_str())
                                    .with_operation(pipeline.operation.as_str()),
                            );
                            if let Some(record) = self.current.write().as_mut() {
                                record.stage_errors.push(StageFailure {
                                    stage: id,
                                    error: error.to_string(),
                                    timestamp: crate::utils::now_utc(),
                                });
                            }
                        }
                    }
                }

                // Every settlement is reported, the aborting one included.
                if let Some(callback) = &on_progress {
                    callback(self.progress.read().summary());
                }
                if aborted.is_some() {
                    break;
                }
            }

            if let Some(error) = aborted {
                return Err(error);
            }

            if is_parallel {
                self.sink.emit(&PipelineEvent::ParallelComplete {
                    stages: group.clone(),
                });
            }
        }

        let Some(mut record) = self.current.write().take() else {
            return Err(SetupError::Internal(
                "execution record disappeared mid-run".to_string(),
            ));
        };
        record.status = ExecutionStatus::Completed;
        record.ended_at = Some(crate::utils::now_utc());
        let results = record.results.clone();

        tracing::info!(
            operation = %record.operation,
            duration_ms = record.duration_ms(),
            "Pipeline completed"
        );
        self.sink.emit(&PipelineEvent::PipelineComplete {
            operation: record.operation.to_string(),
            status: "completed".to_string(),
            duration_ms: record.duration_ms(),
            execution: record.clone(),
        });
        self.history.write().push(record);

        Ok(results)
    }

    /// Routes a critical stage failure: classifies and logs it, freezes the
    /// failed record into history and emits `pipeline:error`. Returns the
    /// original error for propagation.
    fn handle_execution_failure(&self, stage: StageId, error: SetupError) -> SetupError {
        self.errors.record(
            &error,
            ErrorContext::new().with_stage(stage.as_str()),
        );

        if let Some(mut record) = self.current.write().take() {
            record.status = ExecutionStatus::Failed;
            record.error = Some(error.to_string());
            record.ended_at = Some(crate::utils::now_utc());
            self.sink.emit(&PipelineEvent::PipelineError {
                operation: record.operation.to_string(),
                error: error.to_string(),
                execution: record.clone(),
            });
            self.history.write().push(record);
        }

        error
    }

    /// Runs one stage body, delegating to the matching collaborator.
    async fn run_stage(
        &self,
        id: StageId,
        options: &StageOptions,
    ) -> Result<serde_json::Value, SetupError> {
        let progress = self.stage_progress_fn(id);
        match id {
            StageId::ValidatePrerequisites => {
                let report = self.check_prerequisites().await;
                Ok(serde_json::to_value(report)?)
            }
            StageId::DetectChanges => {
                let report = self.services.state.detect_changes().await?;
                Ok(serde_json::to_value(report)?)
            }
            StageId::ProcessImages => self.services.images.process_images(options, progress).await,
            StageId::SeedDatabase => self.services.database.seed_all(options, progress).await,
            StageId::SyncFrontend => {
                self.services.frontend.sync_mock_data(options, progress).await
            }
            StageId::ValidateData => {
                let validation = self.services.validator.validate_data().await?;
                Ok(serde_json::to_value(validation)?)
            }
            StageId::UpdateState => {
                self.services.state.save_current_state().await?;
                Ok(serde_json::json!({
                    "state_updated": true,
                    "timestamp": crate::utils::iso_timestamp(),
                }))
            }
        }
    }

    fn stage_progress_fn(&self, id: StageId) -> ProgressFn {
        let progress = Arc::clone(&self.progress);
        Arc::new(move |percent| progress.write().set_percent(id, percent))
    }

    async fn check_prerequisites(&self) -> PrereqReport {
        let mut checks = HashMap::new();
        checks.insert("images".to_string(), self.services.images.ping().await);
        checks.insert("database".to_string(), self.services.database.ping().await);
        checks.insert("frontend".to_string(), self.services.frontend.ping().await);
        checks.insert("state".to_string(), self.services.state.ping().await);
        checks.insert("validator".to_string(), self.services.validator.ping().await);
        let all_passed = checks.values().all(|ok| *ok);
        PrereqReport { checks, all_passed }
    }

    /// Returns a point-in-time view of the engine.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let tracker = self.progress.read();
        StatusSnapshot {
            is_running: self.running.load(Ordering::SeqCst),
            current_execution: self.current.read().clone(),
            current_operation: *self.last_operation.read(),
            current_stages: tracker.running_stages(),
            progress: tracker.summary(),
            stage_progress: tracker.stage_progress(),
        }
    }

    /// Returns a copy of the execution history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.history.read().records().to_vec()
    }

    /// The engine's error handler, for audit-log and statistics access.
    #[must_use]
    pub fn error_handler(&self) -> &ErrorHandler {
        &self.errors
    }
}
