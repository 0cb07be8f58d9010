//! # Envsetup
//!
//! A dependency-aware setup pipeline orchestrator for local development
//! environments.
//!
//! Envsetup builds an execution plan for a named operation, runs the plan
//! honoring stage dependencies and declared parallelism, tracks live
//! progress, and classifies and recovers from stage failures:
//!
//! - **Operation presets**: `full-setup`, `images-only`, `database-only`,
//!   `frontend-only`, `validation-only` and change-driven `incremental` runs
//! - **Dependency resolution**: layered topological sort with cycle
//!   detection; independent stages run concurrently
//! - **Failure policy**: critical stage failures abort the run, non-critical
//!   failures are contained and logged
//! - **Observability**: typed lifecycle events, progress snapshots and an
//!   error audit log with classification statistics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use envsetup::prelude::*;
//!
//! let engine = SetupEngine::new(collaborators);
//! let pipeline = engine.build_pipeline("full-setup", StageOptions::new())?;
//! let results = engine.execute_pipeline(pipeline, None).await?;
//! ```
//!
//! Stage bodies delegate all real work (uploads, seeding, state diffing) to
//! the collaborator traits in [`services`].

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod engine;
pub mod errors;
pub mod events;
pub mod history;
pub mod observability;
pub mod operations;
pub mod pipeline;
pub mod progress;
pub mod recovery;
pub mod resolver;
pub mod services;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::{ProgressCallback, SetupEngine};
    pub use crate::errors::SetupError;
    pub use crate::events::{
        CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent,
    };
    pub use crate::history::{ExecutionHistory, ExecutionRecord, ExecutionStatus};
    pub use crate::operations::OperationType;
    pub use crate::pipeline::PipelineDefinition;
    pub use crate::progress::{ProgressSummary, StageProgress, StageStatus, StatusSnapshot};
    pub use crate::recovery::{
        classify_error, ErrorClassification, ErrorContext, ErrorHandler, ErrorKind,
        RecoveryStrategy, Severity,
    };
    pub use crate::services::{
        ChangeReport, Collaborators, DataValidation, DatabaseService, DataValidator,
        FrontendService, ImageService, PrereqReport, ProgressFn, StageOptions, StateService,
    };
    pub use crate::stages::{StageId, StageInfo, StageSpec};
    pub use crate::utils::{iso_timestamp, now_utc, Timestamp};
}
