//! External collaborator contracts consumed by stage bodies.
//!
//! The engine never performs uploads, seeding or state diffing itself; stage
//! bodies delegate to these traits. Production wiring supplies real service
//! clients, tests supply the mocks from [`crate::testing`].

use crate::errors::SetupError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-stage progress callback, invoked with a 0..=100 percentage.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Options forwarded verbatim from `build_pipeline` to stage bodies.
pub type StageOptions = HashMap<String, serde_json::Value>;

/// What the state service detected since the last persisted snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Whether anything changed at all.
    pub has_changes: bool,
    /// Image assets changed.
    pub image_changes: bool,
    /// Seed data changed.
    pub data_changes: bool,
    /// Configuration changed.
    pub config_changes: bool,
    /// Free-form detail per changed area.
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl ChangeReport {
    /// A report with every change flag set.
    #[must_use]
    pub fn everything() -> Self {
        Self {
            has_changes: true,
            image_changes: true,
            data_changes: true,
            config_changes: true,
            details: HashMap::new(),
        }
    }
}

/// Result of the prerequisite validation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrereqReport {
    /// Reachability per collaborator service.
    pub checks: HashMap<String, bool>,
    /// Whether every check passed.
    pub all_passed: bool,
}

/// Result of the data validation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataValidation {
    /// Whether all checks passed.
    pub valid: bool,
    /// Individual check outcomes.
    pub checks: HashMap<String, serde_json::Value>,
}

/// Image processing and upload service.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Returns whether the service is reachable.
    async fn ping(&self) -> bool {
        true
    }

    /// Processes and uploads image assets, reporting progress as it goes.
    /// The returned value is passed through to the results map verbatim.
    async fn process_images(
        &self,
        options: &StageOptions,
        progress: ProgressFn,
    ) -> Result<serde_json::Value, SetupError>;
}

/// Database seeding service.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    /// Returns whether the service is reachable.
    async fn ping(&self) -> bool {
        true
    }

    /// Seeds all tables, reporting progress as it goes.
    async fn seed_all(
        &self,
        options: &StageOptions,
        progress: ProgressFn,
    ) -> Result<serde_json::Value, SetupError>;
}

/// Frontend mock-data sync service.
#[async_trait]
pub trait FrontendService: Send + Sync {
    /// Returns whether the service is reachable.
    async fn ping(&self) -> bool {
        true
    }

    /// Syncs generated mock data into the frontend workspace.
    async fn sync_mock_data(
        &self,
        options: &StageOptions,
        progress: ProgressFn,
    ) -> Result<serde_json::Value, SetupError>;
}

/// Local-state tracking service.
#[async_trait]
pub trait StateService: Send + Sync {
    /// Returns whether the service is reachable.
    async fn ping(&self) -> bool {
        true
    }

    /// Compares the workspace against the last persisted snapshot.
    async fn detect_changes(&self) -> Result<ChangeReport, SetupError>;

    /// Persists the current workspace state as the new snapshot.
    async fn save_current_state(&self) -> Result<(), SetupError>;
}

/// Post-run data validation service.
#[async_trait]
pub trait DataValidator: Send + Sync {
    /// Returns whether the service is reachable.
    async fn ping(&self) -> bool {
        true
    }

    /// Runs consistency checks over seeded and synced data.
    async fn validate_data(&self) -> Result<DataValidation, SetupError>;
}

/// The full set of collaborators a [`crate::engine::SetupEngine`] delegates to.
#[derive(Clone)]
pub struct Collaborators {
    /// Image processing service.
    pub images: Arc<dyn ImageService>,
    /// Database seeding service.
    pub database: Arc<dyn DatabaseService>,
    /// Frontend sync service.
    pub frontend: Arc<dyn FrontendService>,
    /// Local-state service.
    pub state: Arc<dyn StateService>,
    /// Data validation service.
    pub validator: Arc<dyn DataValidator>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_report_everything() {
        let report = ChangeReport::everything();
        assert!(report.has_changes);
        assert!(report.image_changes && report.data_changes && report.config_changes);
    }

    #[test]
    fn test_change_report_serde_defaults() {
        let report: ChangeReport =
            serde_json::from_str(r#"{"has_changes":false,"image_changes":false,"data_changes":false,"config_changes":false}"#)
                .unwrap();
        assert!(report.details.is_empty());
    }
}
