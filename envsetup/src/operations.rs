//! Operation types and the operation-to-stage catalog.

use crate::errors::SetupError;
use crate::services::{ChangeReport, StageOptions};
use crate::stages::{spec, StageId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// A named preset selecting which stages a pipeline includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    /// Run every registered stage.
    FullSetup,
    /// Only process and upload images.
    ImagesOnly,
    /// Only seed the database.
    DatabaseOnly,
    /// Only sync frontend mock data.
    FrontendOnly,
    /// Only validate the current environment.
    ValidationOnly,
    /// Run whatever the detected changes require.
    Incremental,
}

impl OperationType {
    /// All operation types in catalog order.
    pub const ALL: [Self; 6] = [
        Self::FullSetup,
        Self::ImagesOnly,
        Self::DatabaseOnly,
        Self::FrontendOnly,
        Self::ValidationOnly,
        Self::Incremental,
    ];

    /// Returns the wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FullSetup => "full-setup",
            Self::ImagesOnly => "images-only",
            Self::DatabaseOnly => "database-only",
            Self::FrontendOnly => "frontend-only",
            Self::ValidationOnly => "validation-only",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SetupError::UnknownOperation(s.to_string()))
    }
}

/// The bracketing stages every non-full operation still runs.
const BRACKETING: [StageId; 4] = [
    StageId::ValidatePrerequisites,
    StageId::DetectChanges,
    StageId::ValidateData,
    StageId::UpdateState,
];

/// Returns the stage subset an operation requires, in registration order.
///
/// For [`OperationType::Incremental`] the work stages are selected by the
/// change report supplied under the `"changes"` options key; when no report
/// is supplied every work stage is assumed dirty. The subset is closed over
/// hard dependencies, so bracketing stages are always present.
#[must_use]
pub fn stages_for(operation: OperationType, options: &StageOptions) -> Vec<StageId> {
    let mut selected: HashSet<StageId> = match operation {
        OperationType::FullSetup => StageId::ALL.into_iter().collect(),
        OperationType::ImagesOnly => work_set(&[StageId::ProcessImages]),
        OperationType::DatabaseOnly => work_set(&[StageId::SeedDatabase]),
        OperationType::FrontendOnly => work_set(&[StageId::SyncFrontend]),
        OperationType::ValidationOnly => BRACKETING.into_iter().collect(),
        OperationType::Incremental => incremental_set(options),
    };

    close_over_dependencies(&mut selected);

    let mut ordered: Vec<StageId> = selected.into_iter().collect();
    ordered.sort_by_key(|id| id.index());
    ordered
}

fn work_set(work: &[StageId]) -> HashSet<StageId> {
    BRACKETING.into_iter().chain(work.iter().copied()).collect()
}

fn incremental_set(options: &StageOptions) -> HashSet<StageId> {
    let changes: ChangeReport = options
        .get("changes")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(ChangeReport::everything);

    let mut work = Vec::new();
    if changes.image_changes {
        work.push(StageId::ProcessImages);
    }
    if changes.data_changes {
        work.push(StageId::SeedDatabase);
    }
    if changes.data_changes || changes.config_changes {
        work.push(StageId::SyncFrontend);
    }
    work_set(&work)
}

/// Adds every hard dependency reachable from the selection.
fn close_over_dependencies(selected: &mut HashSet<StageId>) {
    let mut queue: Vec<StageId> = selected.iter().copied().collect();
    while let Some(id) = queue.pop() {
        for dep in spec(id).dependencies {
            if selected.insert(*dep) {
                queue.push(*dep);
            }
        }
    }
}

/// Returns the wire names of every operation type, in catalog order.
#[must_use]
pub fn operation_types() -> Vec<&'static str> {
    OperationType::ALL.iter().map(|op| op.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn no_options() -> StageOptions {
        StageOptions::new()
    }

    #[test]
    fn test_operation_round_trip() {
        for op in OperationType::ALL {
            assert_eq!(op.as_str().parse::<OperationType>().unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_operation_names_value() {
        let err = "unknown-op".parse::<OperationType>().unwrap_err();
        assert!(err.to_string().contains("unknown-op"));
    }

    #[test]
    fn test_full_setup_includes_all_stages() {
        let stages = stages_for(OperationType::FullSetup, &no_options());
        assert_eq!(stages, StageId::ALL.to_vec());
    }

    #[test]
    fn test_images_only_subset() {
        let stages = stages_for(OperationType::ImagesOnly, &no_options());
        assert_eq!(
            stages,
            vec![
                StageId::ValidatePrerequisites,
                StageId::DetectChanges,
                StageId::ProcessImages,
                StageId::ValidateData,
                StageId::UpdateState,
            ]
        );
        assert!(!stages.contains(&StageId::SeedDatabase));
        assert!(!stages.contains(&StageId::SyncFrontend));
    }

    #[test]
    fn test_validation_only_subset() {
        let stages = stages_for(OperationType::ValidationOnly, &no_options());
        assert_eq!(
            stages,
            vec![
                StageId::ValidatePrerequisites,
                StageId::DetectChanges,
                StageId::ValidateData,
                StageId::UpdateState,
            ]
        );
    }

    #[test]
    fn test_incremental_without_report_assumes_everything() {
        let stages = stages_for(OperationType::Incremental, &no_options());
        assert_eq!(stages, StageId::ALL.to_vec());
    }

    #[test]
    fn test_incremental_with_image_changes_only() {
        let mut options = StageOptions::new();
        options.insert(
            "changes".to_string(),
            serde_json::json!({
                "has_changes": true,
                "image_changes": true,
                "data_changes": false,
                "config_changes": false,
            }),
        );

        let stages = stages_for(OperationType::Incremental, &options);
        assert!(stages.contains(&StageId::ProcessImages));
        assert!(!stages.contains(&StageId::SeedDatabase));
        assert!(!stages.contains(&StageId::SyncFrontend));
    }

    #[test]
    fn test_incremental_with_no_changes_keeps_bracketing_stages() {
        let mut options = StageOptions::new();
        options.insert(
            "changes".to_string(),
            serde_json::json!({
                "has_changes": false,
                "image_changes": false,
                "data_changes": false,
                "config_changes": false,
            }),
        );

        let stages = stages_for(OperationType::Incremental, &options);
        assert_eq!(
            stages,
            vec![
                StageId::ValidatePrerequisites,
                StageId::DetectChanges,
                StageId::ValidateData,
                StageId::UpdateState,
            ]
        );
    }

    #[test]
    fn test_operation_types_listing() {
        let types = operation_types();
        assert_eq!(types.len(), 6);
        assert!(types.contains(&"full-setup"));
        assert!(types.contains(&"incremental"));
    }
}
