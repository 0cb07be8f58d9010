//! Pipeline definitions and the pipeline builder.

use crate::errors::SetupError;
use crate::operations::{stages_for, OperationType};
use crate::resolver::resolve_dependencies;
use crate::services::StageOptions;
use crate::stages::{spec, StageId, StageSpec};
use serde::Serialize;

/// Estimate used for stages that declare no timeout hint.
pub const DEFAULT_STAGE_TIMEOUT_MS: u64 = 30_000;

/// An immutable, ready-to-execute pipeline.
///
/// Built once per `build_pipeline` call and consumed by
/// [`crate::engine::SetupEngine::execute_pipeline`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineDefinition {
    /// The operation this pipeline implements.
    pub operation: OperationType,
    /// Every stage in the plan, in registration order.
    pub stages: Vec<StageId>,
    /// Ordered execution groups; stages within a group run concurrently.
    pub execution_plan: Vec<Vec<StageId>>,
    /// Options forwarded verbatim to stage bodies.
    pub options: StageOptions,
    /// Advisory duration estimate. Never enforced as a deadline.
    pub estimated_duration_ms: u64,
}

/// Builds a pipeline for an operation.
///
/// Looks up the operation's stage subset, closes it over hard dependencies,
/// resolves the execution plan and computes the duration estimate.
///
/// # Errors
///
/// Returns [`SetupError::CircularDependency`] if the selected stages cannot
/// be ordered.
pub fn build_pipeline(
    operation: OperationType,
    options: StageOptions,
) -> Result<PipelineDefinition, SetupError> {
    let stages = stages_for(operation, &options);
    let specs: Vec<&StageSpec> = stages.iter().map(|id| spec(*id)).collect();
    let execution_plan = resolve_dependencies(&specs)?;
    let estimated_duration_ms = estimate_duration(&specs);

    tracing::debug!(
        operation = %operation,
        stages = stages.len(),
        groups = execution_plan.len(),
        estimated_duration_ms,
        "Built pipeline"
    );

    Ok(PipelineDefinition {
        operation,
        stages,
        execution_plan,
        options,
        estimated_duration_ms,
    })
}

/// Sums stage timeout hints, defaulting unset hints to
/// [`DEFAULT_STAGE_TIMEOUT_MS`].
#[must_use]
pub fn estimate_duration(specs: &[&StageSpec]) -> u64 {
    specs
        .iter()
        .map(|s| s.timeout_ms.unwrap_or(DEFAULT_STAGE_TIMEOUT_MS))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_setup_plan_shape() {
        let pipeline = build_pipeline(OperationType::FullSetup, StageOptions::new()).unwrap();

        assert_eq!(pipeline.execution_plan[0], vec![StageId::ValidatePrerequisites]);
        let parallel_group = pipeline
            .execution_plan
            .iter()
            .find(|g| g.contains(&StageId::ProcessImages))
            .unwrap();
        assert_eq!(parallel_group.len(), 3);
        assert!(parallel_group.contains(&StageId::SeedDatabase));
        assert!(parallel_group.contains(&StageId::SyncFrontend));
    }

    #[test]
    fn test_images_only_excludes_other_work_stages() {
        let pipeline = build_pipeline(OperationType::ImagesOnly, StageOptions::new()).unwrap();

        let names: Vec<&str> = pipeline.stages.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "validate-prerequisites",
                "detect-changes",
                "process-images",
                "validate-data",
                "update-state",
            ]
        );
    }

    #[test]
    fn test_every_planned_stage_in_exactly_one_group() {
        let pipeline = build_pipeline(OperationType::FullSetup, StageOptions::new()).unwrap();

        let mut flattened: Vec<StageId> =
            pipeline.execution_plan.iter().flatten().copied().collect();
        flattened.sort_by_key(|id| id.index());
        assert_eq!(flattened, pipeline.stages);
    }

    #[test]
    fn test_options_stored_verbatim() {
        let mut options = StageOptions::new();
        options.insert("dry_run".to_string(), serde_json::json!(true));

        let pipeline = build_pipeline(OperationType::DatabaseOnly, options).unwrap();
        assert_eq!(pipeline.options["dry_run"], serde_json::json!(true));
    }

    #[test]
    fn test_estimate_duration_defaults_missing_hints() {
        let a = StageSpec {
            id: StageId::ProcessImages,
            description: "a",
            dependencies: &[],
            run_after: &[],
            parallel: false,
            critical: true,
            timeout_ms: Some(10_000),
        };
        let b = StageSpec {
            id: StageId::SeedDatabase,
            description: "b",
            dependencies: &[],
            run_after: &[],
            parallel: false,
            critical: true,
            timeout_ms: None,
        };
        let c = StageSpec {
            id: StageId::SyncFrontend,
            description: "c",
            dependencies: &[],
            run_after: &[],
            parallel: false,
            critical: true,
            timeout_ms: Some(20_000),
        };

        assert_eq!(estimate_duration(&[&a, &b, &c]), 60_000);
    }
}
