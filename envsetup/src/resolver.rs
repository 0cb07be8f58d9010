//! Layer-by-layer topological sort of stages into execution groups.
//!
//! The resolver implements a Kahn-style iterative sort: each pass collects
//! every remaining stage whose ordering constraints are satisfied, which
//! becomes the next layer. Stages inside a layer have no constraints on each
//! other and may run concurrently.

use crate::errors::SetupError;
use crate::stages::{StageId, StageSpec};
use std::collections::HashSet;

/// Resolves a stage subset into ordered execution groups.
///
/// Groups are emitted in dependency order. Within a layer, stages flagged
/// `parallel` form a single concurrent group; the rest run alone in singleton
/// groups ahead of the concurrent batch. Both orders follow stage
/// registration order, so the plan is deterministic for a given subset.
///
/// Ordering constraints that point at stages outside the subset are treated
/// as satisfied, so a fan-in stage only waits for the upstream work the
/// operation actually includes.
///
/// # Errors
///
/// Returns [`SetupError::CircularDependency`] naming the stuck stages when no
/// remaining stage can become ready.
pub fn resolve_dependencies(stages: &[&StageSpec]) -> Result<Vec<Vec<StageId>>, SetupError> {
    let selected: HashSet<StageId> = stages.iter().map(|s| s.id).collect();

    let mut remaining: Vec<&StageSpec> = stages.to_vec();
    remaining.sort_by_key(|s| s.id.index());

    let mut satisfied: HashSet<StageId> = HashSet::new();
    let mut plan: Vec<Vec<StageId>> = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&StageSpec>, Vec<&StageSpec>) =
            remaining.iter().copied().partition(|s| {
                s.ordering_constraints()
                    .filter(|dep| selected.contains(dep))
                    .all(|dep| satisfied.contains(&dep))
            });

        if ready.is_empty() {
            return Err(SetupError::CircularDependency {
                remaining: blocked.iter().map(|s| s.id.as_str().to_string()).collect(),
            });
        }

        let mut concurrent: Vec<StageId> = Vec::new();
        for stage in &ready {
            if stage.parallel {
                concurrent.push(stage.id);
            } else {
                plan.push(vec![stage.id]);
            }
        }
        if !concurrent.is_empty() {
            plan.push(concurrent);
        }

        satisfied.extend(ready.iter().map(|s| s.id));
        remaining = blocked;
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{spec, REGISTRY};
    use pretty_assertions::assert_eq;

    fn plan_for(ids: &[StageId]) -> Vec<Vec<StageId>> {
        let specs: Vec<&StageSpec> = ids.iter().map(|id| spec(*id)).collect();
        resolve_dependencies(&specs).unwrap()
    }

    #[test]
    fn test_full_registry_plan() {
        let specs: Vec<&StageSpec> = REGISTRY.iter().collect();
        let plan = resolve_dependencies(&specs).unwrap();

        assert_eq!(plan[0], vec![StageId::ValidatePrerequisites]);
        assert_eq!(plan[1], vec![StageId::DetectChanges]);
        assert_eq!(
            plan[2],
            vec![
                StageId::ProcessImages,
                StageId::SeedDatabase,
                StageId::SyncFrontend
            ]
        );
        assert_eq!(plan[3], vec![StageId::ValidateData]);
        assert_eq!(plan[4], vec![StageId::UpdateState]);
    }

    #[test]
    fn test_out_of_plan_constraints_are_ignored() {
        // validate-data runs after seed-database only when it is planned.
        let plan = plan_for(&[
            StageId::ValidatePrerequisites,
            StageId::DetectChanges,
            StageId::ProcessImages,
            StageId::ValidateData,
            StageId::UpdateState,
        ]);

        assert_eq!(plan[2], vec![StageId::ProcessImages]);
        assert_eq!(plan[3], vec![StageId::ValidateData]);
    }

    #[test]
    fn test_every_stage_appears_exactly_once() {
        let specs: Vec<&StageSpec> = REGISTRY.iter().collect();
        let plan = resolve_dependencies(&specs).unwrap();

        let mut seen: Vec<StageId> = plan.into_iter().flatten().collect();
        seen.sort_by_key(|id| id.index());
        assert_eq!(seen, StageId::ALL.to_vec());
    }

    #[test]
    fn test_cycle_detection() {
        let a = StageSpec {
            id: StageId::ProcessImages,
            description: "a",
            dependencies: &[StageId::SeedDatabase],
            run_after: &[],
            parallel: false,
            critical: true,
            timeout_ms: None,
        };
        let b = StageSpec {
            id: StageId::SeedDatabase,
            description: "b",
            dependencies: &[StageId::ProcessImages],
            run_after: &[],
            parallel: false,
            critical: true,
            timeout_ms: None,
        };

        let err = resolve_dependencies(&[&a, &b]).unwrap_err();
        assert!(matches!(err, SetupError::CircularDependency { .. }));
        assert!(err.to_string().contains("process-images"));
    }

    #[test]
    fn test_empty_subset_yields_empty_plan() {
        let plan = resolve_dependencies(&[]).unwrap();
        assert!(plan.is_empty());
    }
}
