//! Per-execution progress tracking and status snapshots.

use crate::history::ExecutionRecord;
use crate::operations::OperationType;
use crate::stages::StageId;
use serde::Serialize;
use std::collections::HashMap;

/// Lifecycle status of one stage within the current execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// Not yet started.
    Pending,
    /// Currently running.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// Progress of one stage.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StageProgress {
    /// Current lifecycle status.
    pub status: StageStatus,
    /// Completion percentage, 0..=100.
    pub percent: u8,
}

/// Aggregate progress over the current plan.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressSummary {
    /// Stages in the plan.
    pub total: usize,
    /// Stages that have settled successfully.
    pub completed: usize,
    /// `round(completed / total * 100)`.
    pub percentage: u8,
}

/// Point-in-time view of the engine, returned by `SetupEngine::status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Whether an execution is in flight.
    pub is_running: bool,
    /// The in-flight execution record, if any.
    pub current_execution: Option<ExecutionRecord>,
    /// The operation currently (or most recently) executed.
    pub current_operation: Option<OperationType>,
    /// Stages presently running.
    pub current_stages: Vec<StageId>,
    /// Aggregate progress over the current plan.
    pub progress: ProgressSummary,
    /// Per-stage progress, keyed by stage wire name.
    pub stage_progress: HashMap<String, StageProgress>,
}

/// Tracks stage progress for the current (or most recent) execution.
///
/// Owned exclusively by the engine and reset at the start of each run.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    stages: HashMap<StageId, StageProgress>,
    completed: usize,
}

impl ProgressTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the tracker for a new plan, marking every stage pending.
    pub fn reset(&mut self, stages: &[StageId]) {
        self.completed = 0;
        self.stages = stages
            .iter()
            .map(|id| {
                (
                    *id,
                    StageProgress {
                        status: StageStatus::Pending,
                        percent: 0,
                    },
                )
            })
            .collect();
    }

    /// Marks a stage running.
    pub fn start(&mut self, id: StageId) {
        self.stages.insert(
            id,
            StageProgress {
                status: StageStatus::Running,
                percent: 0,
            },
        );
    }

    /// Updates the percentage of a running stage.
    pub fn set_percent(&mut self, id: StageId, percent: u8) {
        if let Some(progress) = self.stages.get_mut(&id) {
            progress.percent = percent.min(100);
        }
    }

    /// Marks a stage completed.
    pub fn complete(&mut self, id: StageId) {
        self.stages.insert(
            id,
            StageProgress {
                status: StageStatus::Completed,
                percent: 100,
            },
        );
        self.completed += 1;
    }

    /// Marks a stage failed.
    pub fn fail(&mut self, id: StageId) {
        if let Some(progress) = self.stages.get_mut(&id) {
            progress.status = StageStatus::Failed;
        }
    }

    /// Returns the stages presently running, in registration order.
    #[must_use]
    pub fn running_stages(&self) -> Vec<StageId> {
        let mut running: Vec<StageId> = self
            .stages
            .iter()
            .filter(|(_, p)| p.status == StageStatus::Running)
            .map(|(id, _)| *id)
            .collect();
        running.sort_by_key(|id| id.index());
        running
    }

    /// Returns the aggregate progress summary.
    #[must_use]
    pub fn summary(&self) -> ProgressSummary {
        let total = self.stages.len();
        let percentage = if total == 0 {
            0
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
            {
                ((self.completed as f64 / total as f64) * 100.0).round() as u8
            }
        };
        ProgressSummary {
            total,
            completed: self.completed,
            percentage,
        }
    }

    /// Returns per-stage progress keyed by wire name.
    #[must_use]
    pub fn stage_progress(&self) -> HashMap<String, StageProgress> {
        self.stages
            .iter()
            .map(|(id, p)| (id.as_str().to_string(), *p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_marks_all_pending() {
        let mut tracker = ProgressTracker::new();
        tracker.reset(&[StageId::DetectChanges, StageId::SeedDatabase]);

        let summary = tracker.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.percentage, 0);
    }

    #[test]
    fn test_completion_percentage_rounds() {
        let mut tracker = ProgressTracker::new();
        tracker.reset(&[
            StageId::ValidatePrerequisites,
            StageId::DetectChanges,
            StageId::UpdateState,
        ]);
        tracker.complete(StageId::ValidatePrerequisites);

        // 1 of 3 rounds to 33.
        assert_eq!(tracker.summary().percentage, 33);

        tracker.complete(StageId::DetectChanges);
        assert_eq!(tracker.summary().percentage, 67);
    }

    #[test]
    fn test_running_stages_in_registration_order() {
        let mut tracker = ProgressTracker::new();
        tracker.reset(&[StageId::SeedDatabase, StageId::ProcessImages]);
        tracker.start(StageId::SeedDatabase);
        tracker.start(StageId::ProcessImages);

        assert_eq!(
            tracker.running_stages(),
            vec![StageId::ProcessImages, StageId::SeedDatabase]
        );
    }

    #[test]
    fn test_failed_stage_keeps_percent() {
        let mut tracker = ProgressTracker::new();
        tracker.reset(&[StageId::SyncFrontend]);
        tracker.start(StageId::SyncFrontend);
        tracker.set_percent(StageId::SyncFrontend, 40);
        tracker.fail(StageId::SyncFrontend);

        let progress = tracker.stage_progress();
        let sync = &progress["sync-frontend"];
        assert_eq!(sync.status, StageStatus::Failed);
        assert_eq!(sync.percent, 40);
        assert_eq!(tracker.summary().completed, 0);
    }

    #[test]
    fn test_percent_is_clamped() {
        let mut tracker = ProgressTracker::new();
        tracker.reset(&[StageId::ProcessImages]);
        tracker.start(StageId::ProcessImages);
        tracker.set_percent(StageId::ProcessImages, 250);

        assert_eq!(tracker.stage_progress()["process-images"].percent, 100);
    }

    #[test]
    fn test_empty_plan_percentage_is_zero() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.summary().percentage, 0);
    }
}
