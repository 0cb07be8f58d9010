//! Stage identifiers and the static stage registry.
//!
//! Every unit of setup work is identified by a [`StageId`] and described by a
//! [`StageSpec`] registry entry. The registry is a fixed catalog: stage bodies
//! live on the engine and delegate to external collaborator services.

use crate::errors::SetupError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier for every known setup stage.
///
/// Variant order is registration order; the dependency resolver uses it as
/// the deterministic tie-break within an execution group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    /// Checks that every collaborator service is reachable.
    ValidatePrerequisites,
    /// Asks the state service what has changed since the last run.
    DetectChanges,
    /// Processes and uploads image assets.
    ProcessImages,
    /// Seeds the development database.
    SeedDatabase,
    /// Syncs generated mock data into the frontend.
    SyncFrontend,
    /// Verifies the seeded/synced data is consistent.
    ValidateData,
    /// Persists the post-run state snapshot.
    UpdateState,
}

impl StageId {
    /// All stages in registration order.
    pub const ALL: [Self; 7] = [
        Self::ValidatePrerequisites,
        Self::DetectChanges,
        Self::ProcessImages,
        Self::SeedDatabase,
        Self::SyncFrontend,
        Self::ValidateData,
        Self::UpdateState,
    ];

    /// Returns the wire name of the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidatePrerequisites => "validate-prerequisites",
            Self::DetectChanges => "detect-changes",
            Self::ProcessImages => "process-images",
            Self::SeedDatabase => "seed-database",
            Self::SyncFrontend => "sync-frontend",
            Self::ValidateData => "validate-data",
            Self::UpdateState => "update-state",
        }
    }

    /// Returns the position of the stage in registration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| SetupError::UnknownStage(s.to_string()))
    }
}

/// Static metadata describing a registered stage.
///
/// `dependencies` are hard prerequisites: building a pipeline pulls them into
/// the plan transitively. `run_after` entries are ordering-only constraints,
/// honored when the named stage is part of the same plan and ignored
/// otherwise. This lets a fan-in stage such as `validate-data` wait for
/// whichever work stages an operation actually includes.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    /// The stage identifier.
    pub id: StageId,
    /// Human-readable description.
    pub description: &'static str,
    /// Hard prerequisites, always included in the plan.
    pub dependencies: &'static [StageId],
    /// Ordering-only constraints against stages that may not be planned.
    pub run_after: &'static [StageId],
    /// Whether this stage may share an execution group with others.
    pub parallel: bool,
    /// Whether a failure of this stage aborts the whole pipeline.
    pub critical: bool,
    /// Advisory duration hint in milliseconds, used for estimation only.
    pub timeout_ms: Option<u64>,
}

impl StageSpec {
    /// Returns every ordering constraint of the stage (hard and soft).
    pub fn ordering_constraints(&self) -> impl Iterator<Item = StageId> + '_ {
        self.dependencies
            .iter()
            .copied()
            .chain(self.run_after.iter().copied())
    }
}

/// The static stage registry, indexed by [`StageId::index`].
pub const REGISTRY: [StageSpec; 7] = [
    StageSpec {
        id: StageId::ValidatePrerequisites,
        description: "Verify that all collaborator services are reachable",
        dependencies: &[],
        run_after: &[],
        parallel: false,
        critical: true,
        timeout_ms: Some(10_000),
    },
    StageSpec {
        id: StageId::DetectChanges,
        description: "Detect image, data and config changes since the last run",
        dependencies: &[StageId::ValidatePrerequisites],
        run_after: &[],
        parallel: false,
        critical: true,
        timeout_ms: Some(15_000),
    },
    StageSpec {
        id: StageId::ProcessImages,
        description: "Process and upload image assets",
        dependencies: &[StageId::DetectChanges],
        run_after: &[],
        parallel: true,
        critical: true,
        timeout_ms: Some(300_000),
    },
    StageSpec {
        id: StageId::SeedDatabase,
        description: "Seed the development database",
        dependencies: &[StageId::DetectChanges],
        run_after: &[],
        parallel: true,
        critical: true,
        timeout_ms: Some(120_000),
    },
    StageSpec {
        id: StageId::SyncFrontend,
        description: "Sync mock data into the frontend",
        dependencies: &[StageId::DetectChanges],
        run_after: &[],
        parallel: true,
        critical: false,
        timeout_ms: Some(60_000),
    },
    StageSpec {
        id: StageId::ValidateData,
        description: "Validate seeded and synced data",
        dependencies: &[StageId::DetectChanges],
        run_after: &[
            StageId::ProcessImages,
            StageId::SeedDatabase,
            StageId::SyncFrontend,
        ],
        parallel: false,
        critical: true,
        timeout_ms: Some(30_000),
    },
    StageSpec {
        id: StageId::UpdateState,
        description: "Persist the post-run state snapshot",
        dependencies: &[StageId::ValidateData],
        run_after: &[],
        parallel: false,
        critical: true,
        timeout_ms: Some(5_000),
    },
];

/// Looks up the registry entry for a stage.
#[must_use]
pub fn spec(id: StageId) -> &'static StageSpec {
    &REGISTRY[id.index()]
}

/// A public listing entry for one registered stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageInfo {
    /// The stage wire name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Wire names of hard prerequisites.
    pub dependencies: Vec<&'static str>,
}

/// Returns listing entries for every registered stage, in registration order.
#[must_use]
pub fn available_stages() -> Vec<StageInfo> {
    REGISTRY
        .iter()
        .map(|s| StageInfo {
            name: s.id.as_str(),
            description: s.description,
            dependencies: s.dependencies.iter().map(|d| d.as_str()).collect(),
        })
        .collect()
}
