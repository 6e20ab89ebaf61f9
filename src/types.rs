use serde::{Deserialize, Serialize};

/// Which realization of the blockwise recursion runs an inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InversionVariant {
    /// Sequential recursion; every step materializes its result in a fresh buffer.
    Auxiliary,
    /// Sequential recursion over one working copy of the input.
    #[default]
    InPlace,
    /// Level-synchronized merge over a fixed leaf partition, run by a worker team.
    ParallelBottomUp,
}

/// Which diagonal block the sequential recursion pivots on at every split.
///
/// There is no automatic fallback between strategies: a singular pivot fails the
/// whole call and callers may retry with a different strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PivotStrategy {
    /// Invert the top-left block first; Schur complement lands on the bottom-right.
    #[default]
    A,
    /// Invert the bottom-right block first; Schur complement lands on the top-left.
    D,
    /// Invert both diagonal blocks, then both Schur complements.
    AAndD,
}

/// Side of a 2x2 block split that a Schur completion pivots on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PivotSide {
    A,
    D,
}

pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Engine configuration for a single inversion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InversionOptions {
    #[serde(default)]
    pub variant: InversionVariant,
    #[serde(default)]
    pub pivot: PivotStrategy,
    #[serde(default = "default_worker_count")]
    pub workers: usize,
}

impl InversionOptions {
    pub fn auxiliary() -> Self {
        Self {
            variant: InversionVariant::Auxiliary,
            ..Self::default()
        }
    }

    pub fn in_place() -> Self {
        Self {
            variant: InversionVariant::InPlace,
            ..Self::default()
        }
    }

    pub fn parallel(workers: usize) -> Self {
        Self {
            variant: InversionVariant::ParallelBottomUp,
            pivot: PivotStrategy::AAndD,
            workers,
        }
    }

    pub fn with_pivot(mut self, pivot: PivotStrategy) -> Self {
        self.pivot = pivot;
        self
    }

    /// Worker team size actually used; zero is clamped to a single worker.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

impl Default for InversionOptions {
    fn default() -> Self {
        Self {
            variant: InversionVariant::default(),
            pivot: PivotStrategy::default(),
            workers: default_worker_count(),
        }
    }
}
