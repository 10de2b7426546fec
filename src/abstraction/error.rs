use super::types::{CellId, RegionId};
use std::fmt;

/// Result type for abstraction and database operations
pub type AbstractionResult<T> = Result<T, AbstractionError>;

/// Stage of an edit in which a failure surfaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditPhase {
    Classify,
    Confirm,
    Reabstract,
    RepairNeighbors,
    PatchDatabase,
    Verify,
    Export,
}

impl fmt::Display for EditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditPhase::Classify => "classify",
            EditPhase::Confirm => "confirm",
            EditPhase::Reabstract => "reabstract",
            EditPhase::RepairNeighbors => "repair-neighbors",
            EditPhase::PatchDatabase => "patch-database",
            EditPhase::Verify => "verify",
            EditPhase::Export => "export",
        };
        f.write_str(name)
    }
}

/// What a cell was expected to be when an edit precondition failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpectedCell {
    Open,
    Wall,
}

impl fmt::Display for ExpectedCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedCell::Open => f.write_str("open"),
            ExpectedCell::Wall => f.write_str("a wall"),
        }
    }
}

/// Errors that can occur while editing the abstraction or querying the database.
///
/// There is no rollback: after any error raised from an edit the snapshot is
/// partially mutated and must be rebuilt or reloaded by the caller.
#[derive(Debug, thiserror::Error)]
pub enum AbstractionError {
    #[error("precondition violated at cell {cell}: expected cell to be {expected}")]
    PreconditionViolation { cell: CellId, expected: ExpectedCell },

    #[error("cell ({x}, {y}) is outside the {width}x{height} map")]
    CellOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    #[error("invariant violated during {phase} at cell {cell:?}: {detail}")]
    InvariantViolation {
        phase: EditPhase,
        cell: Option<CellId>,
        detail: String,
    },

    #[error("unknown region {0}")]
    UnknownRegion(RegionId),

    #[error("no database entry from {from} to {to}")]
    NoDatabaseEntry { from: RegionId, to: RegionId },

    #[error("search from {start} to {goal} exceeded {cap} iterations")]
    SearchExhausted {
        start: CellId,
        goal: CellId,
        cap: usize,
    },

    #[error("no path from {start} to {goal}")]
    Unreachable { start: CellId, goal: CellId },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed map: {0}")]
    MapFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("config parse error: {0}")]
    Config(#[from] ron::error::SpannedError),
}

impl AbstractionError {
    pub(crate) fn invariant(phase: EditPhase, cell: Option<CellId>, detail: impl Into<String>) -> Self {
        AbstractionError::InvariantViolation {
            phase,
            cell,
            detail: detail.into(),
        }
    }
}
