mod types;
mod error;
mod grid;
mod region;
mod builder;
mod search;

// Incremental maintenance
mod classifier;
mod connectivity;
mod reabstract;
mod neighbors;
mod database;
mod export;
mod editor;

#[cfg(test)]
mod tests;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use types::{
    diagonal_cost, octile_distance, CellId, CellTag, Direction, LocalPath, RegionId, SectorBounds, SectorId,
    DATABASE_VERSION, DEFAULT_GRID_SIZE, REGION_ID_OFFSET,
};
pub use error::{AbstractionError, AbstractionResult, EditPhase, ExpectedCell};
pub use grid::{Grid, Neighborhood};
pub use region::{GroupRecord, IdAllocator, RegionTable};
pub use builder::{abstract_sector, build_regions, recompute_representative};
pub use search::{bounded_astar, greedy_walk};
pub use classifier::{classify_wall_addition, classify_wall_removal, partition_candidates, AddCase, PartitionCandidates, RemoveCase};
pub use connectivity::{confirm_partition, flood_region, is_connected, PartitionEvidence, PartitionVerdict};
pub use reabstract::{reabstract_sector, Reabstraction};
pub use neighbors::derive_neighbors;
pub use database::{compress_subgoals, DbEntry, DbRow, DirtySet, PatchStats, SubgoalDatabase};
pub use export::{build_snapshot, load_snapshot, save_snapshot, snapshot_bytes, DatabaseSnapshot, EntrySnapshot, RegionSnapshot};
pub use editor::{DynamicAbstraction, EditCase, EditOutcome};

