use std::collections::BTreeSet;
use tracing::{debug, info};
use crate::config::AbstractionConfig;
use crate::fixed_math::FixedNum;
use super::builder::{build_regions, recompute_representative};
use super::classifier::{classify_wall_addition, classify_wall_removal, AddCase, PartitionCandidates, RemoveCase};
use super::connectivity::{confirm_partition, flood_region, PartitionEvidence, PartitionVerdict};
use super::database::{DbEntry, DirtySet, PatchStats, SubgoalDatabase};
use super::error::{AbstractionError, AbstractionResult, EditPhase, ExpectedCell};
use super::export::{snapshot_bytes, DatabaseSnapshot};
use super::grid::Grid;
use super::neighbors::{derive_neighbors, repair_neighbors, NeighborRepair};
use super::reabstract::reabstract_sector;
use super::region::{GroupRecord, RegionTable};
use super::search::{bounded_astar, greedy_walk};
use super::types::{CellId, CellTag, LocalPath, RegionId};

/// Which maintenance path an edit took.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditCase {
    /// The blocked cell was a one-cell region.
    Elimination,
    /// The region lost one cell and stayed whole. `suspected` is set when a
    /// split pattern was flagged but the oracle found the sides connected.
    InteriorRemoval { suspected: bool },
    /// The region was dissolved and its sector re-abstracted.
    Partition { evidence: PartitionEvidence },
    /// The opened cell has no open neighbor.
    SurroundedByWalls,
    /// The opened cell merged the same-sector regions around it.
    SameSectorMerge,
    /// The opened cell only touches other sectors.
    CrossSectorSingleton,
}

/// Summary of one completed edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditOutcome {
    pub cell: CellId,
    pub case: EditCase,
    pub regions_before: usize,
    pub regions_after: usize,
    pub dirty: DirtySet,
    pub patch: PatchStats,
}

/// Result of the per-case handlers, before the database is patched.
struct AppliedEdit {
    case: EditCase,
    dirty: DirtySet,
    expected_regions: usize,
}

/// A map abstraction kept current under single-cell edits.
///
/// Owns the grid, the region table and the subgoal database. Edits are
/// single-threaded and not transactional: after any error the instance is
/// partially mutated and must be replaced, e.g. with [`Self::rebuild`].
#[derive(Clone, Debug)]
pub struct DynamicAbstraction {
    grid: Grid,
    regions: RegionTable,
    database: SubgoalDatabase,
    config: AbstractionConfig,
}

impl DynamicAbstraction {
    /// Full build from a walkability mask (row-major, `true` = open).
    pub fn new(width: usize, height: usize, walkable: &[bool], config: AbstractionConfig) -> AbstractionResult<Self> {
        config.validate()?;
        let mut grid = Grid::from_walkable(width, height, config.grid_size, walkable)?;
        let regions = build_regions(&mut grid);
        let database = SubgoalDatabase::build(&grid, &regions, &config)?;
        if let Some(path) = &config.database_path {
            database.export(&grid, &regions, path)?;
        }
        Ok(Self {
            grid,
            regions,
            database,
            config,
        })
    }

    /// Full reconstruction from the current map, without exporting.
    ///
    /// This is the reference the incremental path must match byte for byte.
    pub fn rebuild(&self) -> AbstractionResult<Self> {
        let config = AbstractionConfig {
            database_path: None,
            ..self.config.clone()
        };
        Self::new(self.grid.width(), self.grid.height(), &self.grid.walkable_mask(), config)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub fn database(&self) -> &SubgoalDatabase {
        &self.database
    }

    pub fn config(&self) -> &AbstractionConfig {
        &self.config
    }

    pub fn cell_at(&self, x: usize, y: usize) -> AbstractionResult<CellId> {
        self.grid.cell_at(x, y)
    }

    fn check_bounds(&self, cell: CellId) -> AbstractionResult<()> {
        if self.grid.contains(cell) {
            return Ok(());
        }
        let width = self.grid.width().max(1);
        Err(AbstractionError::CellOutOfBounds {
            x: cell.0 % width,
            y: cell.0 / width,
            width: self.grid.width(),
            height: self.grid.height(),
        })
    }

    // ========================================================================
    // Wall addition
    // ========================================================================

    /// Block an open cell.
    pub fn add_wall(&mut self, cell: CellId) -> AbstractionResult<EditOutcome> {
        self.check_bounds(cell)?;
        let before = self.regions.len();
        let case = classify_wall_addition(&self.grid, &self.regions, cell)?;
        debug!("[EDIT] add_wall {}: {:?}", cell, case);

        let applied = match case {
            AddCase::Elimination { region } => self.eliminate_region(cell, region, before)?,
            AddCase::InteriorRemoval { region } => self.remove_interior_cell(cell, region, before, false)?,
            AddCase::SuspectedPartition { region, candidates } => {
                self.split_region(cell, region, candidates, before)?
            }
        };
        self.finish(cell, before, applied)
    }

    fn eliminate_region(&mut self, cell: CellId, region: RegionId, before: usize) -> AbstractionResult<AppliedEdit> {
        self.grid.set_tag(cell, CellTag::Wall);
        let record = self
            .regions
            .remove(region)
            .ok_or(AbstractionError::UnknownRegion(region))?;
        let repair = NeighborRepair {
            targets: BTreeSet::new(),
            tombstoned: [region].into_iter().collect(),
            former_neighbors: record.neighbors,
        };
        repair_neighbors(&self.grid, &mut self.regions, &repair)?;

        let mut dirty = DirtySet::new();
        dirty.tombstone(region);
        Ok(AppliedEdit {
            case: EditCase::Elimination,
            dirty,
            expected_regions: before - 1,
        })
    }

    /// Shrink `region` by `cell`, which must already be tagged as a wall.
    fn shrink_region(&mut self, cell: CellId, region: RegionId) -> AbstractionResult<()> {
        let record = self
            .regions
            .get_mut(region)
            .ok_or(AbstractionError::UnknownRegion(region))?;
        if !record.release(cell) {
            return Err(AbstractionError::invariant(
                EditPhase::Classify,
                Some(cell),
                format!("cell is tagged {region} but not in its member list"),
            ));
        }
        record.rep = recompute_representative(&self.grid, &record.members).ok_or_else(|| {
            AbstractionError::invariant(EditPhase::Classify, Some(cell), format!("{region} has no members left"))
        })?;
        Ok(())
    }

    fn remove_interior_cell(
        &mut self,
        cell: CellId,
        region: RegionId,
        before: usize,
        suspected: bool,
    ) -> AbstractionResult<AppliedEdit> {
        self.grid.set_tag(cell, CellTag::Wall);
        self.shrink_region(cell, region)?;
        repair_neighbors(&self.grid, &mut self.regions, &NeighborRepair::for_targets([region]))?;

        let mut dirty = DirtySet::new();
        dirty.touch(region);
        Ok(AppliedEdit {
            case: EditCase::InteriorRemoval { suspected },
            dirty,
            expected_regions: before,
        })
    }

    fn split_region(
        &mut self,
        cell: CellId,
        region: RegionId,
        candidates: PartitionCandidates,
        before: usize,
    ) -> AbstractionResult<AppliedEdit> {
        self.grid.set_tag(cell, CellTag::Wall);
        let evidence = match confirm_partition(&self.grid, cell, region, candidates) {
            PartitionVerdict::Intact => {
                debug!("[EDIT] {} stays connected around {}", region, cell);
                return self.remove_interior_cell(cell, region, before, true);
            }
            PartitionVerdict::Partitioned(evidence) => evidence,
        };

        let sector = self.grid.sector_of(cell);
        let dissolve: BTreeSet<RegionId> = [region].into_iter().collect();
        let result = reabstract_sector(&mut self.grid, &mut self.regions, sector, &dissolve)?;
        if result.created.is_empty() {
            return Err(AbstractionError::invariant(
                EditPhase::Reabstract,
                Some(cell),
                format!("partition of {region} left no component"),
            ));
        }
        info!(
            "[EDIT] {} split into {} regions at {} ({:?})",
            region,
            result.created.len(),
            cell,
            evidence
        );

        let mut dirty = DirtySet::new();
        dirty.tombstone(region);
        for &id in &result.created {
            dirty.touch(id);
        }
        Ok(AppliedEdit {
            case: EditCase::Partition { evidence },
            dirty,
            expected_regions: before - 1 + result.created.len(),
        })
    }

    // ========================================================================
    // Wall removal
    // ========================================================================

    /// Open a wall cell.
    pub fn remove_wall(&mut self, cell: CellId) -> AbstractionResult<EditOutcome> {
        self.check_bounds(cell)?;
        let before = self.regions.len();
        let case = classify_wall_removal(&self.grid, cell)?;
        debug!("[EDIT] remove_wall {}: {:?}", cell, case);

        let applied = match case {
            RemoveCase::SurroundedByWalls => self.open_isolated_cell(cell, before)?,
            RemoveCase::SameSector { anchor, touched } => self.merge_sector_regions(cell, anchor, touched, before)?,
            RemoveCase::CrossSector { touched } => self.open_cross_sector_cell(cell, touched, before)?,
        };
        self.finish(cell, before, applied)
    }

    /// Tag `cell` as a new one-cell region with the lowest free id.
    fn insert_singleton(&mut self, cell: CellId) -> RegionId {
        let id = self.regions.fresh_id();
        self.grid.set_tag(cell, CellTag::Region(id));
        self.regions
            .insert(GroupRecord::seed(id, cell, self.grid.sector_of(cell)));
        id
    }

    fn open_isolated_cell(&mut self, cell: CellId, before: usize) -> AbstractionResult<AppliedEdit> {
        let id = self.insert_singleton(cell);
        let mut dirty = DirtySet::new();
        dirty.touch(id);
        Ok(AppliedEdit {
            case: EditCase::SurroundedByWalls,
            dirty,
            expected_regions: before + 1,
        })
    }

    fn merge_sector_regions(
        &mut self,
        cell: CellId,
        anchor: RegionId,
        touched: BTreeSet<RegionId>,
        before: usize,
    ) -> AbstractionResult<AppliedEdit> {
        self.grid.set_tag(cell, CellTag::Region(anchor));
        let sector = self.grid.sector_of(cell);
        let result = reabstract_sector(&mut self.grid, &mut self.regions, sector, &touched)?;
        if result.created.len() != 1 {
            return Err(AbstractionError::invariant(
                EditPhase::Reabstract,
                Some(cell),
                format!("merging {:?} produced {} regions", touched, result.created.len()),
            ));
        }

        let mut dirty = DirtySet::new();
        for &id in &touched {
            dirty.tombstone(id);
        }
        for &id in &result.created {
            dirty.touch(id);
        }
        Ok(AppliedEdit {
            case: EditCase::SameSectorMerge,
            dirty,
            expected_regions: before + 1 - touched.len(),
        })
    }

    fn open_cross_sector_cell(
        &mut self,
        cell: CellId,
        touched: BTreeSet<RegionId>,
        before: usize,
    ) -> AbstractionResult<AppliedEdit> {
        let id = self.insert_singleton(cell);
        repair_neighbors(&self.grid, &mut self.regions, &NeighborRepair::for_targets([id]))?;

        let linked = self
            .regions
            .get(id)
            .map(|record| record.neighbors.clone())
            .unwrap_or_default();
        if linked != touched {
            return Err(AbstractionError::invariant(
                EditPhase::RepairNeighbors,
                Some(cell),
                format!("{id} linked to {:?}, expected {:?}", linked, touched),
            ));
        }

        let mut dirty = DirtySet::new();
        dirty.touch(id);
        Ok(AppliedEdit {
            case: EditCase::CrossSectorSingleton,
            dirty,
            expected_regions: before + 1,
        })
    }

    // ========================================================================
    // Shared tail
    // ========================================================================

    fn finish(&mut self, cell: CellId, before: usize, applied: AppliedEdit) -> AbstractionResult<EditOutcome> {
        let after = self.regions.len();
        if after != applied.expected_regions {
            return Err(AbstractionError::invariant(
                EditPhase::Verify,
                Some(cell),
                format!(
                    "{:?} should leave {} live regions (from {}), found {}",
                    applied.case, applied.expected_regions, before, after
                ),
            ));
        }

        let patch = self
            .database
            .patch(&self.grid, &self.regions, &applied.dirty, &self.config)?;

        if self.config.verify_after_edit {
            self.verify_invariants()?;
        }

        info!(
            "[EDIT] {} {:?}: {} -> {} regions, {} rows recomputed",
            cell, applied.case, before, after, patch.rows_recomputed
        );
        Ok(EditOutcome {
            cell,
            case: applied.case,
            regions_before: before,
            regions_after: after,
            dirty: applied.dirty,
            patch,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Database entry between two live regions.
    pub fn query(&self, from: RegionId, to: RegionId) -> AbstractionResult<&DbEntry> {
        self.database.entry(from, to)
    }

    /// Region owning `cell`, `None` for walls.
    pub fn region_of(&self, cell: CellId) -> AbstractionResult<Option<RegionId>> {
        self.check_bounds(cell)?;
        Ok(self.grid.tag(cell).region())
    }

    /// Cell-level path between two open cells, stitched from database subgoals.
    ///
    /// Each leg between consecutive waypoints tries a greedy walk first and
    /// falls back to bounded A*. Pairs further apart than the stored levels
    /// are searched directly.
    pub fn reconstruct_path(&self, start: CellId, goal: CellId) -> AbstractionResult<LocalPath> {
        let from = self.open_region(start)?;
        let to = self.open_region(goal)?;
        let cap = self.config.search_iteration_cap;

        if from == to {
            return bounded_astar(&self.grid, start, goal, |c| self.grid.tag(c).is_member_of(from), cap);
        }

        let entry = match self.database.entry(from, to) {
            Ok(entry) => entry,
            Err(AbstractionError::NoDatabaseEntry { .. }) => {
                debug!("[PATH] {} -> {} beyond stored levels, searching directly", from, to);
                return bounded_astar(&self.grid, start, goal, |_| true, cap);
            }
            Err(e) => return Err(e),
        };

        let mut waypoints = vec![start];
        waypoints.extend(entry.subgoals.iter().copied());
        waypoints.push(goal);
        waypoints.dedup();

        let mut path = LocalPath::trivial(start);
        for leg in waypoints.windows(2) {
            let piece = match greedy_walk(&self.grid, leg[0], leg[1], |_| true, self.config.compress_iteration_cap) {
                Some(piece) => piece,
                None => bounded_astar(&self.grid, leg[0], leg[1], |_| true, cap)?,
            };
            path.cells.extend(piece.cells.into_iter().skip(1));
            path.cost += piece.cost;
        }
        Ok(path)
    }

    fn open_region(&self, cell: CellId) -> AbstractionResult<RegionId> {
        self.region_of(cell)?.ok_or(AbstractionError::PreconditionViolation {
            cell,
            expected: ExpectedCell::Open,
        })
    }

    /// Cost of the cheapest walk stored between the regions of two cells.
    pub fn region_cost(&self, a: CellId, b: CellId) -> AbstractionResult<FixedNum> {
        let from = self.open_region(a)?;
        let to = self.open_region(b)?;
        Ok(self.query(from, to)?.cost)
    }

    // ========================================================================
    // Persistence and verification
    // ========================================================================

    pub fn snapshot(&self) -> AbstractionResult<DatabaseSnapshot> {
        self.database.snapshot(&self.grid, &self.regions)
    }

    /// Export bytes as written to `database_path`.
    pub fn export_bytes(&self) -> AbstractionResult<Vec<u8>> {
        snapshot_bytes(&self.snapshot()?)
    }

    /// Check every structural invariant of the grid, table and database.
    pub fn verify_invariants(&self) -> AbstractionResult<()> {
        let fail = |cell: Option<CellId>, detail: String| AbstractionError::invariant(EditPhase::Verify, cell, detail);

        // Cells
        let mut assigned = 0usize;
        for index in 0..self.grid.len() {
            let cell = CellId(index);
            match self.grid.tag(cell) {
                CellTag::Wall => {}
                CellTag::Region(id) => {
                    let record = self
                        .regions
                        .get(id)
                        .ok_or_else(|| fail(Some(cell), format!("tagged with dead id {id}")))?;
                    if !record.contains(cell) {
                        return Err(fail(Some(cell), format!("tagged {id} but not a member")));
                    }
                    assigned += 1;
                }
                other => return Err(fail(Some(cell), format!("open cell left as {other:?}"))),
            }
        }
        let members: usize = self.regions.iter().map(GroupRecord::cell_count).sum();
        if members != assigned {
            return Err(fail(None, format!("{members} members recorded, {assigned} cells tagged")));
        }

        // Regions
        for record in self.regions.iter() {
            if !record.members.windows(2).all(|w| w[0] < w[1]) {
                return Err(fail(Some(record.rep), format!("{} members not sorted", record.id)));
            }
            if !record.contains(record.rep) {
                return Err(fail(Some(record.rep), format!("{} rep is not a member", record.id)));
            }
            if recompute_representative(&self.grid, &record.members) != Some(record.rep) {
                return Err(fail(Some(record.rep), format!("{} rep is not the centroid choice", record.id)));
            }
            if record.members.iter().any(|&c| self.grid.sector_of(c) != record.sector) {
                return Err(fail(Some(record.rep), format!("{} crosses its sector", record.id)));
            }
            if flood_region(&self.grid, record.rep, record.id).len() != record.cell_count() {
                return Err(fail(Some(record.rep), format!("{} is not one component", record.id)));
            }
            let derived = derive_neighbors(&self.grid, record);
            if derived != record.neighbors {
                return Err(fail(
                    Some(record.rep),
                    format!("{} neighbors {:?}, map says {:?}", record.id, record.neighbors, derived),
                ));
            }
            for &other in &record.neighbors {
                let mirrored = self.regions.get(other).is_some_and(|o| o.neighbors.contains(&record.id));
                if !mirrored {
                    return Err(fail(Some(record.rep), format!("{} -> {} not mirrored", record.id, other)));
                }
            }
        }

        // Database
        if self.database.rows().len() != self.regions.len() {
            return Err(fail(
                None,
                format!("{} rows for {} regions", self.database.rows().len(), self.regions.len()),
            ));
        }
        for record in self.regions.iter() {
            let row = self
                .database
                .row(record.id)
                .ok_or_else(|| fail(Some(record.rep), format!("{} has no row", record.id)))?;
            let expected = self.hop_targets(record.id);
            let stored: BTreeSet<RegionId> = row.entries.keys().copied().collect();
            if stored != expected {
                return Err(fail(
                    Some(record.rep),
                    format!("{} row targets {:?}, expected {:?}", record.id, stored, expected),
                ));
            }
        }
        Ok(())
    }

    /// Regions within `1..=levels` hops of `source`.
    fn hop_targets(&self, source: RegionId) -> BTreeSet<RegionId> {
        let mut seen: BTreeSet<RegionId> = [source].into_iter().collect();
        let mut layer = vec![source];
        for _ in 0..self.database.levels() {
            let mut next = Vec::new();
            for id in layer {
                if let Some(record) = self.regions.get(id) {
                    for &n in &record.neighbors {
                        if seen.insert(n) {
                            next.push(n);
                        }
                    }
                }
            }
            layer = next;
        }
        seen.remove(&source);
        seen
    }
}
