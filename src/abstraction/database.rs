use kestrel_macros::profile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use tracing::{debug, info};
use crate::config::AbstractionConfig;
use crate::fixed_math::FixedNum;
use super::error::{AbstractionError, AbstractionResult, EditPhase};
use super::export::{build_snapshot, save_snapshot, DatabaseSnapshot};
use super::grid::Grid;
use super::region::RegionTable;
use super::search::{bounded_astar, greedy_walk};
use super::types::{CellId, RegionId, REGION_ID_OFFSET};

// ============================================================================
// Entries and rows
// ============================================================================

/// Cheapest bounded-hop route from a row's region to one target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbEntry {
    /// Sum of the base costs along the region walk.
    pub cost: FixedNum,
    /// Number of region-graph edges on the walk.
    pub hops: u32,
    /// Compressed waypoints: rep cells, start excluded, destination rep last.
    pub subgoals: Vec<CellId>,
}

/// All entries whose source is `region`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbRow {
    pub region: RegionId,
    pub entries: BTreeMap<RegionId, DbEntry>,
}

/// Regions an edit touched, as handed to [`SubgoalDatabase::patch`].
///
/// An id can be in both sets when a dissolved id was handed out again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtySet {
    pub tombstoned: BTreeSet<RegionId>,
    pub changed: BTreeSet<RegionId>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tombstone(&mut self, id: RegionId) {
        self.tombstoned.insert(id);
    }

    pub fn touch(&mut self, id: RegionId) {
        self.changed.insert(id);
    }

    pub fn all(&self) -> BTreeSet<RegionId> {
        self.tombstoned.union(&self.changed).copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tombstoned.is_empty() && self.changed.is_empty()
    }
}

/// Work done by one patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub rows_recomputed: usize,
    pub rows_dropped: usize,
    pub base_costs_recomputed: usize,
}

// ============================================================================
// Region-graph walks
// ============================================================================

/// A walk from a row's source over the region graph.
///
/// Ordered by cost, then hop count, then the rep cells it visits. Rep cells
/// are a property of the map, so the order does not depend on which ids the
/// regions happen to carry.
#[derive(Clone, Debug)]
struct Walk {
    cost: FixedNum,
    regions: Vec<RegionId>,
    reps: Vec<CellId>,
}

impl Walk {
    fn empty() -> Self {
        Self {
            cost: FixedNum::ZERO,
            regions: Vec::new(),
            reps: Vec::new(),
        }
    }

    fn extend(&self, region: RegionId, rep: CellId, step: FixedNum) -> Self {
        let mut regions = Vec::with_capacity(self.regions.len() + 1);
        regions.extend_from_slice(&self.regions);
        regions.push(region);
        let mut reps = Vec::with_capacity(self.reps.len() + 1);
        reps.extend_from_slice(&self.reps);
        reps.push(rep);
        Self {
            cost: self.cost + step,
            regions,
            reps,
        }
    }

    fn key_cmp(&self, other: &Walk) -> Ordering {
        self.cost
            .cmp(&other.cost)
            .then_with(|| self.regions.len().cmp(&other.regions.len()))
            .then_with(|| self.reps.cmp(&other.reps))
    }
}

#[inline]
fn pair(a: RegionId, b: RegionId) -> (RegionId, RegionId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Optimal cost between two adjacent regions' reps, searching only their cells.
fn compute_base_cost(
    grid: &Grid,
    table: &RegionTable,
    a: RegionId,
    b: RegionId,
    cap: usize,
) -> AbstractionResult<FixedNum> {
    let rep_a = table.get(a).ok_or(AbstractionError::UnknownRegion(a))?.rep;
    let rep_b = table.get(b).ok_or(AbstractionError::UnknownRegion(b))?.rep;
    let (start, goal) = if rep_a <= rep_b { (rep_a, rep_b) } else { (rep_b, rep_a) };
    let path = bounded_astar(
        grid,
        start,
        goal,
        |cell| grid.tag(cell).region().is_some_and(|id| id == a || id == b),
        cap,
    )?;
    Ok(path.cost)
}

/// Drop intermediate reps from a region walk where a greedy walk can skip them.
///
/// # Algorithm
/// From the current waypoint try the farthest remaining rep first. A rep is
/// reachable when [`greedy_walk`] gets there using only cells of the regions
/// on the walk between the two waypoints. If no farther rep is reachable the
/// next rep on the walk becomes the waypoint.
///
/// `path` excludes `source`; the result excludes the source rep and always
/// ends with the destination rep.
pub fn compress_subgoals(
    grid: &Grid,
    table: &RegionTable,
    source: RegionId,
    path: &[RegionId],
    cap: usize,
) -> AbstractionResult<Vec<CellId>> {
    let mut regions = Vec::with_capacity(path.len() + 1);
    regions.push(source);
    regions.extend_from_slice(path);
    let reps = regions
        .iter()
        .map(|&id| table.get(id).map(|r| r.rep).ok_or(AbstractionError::UnknownRegion(id)))
        .collect::<AbstractionResult<Vec<CellId>>>()?;

    let last = regions.len() - 1;
    let mut subgoals = Vec::new();
    let mut current = 0;
    while current < last {
        let mut next = current + 1;
        for far in (current + 2..=last).rev() {
            let window = &regions[current..=far];
            let allowed = |cell: CellId| grid.tag(cell).region().is_some_and(|id| window.contains(&id));
            if greedy_walk(grid, reps[current], reps[far], allowed, cap).is_some() {
                next = far;
                break;
            }
        }
        subgoals.push(reps[next]);
        current = next;
    }
    Ok(subgoals)
}

// ============================================================================
// Database
// ============================================================================

/// Precomputed inter-region routes.
///
/// Rows are kept sorted by region id; `row_index` maps `id - REGION_ID_OFFSET`
/// to a row position and is regenerated after every patch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubgoalDatabase {
    levels: usize,
    base: BTreeMap<(RegionId, RegionId), FixedNum>,
    rows: Vec<DbRow>,
    row_index: Vec<Option<usize>>,
}

impl SubgoalDatabase {
    /// Full construction from a finished abstraction.
    #[profile(5)]
    pub fn build(grid: &Grid, table: &RegionTable, config: &AbstractionConfig) -> AbstractionResult<Self> {
        let mut db = Self {
            levels: config.num_neighbour_levels,
            base: BTreeMap::new(),
            rows: Vec::with_capacity(table.len()),
            row_index: Vec::new(),
        };

        for record in table.iter() {
            for &other in &record.neighbors {
                if record.id < other {
                    let cost = compute_base_cost(grid, table, record.id, other, config.search_iteration_cap)?;
                    db.base.insert((record.id, other), cost);
                }
            }
        }

        for id in table.ids() {
            let row = db.compute_row(grid, table, id, config.compress_iteration_cap)?;
            db.rows.push(row);
        }
        db.regenerate_index();

        info!(
            "[DATABASE] Built {} rows, {} entries, {} base costs (levels = {})",
            db.rows.len(),
            db.entry_count(),
            db.base.len(),
            db.levels
        );
        Ok(db)
    }

    /// Bring the database in line with an edited abstraction.
    ///
    /// # Algorithm
    /// 1. Affected sources: the dirty ids, every target of their pre-edit
    ///    rows (their old hop ball), and every region within `levels` hops of
    ///    a live dirty id in the current graph.
    /// 2. Base costs touching a dirty id are dropped; adjacencies of live
    ///    dirty ids are searched again.
    /// 3. Rows of affected live sources are recomputed, rows of dead ids
    ///    dropped, all other rows kept as they are.
    /// 4. The id index is regenerated.
    /// 5. The result is exported when a database path is configured.
    #[profile(2)]
    pub fn patch(
        &mut self,
        grid: &Grid,
        table: &RegionTable,
        dirty: &DirtySet,
        config: &AbstractionConfig,
    ) -> AbstractionResult<PatchStats> {
        let dirty_ids = dirty.all();
        let mut stats = PatchStats::default();

        // Step 1: affected sources
        let mut affected = dirty_ids.clone();
        for &id in &dirty_ids {
            if let Some(row) = self.row(id) {
                affected.extend(row.entries.keys().copied());
            }
        }
        let live_dirty: Vec<RegionId> = dirty_ids.iter().copied().filter(|&id| table.contains(id)).collect();
        affected.extend(self.hop_ball(table, &live_dirty));

        // Step 2: base costs
        self.base
            .retain(|(a, b), _| !dirty_ids.contains(a) && !dirty_ids.contains(b));
        for &id in &live_dirty {
            let record = table.get(id).ok_or(AbstractionError::UnknownRegion(id))?;
            for &other in &record.neighbors {
                let key = pair(id, other);
                if self.base.contains_key(&key) {
                    continue;
                }
                let cost = compute_base_cost(grid, table, key.0, key.1, config.search_iteration_cap)?;
                self.base.insert(key, cost);
                stats.base_costs_recomputed += 1;
            }
        }

        // Step 3: rows
        let mut fresh = Vec::new();
        for &id in affected.iter().filter(|&&id| table.contains(id)) {
            fresh.push(self.compute_row(grid, table, id, config.compress_iteration_cap)?);
        }
        let before = self.rows.len();
        self.rows
            .retain(|row| table.contains(row.region) && !affected.contains(&row.region));
        stats.rows_dropped = before - self.rows.len();
        stats.rows_recomputed = fresh.len();
        self.rows.extend(fresh);
        self.rows.sort_by_key(|row| row.region);

        // Step 4: index
        self.regenerate_index();

        debug!(
            "[PATCH] dirty {:?}: {} affected, {} rows recomputed, {} base costs",
            dirty_ids,
            affected.len(),
            stats.rows_recomputed,
            stats.base_costs_recomputed
        );

        // Step 5: persist
        if let Some(path) = &config.database_path {
            self.export(grid, table, path)?;
        }

        Ok(stats)
    }

    /// Rebuild `row_index` from `rows`, resizing it to the largest live id.
    pub fn regenerate_index(&mut self) {
        let len = self.rows.iter().map(|row| row.region.slot() + 1).max().unwrap_or(0);
        self.row_index.clear();
        self.row_index.resize(len, None);
        for (position, row) in self.rows.iter().enumerate() {
            self.row_index[row.region.slot()] = Some(position);
        }
    }

    /// Live regions within `levels` hops of any seed, seeds included.
    fn hop_ball(&self, table: &RegionTable, seeds: &[RegionId]) -> BTreeSet<RegionId> {
        let mut seen: BTreeSet<RegionId> = seeds.iter().copied().collect();
        let mut queue: VecDeque<(RegionId, usize)> = seeds.iter().map(|&id| (id, 0)).collect();
        while let Some((id, depth)) = queue.pop_front() {
            if depth == self.levels {
                continue;
            }
            let Some(record) = table.get(id) else { continue };
            for &next in &record.neighbors {
                if seen.insert(next) {
                    queue.push_back((next, depth + 1));
                }
            }
        }
        seen
    }

    /// One row by bounded-hop relaxation over the region graph.
    ///
    /// Round `i` extends only the walks that improved in round `i - 1`, so
    /// after `levels` rounds every region reachable in `1..=levels` hops holds
    /// its cheapest walk of at most `levels` hops.
    fn compute_row(
        &self,
        grid: &Grid,
        table: &RegionTable,
        source: RegionId,
        compress_cap: usize,
    ) -> AbstractionResult<DbRow> {
        if !table.contains(source) {
            return Err(AbstractionError::UnknownRegion(source));
        }

        let mut best: BTreeMap<RegionId, Walk> = BTreeMap::new();
        let mut frontier: Vec<(RegionId, Walk)> = vec![(source, Walk::empty())];

        for _ in 0..self.levels {
            let mut improved: BTreeMap<RegionId, Walk> = BTreeMap::new();
            for (from, walk) in &frontier {
                let Some(record) = table.get(*from) else { continue };
                for &to in &record.neighbors {
                    if to == source {
                        continue;
                    }
                    let step = self.base_cost(*from, to).ok_or_else(|| {
                        AbstractionError::invariant(
                            EditPhase::PatchDatabase,
                            None,
                            format!("no base cost for adjacent pair {from}-{to}"),
                        )
                    })?;
                    let rep = table.get(to).ok_or(AbstractionError::UnknownRegion(to))?.rep;
                    let candidate = walk.extend(to, rep, step);
                    let beats = |current: Option<&Walk>| current.map_or(true, |w| candidate.key_cmp(w) == Ordering::Less);
                    if beats(best.get(&to)) && beats(improved.get(&to)) {
                        improved.insert(to, candidate);
                    }
                }
            }
            if improved.is_empty() {
                break;
            }
            for (id, walk) in &improved {
                best.insert(*id, walk.clone());
            }
            frontier = improved.into_iter().collect();
        }

        let mut entries = BTreeMap::new();
        for (target, walk) in best {
            let subgoals = compress_subgoals(grid, table, source, &walk.regions, compress_cap)?;
            entries.insert(
                target,
                DbEntry {
                    cost: walk.cost,
                    hops: walk.regions.len() as u32,
                    subgoals,
                },
            );
        }
        Ok(DbRow { region: source, entries })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn rows(&self) -> &[DbRow] {
        &self.rows
    }

    pub fn row_index(&self) -> &[Option<usize>] {
        &self.row_index
    }

    pub fn entry_count(&self) -> usize {
        self.rows.iter().map(|row| row.entries.len()).sum()
    }

    pub fn base_costs(&self) -> impl Iterator<Item = (&(RegionId, RegionId), &FixedNum)> {
        self.base.iter()
    }

    pub fn base_cost(&self, a: RegionId, b: RegionId) -> Option<FixedNum> {
        self.base.get(&pair(a, b)).copied()
    }

    pub fn row(&self, id: RegionId) -> Option<&DbRow> {
        if id.0 < REGION_ID_OFFSET {
            return None;
        }
        self.row_index
            .get(id.slot())
            .copied()
            .flatten()
            .and_then(|position| self.rows.get(position))
    }

    /// Entry from `from` to `to`.
    ///
    /// `UnknownRegion` when either id has no row, `NoDatabaseEntry` when both
    /// are live but further apart than the stored neighbor levels.
    pub fn entry(&self, from: RegionId, to: RegionId) -> AbstractionResult<&DbEntry> {
        let row = self.row(from).ok_or(AbstractionError::UnknownRegion(from))?;
        if self.row(to).is_none() {
            return Err(AbstractionError::UnknownRegion(to));
        }
        row.entries
            .get(&to)
            .ok_or(AbstractionError::NoDatabaseEntry { from, to })
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    pub fn snapshot(&self, grid: &Grid, table: &RegionTable) -> AbstractionResult<DatabaseSnapshot> {
        build_snapshot(grid, table, self)
    }

    /// Write the canonical snapshot (bincode inside zlib) to `path`.
    pub fn export(&self, grid: &Grid, table: &RegionTable, path: &Path) -> AbstractionResult<()> {
        let snapshot = self.snapshot(grid, table)?;
        save_snapshot(path, &snapshot)?;
        debug!("[EXPORT] Wrote {} regions to {}", snapshot.regions.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::builder::build_regions;
    use super::super::types::CellTag;

    fn corridor(sectors: usize) -> (Grid, RegionTable) {
        let mut grid = Grid::new(sectors * 4, 1, 4);
        let table = build_regions(&mut grid);
        (grid, table)
    }

    #[test]
    fn corridor_rows_respect_hop_limit() {
        let (grid, table) = corridor(4);
        let db = SubgoalDatabase::build(&grid, &table, &AbstractionConfig::default()).unwrap();
        let first = RegionId(REGION_ID_OFFSET);
        let row = db.row(first).unwrap();
        assert_eq!(row.entries.len(), 2, "two neighbor levels from the end of a corridor");

        let far = db.entry(first, RegionId(REGION_ID_OFFSET + 2)).unwrap();
        assert_eq!(far.hops, 2);
        assert_eq!(far.cost, FixedNum::from_num(8), "reps sit at x = 1, 5, 9");
        assert_eq!(far.subgoals, vec![table.get(RegionId(REGION_ID_OFFSET + 2)).unwrap().rep]);

        let err = db.entry(first, RegionId(REGION_ID_OFFSET + 3)).unwrap_err();
        assert!(matches!(err, AbstractionError::NoDatabaseEntry { .. }));
        let err = db.entry(first, RegionId(99)).unwrap_err();
        assert!(matches!(err, AbstractionError::UnknownRegion(RegionId(99))));
    }

    #[test]
    fn compression_skips_reps_on_a_straight_line() {
        let (grid, table) = corridor(3);
        let path = [RegionId(3), RegionId(4)];
        let subgoals = compress_subgoals(&grid, &table, RegionId(2), &path, 64).unwrap();
        assert_eq!(subgoals, vec![table.get(RegionId(4)).unwrap().rep], "middle rep is dropped");
    }

    #[test]
    fn compression_keeps_rep_when_greedy_walk_fails() {
        // Middle sector has a wall column at x = 5 open only on the bottom row,
        // so a greedy walk along y = 1 gets stuck in front of it.
        let mut grid = Grid::new(12, 4, 4);
        for y in 0..3 {
            let cell = grid.get_index(5, y);
            grid.set_tag(cell, CellTag::Wall);
        }
        let table = build_regions(&mut grid);
        let left = grid.tag(grid.get_index(0, 0)).region().unwrap();
        let middle = grid.tag(grid.get_index(4, 0)).region().unwrap();
        let right = grid.tag(grid.get_index(8, 0)).region().unwrap();

        let subgoals = compress_subgoals(&grid, &table, left, &[middle, right], 64).unwrap();
        assert_eq!(
            subgoals,
            vec![table.get(middle).unwrap().rep, table.get(right).unwrap().rep]
        );
    }

    #[test]
    fn index_tracks_sparse_ids() {
        let (grid, table) = corridor(2);
        let mut db = SubgoalDatabase::build(&grid, &table, &AbstractionConfig::default()).unwrap();
        db.rows.retain(|row| row.region != RegionId(REGION_ID_OFFSET));
        db.regenerate_index();
        assert_eq!(db.row_index, vec![None, Some(0)]);
        assert!(db.row(RegionId(0)).is_none(), "ids below the offset never index");
    }
}
