use fixedbitset::FixedBitSet;
use kestrel_macros::profile;
use std::collections::VecDeque;
use tracing::{debug, info};
use super::grid::Grid;
use super::neighbors::derive_neighbors;
use super::region::{GroupRecord, IdAllocator, RegionTable};
use super::types::{CellId, CellTag, RegionId, SectorBounds};

/// Cluster one sector's dirty cells into 8-connected components.
///
/// Algorithm: row-major seed scan over the bounding box; every dirty cell not
/// yet visited seeds a breadth-first flood restricted to the box and to dirty
/// cells. Each component gets the next id from `ids` and its cells are tagged
/// with it as they are reached, so the returned member lists are in flood
/// order (first entry is the seed).
///
/// The seed order makes the result a pure function of the sector contents:
/// the same cells always produce the same components in the same order.
pub fn abstract_sector(
    grid: &mut Grid,
    bounds: SectorBounds,
    dirty: impl Fn(CellTag) -> bool,
    ids: &mut IdAllocator,
) -> Vec<(RegionId, Vec<CellId>)> {
    let mut visited = FixedBitSet::with_capacity(bounds.area());
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    let seeds: Vec<CellId> = grid.cells_in(bounds).collect();
    for seed in seeds {
        let (sx, sy) = grid.coords(seed);
        if visited.contains(bounds.local_index(sx, sy)) || !dirty(grid.tag(seed)) {
            continue;
        }

        let id = ids.allocate();
        let mut members = Vec::new();
        visited.insert(bounds.local_index(sx, sy));
        queue.push_back(seed);

        while let Some(cell) = queue.pop_front() {
            grid.set_tag(cell, CellTag::Region(id));
            members.push(cell);

            for (_, next) in grid.neighbors(cell) {
                let (nx, ny) = grid.coords(next);
                if !bounds.contains(nx, ny) {
                    continue;
                }
                let local = bounds.local_index(nx, ny);
                if visited.contains(local) || !dirty(grid.tag(next)) {
                    continue;
                }
                visited.insert(local);
                queue.push_back(next);
            }
        }

        components.push((id, members));
    }

    components
}

/// Pick the member closest to the region's centroid.
///
/// Distances are compared as `(n·x − Σx)² + (n·y − Σy)²` in integers, so no
/// rounding is involved; ties go to the lowest cell id. The choice depends
/// only on the member set.
pub fn recompute_representative(grid: &Grid, members: &[CellId]) -> Option<CellId> {
    let n = members.len() as i128;
    if n == 0 {
        return None;
    }
    let (sum_x, sum_y) = members.iter().fold((0i128, 0i128), |(sx, sy), &cell| {
        let (x, y) = grid.coords(cell);
        (sx + x as i128, sy + y as i128)
    });

    let mut best: Option<(i128, CellId)> = None;
    for &cell in members {
        let (x, y) = grid.coords(cell);
        let dx = n * x as i128 - sum_x;
        let dy = n * y as i128 - sum_y;
        let dist = dx * dx + dy * dy;
        let better = match best {
            None => true,
            Some((best_dist, best_cell)) => dist < best_dist || (dist == best_dist && cell < best_cell),
        };
        if better {
            best = Some((dist, cell));
        }
    }
    best.map(|(_, cell)| cell)
}

/// Turn freshly clustered components into records with final reps.
///
/// The first cell of each component is the provisional rep until the
/// centroid selection replaces it.
pub(crate) fn records_from_components(
    grid: &Grid,
    components: Vec<(RegionId, Vec<CellId>)>,
) -> Vec<GroupRecord> {
    let mut records = Vec::with_capacity(components.len());
    for (id, cells) in components {
        let Some(&first) = cells.first() else { continue };
        let mut record = GroupRecord::seed(id, first, grid.sector_of(first));
        for &cell in &cells[1..] {
            record.absorb(cell);
        }
        if let Some(rep) = recompute_representative(grid, &record.members) {
            record.rep = rep;
        }
        records.push(record);
    }
    records
}

/// Full abstraction of a map: every sector clustered in row-major order with
/// sequential ids, then adjacency derived from the tagged grid.
///
/// Any previous region tags on `grid` are discarded first.
#[profile(5)]
pub fn build_regions(grid: &mut Grid) -> RegionTable {
    *grid = grid.unassigned_copy();
    let mut ids = IdAllocator::sequential();
    let mut table = RegionTable::new();

    let sectors: Vec<_> = grid.sectors().collect();
    for sector in sectors {
        let bounds = grid.sector_bounds(sector);
        let components = abstract_sector(grid, bounds, |tag| tag == CellTag::Unassigned, &mut ids);
        if !components.is_empty() {
            debug!("[BUILD] Sector ({}, {}): {} regions", sector.x, sector.y, components.len());
        }
        for record in records_from_components(grid, components) {
            table.insert(record);
        }
    }

    let ids: Vec<RegionId> = table.ids().collect();
    for id in ids {
        let neighbors = match table.get(id) {
            Some(record) => derive_neighbors(grid, record),
            None => continue,
        };
        if let Some(record) = table.get_mut(id) {
            record.neighbors = neighbors;
        }
    }

    info!(
        "[BUILD] Abstracted {}x{} map into {} regions across {} sectors",
        grid.width(),
        grid.height(),
        table.len(),
        grid.sectors_x() * grid.sectors_y()
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_column_splits_sector_into_two_regions() {
        let mut grid = Grid::new(6, 4, 8);
        for y in 0..4 {
            let cell = grid.get_index(2, y);
            grid.set_tag(cell, CellTag::Wall);
        }
        let table = build_regions(&mut grid);
        assert_eq!(table.len(), 2, "wall column should separate left and right");
        let left = table.get(RegionId(2)).expect("first region");
        assert_eq!(left.cell_count(), 8);
        assert!(left.neighbors.is_empty(), "same-sector regions split by a wall are not adjacent");
    }

    #[test]
    fn diagonal_gap_keeps_cells_connected() {
        // .#
        // #.
        let mut grid = Grid::from_walkable(2, 2, 4, &[true, false, false, true]).unwrap();
        let table = build_regions(&mut grid);
        assert_eq!(table.len(), 1, "diagonal steps between walls connect cells");
    }

    #[test]
    fn representative_is_member_nearest_centroid() {
        let grid = Grid::new(5, 1, 8);
        let members: Vec<CellId> = (0..5).map(CellId).collect();
        assert_eq!(recompute_representative(&grid, &members), Some(CellId(2)));

        // Even count: two members tie, the lower id wins.
        let members: Vec<CellId> = (0..4).map(CellId).collect();
        assert_eq!(recompute_representative(&grid, &members), Some(CellId(1)));
    }

    #[test]
    fn sectors_never_share_regions() {
        let mut grid = Grid::new(8, 8, 4);
        let table = build_regions(&mut grid);
        assert_eq!(table.len(), 4, "one region per sector on an open map");
        for record in table.iter() {
            assert_eq!(record.cell_count(), 16);
            assert_eq!(record.neighbors.len(), 3, "each quadrant touches the other three");
        }
    }
}
