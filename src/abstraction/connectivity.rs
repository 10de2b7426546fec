use fixedbitset::FixedBitSet;
use std::collections::VecDeque;
use tracing::{debug, warn};
use super::classifier::PartitionCandidates;
use super::grid::Grid;
use super::types::{CellId, Direction, RegionId};

/// How a partition was established.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionEvidence {
    /// Reachability search failed across a flagged axis.
    AxisConfirmed,
    /// Diagonal cut-off pattern, accepted without a search. A heuristic:
    /// false positives only cost a redundant sector re-abstraction.
    Diagonal,
}

/// Verdict of the connectivity oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionVerdict {
    Intact,
    Partitioned(PartitionEvidence),
}

/// 8-connected reachability between two cells over cells tagged `region`.
///
/// Regions never leave their sector, so the search is bounded to the
/// sector of `start`.
pub fn is_connected(grid: &Grid, start: CellId, goal: CellId, region: RegionId) -> bool {
    if !grid.tag(start).is_member_of(region) || !grid.tag(goal).is_member_of(region) {
        return false;
    }
    if start == goal {
        return true;
    }

    let bounds = grid.sector_bounds(grid.sector_of(start));
    let mut visited = FixedBitSet::with_capacity(bounds.area());
    let mut queue = VecDeque::new();
    let (sx, sy) = grid.coords(start);
    visited.insert(bounds.local_index(sx, sy));
    queue.push_back(start);

    while let Some(cell) = queue.pop_front() {
        for (_, next) in grid.neighbors(cell) {
            if next == goal {
                return true;
            }
            let (nx, ny) = grid.coords(next);
            if !bounds.contains(nx, ny) || !grid.tag(next).is_member_of(region) {
                continue;
            }
            let local = bounds.local_index(nx, ny);
            if visited.contains(local) {
                continue;
            }
            visited.insert(local);
            queue.push_back(next);
        }
    }
    false
}

/// Every cell reachable from `start` over cells tagged `region`, in BFS order.
pub fn flood_region(grid: &Grid, start: CellId, region: RegionId) -> Vec<CellId> {
    if !grid.tag(start).is_member_of(region) {
        return Vec::new();
    }
    let bounds = grid.sector_bounds(grid.sector_of(start));
    let mut visited = FixedBitSet::with_capacity(bounds.area());
    let (sx, sy) = grid.coords(start);
    visited.insert(bounds.local_index(sx, sy));
    let mut reached = vec![start];
    let mut head = 0;
    while head < reached.len() {
        let cell = reached[head];
        head += 1;
        for (_, next) in grid.neighbors(cell) {
            let (nx, ny) = grid.coords(next);
            if !bounds.contains(nx, ny) || !grid.tag(next).is_member_of(region) {
                continue;
            }
            let local = bounds.local_index(nx, ny);
            if !visited.contains(local) {
                visited.insert(local);
                reached.push(next);
            }
        }
    }
    reached
}

/// Decide whether blocking `cell` split `region`.
///
/// Must run after the cell has been tagged as a wall. For each flagged axis
/// whose two sides are both members, search from one side to the other; a
/// failed search confirms the partition. A side that is not a member cannot
/// be separated from anything, so that axis is left unconfirmed. Diagonal
/// candidates are accepted without a search. Pure: the grid is not touched.
pub fn confirm_partition(
    grid: &Grid,
    cell: CellId,
    region: RegionId,
    candidates: PartitionCandidates,
) -> PartitionVerdict {
    let axes = [
        (candidates.vertical, Direction::West, Direction::East),
        (candidates.horizontal, Direction::North, Direction::South),
    ];

    for (flagged, side_a, side_b) in axes {
        if !flagged {
            continue;
        }
        let (Some(a), Some(b)) = (grid.neighbor(cell, side_a), grid.neighbor(cell, side_b)) else {
            continue;
        };
        if !grid.tag(a).is_member_of(region) || !grid.tag(b).is_member_of(region) {
            continue;
        }
        if !is_connected(grid, a, b, region) {
            debug!("[ORACLE] {} split across {:?}/{:?} at {}", region, side_a, side_b, cell);
            return PartitionVerdict::Partitioned(PartitionEvidence::AxisConfirmed);
        }
    }

    if candidates.diagonal {
        warn!(
            "[ORACLE] Accepting unconfirmed diagonal partition of {} at {} (structural ambiguity)",
            region, cell
        );
        return PartitionVerdict::Partitioned(PartitionEvidence::Diagonal);
    }

    PartitionVerdict::Intact
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::builder::build_regions;
    use super::super::types::CellTag;

    fn grid_from(rows: &[&str], grid_size: usize) -> Grid {
        let height = rows.len();
        let width = rows[0].len();
        let walkable: Vec<bool> = rows.iter().flat_map(|r| r.chars().map(|c| c == '.')).collect();
        Grid::from_walkable(width, height, grid_size, &walkable).unwrap()
    }

    #[test]
    fn corridor_cut_confirms_axis_partition() {
        let mut grid = grid_from(&["#####", ".....", "#####"], 8);
        let table = build_regions(&mut grid);
        let region = table.ids().next().unwrap();
        let cell = grid.get_index(2, 1);
        grid.set_tag(cell, CellTag::Wall);
        let candidates = PartitionCandidates { vertical: true, horizontal: false, diagonal: false };
        assert_eq!(
            confirm_partition(&grid, cell, region, candidates),
            PartitionVerdict::Partitioned(PartitionEvidence::AxisConfirmed)
        );
    }

    #[test]
    fn loop_around_wall_stays_intact() {
        let mut grid = grid_from(&["...", "...", "..."], 8);
        let table = build_regions(&mut grid);
        let region = table.ids().next().unwrap();
        let cell = grid.get_index(1, 1);
        grid.set_tag(cell, CellTag::Wall);
        let candidates = PartitionCandidates { vertical: true, horizontal: true, diagonal: false };
        assert_eq!(confirm_partition(&grid, cell, region, candidates), PartitionVerdict::Intact);
    }

    #[test]
    fn search_stays_inside_region() {
        let mut grid = grid_from(&["....", "....", "...."], 2);
        let _ = build_regions(&mut grid);
        let a = grid.get_index(0, 0);
        let b = grid.get_index(3, 0);
        let region = grid.tag(a).region().unwrap();
        assert!(!is_connected(&grid, a, b, region), "cells in another sector are never reached");
    }
}
