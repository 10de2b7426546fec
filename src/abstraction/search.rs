use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{error, warn};
use crate::fixed_math::FixedNum;
use super::error::{AbstractionError, AbstractionResult};
use super::grid::Grid;
use super::types::{octile_distance, CellId, LocalPath};

/// Open-set entry. Ordered so the max-heap pops the lowest f, then the
/// lowest h, then the lowest cell id; the expansion order is fully determined
/// by the inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct State {
    f: FixedNum,
    h: FixedNum,
    cell: CellId,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.h.cmp(&self.h))
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn heuristic(grid: &Grid, from: CellId, to: CellId) -> FixedNum {
    let (ax, ay) = grid.coords(from);
    let (bx, by) = grid.coords(to);
    octile_distance(ax, ay, bx, by)
}

fn reconstruct_path(came_from: &FxHashMap<CellId, CellId>, mut current: CellId, cost: FixedNum) -> LocalPath {
    let mut cells = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        current = prev;
        cells.push(current);
    }
    cells.reverse();
    LocalPath { cells, cost }
}

/// Bounded 8-connected A* over the cells accepted by `allowed`.
///
/// Octile costs with a consistent octile heuristic, so the returned cost is
/// optimal. `cap` bounds the number of expansions; running out is an error
/// rather than a silent miss so the caller can tell a degenerate map from an
/// unreachable goal.
pub fn bounded_astar(
    grid: &Grid,
    start: CellId,
    goal: CellId,
    allowed: impl Fn(CellId) -> bool,
    cap: usize,
) -> AbstractionResult<LocalPath> {
    if start == goal {
        return Ok(LocalPath::trivial(start));
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: FxHashMap<CellId, CellId> = FxHashMap::default();
    let mut g_score: FxHashMap<CellId, FixedNum> = FxHashMap::default();
    let mut closed: FxHashSet<CellId> = FxHashSet::default();

    let h0 = heuristic(grid, start, goal);
    g_score.insert(start, FixedNum::ZERO);
    open_set.push(State { f: h0, h: h0, cell: start });

    let mut iterations = 0usize;
    while let Some(State { cell: current, .. }) = open_set.pop() {
        if !closed.insert(current) {
            continue;
        }
        iterations += 1;
        if iterations > cap {
            error!(
                "[SEARCH] A* exceeded max iterations ({}) from {} to {}",
                cap, start, goal
            );
            return Err(AbstractionError::SearchExhausted { start, goal, cap });
        }

        let g = g_score.get(&current).copied().unwrap_or(FixedNum::MAX);
        if current == goal {
            return Ok(reconstruct_path(&came_from, current, g));
        }

        for (dir, next) in grid.neighbors(current) {
            if closed.contains(&next) || !grid.is_open(next) || !allowed(next) {
                continue;
            }
            let tentative = g + dir.step_cost();
            if tentative < g_score.get(&next).copied().unwrap_or(FixedNum::MAX) {
                came_from.insert(next, current);
                g_score.insert(next, tentative);
                let h = heuristic(grid, next, goal);
                open_set.push(State { f: tentative + h, h, cell: next });
            }
        }
    }

    Err(AbstractionError::Unreachable { start, goal })
}

/// Greedy walk from `start` to `goal` over allowed cells.
///
/// Each step moves to the neighbor with the smallest octile distance to the
/// goal (lowest cell id on ties) and must strictly decrease that distance.
/// Returns `None` when the walk gets stuck or takes more than `cap` steps.
/// This is the reachability test used to drop intermediate subgoals.
pub fn greedy_walk(
    grid: &Grid,
    start: CellId,
    goal: CellId,
    allowed: impl Fn(CellId) -> bool,
    cap: usize,
) -> Option<LocalPath> {
    let mut current = start;
    let mut cells = vec![start];
    let mut cost = FixedNum::ZERO;
    let mut remaining = heuristic(grid, start, goal);

    for _ in 0..cap {
        if current == goal {
            return Some(LocalPath { cells, cost });
        }
        let mut best: Option<(FixedNum, CellId, FixedNum)> = None;
        for (dir, next) in grid.neighbors(current) {
            if !grid.is_open(next) || !allowed(next) {
                continue;
            }
            let dist = heuristic(grid, next, goal);
            if dist >= remaining {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_dist, best_cell, _)) => dist < best_dist || (dist == best_dist && next < best_cell),
            };
            if better {
                best = Some((dist, next, dir.step_cost()));
            }
        }
        let (dist, next, step) = best?;
        current = next;
        remaining = dist;
        cost += step;
        cells.push(next);
    }

    if current == goal {
        return Some(LocalPath { cells, cost });
    }
    warn!("[SEARCH] Greedy walk from {} to {} hit step cap {}", start, goal, cap);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::types::diagonal_cost;

    fn open_grid(w: usize, h: usize) -> Grid {
        Grid::new(w, h, 16)
    }

    fn wall(grid: &mut Grid, x: usize, y: usize) {
        let cell = grid.get_index(x, y);
        grid.set_tag(cell, super::super::types::CellTag::Wall);
    }

    #[test]
    fn astar_straight_and_diagonal_costs() {
        let grid = open_grid(5, 5);
        let path = bounded_astar(&grid, grid.get_index(0, 0), grid.get_index(4, 0), |_| true, 1000).unwrap();
        assert_eq!(path.cost, FixedNum::from_num(4));
        assert_eq!(path.cells.len(), 5);

        let path = bounded_astar(&grid, grid.get_index(0, 0), grid.get_index(3, 3), |_| true, 1000).unwrap();
        assert_eq!(path.cost, diagonal_cost() * FixedNum::from_num(3));
    }

    #[test]
    fn astar_routes_around_wall() {
        let mut grid = open_grid(5, 5);
        for y in 0..4 {
            wall(&mut grid, 2, y);
        }
        let path = bounded_astar(&grid, grid.get_index(0, 0), grid.get_index(4, 0), |_| true, 1000).unwrap();
        assert!(path.cost > FixedNum::from_num(4), "detour must cost more than the straight line");
        assert!(path.cells.iter().all(|&c| grid.is_open(c)));
    }

    #[test]
    fn astar_reports_exhaustion_and_unreachable() {
        let mut grid = open_grid(5, 5);
        for y in 0..5 {
            wall(&mut grid, 2, y);
        }
        let err = bounded_astar(&grid, grid.get_index(0, 0), grid.get_index(4, 0), |_| true, 1000).unwrap_err();
        assert!(matches!(err, AbstractionError::Unreachable { .. }));

        let grid = open_grid(30, 30);
        let err = bounded_astar(&grid, grid.get_index(0, 0), grid.get_index(29, 29), |_| true, 3).unwrap_err();
        assert!(matches!(err, AbstractionError::SearchExhausted { cap: 3, .. }));
    }

    #[test]
    fn greedy_walk_gets_stuck_behind_concave_wall() {
        let mut grid = open_grid(7, 7);
        // U-shaped wall opening to the west, goal to the east
        for y in 1..6 {
            wall(&mut grid, 4, y);
        }
        wall(&mut grid, 3, 1);
        wall(&mut grid, 3, 5);
        let start = grid.get_index(2, 3);
        let goal = grid.get_index(6, 3);
        assert!(greedy_walk(&grid, start, goal, |_| true, 100).is_none());
        assert!(bounded_astar(&grid, start, goal, |_| true, 1000).is_ok());

        let clear = grid.get_index(0, 0);
        let walked = greedy_walk(&grid, clear, grid.get_index(2, 0), |_| true, 100).unwrap();
        assert_eq!(walked.cost, FixedNum::from_num(2));
    }
}
