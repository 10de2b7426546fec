use std::collections::BTreeSet;
use super::error::{AbstractionError, AbstractionResult, EditPhase, ExpectedCell};
use super::grid::{Grid, Neighborhood};
use super::region::RegionTable;
use super::types::{CellId, CellTag, Direction, RegionId};

/// Corner triples checked for diagonal cut-off: (axis, corner, axis).
const CORNERS: [(Direction, Direction, Direction); 4] = [
    (Direction::North, Direction::NorthEast, Direction::East),
    (Direction::East, Direction::SouthEast, Direction::South),
    (Direction::South, Direction::SouthWest, Direction::West),
    (Direction::West, Direction::NorthWest, Direction::North),
];

/// Which local patterns suggest the new wall may split its region.
///
/// These are necessary conditions only. Axis candidates still need the
/// connectivity oracle; diagonal candidates are accepted as they are.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitionCandidates {
    /// North and south are both outside the region: west and east may be cut apart.
    pub vertical: bool,
    /// East and west are both outside the region: north and south may be cut apart.
    pub horizontal: bool,
    /// A corner member is reachable from the cell only diagonally.
    pub diagonal: bool,
}

impl PartitionCandidates {
    pub fn any(&self) -> bool {
        self.vertical || self.horizontal || self.diagonal
    }
}

/// Outcome of classifying a wall addition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddCase {
    /// The cell is its region's only member; the region disappears.
    Elimination { region: RegionId },
    /// No split pattern; the region just shrinks by one cell.
    InteriorRemoval { region: RegionId },
    /// A split pattern was found and must be confirmed.
    SuspectedPartition {
        region: RegionId,
        candidates: PartitionCandidates,
    },
}

/// Outcome of classifying a wall removal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoveCase {
    /// No open neighbor: a singleton region is born.
    SurroundedByWalls,
    /// At least one open neighbor shares the cell's sector. `anchor` is read
    /// from a neighboring cell; `touched` are every same-sector region around
    /// the cell, all of which merge.
    SameSector {
        anchor: RegionId,
        touched: BTreeSet<RegionId>,
    },
    /// Every open neighbor lies in another sector.
    CrossSector { touched: BTreeSet<RegionId> },
}

/// Inspect a cell about to be blocked.
///
/// Fails fast when the cell is already a wall, before anything is mutated.
pub fn classify_wall_addition(grid: &Grid, table: &RegionTable, cell: CellId) -> AbstractionResult<AddCase> {
    let region = match grid.tag(cell) {
        CellTag::Region(id) => id,
        CellTag::Wall => {
            return Err(AbstractionError::PreconditionViolation {
                cell,
                expected: ExpectedCell::Open,
            })
        }
        other => {
            return Err(AbstractionError::invariant(
                EditPhase::Classify,
                Some(cell),
                format!("open cell carries {other:?} instead of a region"),
            ))
        }
    };

    let record = table
        .get(region)
        .ok_or_else(|| AbstractionError::invariant(EditPhase::Classify, Some(cell), format!("{region} has no record")))?;

    if record.cell_count() == 1 {
        return Ok(AddCase::Elimination { region });
    }

    let candidates = partition_candidates(&grid.neighborhood(cell), region);
    if candidates.any() {
        Ok(AddCase::SuspectedPartition { region, candidates })
    } else {
        Ok(AddCase::InteriorRemoval { region })
    }
}

/// Local split patterns around a cell of `region`.
///
/// Axis rule: an axis is flagged when neither neighbor on it is a member of
/// the region. Inside a sector at least two cells wide this is exactly "both
/// walls, or one wall and the other foreign"; it also catches truncated
/// one-cell edge sectors where both sides are foreign.
///
/// Diagonal rule: both axis neighbors of a corner are walls while the corner
/// itself is a member.
pub fn partition_candidates(hood: &Neighborhood, region: RegionId) -> PartitionCandidates {
    let member = |dir: Direction| hood.get(dir).is_member_of(region);

    let vertical = !member(Direction::North) && !member(Direction::South);
    let horizontal = !member(Direction::East) && !member(Direction::West);
    let diagonal = CORNERS.iter().any(|&(a, corner, b)| {
        hood.get(a).is_wall() && hood.get(b).is_wall() && member(corner)
    });

    PartitionCandidates {
        vertical,
        horizontal,
        diagonal,
    }
}

/// Inspect a wall cell about to be opened.
///
/// Fails fast when the cell is already open.
pub fn classify_wall_removal(grid: &Grid, cell: CellId) -> AbstractionResult<RemoveCase> {
    if grid.tag(cell) != CellTag::Wall {
        return Err(AbstractionError::PreconditionViolation {
            cell,
            expected: ExpectedCell::Wall,
        });
    }

    let hood = grid.neighborhood(cell);
    if hood.all_blocked() {
        return Ok(RemoveCase::SurroundedByWalls);
    }

    let bounds = grid.sector_bounds(grid.sector_of(cell));
    let mut same_sector = BTreeSet::new();
    let mut touched = BTreeSet::new();
    let mut anchor = None;

    for (dir, next) in grid.neighbors(cell) {
        let tag = hood.get(dir);
        if !tag.is_open() {
            continue;
        }
        let Some(id) = tag.region() else {
            return Err(AbstractionError::invariant(
                EditPhase::Classify,
                Some(next),
                "open neighbor has no region",
            ));
        };
        touched.insert(id);
        if grid.in_sector(next, &bounds) {
            same_sector.insert(id);
            if anchor.is_none() {
                anchor = Some(id);
            }
        }
    }

    match anchor {
        Some(anchor) => Ok(RemoveCase::SameSector {
            anchor,
            touched: same_sector,
        }),
        None => Ok(RemoveCase::CrossSector { touched }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: RegionId = RegionId(5);
    const OTHER: RegionId = RegionId(9);

    fn hood(pattern: [CellTag; 8]) -> Neighborhood {
        Neighborhood { tags: pattern }
    }

    // Index order: N, S, E, W, NE, NW, SE, SW
    const W: CellTag = CellTag::Wall;
    const M: CellTag = CellTag::Region(R);
    const F: CellTag = CellTag::Region(OTHER);
    const O: CellTag = CellTag::OutOfBounds;

    #[test]
    fn continuous_vertical_wall_flags_vertical_axis() {
        let c = partition_candidates(&hood([W, W, M, M, M, M, M, M]), R);
        assert!(c.vertical);
        assert!(!c.horizontal);
        assert!(!c.diagonal);
    }

    #[test]
    fn wall_next_to_foreign_region_flags_axis() {
        let c = partition_candidates(&hood([M, M, W, F, M, M, M, M]), R);
        assert!(c.horizontal, "east wall + foreign west should flag the horizontal axis");
        let c = partition_candidates(&hood([O, W, M, M, M, M, M, M]), R);
        assert!(c.vertical, "out of bounds counts as foreign, never as wall");
    }

    #[test]
    fn corner_reachable_only_diagonally_is_flagged() {
        // N and E walls, NE member
        let c = partition_candidates(&hood([W, M, W, M, M, M, M, M]), R);
        assert!(c.diagonal);
        // NE wall too: nothing to cut off
        let c = partition_candidates(&hood([W, M, W, M, W, M, M, M]), R);
        assert!(!c.diagonal);
    }

    #[test]
    fn interior_cell_has_no_candidates() {
        let c = partition_candidates(&hood([M, M, M, M, W, W, W, W]), R);
        assert!(!c.any());
        let c = partition_candidates(&hood([W, M, M, M, W, W, M, M]), R);
        assert!(!c.any(), "single wall on one axis cannot split anything");
    }
}
