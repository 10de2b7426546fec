use crate::fixed_math::FixedNum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest region id handed out by the builder and allocators.
///
/// Ids below this value were raw wall/empty codes in the persisted format, so
/// the offset is kept to stay compatible with exported databases even though
/// in-memory cells use [`CellTag`] instead of magic numbers.
pub const REGION_ID_OFFSET: u32 = 2;

/// Default sector edge length in cells.
pub const DEFAULT_GRID_SIZE: usize = 16;

/// Version written at the head of every exported database.
pub const DATABASE_VERSION: u32 = 1;

/// Index of a cell in the row-major grid (`y * width + x`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub usize);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Region identifier, unique among live regions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u32);

impl RegionId {
    /// Slot in dense id-indexed storage (the database row index).
    #[inline]
    pub fn slot(self) -> usize {
        (self.0 - REGION_ID_OFFSET) as usize
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Sector coordinates (column, row) in sector units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorId {
    pub x: usize,
    pub y: usize,
}

impl SectorId {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// State of one grid cell.
///
/// `OutOfBounds` is never stored in the grid. Neighborhood inspection
/// produces it for off-map neighbors so that it never compares equal to a
/// wall or to any region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellTag {
    Wall,
    OutOfBounds,
    Unassigned,
    Region(RegionId),
}

impl CellTag {
    #[inline]
    pub fn is_wall(self) -> bool {
        self == CellTag::Wall
    }

    /// Walkable cell, assigned or not.
    #[inline]
    pub fn is_open(self) -> bool {
        matches!(self, CellTag::Unassigned | CellTag::Region(_))
    }

    #[inline]
    pub fn region(self) -> Option<RegionId> {
        match self {
            CellTag::Region(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn is_member_of(self, region: RegionId) -> bool {
        self == CellTag::Region(region)
    }
}

/// Eight-way neighbor directions.
///
/// The repr(u8) ensures zero-cost conversion to array indices into a
/// [`Neighborhood`](crate::abstraction::grid::Neighborhood).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North = 0,
    South = 1,
    East = 2,
    West = 3,
    NorthEast = 4,
    NorthWest = 5,
    SouthEast = 6,
    SouthWest = 7,
}

impl Direction {
    #[inline]
    pub fn as_index(self) -> usize {
        self as usize
    }

    /// All eight directions (cardinal + diagonal)
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    /// Grid offset. North is towards row 0, matching the text map layout.
    #[inline]
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, -1),
            Direction::NorthWest => (-1, -1),
            Direction::SouthEast => (1, 1),
            Direction::SouthWest => (-1, 1),
        }
    }

    #[inline]
    pub fn is_diagonal(self) -> bool {
        self.as_index() >= 4
    }

    /// Cost of one step in this direction (octile metric).
    #[inline]
    pub fn step_cost(self) -> FixedNum {
        if self.is_diagonal() {
            diagonal_cost()
        } else {
            FixedNum::from_num(1)
        }
    }
}

/// Cost of a diagonal step, √2 in fixed point.
#[inline]
pub fn diagonal_cost() -> FixedNum {
    FixedNum::from_num(std::f64::consts::SQRT_2)
}

/// Octile distance between two coordinates.
#[inline]
pub fn octile_distance(ax: usize, ay: usize, bx: usize, by: usize) -> FixedNum {
    let dx = ax.abs_diff(bx);
    let dy = ay.abs_diff(by);
    let (lo, hi) = if dx < dy { (dx, dy) } else { (dy, dx) };
    FixedNum::from_num(hi - lo) + diagonal_cost() * FixedNum::from_num(lo)
}

/// Inclusive bounding box of one sector, in cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorBounds {
    pub sector: SectorId,
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl SectorBounds {
    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Index of `(x, y)` inside this box, row-major. Caller guarantees containment.
    #[inline]
    pub fn local_index(&self, x: usize, y: usize) -> usize {
        (y - self.min_y) * self.width() + (x - self.min_x)
    }
}

/// Result of a grid-level search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalPath {
    pub cells: Vec<CellId>,
    pub cost: FixedNum,
}

impl LocalPath {
    pub fn trivial(cell: CellId) -> Self {
        Self {
            cells: vec![cell],
            cost: FixedNum::ZERO,
        }
    }
}
