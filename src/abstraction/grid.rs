use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use super::error::{AbstractionError, AbstractionResult};
use super::types::{CellId, CellTag, Direction, SectorBounds, SectorId};

/// Walkable/blocked grid with per-cell region tags, divided into sectors.
///
/// # Layout
///
/// Row-major storage, `cell = y * width + x`. North is row 0. The map is
/// tiled by `grid_size × grid_size` sectors; sectors on the east and south
/// edges are truncated when the dimensions are not multiples of `grid_size`.
///
/// # Tags
///
/// - `Wall`: blocked
/// - `Unassigned`: open but not yet clustered (only during (re-)abstraction)
/// - `Region(id)`: open and owned by region `id`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    grid_size: usize,
    cells: Vec<CellTag>,
}

impl Grid {
    /// Fully open grid with every cell unassigned.
    pub fn new(width: usize, height: usize, grid_size: usize) -> Self {
        Self {
            width,
            height,
            grid_size: grid_size.max(1),
            cells: vec![CellTag::Unassigned; width * height],
        }
    }

    /// Build from a walkability mask (true = open).
    pub fn from_walkable(width: usize, height: usize, grid_size: usize, walkable: &[bool]) -> AbstractionResult<Self> {
        if walkable.len() != width * height {
            return Err(AbstractionError::MapFormat(format!(
                "walkability mask has {} cells, expected {}x{}",
                walkable.len(),
                width,
                height
            )));
        }
        let cells = walkable
            .iter()
            .map(|&open| if open { CellTag::Unassigned } else { CellTag::Wall })
            .collect();
        Ok(Self {
            width,
            height,
            grid_size: grid_size.max(1),
            cells,
        })
    }

    /// Copy of this grid with every open cell reset to `Unassigned`.
    /// The full rebuild starts from this.
    pub fn unassigned_copy(&self) -> Self {
        let cells = self
            .cells
            .iter()
            .map(|tag| if tag.is_open() { CellTag::Unassigned } else { CellTag::Wall })
            .collect();
        Self {
            width: self.width,
            height: self.height,
            grid_size: self.grid_size,
            cells,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn get_index(&self, x: usize, y: usize) -> CellId {
        CellId(y * self.width + x)
    }

    #[inline]
    pub fn coords(&self, cell: CellId) -> (usize, usize) {
        (cell.0 % self.width, cell.0 / self.width)
    }

    /// Checked coordinate lookup.
    pub fn cell_at(&self, x: usize, y: usize) -> AbstractionResult<CellId> {
        if x >= self.width || y >= self.height {
            return Err(AbstractionError::CellOutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(self.get_index(x, y))
    }

    #[inline]
    pub fn contains(&self, cell: CellId) -> bool {
        cell.0 < self.cells.len()
    }

    #[inline]
    pub fn tag(&self, cell: CellId) -> CellTag {
        self.cells[cell.0]
    }

    #[inline]
    pub fn set_tag(&mut self, cell: CellId, tag: CellTag) {
        self.cells[cell.0] = tag;
    }

    #[inline]
    pub fn is_open(&self, cell: CellId) -> bool {
        self.cells[cell.0].is_open()
    }

    pub fn open_cell_count(&self) -> usize {
        self.cells.iter().filter(|tag| tag.is_open()).count()
    }

    /// Walkability mask (true = open), independent of region tags.
    pub fn walkable_mask(&self) -> Vec<bool> {
        self.cells.iter().map(|tag| tag.is_open()).collect()
    }

    /// Neighbor of `cell` in direction `dir`, if it is on the map.
    #[inline]
    pub fn neighbor(&self, cell: CellId, dir: Direction) -> Option<CellId> {
        let (x, y) = self.coords(cell);
        let (dx, dy) = dir.offset();
        let nx = x.checked_add_signed(dx)?;
        let ny = y.checked_add_signed(dy)?;
        if nx >= self.width || ny >= self.height {
            return None;
        }
        Some(self.get_index(nx, ny))
    }

    /// On-map 8-neighbors with their direction.
    pub fn neighbors(&self, cell: CellId) -> SmallVec<[(Direction, CellId); 8]> {
        Direction::ALL
            .iter()
            .filter_map(|&dir| self.neighbor(cell, dir).map(|n| (dir, n)))
            .collect()
    }

    /// Tags of the eight neighbors, off-map ones reported as `OutOfBounds`.
    pub fn neighborhood(&self, cell: CellId) -> Neighborhood {
        let mut tags = [CellTag::OutOfBounds; 8];
        for dir in Direction::ALL {
            if let Some(n) = self.neighbor(cell, dir) {
                tags[dir.as_index()] = self.tag(n);
            }
        }
        Neighborhood { tags }
    }

    // ========================================================================
    // Sectors
    // ========================================================================

    pub fn sectors_x(&self) -> usize {
        self.width.div_ceil(self.grid_size)
    }

    pub fn sectors_y(&self) -> usize {
        self.height.div_ceil(self.grid_size)
    }

    #[inline]
    pub fn sector_of(&self, cell: CellId) -> SectorId {
        let (x, y) = self.coords(cell);
        SectorId::new(x / self.grid_size, y / self.grid_size)
    }

    pub fn sector_bounds(&self, sector: SectorId) -> SectorBounds {
        let min_x = sector.x * self.grid_size;
        let min_y = sector.y * self.grid_size;
        SectorBounds {
            sector,
            min_x,
            min_y,
            max_x: ((sector.x + 1) * self.grid_size).min(self.width) - 1,
            max_y: ((sector.y + 1) * self.grid_size).min(self.height) - 1,
        }
    }

    /// All sectors in row-major order (the order the builder scans them).
    pub fn sectors(&self) -> impl Iterator<Item = SectorId> + '_ {
        let cols = self.sectors_x();
        (0..self.sectors_y()).flat_map(move |sy| (0..cols).map(move |sx| SectorId::new(sx, sy)))
    }

    /// Cells of a sector in row-major order.
    pub fn cells_in(&self, bounds: SectorBounds) -> impl Iterator<Item = CellId> + '_ {
        (bounds.min_y..=bounds.max_y)
            .flat_map(move |y| (bounds.min_x..=bounds.max_x).map(move |x| self.get_index(x, y)))
    }

    pub fn in_sector(&self, cell: CellId, bounds: &SectorBounds) -> bool {
        let (x, y) = self.coords(cell);
        bounds.contains(x, y)
    }
}

/// Snapshot of the eight neighbor tags around one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Neighborhood {
    pub tags: [CellTag; 8],
}

impl Neighborhood {
    #[inline]
    pub fn get(&self, dir: Direction) -> CellTag {
        self.tags[dir.as_index()]
    }

    pub fn all_blocked(&self) -> bool {
        self.tags.iter().all(|tag| !tag.is_open())
    }
}
