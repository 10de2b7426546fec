use std::collections::BTreeSet;
use tracing::debug;
use super::builder::{abstract_sector, records_from_components};
use super::error::{AbstractionError, AbstractionResult, EditPhase};
use super::grid::Grid;
use super::neighbors::{repair_neighbors, NeighborRepair};
use super::region::{IdAllocator, RegionTable};
use super::types::{CellTag, RegionId, SectorId};

/// What a sector re-abstraction changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reabstraction {
    /// Ids removed from the table. Some may be live again in `created`.
    pub dissolved: BTreeSet<RegionId>,
    /// Regions built from the freed cells, in seed order.
    pub created: Vec<RegionId>,
}

impl Reabstraction {
    /// Ids the database must treat as dirty.
    pub fn dirty_ids(&self) -> BTreeSet<RegionId> {
        self.dissolved.iter().chain(self.created.iter()).copied().collect()
    }
}

/// Dissolve `dissolve` and re-cluster the freed cells of one sector.
///
/// # Algorithm
/// 1. Tombstone every dissolved record, remembering its neighbor set.
/// 2. Reset every sector cell carrying a dissolved id to `Unassigned`. This
///    includes cells tagged with a dissolved id that were never recorded as
///    members, such as a freshly reopened cell carrying its anchor id.
/// 3. Flood the sector's `Unassigned` cells into components; ids come from
///    the dissolved set first, then above the table maximum.
/// 4. Build records with centroid reps, insert them and repair adjacency.
///
/// Regions of the sector that were not dissolved keep their ids, members and
/// reps.
pub fn reabstract_sector(
    grid: &mut Grid,
    table: &mut RegionTable,
    sector: SectorId,
    dissolve: &BTreeSet<RegionId>,
) -> AbstractionResult<Reabstraction> {
    let bounds = grid.sector_bounds(sector);
    let mut former_neighbors = BTreeSet::new();

    for &id in dissolve {
        let record = table.remove(id).ok_or_else(|| {
            AbstractionError::invariant(EditPhase::Reabstract, None, format!("cannot dissolve {id}: no live record"))
        })?;
        if record.sector != sector {
            return Err(AbstractionError::invariant(
                EditPhase::Reabstract,
                Some(record.rep),
                format!(
                    "{id} lives in sector ({}, {}), not ({}, {})",
                    record.sector.x, record.sector.y, sector.x, sector.y
                ),
            ));
        }
        former_neighbors.extend(record.neighbors);
    }

    let cells: Vec<_> = grid.cells_in(bounds).collect();
    for cell in cells {
        if let CellTag::Region(id) = grid.tag(cell) {
            if dissolve.contains(&id) {
                grid.set_tag(cell, CellTag::Unassigned);
            }
        }
    }

    let mut ids = IdAllocator::new(table, dissolve);
    let components = abstract_sector(grid, bounds, |tag| tag == CellTag::Unassigned, &mut ids);
    let mut created = Vec::with_capacity(components.len());
    for record in records_from_components(grid, components) {
        created.push(record.id);
        table.insert(record);
    }

    let repair = NeighborRepair {
        targets: created.iter().copied().collect(),
        tombstoned: dissolve.iter().filter(|id| !created.contains(id)).copied().collect(),
        former_neighbors,
    };
    repair_neighbors(grid, table, &repair)?;

    debug!(
        "[REABSTRACT] Sector ({}, {}): dissolved {:?} -> created {:?}",
        sector.x, sector.y, dissolve, created
    );

    Ok(Reabstraction {
        dissolved: dissolve.clone(),
        created,
    })
}
