use std::collections::BTreeSet;
use tracing::debug;
use super::error::{AbstractionError, AbstractionResult, EditPhase};
use super::grid::Grid;
use super::region::{GroupRecord, RegionTable};
use super::types::RegionId;

/// Regions adjacent to `record`: every foreign region owning an 8-neighbor
/// of one of its members.
pub fn derive_neighbors(grid: &Grid, record: &GroupRecord) -> BTreeSet<RegionId> {
    let mut found = BTreeSet::new();
    for &cell in &record.members {
        for (_, next) in grid.neighbors(cell) {
            if let Some(other) = grid.tag(next).region() {
                if other != record.id {
                    found.insert(other);
                }
            }
        }
    }
    found
}

/// Scope of one adjacency repair.
#[derive(Clone, Debug, Default)]
pub struct NeighborRepair {
    /// Live regions whose adjacency is recomputed from the grid.
    pub targets: BTreeSet<RegionId>,
    /// Ids removed from the table during this edit.
    pub tombstoned: BTreeSet<RegionId>,
    /// Neighbor sets of the tombstoned or changed records before the edit,
    /// so stale back-references can be found without scanning the table.
    pub former_neighbors: BTreeSet<RegionId>,
}

impl NeighborRepair {
    pub fn for_targets(targets: impl IntoIterator<Item = RegionId>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            ..Default::default()
        }
    }
}

/// Rebuild adjacency for the repair targets and drop stale references.
///
/// 1. Every region that pointed at a target or a tombstoned id loses those
///    entries.
/// 2. Each target's neighbor set is derived from the grid and mirrored onto
///    the regions it touches.
///
/// Regions outside the touched set keep every adjacency they had that does
/// not involve a target or tombstoned id. Returns the regions whose neighbor
/// sets were written.
pub fn repair_neighbors(
    grid: &Grid,
    table: &mut RegionTable,
    repair: &NeighborRepair,
) -> AbstractionResult<BTreeSet<RegionId>> {
    let mut touched: BTreeSet<RegionId> = repair.former_neighbors.clone();
    for &target in &repair.targets {
        let record = table.get(target).ok_or_else(|| {
            AbstractionError::invariant(
                EditPhase::RepairNeighbors,
                None,
                format!("repair target {target} is not a live region"),
            )
        })?;
        touched.extend(record.neighbors.iter().copied());
    }

    // Step 1: clear stale back-references
    for &id in &touched {
        if repair.targets.contains(&id) {
            continue;
        }
        if let Some(record) = table.get_mut(id) {
            record
                .neighbors
                .retain(|n| !repair.targets.contains(n) && !repair.tombstoned.contains(n));
        }
    }

    // Step 2: derive and mirror
    for &target in &repair.targets {
        let derived = match table.get(target) {
            Some(record) => derive_neighbors(grid, record),
            None => continue,
        };
        for &other in &derived {
            if !table.contains(other) {
                return Err(AbstractionError::invariant(
                    EditPhase::RepairNeighbors,
                    None,
                    format!("{target} touches {other}, which has no record"),
                ));
            }
            table.link(target, other);
            touched.insert(other);
        }
        if let Some(record) = table.get_mut(target) {
            record.neighbors = derived;
        }
        touched.insert(target);
    }

    debug!(
        "[NEIGHBORS] Repaired {} targets, {} tombstoned, {} regions touched",
        repair.targets.len(),
        repair.tombstoned.len(),
        touched.len()
    );
    Ok(touched)
}
