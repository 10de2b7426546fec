use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use super::types::{CellId, RegionId, SectorId, REGION_ID_OFFSET};

/// One region: a maximal 8-connected set of open cells inside a sector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: RegionId,
    /// Representative cell, the canonical endpoint for inter-region paths.
    /// Always a member.
    pub rep: CellId,
    /// Member cells, sorted ascending.
    pub members: Vec<CellId>,
    /// Adjacent regions. Symmetric across the table.
    pub neighbors: BTreeSet<RegionId>,
    pub sector: SectorId,
}

impl GroupRecord {
    /// New record whose first cell is both provisional member and rep.
    pub fn seed(id: RegionId, cell: CellId, sector: SectorId) -> Self {
        Self {
            id,
            rep: cell,
            members: vec![cell],
            neighbors: BTreeSet::new(),
            sector,
        }
    }

    /// Add a cell found later in the flood fill.
    pub fn absorb(&mut self, cell: CellId) {
        match self.members.binary_search(&cell) {
            Ok(_) => {}
            Err(pos) => self.members.insert(pos, cell),
        }
    }

    /// Remove a member. Returns false when the cell was not a member.
    pub fn release(&mut self, cell: CellId) -> bool {
        match self.members.binary_search(&cell) {
            Ok(pos) => {
                self.members.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn contains(&self, cell: CellId) -> bool {
        self.members.binary_search(&cell).is_ok()
    }
}

/// Live region table, keyed by id.
///
/// Removing a record tombstones its id: nothing refers to it afterwards
/// until one of the creation paths hands it out again.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionTable {
    groups: BTreeMap<RegionId, GroupRecord>,
}

impl RegionTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[inline]
    pub fn get(&self, id: RegionId) -> Option<&GroupRecord> {
        self.groups.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut GroupRecord> {
        self.groups.get_mut(&id)
    }

    #[inline]
    pub fn contains(&self, id: RegionId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn insert(&mut self, record: GroupRecord) -> Option<GroupRecord> {
        self.groups.insert(record.id, record)
    }

    /// Tombstone a region, returning its last record.
    pub fn remove(&mut self, id: RegionId) -> Option<GroupRecord> {
        self.groups.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupRecord> {
        self.groups.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.groups.keys().copied()
    }

    pub fn max_id(&self) -> Option<RegionId> {
        self.groups.keys().next_back().copied()
    }

    /// Lowest id at or above the offset that is not live.
    ///
    /// Equals `len() + REGION_ID_OFFSET` whenever live ids are dense, which is
    /// what the singleton creation paths expect.
    pub fn fresh_id(&self) -> RegionId {
        let mut candidate = REGION_ID_OFFSET;
        for &id in self.groups.keys() {
            if id.0 != candidate {
                break;
            }
            candidate += 1;
        }
        RegionId(candidate)
    }

    /// First id above the current maximum.
    pub fn next_id_above_max(&self) -> RegionId {
        self.max_id().map_or(RegionId(REGION_ID_OFFSET), |id| RegionId(id.0 + 1))
    }

    /// Add `b` to `a`'s neighbors and vice versa.
    pub fn link(&mut self, a: RegionId, b: RegionId) {
        if a == b {
            return;
        }
        if let Some(record) = self.groups.get_mut(&a) {
            record.neighbors.insert(b);
        }
        if let Some(record) = self.groups.get_mut(&b) {
            record.neighbors.insert(a);
        }
    }
}

/// Hands out region ids for one re-abstraction: dissolved ids first
/// (ascending), then ids above the table's maximum.
#[derive(Debug)]
pub struct IdAllocator {
    reusable: Vec<RegionId>,
    next: u32,
}

impl IdAllocator {
    pub fn new(table: &RegionTable, dissolved: &BTreeSet<RegionId>) -> Self {
        let above = table.next_id_above_max().0;
        let highest_dissolved = dissolved.iter().next_back().map_or(0, |id| id.0 + 1);
        Self {
            reusable: dissolved.iter().rev().copied().collect(),
            next: above.max(highest_dissolved).max(REGION_ID_OFFSET),
        }
    }

    /// Sequential ids starting at the offset, for the full builder.
    pub fn sequential() -> Self {
        Self {
            reusable: Vec::new(),
            next: REGION_ID_OFFSET,
        }
    }

    pub fn allocate(&mut self) -> RegionId {
        if let Some(id) = self.reusable.pop() {
            return id;
        }
        let id = RegionId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, cells: &[usize]) -> GroupRecord {
        let mut rec = GroupRecord::seed(RegionId(id), CellId(cells[0]), SectorId::new(0, 0));
        for &c in &cells[1..] {
            rec.absorb(CellId(c));
        }
        rec
    }

    #[test]
    fn members_stay_sorted() {
        let rec = record(2, &[9, 3, 7, 1]);
        assert_eq!(rec.members, vec![CellId(1), CellId(3), CellId(7), CellId(9)]);
        assert_eq!(rec.rep, CellId(9), "seed cell stays provisional rep");
    }

    #[test]
    fn fresh_id_fills_gaps() {
        let mut table = RegionTable::new();
        assert_eq!(table.fresh_id(), RegionId(REGION_ID_OFFSET));
        for id in [2, 3, 5] {
            table.insert(record(id, &[id as usize]));
        }
        assert_eq!(table.fresh_id(), RegionId(4));
        table.insert(record(4, &[4]));
        assert_eq!(table.fresh_id(), RegionId(6));
        assert_eq!(table.fresh_id().0 as usize, table.len() + REGION_ID_OFFSET as usize);
    }

    #[test]
    fn allocator_reuses_dissolved_then_grows() {
        let mut table = RegionTable::new();
        for id in [2, 3, 7] {
            table.insert(record(id, &[id as usize]));
        }
        let dissolved: BTreeSet<_> = [RegionId(3), RegionId(9)].into_iter().collect();
        table.remove(RegionId(3));
        let mut alloc = IdAllocator::new(&table, &dissolved);
        assert_eq!(alloc.allocate(), RegionId(3));
        assert_eq!(alloc.allocate(), RegionId(9));
        assert_eq!(alloc.allocate(), RegionId(10));
    }
}
