use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use crate::fixed_math::FixedNum;
use super::database::SubgoalDatabase;
use super::error::{AbstractionError, AbstractionResult, EditPhase};
use super::grid::Grid;
use super::region::RegionTable;
use super::types::{CellId, RegionId, DATABASE_VERSION};

/// Persisted form of the abstraction and its database.
///
/// Regions appear in ascending rep order and refer to each other by position
/// in that order, so two abstractions of the same map serialize identically
/// whatever ids their regions carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub grid_size: u32,
    pub levels: u32,
    pub regions: Vec<RegionSnapshot>,
    /// `(a, b, cost)` with `a < b`, sorted.
    pub links: Vec<(u32, u32, FixedNum)>,
    /// Sorted by `(from, to)`.
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub rep: CellId,
    pub cell_count: u32,
    pub members: Vec<CellId>,
    pub neighbors: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub from: u32,
    pub to: u32,
    pub cost: FixedNum,
    pub hops: u32,
    pub subgoals: Vec<CellId>,
}

fn canonical(index: &BTreeMap<RegionId, u32>, id: RegionId) -> AbstractionResult<u32> {
    index.get(&id).copied().ok_or_else(|| {
        AbstractionError::invariant(EditPhase::Export, None, format!("{id} is referenced but not live"))
    })
}

/// Canonical snapshot of a table and its database.
pub fn build_snapshot(grid: &Grid, table: &RegionTable, db: &SubgoalDatabase) -> AbstractionResult<DatabaseSnapshot> {
    let mut ordered: Vec<_> = table.iter().collect();
    ordered.sort_by_key(|record| record.rep);
    let index: BTreeMap<RegionId, u32> = ordered
        .iter()
        .enumerate()
        .map(|(position, record)| (record.id, position as u32))
        .collect();

    let mut regions = Vec::with_capacity(ordered.len());
    for record in &ordered {
        let mut neighbors = record
            .neighbors
            .iter()
            .map(|&id| canonical(&index, id))
            .collect::<AbstractionResult<Vec<u32>>>()?;
        neighbors.sort_unstable();
        regions.push(RegionSnapshot {
            rep: record.rep,
            cell_count: record.cell_count() as u32,
            members: record.members.clone(),
            neighbors,
        });
    }

    let mut links = Vec::new();
    for (&(a, b), &cost) in db.base_costs() {
        let (ca, cb) = (canonical(&index, a)?, canonical(&index, b)?);
        links.push((ca.min(cb), ca.max(cb), cost));
    }
    links.sort_unstable();

    let mut entries = Vec::with_capacity(db.entry_count());
    for row in db.rows() {
        let from = canonical(&index, row.region)?;
        for (&target, entry) in &row.entries {
            entries.push(EntrySnapshot {
                from,
                to: canonical(&index, target)?,
                cost: entry.cost,
                hops: entry.hops,
                subgoals: entry.subgoals.clone(),
            });
        }
    }
    entries.sort_unstable_by_key(|entry| (entry.from, entry.to));

    Ok(DatabaseSnapshot {
        version: DATABASE_VERSION,
        width: grid.width() as u32,
        height: grid.height() as u32,
        grid_size: grid.grid_size() as u32,
        levels: db.levels() as u32,
        regions,
        links,
        entries,
    })
}

/// bincode inside zlib, the on-disk format.
pub fn snapshot_bytes(snapshot: &DatabaseSnapshot) -> AbstractionResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    bincode::serialize_into(&mut encoder, snapshot)?;
    Ok(encoder.finish()?)
}

pub fn save_snapshot(path: &Path, snapshot: &DatabaseSnapshot) -> AbstractionResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    bincode::serialize_into(&mut encoder, snapshot)?;
    encoder.finish()?.flush()?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> AbstractionResult<DatabaseSnapshot> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut decoder = ZlibDecoder::new(reader);
    let snapshot: DatabaseSnapshot = bincode::deserialize_from(&mut decoder)?;
    if snapshot.version != DATABASE_VERSION {
        return Err(AbstractionError::MapFormat(format!(
            "database version {} (expected {})",
            snapshot.version, DATABASE_VERSION
        )));
    }
    Ok(snapshot)
}
