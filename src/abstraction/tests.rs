//! Tests for grid geometry, classification on real grids and the edit dispatcher

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::AbstractionConfig;

    /// `.` open, anything else blocked.
    fn mask(rows: &[&str]) -> (usize, usize, Vec<bool>) {
        let height = rows.len();
        let width = rows[0].len();
        let walkable = rows.iter().flat_map(|r| r.chars().map(|c| c == '.')).collect();
        (width, height, walkable)
    }

    fn grid_from(rows: &[&str], grid_size: usize) -> Grid {
        let (w, h, walkable) = mask(rows);
        Grid::from_walkable(w, h, grid_size, &walkable).unwrap()
    }

    fn abstraction(rows: &[&str], grid_size: usize) -> DynamicAbstraction {
        let (w, h, walkable) = mask(rows);
        let config = AbstractionConfig {
            grid_size,
            verify_after_edit: true,
            ..Default::default()
        };
        DynamicAbstraction::new(w, h, &walkable, config).unwrap()
    }

    fn assert_matches_rebuild(dynamic: &DynamicAbstraction) {
        let incremental = dynamic.export_bytes().unwrap();
        let rebuilt = dynamic.rebuild().unwrap().export_bytes().unwrap();
        assert_eq!(incremental, rebuilt, "incremental export should equal a full rebuild");
    }

    // ========================================================================
    // Grid geometry
    // ========================================================================

    #[test]
    fn test_sector_bounds_truncate_at_map_edge() {
        let grid = Grid::new(10, 7, 4);
        assert_eq!(grid.sectors_x(), 3);
        assert_eq!(grid.sectors_y(), 2);
        let bounds = grid.sector_bounds(SectorId::new(2, 1));
        assert_eq!((bounds.min_x, bounds.max_x, bounds.min_y, bounds.max_y), (8, 9, 4, 6));
        assert_eq!(bounds.area(), 6);
        assert_eq!(grid.sector_of(grid.get_index(9, 6)), SectorId::new(2, 1));
    }

    #[test]
    fn test_neighborhood_reports_out_of_bounds() {
        let grid = Grid::new(3, 3, 4);
        let hood = grid.neighborhood(CellId(0));
        for dir in [Direction::North, Direction::West, Direction::NorthWest, Direction::NorthEast, Direction::SouthWest] {
            assert_eq!(hood.get(dir), CellTag::OutOfBounds, "{:?} is off the map", dir);
        }
        assert_eq!(hood.get(Direction::SouthEast), CellTag::Unassigned);
        assert!(!hood.all_blocked());
        assert_eq!(grid.neighbors(CellId(4)).len(), 8);
    }

    #[test]
    fn test_cell_at_rejects_off_map_coordinates() {
        let grid = Grid::new(4, 2, 4);
        let err = grid.cell_at(4, 0).unwrap_err();
        assert!(matches!(err, AbstractionError::CellOutOfBounds { x: 4, y: 0, width: 4, height: 2 }));
        assert_eq!(grid.cell_at(3, 1).unwrap(), CellId(7));
    }

    // ========================================================================
    // Classification on built grids
    // ========================================================================

    #[test]
    fn test_classify_wall_addition_cases() {
        let mut grid = grid_from(&["#.#..", "#####", "....."], 8);
        let table = build_regions(&mut grid);

        let lone = grid.get_index(1, 0);
        let case = classify_wall_addition(&grid, &table, lone).unwrap();
        assert!(matches!(case, AddCase::Elimination { .. }));

        let corridor = grid.get_index(2, 2);
        match classify_wall_addition(&grid, &table, corridor).unwrap() {
            AddCase::SuspectedPartition { candidates, .. } => {
                assert!(candidates.vertical, "wall above and map edge below");
                assert!(!candidates.horizontal);
            }
            other => panic!("expected a suspected partition, got {:?}", other),
        }

        let err = classify_wall_addition(&grid, &table, grid.get_index(0, 0)).unwrap_err();
        assert!(matches!(err, AbstractionError::PreconditionViolation { expected: ExpectedCell::Open, .. }));
    }

    #[test]
    fn test_open_block_center_is_interior() {
        let mut grid = grid_from(&["...", "...", "..."], 4);
        let table = build_regions(&mut grid);
        let case = classify_wall_addition(&grid, &table, grid.get_index(1, 1)).unwrap();
        assert!(matches!(case, AddCase::InteriorRemoval { .. }));
    }

    #[test]
    fn test_classify_wall_removal_cases() {
        let grid = {
            let mut g = grid_from(&["###", "###", "###"], 4);
            let _ = build_regions(&mut g);
            g
        };
        assert_eq!(classify_wall_removal(&grid, grid.get_index(1, 1)).unwrap(), RemoveCase::SurroundedByWalls);

        let mut grid = grid_from(&[".#.."], 4);
        let _ = build_regions(&mut grid);
        let left = grid.tag(grid.get_index(0, 0)).region().unwrap();
        let right = grid.tag(grid.get_index(2, 0)).region().unwrap();
        match classify_wall_removal(&grid, grid.get_index(1, 0)).unwrap() {
            RemoveCase::SameSector { anchor, touched } => {
                assert_eq!(anchor, right, "east is inspected before west");
                assert_eq!(touched.into_iter().collect::<Vec<_>>(), vec![left, right]);
            }
            other => panic!("expected same-sector reopening, got {:?}", other),
        }

        let mut grid = grid_from(&["..##...."], 4);
        let _ = build_regions(&mut grid);
        let east = grid.tag(grid.get_index(4, 0)).region().unwrap();
        match classify_wall_removal(&grid, grid.get_index(3, 0)).unwrap() {
            RemoveCase::CrossSector { touched } => assert_eq!(touched.into_iter().collect::<Vec<_>>(), vec![east]),
            other => panic!("expected cross-sector reopening, got {:?}", other),
        }

        let err = classify_wall_removal(&grid, grid.get_index(0, 0)).unwrap_err();
        assert!(matches!(err, AbstractionError::PreconditionViolation { expected: ExpectedCell::Wall, .. }));
    }

    // ========================================================================
    // Dispatcher
    // ========================================================================

    #[test]
    fn test_corridor_split_and_merge_round_trip() {
        let mut dynamic = abstraction(&["######", "......", "######"], 8);
        let original = dynamic.export_bytes().unwrap();
        let cell = dynamic.cell_at(2, 1).unwrap();

        let outcome = dynamic.add_wall(cell).unwrap();
        assert_eq!(
            outcome.case,
            EditCase::Partition { evidence: PartitionEvidence::AxisConfirmed }
        );
        assert_eq!((outcome.regions_before, outcome.regions_after), (1, 2));
        assert_matches_rebuild(&dynamic);

        let outcome = dynamic.remove_wall(cell).unwrap();
        assert_eq!(outcome.case, EditCase::SameSectorMerge);
        assert_eq!(outcome.regions_after, 1);
        assert_eq!(dynamic.export_bytes().unwrap(), original, "split then merge restores the export");
    }

    #[test]
    fn test_interior_removal_moves_rep_and_patches_rows() {
        let mut dynamic = abstraction(&["........", "........", "........", "........"], 4);
        let cell = dynamic.cell_at(1, 1).unwrap();
        let region = dynamic.region_of(cell).unwrap().unwrap();
        assert_eq!(dynamic.regions().get(region).unwrap().rep, cell);

        let outcome = dynamic.add_wall(cell).unwrap();
        assert_eq!(outcome.case, EditCase::InteriorRemoval { suspected: false });
        assert_ne!(dynamic.regions().get(region).unwrap().rep, cell, "rep must move off the wall");
        assert!(outcome.patch.rows_recomputed >= 2, "both regions' rows depend on the moved rep");
        assert_matches_rebuild(&dynamic);
    }

    #[test]
    fn test_freed_id_is_reused_by_singleton() {
        let mut dynamic = abstraction(&["#.#.."], 8);
        let lone = dynamic.cell_at(1, 0).unwrap();
        let lone_id = dynamic.region_of(lone).unwrap().unwrap();

        let outcome = dynamic.add_wall(lone).unwrap();
        assert_eq!(outcome.case, EditCase::Elimination);
        assert!(!dynamic.regions().contains(lone_id));
        assert!(dynamic.database().row(lone_id).is_none());

        let outcome = dynamic.remove_wall(lone).unwrap();
        assert_eq!(outcome.case, EditCase::SurroundedByWalls);
        assert_eq!(dynamic.region_of(lone).unwrap(), Some(lone_id), "lowest free id is handed out");
        assert_eq!(dynamic.regions().get(lone_id).unwrap().rep, lone);
        assert_eq!(dynamic.database().row_index(), &[Some(0), Some(1)]);
    }

    #[test]
    fn test_flagged_axis_without_two_member_sides_stays_interior() {
        // Blocking (1, 0): north is off the map and south is a wall, but east
        // is a wall too, so there is nothing on the far side to cut off.
        let mut dynamic = abstraction(&["..#", ".##", "###"], 4);
        let cell = dynamic.cell_at(1, 0).unwrap();
        let outcome = dynamic.add_wall(cell).unwrap();
        assert_eq!(outcome.case, EditCase::InteriorRemoval { suspected: true });
        assert_eq!(outcome.regions_after, outcome.regions_before);
        assert_matches_rebuild(&dynamic);
    }

    #[test]
    fn test_diagonal_cut_is_accepted_without_search() {
        // (2, 0) hangs off (1, 1) by a diagonal step between two walls.
        let mut dynamic = abstraction(&["##.", "..#", "###"], 4);
        let cell = dynamic.cell_at(1, 1).unwrap();
        let outcome = dynamic.add_wall(cell).unwrap();
        assert_eq!(outcome.case, EditCase::Partition { evidence: PartitionEvidence::Diagonal });
        assert_eq!((outcome.regions_before, outcome.regions_after), (1, 2));
        assert_matches_rebuild(&dynamic);
    }

    #[test]
    fn test_out_of_bounds_edit_is_rejected() {
        let mut dynamic = abstraction(&["...."], 4);
        let err = dynamic.add_wall(CellId(99)).unwrap_err();
        assert!(matches!(err, AbstractionError::CellOutOfBounds { .. }));
        assert!(dynamic.verify_invariants().is_ok(), "nothing was mutated");
    }
}
