use kestrel::abstraction::{AbstractionError, CellId, DynamicAbstraction, EditOutcome};
use kestrel::config::AbstractionConfig;
use kestrel::maps::random_map;

/// Helper: abstraction of a seeded random map with small sectors so edits
/// cross sector borders often.
fn random_abstraction(width: usize, height: usize, density: f64, seed: u64, levels: usize) -> DynamicAbstraction {
    let map = random_map(width, height, density, seed);
    let config = AbstractionConfig {
        grid_size: 4,
        num_neighbour_levels: levels,
        verify_after_edit: true,
        ..Default::default()
    };
    DynamicAbstraction::new(map.width, map.height, &map.walkable, config).expect("build should succeed")
}

fn toggle(dynamic: &mut DynamicAbstraction, cell: CellId) -> Result<EditOutcome, AbstractionError> {
    if dynamic.grid().is_open(cell) {
        dynamic.add_wall(cell)
    } else {
        dynamic.remove_wall(cell)
    }
}

/// Compare the incremental export with a rebuild; dump both as JSON on mismatch.
fn assert_equivalent(dynamic: &DynamicAbstraction, context: &str) {
    let incremental = dynamic.export_bytes().expect("export");
    let rebuilt = dynamic.rebuild().expect("rebuild");
    let expected = rebuilt.export_bytes().expect("export");
    if incremental != expected {
        let ours = serde_json::to_string_pretty(&dynamic.snapshot().expect("snapshot")).unwrap_or_default();
        let theirs = serde_json::to_string_pretty(&rebuilt.snapshot().expect("snapshot")).unwrap_or_default();
        println!("=== incremental ===\n{}", ours);
        println!("=== rebuild ===\n{}", theirs);
        panic!("{}: incremental export differs from full rebuild", context);
    }
}

fn fuzz(seed: u64, width: usize, height: usize, density: f64, levels: usize, edits: usize) {
    let mut dynamic = random_abstraction(width, height, density, seed, levels);
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut cases = std::collections::BTreeMap::new();

    for i in 0..edits {
        let cell = CellId(rng.usize(0..width * height));
        let outcome = toggle(&mut dynamic, cell)
            .unwrap_or_else(|e| panic!("seed {} edit {} at {}: {}", seed, i, cell, e));
        *cases.entry(format!("{:?}", outcome.case)).or_insert(0usize) += 1;
        assert_equivalent(&dynamic, &format!("seed {} edit {} at {} ({:?})", seed, i, cell, outcome.case));
    }

    println!("seed {}: {} edits, cases {:?}", seed, edits, cases);
}

#[test]
fn test_random_toggles_match_rebuild_sparse_maps() {
    for seed in 1..=4 {
        fuzz(seed, 16, 12, 0.2, 2, 60);
    }
}

#[test]
fn test_random_toggles_match_rebuild_dense_maps() {
    // Dense maps produce many tiny regions, singletons and diagonal squeezes.
    for seed in 10..=13 {
        fuzz(seed, 13, 11, 0.45, 2, 60);
    }
}

#[test]
fn test_random_toggles_match_rebuild_three_levels() {
    for seed in 20..=21 {
        fuzz(seed, 16, 16, 0.3, 3, 40);
    }
}

#[test]
fn test_add_then_remove_restores_export() {
    let mut dynamic = random_abstraction(16, 16, 0.3, 99, 2);
    let mut rng = fastrand::Rng::with_seed(99);

    for _ in 0..40 {
        let cell = CellId(rng.usize(0..16 * 16));
        let before = dynamic.export_bytes().unwrap();
        toggle(&mut dynamic, cell).unwrap();
        toggle(&mut dynamic, cell).unwrap();
        assert_eq!(dynamic.export_bytes().unwrap(), before, "double toggle of {} should be a no-op", cell);
    }
}

#[test]
fn test_build_is_deterministic() {
    let a = random_abstraction(20, 20, 0.3, 5, 2);
    let b = random_abstraction(20, 20, 0.3, 5, 2);
    assert_eq!(a.export_bytes().unwrap(), b.export_bytes().unwrap(), "same map should export identically");
    assert_eq!(a.regions(), b.regions(), "same map should assign the same ids");
}
