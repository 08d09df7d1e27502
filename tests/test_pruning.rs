use peakmetrics::core::{DivideTree, DivideTreeBuilder, IslandTree, Peak, PeakId, Saddle};
use peakmetrics::{CoordinateSystem, Elevation, ElevationUnit, Offsets, Tile};
use ndarray::Array2;
use std::collections::BTreeSet;

fn terrain() -> Tile {
    // Summits 90, 70, 100, 50, 85 separated by saddles 30, 40, 20, 35
    let ridge = [0, 90, 30, 70, 40, 100, 20, 50, 35, 85, 0];
    let mut data = Array2::from_elem((3, ridge.len()), 0);
    for (x, &e) in ridge.iter().enumerate() {
        data[[1, x]] = e;
    }
    // Let the 85 ridge run off the east edge
    data[[1, ridge.len() - 1]] = 60;
    Tile::new(
        data,
        CoordinateSystem::new(46.0, 7.0, -1.0 / 3600.0, 1.0 / 3600.0),
        ElevationUnit::Feet,
    )
    .expect("Failed to create tile")
}

fn survivors(tree: &DivideTree) -> BTreeSet<PeakId> {
    tree.peaks().map(|(id, _)| id).collect()
}

fn pruned(tree: &DivideTree, threshold: Elevation) -> DivideTree {
    let island = IslandTree::build(tree);
    let mut copy = tree.clone();
    copy.prune(threshold, &island);
    copy
}

#[test]
fn test_pruning_is_monotonic() {
    let tree = DivideTreeBuilder::new(&terrain()).build().expect("Failed to build divide tree");
    assert_eq!(tree.peak_count(), 5);

    let mut previous = survivors(&tree);
    for threshold in (0..=110).step_by(5) {
        let tree = pruned(&tree, threshold);
        tree.validate().expect("Pruned tree is inconsistent");
        let current = survivors(&tree);
        assert!(
            current.is_subset(&previous),
            "Survivors at {} are not a subset of the lower threshold's",
            threshold
        );
        previous = current;
    }
}

#[test]
fn test_survivors_meet_threshold_after_rederivation() {
    let tree = DivideTreeBuilder::new(&terrain()).build().expect("Failed to build divide tree");
    for threshold in [10, 40, 55, 65, 95] {
        let tree = pruned(&tree, threshold);
        let island = IslandTree::build(&tree);
        for (id, node) in island.nodes() {
            assert!(node.prominence >= 0);
            assert_eq!(node.key_saddle.is_none(), node.parent.is_none(), "Peak {}", id);
        }
    }
}

fn peak_with_elevation(tree: &DivideTree, elevation: Elevation) -> PeakId {
    tree.peaks()
        .find(|(_, p)| p.elevation == elevation)
        .map(|(id, _)| id)
        .expect("No peak at that elevation")
}

#[test]
fn test_pruning_keeps_lowest_col_on_ridge() {
    let ridge = [0, 100, 40, 60, 50, 90, 0];
    let mut data = Array2::from_elem((3, ridge.len()), 0);
    for (x, &e) in ridge.iter().enumerate() {
        data[[1, x]] = e;
    }
    let tile = Tile::new(
        data,
        CoordinateSystem::new(46.0, 7.0, -1.0 / 3600.0, 1.0 / 3600.0),
        ElevationUnit::Feet,
    )
    .expect("Failed to create tile");
    let mut tree = DivideTreeBuilder::new(&tile).build().expect("Failed to build divide tree");
    let summit = peak_with_elevation(&tree, 90);
    let knob = peak_with_elevation(&tree, 60);

    let provisional = IslandTree::build(&tree);
    assert_eq!(provisional.prominence(summit), Some(50));
    assert_eq!(provisional.prominence(knob), Some(10));

    tree.prune(20, &provisional);
    tree.validate().expect("Pruned tree is inconsistent");
    assert!(tree.peak(knob).is_none());

    let rederived = IslandTree::build(&tree);
    assert_eq!(rederived.prominence(summit), Some(50));
    let key = rederived
        .node(summit)
        .and_then(|node| node.key_saddle)
        .expect("Missing key saddle");
    assert_eq!(tree.saddle(key).map(|s| s.elevation), Some(40));
}

#[test]
fn test_pruning_changes_key_saddle_of_survivor() {
    // 120 -(50)- 60 -(50)- 90, rooted at the 120; the east col is numbered first
    let mut tree = DivideTree::new(CoordinateSystem::new(0.0, 0.0, -1.0, 1.0));
    let high = tree.add_peak(Peak { location: Offsets::new(0, 0), elevation: 120 });
    let low = tree.add_peak(Peak { location: Offsets::new(2, 0), elevation: 60 });
    let mid = tree.add_peak(Peak { location: Offsets::new(4, 0), elevation: 90 });
    let east = tree.add_saddle(Saddle { location: Offsets::new(3, 0), elevation: 50 });
    let west = tree.add_saddle(Saddle { location: Offsets::new(1, 0), elevation: 50 });
    tree.connect(low, high, west).expect("Failed to connect");
    tree.connect(mid, low, east).expect("Failed to connect");

    // The east col merges the 60 into the 90 first, so the 90 meets the 120 at the west col
    let provisional = IslandTree::build(&tree);
    assert_eq!(provisional.prominence(low), Some(10));
    assert_eq!(provisional.prominence(mid), Some(40));
    assert_eq!(provisional.node(mid).expect("Missing node").key_saddle, Some(west));

    // Equal cols: the parent edge wins, so the west col goes
    let removed = tree.prune(20, &provisional);
    assert_eq!(removed, 1);
    assert!(tree.peak(low).is_none());
    assert!(tree.saddle(west).is_none());

    let edge = tree.parent_edge(mid).expect("Survivor lost its parent");
    assert_eq!(edge.parent, high);
    assert_eq!(edge.saddle, east);

    // The provisional key saddle no longer exists; only a rebuilt island tree is usable
    let rederived = IslandTree::build(&tree);
    assert_eq!(rederived.prominence(mid), Some(40));
    assert_eq!(rederived.node(mid).expect("Missing node").key_saddle, Some(east));
    assert_ne!(
        rederived.node(mid).map(|n| n.key_saddle),
        provisional.node(mid).map(|n| n.key_saddle)
    );
}

#[test]
fn test_runoff_deletion_is_idempotent_and_topology_neutral() {
    let mut tree = DivideTreeBuilder::new(&terrain()).build().expect("Failed to build divide tree");
    assert!(!tree.runoffs().is_empty());
    let before = IslandTree::build(&tree);

    let removed = tree.delete_runoffs();
    assert!(removed > 0);
    let once = tree.clone();

    assert_eq!(tree.delete_runoffs(), 0);
    assert_eq!(tree, once);
    assert_eq!(IslandTree::build(&tree), before);
}

#[test]
fn test_divide_tree_file_round_trip() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("terrain.dvt");

    let tree = pruned(
        &DivideTreeBuilder::new(&terrain()).build().expect("Failed to build divide tree"),
        45,
    );
    tree.write_to_file(&path).expect("Failed to write divide tree");
    let loaded = DivideTree::read_from_file(&path).expect("Failed to read divide tree");
    assert_eq!(loaded, tree);

    std::fs::write(&path, b"not a divide tree").expect("Failed to overwrite file");
    assert!(DivideTree::read_from_file(&path).is_err());
}
