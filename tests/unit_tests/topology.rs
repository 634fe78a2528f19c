use vanadis::topology::{BoundaryConditions, BoxSide, BoxTopology, PatchInterface, PatchSide};

#[test]
fn side_indices_follow_the_conventional_ordering() {
    assert_eq!(BoxSide::lower(0).index(), 1); // west
    assert_eq!(BoxSide::upper(0).index(), 2); // east
    assert_eq!(BoxSide::lower(1).index(), 3); // south
    assert_eq!(BoxSide::upper(1).index(), 4); // north
    assert_eq!(BoxSide::lower(2).index(), 5); // front
    assert_eq!(BoxSide::upper(2).index(), 6); // back

    for index in 1..=6 {
        assert_eq!(BoxSide::from_index(index).index(), index);
    }
}

#[test]
fn inferred_maps_for_facing_sides() {
    let bi = PatchInterface::with_inferred_maps(
        PatchSide::new(0, BoxSide::upper(0)),
        PatchSide::new(1, BoxSide::lower(0)),
        2,
    );
    assert_eq!(bi.dir_map(), &[0, 1]);
    // Facing sides preserve the sense of the normal direction
    assert_eq!(bi.dir_orientation(), &[true, true]);
}

#[test]
fn inferred_maps_for_sides_facing_the_same_way() {
    let bi = PatchInterface::with_inferred_maps(
        PatchSide::new(0, BoxSide::upper(0)),
        PatchSide::new(1, BoxSide::upper(0)),
        2,
    );
    assert_eq!(bi.dir_map(), &[0, 1]);
    assert_eq!(bi.dir_orientation(), &[false, true]);
}

#[test]
fn interface_maps_are_validated() {
    let first = PatchSide::new(0, BoxSide::upper(0));
    let second = PatchSide::new(1, BoxSide::lower(0));
    // Not a permutation
    assert!(PatchInterface::new(first, second, vec![0, 0], vec![true, true]).is_err());
    // Normal directions not paired
    assert!(PatchInterface::new(first, second, vec![1, 0], vec![true, true]).is_err());
    assert!(PatchInterface::new(first, second, vec![0, 1], vec![true, true]).is_ok());
}

#[test]
fn each_side_joins_at_most_one_interface() {
    let mut topology = BoxTopology::new(2);
    let p0 = topology.add_box();
    let p1 = topology.add_box();
    let p2 = topology.add_box();

    topology
        .add_interface(p0, BoxSide::upper(0), p1, BoxSide::lower(0))
        .unwrap();
    // The east side of p0 is already matched
    let result = topology.add_interface(p0, BoxSide::upper(0), p2, BoxSide::lower(0));
    assert!(result.is_err());
}

#[test]
fn unknown_patches_are_rejected() {
    let mut topology = BoxTopology::new(2);
    topology.add_box();
    assert!(topology
        .add_interface(0, BoxSide::upper(0), 7, BoxSide::lower(0))
        .is_err());
}

#[test]
fn auto_boundaries_cover_all_unmatched_sides() {
    let mut topology = BoxTopology::new(2);
    let p0 = topology.add_box();
    let p1 = topology.add_box();
    topology
        .add_interface(p0, BoxSide::upper(0), p1, BoxSide::lower(0))
        .unwrap();
    topology.add_auto_boundaries();

    assert_eq!(topology.boundaries().len(), 6);
    for patch in 0..2 {
        for index in 1..=4 {
            assert!(topology.is_assigned(PatchSide::new(patch, BoxSide::from_index(index))));
        }
    }
}

#[test]
fn dirichlet_sides_are_filtered_by_unknown() {
    let mut bc = BoundaryConditions::new();
    bc.add_dirichlet(PatchSide::new(0, BoxSide::lower(0)), 0);
    bc.add_dirichlet(PatchSide::new(0, BoxSide::upper(0)), 1);
    assert_eq!(bc.dirichlet_sides(0).count(), 1);
    assert_eq!(bc.dirichlet_sides(1).count(), 1);
    assert_eq!(bc.dirichlet_sides(2).count(), 0);
}
