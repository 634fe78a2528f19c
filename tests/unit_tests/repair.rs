use vanadis::htree::{ElementBox, HierarchicalTree};
use vanadis::repair::{find_mismatched_elements, find_mismatched_elements_2d};
use vanadis::topology::{BoxSide, PatchInterface, PatchSide};

fn facing_interface() -> PatchInterface {
    PatchInterface::with_inferred_maps(
        PatchSide::new(0, BoxSide::upper(0)),
        PatchSide::new(1, BoxSide::lower(0)),
        2,
    )
}

fn refined_tree() -> HierarchicalTree {
    let mut tree = HierarchicalTree::new(&[2, 2]);
    // Lower-right quadrant refined to level 1
    tree.refine(&ElementBox::new(1, vec![2, 0], vec![4, 2])).unwrap();
    tree
}

#[test]
fn coarse_side_of_a_mismatched_interface_is_detected() {
    let tree0 = refined_tree();
    let tree1 = HierarchicalTree::new(&[2, 2]);
    let bi = facing_interface();

    let (first, second) = find_mismatched_elements(&bi, &tree0, &tree1).unwrap();
    assert!(first.is_empty());
    assert_eq!(second, vec![ElementBox::new(1, vec![0, 0], vec![1, 2])]);
}

#[test]
fn matching_interface_yields_no_elements() {
    let tree0 = refined_tree();
    let mut tree1 = HierarchicalTree::new(&[2, 2]);
    tree1.refine(&ElementBox::new(1, vec![0, 0], vec![1, 2])).unwrap();
    let bi = facing_interface();

    let (first, second) = find_mismatched_elements(&bi, &tree0, &tree1).unwrap();
    assert!(first.is_empty() && second.is_empty());

    let (first, second) = find_mismatched_elements_2d(&bi, &tree0, &tree1).unwrap();
    assert!(first.is_empty() && second.is_empty());
}

#[test]
fn both_sides_can_need_refinement() {
    let tree0 = refined_tree();
    let mut tree1 = HierarchicalTree::new(&[2, 2]);
    // Upper half of the west face of the second patch refined to level 1
    tree1.refine(&ElementBox::new(1, vec![0, 2], vec![1, 4])).unwrap();
    let bi = facing_interface();

    let (first, second) = find_mismatched_elements(&bi, &tree0, &tree1).unwrap();
    assert_eq!(first, vec![ElementBox::new(1, vec![3, 2], vec![4, 4])]);
    assert_eq!(second, vec![ElementBox::new(1, vec![0, 0], vec![1, 2])]);
}

#[test]
fn reversed_orientation_flips_the_refinement_box() {
    let tree0 = refined_tree();
    let tree1 = HierarchicalTree::new(&[2, 2]);
    // East side against east side with reversed tangential orientation
    let bi = PatchInterface::new(
        PatchSide::new(0, BoxSide::upper(0)),
        PatchSide::new(1, BoxSide::upper(0)),
        vec![0, 1],
        vec![false, false],
    )
    .unwrap();

    let (first, second) = find_mismatched_elements(&bi, &tree0, &tree1).unwrap();
    assert!(first.is_empty());
    assert_eq!(second, vec![ElementBox::new(1, vec![3, 2], vec![4, 4])]);
}

#[test]
fn knot_merge_path_agrees_with_the_general_path() {
    let cases = [
        (refined_tree(), HierarchicalTree::new(&[2, 2]), facing_interface()),
        (
            refined_tree(),
            {
                let mut t = HierarchicalTree::new(&[2, 2]);
                t.refine(&ElementBox::new(1, vec![0, 2], vec![1, 4])).unwrap();
                t
            },
            facing_interface(),
        ),
        (
            refined_tree(),
            HierarchicalTree::new(&[2, 2]),
            PatchInterface::new(
                PatchSide::new(0, BoxSide::upper(0)),
                PatchSide::new(1, BoxSide::upper(0)),
                vec![0, 1],
                vec![false, false],
            )
            .unwrap(),
        ),
    ];

    for (tree0, tree1, bi) in &cases {
        let (mut gen0, mut gen1) = find_mismatched_elements(bi, tree0, tree1).unwrap();
        let (mut fast0, mut fast1) = find_mismatched_elements_2d(bi, tree0, tree1).unwrap();
        gen0.sort();
        gen1.sort();
        fast0.sort();
        fast1.sort();
        assert_eq!(gen0, fast0);
        assert_eq!(gen1, fast1);
    }
}

#[test]
fn transverse_interfaces_remap_through_the_direction_permutation() {
    let tree0 = refined_tree();
    let tree1 = HierarchicalTree::new(&[2, 2]);
    // East side of the first patch against the south side of the second:
    // the normal pairs with the second patch's y direction, so the inferred
    // map swaps the directions
    let bi = PatchInterface::with_inferred_maps(
        PatchSide::new(0, BoxSide::upper(0)),
        PatchSide::new(1, BoxSide::lower(1)),
        2,
    );
    assert_eq!(bi.dir_map(), &[1, 0]);

    // The refined lower half of the east face maps to the left half of the
    // south face
    let (first, second) = find_mismatched_elements(&bi, &tree0, &tree1).unwrap();
    assert!(first.is_empty());
    assert_eq!(second, vec![ElementBox::new(1, vec![0, 0], vec![2, 1])]);

    let (fast_first, fast_second) = find_mismatched_elements_2d(&bi, &tree0, &tree1).unwrap();
    assert!(fast_first.is_empty());
    assert_eq!(fast_second, second);
}

#[test]
fn knot_merge_path_rejects_3d_interfaces() {
    let tree0 = HierarchicalTree::new(&[2, 2, 2]);
    let tree1 = HierarchicalTree::new(&[2, 2, 2]);
    let bi = PatchInterface::with_inferred_maps(
        PatchSide::new(0, BoxSide::upper(0)),
        PatchSide::new(1, BoxSide::lower(0)),
        3,
    );
    let result = find_mismatched_elements_2d(&bi, &tree0, &tree1);
    assert!(result.is_err());
}

#[test]
fn general_path_handles_3d_interfaces() {
    let mut tree0 = HierarchicalTree::new(&[2, 2, 2]);
    tree0
        .refine(&ElementBox::new(1, vec![2, 0, 0], vec![4, 4, 4]))
        .unwrap();
    let tree1 = HierarchicalTree::new(&[2, 2, 2]);
    let bi = PatchInterface::with_inferred_maps(
        PatchSide::new(0, BoxSide::upper(0)),
        PatchSide::new(1, BoxSide::lower(0)),
        3,
    );

    let (first, second) = find_mismatched_elements(&bi, &tree0, &tree1).unwrap();
    assert!(first.is_empty());
    assert_eq!(second, vec![ElementBox::new(1, vec![0, 0, 0], vec![1, 4, 4])]);
}

#[test]
fn mismatched_tangential_extents_are_rejected() {
    let tree0 = HierarchicalTree::new(&[2, 2]);
    let tree1 = HierarchicalTree::new(&[2, 3]);
    let bi = facing_interface();
    assert!(find_mismatched_elements(&bi, &tree0, &tree1).is_err());
}
