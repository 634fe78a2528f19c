use proptest::prelude::*;
use vanadis::htree::{shift_index, ElementBox, HierarchicalTree, SideBox};
use vanadis::topology::BoxSide;

#[test]
fn refinement_keeps_leaves_a_partition() {
    let mut tree = HierarchicalTree::new(&[2, 2]);
    assert_eq!(tree.leaf_volume(), tree.domain_volume());

    tree.refine(&ElementBox::new(1, vec![2, 0], vec![4, 2])).unwrap();
    assert_eq!(tree.leaf_volume(), tree.domain_volume());
    assert_eq!(tree.max_inserted_level(), 1);

    tree.refine(&ElementBox::new(2, vec![4, 0], vec![6, 2])).unwrap();
    assert_eq!(tree.leaf_volume(), tree.domain_volume());
    assert_eq!(tree.max_inserted_level(), 2);
}

#[test]
fn level_queries_after_refinement() {
    let mut tree = HierarchicalTree::new(&[2, 2]);
    tree.refine(&ElementBox::new(1, vec![2, 0], vec![4, 2])).unwrap();

    let upper = tree.upper_corner().to_vec();
    // Inside the refined lower-right quadrant
    assert_eq!(tree.level_at(&[3 * upper[0] / 4, upper[1] / 4]).unwrap(), 1);
    // Outside it
    assert_eq!(tree.level_at(&[upper[0] / 4, upper[1] / 4]).unwrap(), 0);
    assert!(tree.level_at(&[upper[0], 0]).is_err());
}

#[test]
fn refining_an_already_finer_region_changes_nothing() {
    let mut tree = HierarchicalTree::new(&[2, 2]);
    tree.refine(&ElementBox::new(2, vec![0, 0], vec![4, 4])).unwrap();
    let before = tree.leaf_boxes();
    tree.refine(&ElementBox::new(1, vec![0, 0], vec![2, 2])).unwrap();
    assert_eq!(tree.leaf_boxes(), before);
}

#[test]
fn boxes_on_side_partition_the_face() {
    let mut tree = HierarchicalTree::new(&[2, 2]);
    tree.refine(&ElementBox::new(1, vec![2, 0], vec![4, 2])).unwrap();

    let mut east = tree.boxes_on_side(BoxSide::upper(0));
    east.sort_by_key(|b| b.lower.clone());
    assert_eq!(
        east,
        vec![
            SideBox {
                lower: vec![2, 0],
                upper: vec![4, 2],
                level: 1,
            },
            SideBox {
                lower: vec![2, 2],
                upper: vec![4, 4],
                level: 0,
            },
        ]
    );

    // The west face is untouched by the refinement
    let west = tree.boxes_on_side(BoxSide::lower(0));
    assert_eq!(west.len(), 1);
    assert_eq!(west[0].level, 0);
}

#[test]
fn empty_or_out_of_domain_refinement_boxes_are_rejected() {
    let mut tree = HierarchicalTree::new(&[2, 2]);
    assert!(tree.refine(&ElementBox::new(1, vec![2, 2], vec![2, 4])).is_err());
    assert!(tree.refine(&ElementBox::new(1, vec![0, 0], vec![5, 2])).is_err());
}

proptest! {
    #[test]
    fn shift_index_round_trips_through_finer_levels(
        value in 0u64..(1 << 20),
        from in 1u8..16,
        delta in 0u8..8,
    ) {
        let finer = shift_index(value, from, from + delta);
        prop_assert_eq!(shift_index(finer, from + delta, from), value);
    }

    #[test]
    fn random_refinements_preserve_the_partition(
        boxes in prop::collection::vec((1u8..=3, 0u64..1000, 0u64..1000, 1u64..4, 1u64..4), 1..6)
    ) {
        let mut tree = HierarchicalTree::new(&[2, 2]);
        for (level, lx, ly, sx, sy) in boxes {
            let upper = 2u64 << level;
            let lx = lx % (upper - 1);
            let ly = ly % (upper - 1);
            let ux = (lx + sx).min(upper);
            let uy = (ly + sy).min(upper);
            tree.refine(&ElementBox::new(level, vec![lx, ly], vec![ux, uy]))
                .unwrap();
            prop_assert_eq!(tree.leaf_volume(), tree.domain_volume());
        }
    }
}
