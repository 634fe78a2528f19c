use matrixcompare::assert_scalar_eq;
use nalgebra::{dvector, DMatrix};
use vanadis::basis::{Basis, HierarchicalBasis, TensorBsplineBasis};
use vanadis::htree::{ElementBox, HierarchicalTree};
use vanadis::topology::BoxSide;

#[test]
fn unrefined_hierarchical_basis_has_grid_corner_dofs() {
    let basis = HierarchicalBasis::new(&[2, 2]);
    assert_eq!(basis.num_dofs(), 9);
    assert_eq!(basis.elements().count(), 4);
    assert_eq!(basis.degree(0), 1);
}

#[test]
fn refinement_adds_dofs_and_elements() {
    let mut basis = HierarchicalBasis::new(&[2, 2]);
    basis
        .refine_elements(&[ElementBox::new(1, vec![2, 0], vec![4, 2])])
        .unwrap();
    // 2 coarse cells left of the refined quadrant, 1 above it, 4 fine cells
    assert_eq!(basis.elements().count(), 7);
    assert_eq!(basis.num_dofs(), 14);
}

#[test]
fn hierarchical_basis_is_a_partition_of_unity() {
    let mut basis = HierarchicalBasis::new(&[2, 2]);
    basis
        .refine_elements(&[ElementBox::new(1, vec![2, 0], vec![4, 2])])
        .unwrap();

    for point in [dvector![0.1, 0.1], dvector![0.6, 0.1], dvector![0.9, 0.4]] {
        let points = DMatrix::from_column_slice(2, 1, point.as_slice());
        let data = basis.evaluate_all_derivatives(&points, 1).unwrap();
        assert_eq!(data[0].nrows(), 4);

        let value_sum: f64 = data[0].column(0).iter().sum();
        assert_scalar_eq!(value_sum, 1.0, comp = abs, tol = 1e-14);
        // Gradients of a partition of unity sum to zero
        for dir in 0..2 {
            let grad_sum: f64 = (0..4).map(|f| data[1][(f * 2 + dir, 0)]).sum();
            assert_scalar_eq!(grad_sum, 0.0, comp = abs, tol = 1e-12);
        }
    }
}

#[test]
fn active_functions_match_the_containing_cell() {
    let basis = HierarchicalBasis::new(&[2, 2]);
    let mut actives = Vec::new();
    basis.active_into(&dvector![0.1, 0.1], &mut actives);
    assert_eq!(actives.len(), 4);
    let mut other = Vec::new();
    basis.active_into(&dvector![0.9, 0.9], &mut other);
    assert_eq!(other.len(), 4);
    assert_ne!(actives, other);
}

#[test]
fn hierarchical_boundary_anchors_lie_on_the_side() {
    let mut basis = HierarchicalBasis::new(&[2, 2]);
    basis
        .refine_elements(&[ElementBox::new(1, vec![2, 0], vec![4, 2])])
        .unwrap();

    let anchors = basis.boundary_anchors(BoxSide::upper(0)).unwrap();
    assert_eq!(anchors.dofs.len(), 4);
    let mut params: Vec<f64> = (0..anchors.dofs.len())
        .map(|col| anchors.anchors[(1, col)])
        .collect();
    params.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(params, vec![0.0, 0.25, 0.5, 1.0]);
    for col in 0..anchors.dofs.len() {
        assert_scalar_eq!(anchors.anchors[(0, col)], 1.0, comp = abs, tol = 0.0);
    }
}

#[test]
fn basis_from_a_tree_matches_incremental_refinement() {
    let mut tree = HierarchicalTree::new(&[2, 2]);
    tree.refine(&ElementBox::new(1, vec![2, 0], vec![4, 2])).unwrap();
    let from_tree = HierarchicalBasis::from_tree(tree);

    let mut incremental = HierarchicalBasis::new(&[2, 2]);
    incremental
        .refine_elements(&[ElementBox::new(1, vec![2, 0], vec![4, 2])])
        .unwrap();

    assert_eq!(from_tree.num_dofs(), incremental.num_dofs());
    assert_eq!(from_tree.elements().count(), incremental.elements().count());
    assert_eq!(
        from_tree.tree().unwrap().leaf_boxes(),
        incremental.tree().unwrap().leaf_boxes()
    );
}

#[test]
fn tensor_basis_rejects_element_refinement() {
    let mut basis = TensorBsplineBasis::new(&[2, 2], &[2, 2]);
    assert!(basis
        .refine_elements(&[ElementBox::new(1, vec![0, 0], vec![1, 1])])
        .is_err());
    assert!(basis.tree().is_none());
}

#[test]
fn tensor_boundary_anchors_use_greville_points() {
    let basis = TensorBsplineBasis::new(&[2, 2], &[2, 2]);
    let anchors = basis.boundary_anchors(BoxSide::upper(0)).unwrap();
    assert_eq!(anchors.dofs.len(), 4);
    for col in 0..anchors.dofs.len() {
        assert_scalar_eq!(anchors.anchors[(0, col)], 1.0, comp = abs, tol = 1e-14);
    }
    let mut params: Vec<f64> = (0..anchors.dofs.len())
        .map(|col| anchors.anchors[(1, col)])
        .collect();
    params.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(params, vec![0.0, 0.25, 0.75, 1.0]);
}
