use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{dvector, DMatrix, DVector};
use vanadis::assembly::{
    assemble_multipatch, assemble_patch, AssemblyOptions, CdrVisitor, ElementVisitor,
    SparseSystem, Stabilization,
};
use vanadis::basis::{Basis, HierarchicalBasis};
use vanadis::function::ConstantCoefficient;
use vanadis::geometry::{AffineGeometry, GeometryEvaluator};
use vanadis::multibasis::MultiBasis;
use vanadis::topology::{BoundaryConditions, BoxSide, BoxTopology, PatchSide};

fn unit_square_multibasis(cells: &[usize]) -> MultiBasis {
    let mut topology = BoxTopology::new(2);
    topology.add_box();
    topology.add_auto_boundaries();
    let mut mb = MultiBasis::new(topology);
    mb.add_basis(Box::new(HierarchicalBasis::new(cells))).unwrap();
    mb
}

fn dense_matrix(system: &SparseSystem) -> DMatrix<f64> {
    let n = system.mapper().free_dof_count();
    let mut dense = DMatrix::zeros(n, n);
    for (i, j, v) in system.matrix().triplet_iter() {
        dense[(i, j)] += *v;
    }
    dense
}

fn poisson_coefficients() -> (ConstantCoefficient, ConstantCoefficient, ConstantCoefficient, ConstantCoefficient)
{
    (
        ConstantCoefficient::identity_matrix(2, 1.0),
        ConstantCoefficient::vector(dvector![0.0, 0.0]),
        ConstantCoefficient::scalar(0.0),
        ConstantCoefficient::scalar(1.0),
    )
}

#[test]
fn bilinear_stiffness_matrix_on_the_unit_square() {
    let mb = unit_square_multibasis(&[1, 1]);
    let (diffusion, convection, reaction, source) = poisson_coefficients();
    let mut visitor = CdrVisitor::new(&diffusion, &convection, &reaction, &source);

    let mapper = mb.mapper(true).unwrap();
    let mut system = SparseSystem::new(mapper).unwrap();
    let mut geometry = AffineGeometry::identity(2);
    assemble_patch(
        &mut visitor,
        mb.basis(0),
        &mut geometry,
        0,
        &AssemblyOptions::default(),
        &DVector::zeros(0),
        &mut system,
    )
    .unwrap();

    // Dof order is lexicographic in (x, y):
    // 0 = (0,0), 1 = (0,1), 2 = (1,0), 3 = (1,1)
    let third = 1.0 / 3.0;
    let sixth = 1.0 / 6.0;
    let expected = DMatrix::from_row_slice(
        4,
        4,
        &[
            2.0 * third, -sixth, -sixth, -third, //
            -sixth, 2.0 * third, -third, -sixth, //
            -sixth, -third, 2.0 * third, -sixth, //
            -third, -sixth, -sixth, 2.0 * third,
        ],
    );
    assert_matrix_eq!(dense_matrix(&system), expected, comp = abs, tol = 1e-13);
    assert_matrix_eq!(
        *system.rhs(),
        dvector![0.25, 0.25, 0.25, 0.25],
        comp = abs,
        tol = 1e-13
    );
}

#[test]
fn dirichlet_values_are_moved_to_the_right_hand_side() {
    let mut topology = BoxTopology::new(2);
    topology.add_box();
    topology.add_auto_boundaries();
    let mut mb = MultiBasis::new(topology);
    mb.add_basis(Box::new(HierarchicalBasis::new(&[1, 1]))).unwrap();

    let mut bc = BoundaryConditions::new();
    bc.add_dirichlet(PatchSide::new(0, BoxSide::lower(0)), 0);
    let mapper = mb.mapper_with_bc(true, &bc, 0).unwrap();
    assert_eq!(mapper.free_dof_count(), 2);
    assert_eq!(mapper.eliminated_dof_count(), 2);

    let diffusion = ConstantCoefficient::identity_matrix(2, 1.0);
    let convection = ConstantCoefficient::vector(dvector![0.0, 0.0]);
    let reaction = ConstantCoefficient::scalar(0.0);
    let source = ConstantCoefficient::scalar(0.0);
    let mut visitor = CdrVisitor::new(&diffusion, &convection, &reaction, &source);

    let mut system = SparseSystem::new(mapper).unwrap();
    let mut geometry = AffineGeometry::identity(2);
    // u = 1 on the west side
    assemble_patch(
        &mut visitor,
        mb.basis(0),
        &mut geometry,
        0,
        &AssemblyOptions::default(),
        &dvector![1.0, 1.0],
        &mut system,
    )
    .unwrap();

    let matrix = dense_matrix(&system);
    let rhs = system.rhs().clone();
    // The exact solution of the reduced system is u = 1 everywhere
    let solution = matrix
        .lu()
        .solve(&rhs)
        .expect("reduced stiffness matrix must be invertible");
    assert_matrix_eq!(solution, dvector![1.0, 1.0], comp = abs, tol = 1e-12);
}

#[test]
fn supg_with_zero_convection_reduces_to_galerkin() {
    let assemble = |stabilization: Stabilization| {
        let mb = unit_square_multibasis(&[2, 2]);
        let (diffusion, convection, reaction, source) = poisson_coefficients();
        let mut visitor = CdrVisitor::new(&diffusion, &convection, &reaction, &source);
        let mut system = SparseSystem::new(mb.mapper(true).unwrap()).unwrap();
        let mut geometry = AffineGeometry::identity(2);
        let options = AssemblyOptions {
            stabilization,
            ..Default::default()
        };
        assemble_patch(
            &mut visitor,
            mb.basis(0),
            &mut geometry,
            0,
            &options,
            &DVector::zeros(0),
            &mut system,
        )
        .unwrap();
        (dense_matrix(&system), system.rhs().clone())
    };

    let (galerkin, rhs_galerkin) = assemble(Stabilization::None);
    let (supg, rhs_supg) = assemble(Stabilization::Supg);
    assert_matrix_eq!(supg, galerkin, comp = abs, tol = 1e-13);
    assert_matrix_eq!(rhs_supg, rhs_galerkin, comp = abs, tol = 1e-13);
}

#[test]
fn supg_parameter_measures_the_element_extent_along_the_flow() {
    let diffusion = ConstantCoefficient::identity_matrix(2, 1e-3);
    let convection = ConstantCoefficient::vector(dvector![1.0, 0.0]);
    let reaction = ConstantCoefficient::scalar(0.0);
    let source = ConstantCoefficient::scalar(1.0);
    let mut visitor = CdrVisitor::new(&diffusion, &convection, &reaction, &source);

    let basis = HierarchicalBasis::new(&[1, 1]);
    let options = AssemblyOptions {
        stabilization: Stabilization::Supg,
        ..Default::default()
    };
    let (rule, _flags) = visitor.initialize(&basis, 0, &options).unwrap();
    let element = basis.elements().next().unwrap();
    let (nodes, _weights) = rule.map_to_element(&element);
    let mut geometry = AffineGeometry::identity(2);
    visitor.evaluate(&basis, &mut geometry, &nodes).unwrap();

    // The unit square projected onto b = (1, 0) spans [0, 1]
    let parameter = visitor
        .stabilization_parameter(&element, &mut geometry)
        .unwrap();
    assert_scalar_eq!(parameter, 0.5, comp = abs, tol = 1e-14);
}

#[test]
fn supg_parameter_is_rejected_in_3d() {
    let diffusion = ConstantCoefficient::identity_matrix(3, 1.0);
    let convection = ConstantCoefficient::vector(dvector![1.0, 0.0, 0.0]);
    let reaction = ConstantCoefficient::scalar(0.0);
    let source = ConstantCoefficient::scalar(0.0);
    let mut visitor = CdrVisitor::new(&diffusion, &convection, &reaction, &source);

    let basis = HierarchicalBasis::new(&[1, 1, 1]);
    let options = AssemblyOptions {
        stabilization: Stabilization::Supg,
        ..Default::default()
    };
    let (rule, _flags) = visitor.initialize(&basis, 0, &options).unwrap();
    let element = basis.elements().next().unwrap();
    let (nodes, _weights) = rule.map_to_element(&element);
    let mut geometry = AffineGeometry::identity(3);
    visitor.evaluate(&basis, &mut geometry, &nodes).unwrap();

    let err = visitor
        .stabilization_parameter(&element, &mut geometry)
        .unwrap_err();
    assert!(err.to_string().contains("3D"));
}

#[test]
fn multipatch_assembly_couples_shared_dofs() {
    let mut topology = BoxTopology::new(2);
    let p0 = topology.add_box();
    let p1 = topology.add_box();
    topology
        .add_interface(p0, BoxSide::upper(0), p1, BoxSide::lower(0))
        .unwrap();
    topology.add_auto_boundaries();
    let mut mb = MultiBasis::new(topology);
    mb.add_basis(Box::new(HierarchicalBasis::new(&[1, 1]))).unwrap();
    mb.add_basis(Box::new(HierarchicalBasis::new(&[1, 1]))).unwrap();

    let mapper = mb.mapper(true).unwrap();
    assert_eq!(mapper.free_dof_count(), 6);

    let (diffusion, convection, reaction, source) = poisson_coefficients();
    let mut visitor = CdrVisitor::new(&diffusion, &convection, &reaction, &source);
    let mut system = SparseSystem::new(mapper).unwrap();
    let mut geometries: Vec<Box<dyn GeometryEvaluator>> = vec![
        Box::new(AffineGeometry::identity(2)),
        Box::new(AffineGeometry::scaling(&[1.0, 1.0], dvector![1.0, 0.0]).unwrap()),
    ];
    assemble_multipatch(
        &mut visitor,
        &mb,
        &mut geometries,
        &AssemblyOptions::default(),
        &DVector::zeros(0),
        &mut system,
    )
    .unwrap();

    // Total load: the integral of f = 1 over both unit patches
    assert_scalar_eq!(system.rhs().sum(), 2.0, comp = abs, tol = 1e-13);
    // Shared interface dofs accumulate contributions from both patches
    let matrix = dense_matrix(&system);
    assert_matrix_eq!(matrix, matrix.transpose(), comp = abs, tol = 1e-13);
    let shared = mapper_index_of_shared_dof(&mb);
    assert_scalar_eq!(system.rhs()[shared], 0.5, comp = abs, tol = 1e-13);
}

// The global index of one dof on the shared interface edge.
fn mapper_index_of_shared_dof(mb: &MultiBasis) -> usize {
    let mapper = mb.mapper(true).unwrap();
    let dofs = mb.basis(0).boundary_dofs(BoxSide::upper(0));
    mapper.index(0, dofs[0])
}
