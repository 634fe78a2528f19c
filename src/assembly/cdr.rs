//! Element visitor for the convection-diffusion-reaction equation.

use crate::assembly::{AssemblyOptions, ElementVisitor, EvalFlags, SparseSystem, Stabilization};
use crate::basis::{mixed_derivative_offset, num_second_derivatives, Basis, Element};
use crate::function::CoefficientFunction;
use crate::geometry::GeometryEvaluator;
use crate::quadrature::GaussTensorRule;
use eyre::{bail, ensure, eyre};
use nalgebra::{DMatrix, DVector};

/// Assembles the weak form of
///
/// `-div(A grad u) + b . grad u + c u = f`
///
/// with diffusion tensor `A` (passed column-major as a `d*d`-valued
/// coefficient), convection field `b`, reaction coefficient `c` and source
/// `f`, optionally with SUPG stabilization.
///
/// With SUPG enabled, the stabilized test function `b . grad phi` multiplies
/// the strong residual; the second-order term uses the basis' second
/// derivatives transformed through the inverse geometry Jacobian. The
/// stabilization parameter is the spread of the convection direction over the
/// mapped element boundary, see [`CdrVisitor::stabilization_parameter`].
pub struct CdrVisitor<'a> {
    diffusion: &'a dyn CoefficientFunction,
    convection: &'a dyn CoefficientFunction,
    reaction: &'a dyn CoefficientFunction,
    source: &'a dyn CoefficientFunction,
    stabilization: Stabilization,
    dim: usize,

    actives: Vec<usize>,
    basis_data: Vec<DMatrix<f64>>,
    diffusion_values: DMatrix<f64>,
    convection_values: DMatrix<f64>,
    reaction_values: DMatrix<f64>,
    source_values: DMatrix<f64>,

    local_matrix: DMatrix<f64>,
    local_rhs: DVector<f64>,
}

impl<'a> CdrVisitor<'a> {
    pub fn new(
        diffusion: &'a dyn CoefficientFunction,
        convection: &'a dyn CoefficientFunction,
        reaction: &'a dyn CoefficientFunction,
        source: &'a dyn CoefficientFunction,
    ) -> Self {
        Self {
            diffusion,
            convection,
            reaction,
            source,
            stabilization: Stabilization::None,
            dim: 0,
            actives: Vec::new(),
            basis_data: Vec::new(),
            diffusion_values: DMatrix::zeros(0, 0),
            convection_values: DMatrix::zeros(0, 0),
            reaction_values: DMatrix::zeros(0, 0),
            source_values: DMatrix::zeros(0, 0),
            local_matrix: DMatrix::zeros(0, 0),
            local_rhs: DVector::zeros(0),
        }
    }

    pub fn local_matrix(&self) -> &DMatrix<f64> {
        &self.local_matrix
    }

    pub fn local_rhs(&self) -> &DVector<f64> {
        &self.local_rhs
    }

    pub fn actives(&self) -> &[usize] {
        &self.actives
    }

    // Reference gradients at node k as a d x N matrix.
    fn reference_gradients(&self, k: usize) -> DMatrix<f64> {
        let d = self.dim;
        let n = self.actives.len();
        let grads = &self.basis_data[1];
        DMatrix::from_fn(d, n, |dir, i| grads[(i * d + dir, k)])
    }

    // The symmetric Hessian of basis function `i` at node `k`, unpacked from
    // the condensed second-derivative rows.
    fn reference_hessian(&self, i: usize, k: usize) -> DMatrix<f64> {
        let d = self.dim;
        let n2 = num_second_derivatives(d);
        let derivs = &self.basis_data[2];
        let mut hessian = DMatrix::zeros(d, d);
        for j in 0..d {
            hessian[(j, j)] = derivs[(i * n2 + j, k)];
            for l in (j + 1)..d {
                let value = derivs[(i * n2 + mixed_derivative_offset(d, j, l), k)];
                hessian[(j, l)] = value;
                hessian[(l, j)] = value;
            }
        }
        hessian
    }

    /// The SUPG parameter of one element: the spread of the projections of
    /// the mapped element boundary onto the convection direction, divided by
    /// `2 |b|`. Zero convection yields zero (plain Galerkin).
    ///
    /// Re-evaluates the geometry at sampled boundary points, so it must be
    /// called after all other geometry uses of the element.
    pub fn stabilization_parameter(
        &self,
        element: &Element,
        geometry: &mut dyn GeometryEvaluator,
    ) -> eyre::Result<f64> {
        let d = self.dim;
        let b: DVector<f64> = self.convection_values.column(0).clone_owned();
        let b_norm = b.norm();
        if b_norm == 0.0 {
            return Ok(0.0);
        }
        if d == 3 {
            bail!("the SUPG parameter is not implemented for 3D");
        }
        ensure!(d == 2, "dimension must be 2 or 3");

        // Sample each of the four edges with N + 1 points
        const N: usize = 2;
        let n1 = N + 1;
        let mut a_mat = DMatrix::zeros(2, 4 * n1);
        for i in 0..=N {
            let a = i as f64 / N as f64;
            a_mat[(0, i)] = a;
            a_mat[(1, i)] = 0.0;
            a_mat[(0, i + n1)] = a;
            a_mat[(1, i + n1)] = 1.0;
            a_mat[(0, i + 2 * n1)] = 0.0;
            a_mat[(1, i + 2 * n1)] = a;
            a_mat[(0, i + 3 * n1)] = 1.0;
            a_mat[(1, i + 3 * n1)] = a;
        }

        let mut boundary_points = DMatrix::zeros(d, a_mat.ncols());
        for i in 0..a_mat.ncols() {
            for di in 0..d {
                let a = a_mat[(di, i)];
                boundary_points[(di, i)] =
                    (1.0 - a) * element.lower[di] + a * element.upper[di];
            }
        }

        geometry.evaluate_at(&boundary_points)?;
        let projections = geometry.values().transpose() * &b;
        let max = projections.max();
        let min = projections.min();
        Ok((max - min) / (2.0 * b_norm))
    }
}

impl ElementVisitor for CdrVisitor<'_> {
    fn initialize(
        &mut self,
        basis: &dyn Basis,
        _patch: usize,
        options: &AssemblyOptions,
    ) -> eyre::Result<(GaussTensorRule, EvalFlags)> {
        let d = basis.dim();
        ensure!(d == 2 || d == 3, "dimension must be 2 or 3");
        ensure!(
            self.diffusion.target_dim() == d * d,
            "diffusion coefficient must have {} components, has {}",
            d * d,
            self.diffusion.target_dim()
        );
        ensure!(
            self.convection.target_dim() == d,
            "convection coefficient must have {} components, has {}",
            d,
            self.convection.target_dim()
        );
        ensure!(
            self.reaction.target_dim() == 1,
            "reaction coefficient must be scalar"
        );
        ensure!(self.source.target_dim() == 1, "source must be scalar");
        self.dim = d;
        self.stabilization = options.stabilization;

        let rule = match &options.quadrature_points {
            Some(points) => {
                ensure!(
                    points.len() == d,
                    "quadrature option specifies {} directions for dimension {}",
                    points.len(),
                    d
                );
                GaussTensorRule::new(points)?
            }
            None => GaussTensorRule::for_basis(basis)?,
        };
        let flags = EvalFlags {
            need_values: true,
            need_measure: true,
            need_gradient_transform: true,
            need_second_derivatives: self.stabilization == Stabilization::Supg,
        };
        Ok((rule, flags))
    }

    fn evaluate(
        &mut self,
        basis: &dyn Basis,
        geometry: &mut dyn GeometryEvaluator,
        nodes: &DMatrix<f64>,
    ) -> eyre::Result<()> {
        // The active set is constant within one element
        basis.active_into(&nodes.column(0).clone_owned(), &mut self.actives);
        self.basis_data = basis.evaluate_all_derivatives(nodes, 2)?;

        geometry.evaluate_at(nodes)?;
        let physical = geometry.values();
        self.diffusion.eval_into(physical, &mut self.diffusion_values)?;
        self.convection.eval_into(physical, &mut self.convection_values)?;
        self.reaction.eval_into(physical, &mut self.reaction_values)?;
        self.source.eval_into(physical, &mut self.source_values)?;

        let n = self.actives.len();
        self.local_matrix = DMatrix::zeros(n, n);
        self.local_rhs = DVector::zeros(n);
        Ok(())
    }

    fn assemble(
        &mut self,
        element: &Element,
        geometry: &mut dyn GeometryEvaluator,
        weights: &DVector<f64>,
    ) -> eyre::Result<()> {
        let d = self.dim;
        let n = self.actives.len();
        let values = &self.basis_data[0];

        // SUPG contributions are accumulated separately: the stabilization
        // parameter is only available after the quadrature loop
        let mut supg_matrix = DMatrix::zeros(n, n);

        for k in 0..weights.len() {
            let weight = weights[k] * geometry.measure(k);

            let physical_gradients = geometry.transform_gradients(k, &self.reference_gradients(k));
            let diffusion =
                DMatrix::from_fn(d, d, |r, c| self.diffusion_values[(c * d + r, k)]);
            let convection: DVector<f64> = self.convection_values.column(k).clone_owned();
            let reaction = self.reaction_values[(0, k)];
            let source = self.source_values[(0, k)];

            let basis_values: DVector<f64> = values.column(k).clone_owned();
            // b . grad of each basis function, one entry per function
            let convective_derivatives: DVector<f64> =
                (convection.transpose() * &physical_gradients).transpose();

            self.local_rhs += weight * source * &basis_values;

            self.local_matrix +=
                weight * (physical_gradients.transpose() * (&diffusion * &physical_gradients));
            self.local_matrix +=
                weight * (&basis_values * convective_derivatives.transpose());
            self.local_matrix +=
                weight * reaction * (&basis_values * basis_values.transpose());

            if self.stabilization == Stabilization::Supg {
                let jacobian_inverse = geometry
                    .jacobian(k)
                    .try_inverse()
                    .ok_or_else(|| eyre!("geometry Jacobian is singular"))?;

                // Rows: b . grad of the physical gradient of each function
                let mut convective_gradients = DMatrix::zeros(n, d);
                for i in 0..n {
                    let physical_hessian = jacobian_inverse.transpose()
                        * self.reference_hessian(i, k)
                        * &jacobian_inverse;
                    for col in 0..d {
                        for j in 0..d {
                            convective_gradients[(i, col)] +=
                                convection[j] * physical_hessian[(j, col)];
                        }
                    }
                }

                supg_matrix +=
                    weight * &convective_gradients * (&diffusion * &physical_gradients);
                supg_matrix +=
                    weight * (&convective_derivatives * convective_derivatives.transpose());
                supg_matrix += weight
                    * reaction
                    * (&convective_derivatives * basis_values.transpose());
            }
        }

        if self.stabilization == Stabilization::Supg {
            // Computing the parameter re-evaluates the geometry, so it has to
            // happen after the quadrature loop
            let parameter = self.stabilization_parameter(element, geometry)?;
            self.local_matrix += parameter * supg_matrix;
        }
        Ok(())
    }

    fn local_to_global(
        &self,
        patch: usize,
        eliminated_values: &DVector<f64>,
        system: &mut SparseSystem,
    ) -> eyre::Result<()> {
        let globals = system.map_indices(patch, &self.actives);
        system.push(&self.local_matrix, &self.local_rhs, &globals, eliminated_values);
        Ok(())
    }
}
