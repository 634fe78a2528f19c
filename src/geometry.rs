//! Geometry maps from the parametric domain into physical space.

use eyre::{ensure, eyre};
use nalgebra::{DMatrix, DVector};

/// Evaluates a geometry map and its derived quantities at a batch of
/// parametric points.
///
/// The protocol is stateful: [`GeometryEvaluator::evaluate_at`] computes and
/// caches everything for one batch of points (typically the quadrature nodes
/// of one element), after which the per-point accessors refer to that batch
/// by column index.
pub trait GeometryEvaluator {
    /// The dimension of the physical space.
    fn geometry_dim(&self) -> usize;

    /// Computes the map and its derivatives at the given points (one column
    /// per point).
    fn evaluate_at(&mut self, points: &DMatrix<f64>) -> eyre::Result<()>;

    /// The physical images of the points of the last batch, one per column.
    fn values(&self) -> &DMatrix<f64>;

    /// The integration measure (Jacobian determinant magnitude) at point `k`.
    fn measure(&self, k: usize) -> f64;

    /// The Jacobian matrix of the map at point `k`.
    fn jacobian(&self, k: usize) -> DMatrix<f64>;

    /// Transforms reference gradients (`d` rows, one column per basis
    /// function) at point `k` into physical gradients,
    /// `∇_x φ = J^{-T} ∇_ξ φ`.
    fn transform_gradients(&self, k: usize, reference_gradients: &DMatrix<f64>) -> DMatrix<f64>;
}

/// An affine geometry map `x = A ξ + b` with square invertible `A`.
///
/// The Jacobian is constant, so the inverse transpose and the determinant are
/// computed once at construction.
#[derive(Debug, Clone)]
pub struct AffineGeometry {
    linear: DMatrix<f64>,
    translation: DVector<f64>,
    // A^{-T}, applied to reference gradients
    inverse_transpose: DMatrix<f64>,
    measure: f64,
    values: DMatrix<f64>,
}

impl AffineGeometry {
    pub fn new(linear: DMatrix<f64>, translation: DVector<f64>) -> eyre::Result<Self> {
        ensure!(linear.is_square(), "the linear part must be square");
        ensure!(
            translation.len() == linear.nrows(),
            "translation dimension does not match the linear part"
        );
        let det = linear.determinant();
        ensure!(det != 0.0, "affine geometry map is singular");
        let inverse_transpose = linear
            .clone()
            .try_inverse()
            .ok_or_else(|| eyre!("affine geometry map is singular"))?
            .transpose();
        Ok(Self {
            linear,
            translation,
            inverse_transpose,
            measure: det.abs(),
            values: DMatrix::zeros(0, 0),
        })
    }

    /// The identity map on `[0,1]^d`.
    pub fn identity(dim: usize) -> Self {
        Self {
            linear: DMatrix::identity(dim, dim),
            translation: DVector::zeros(dim),
            inverse_transpose: DMatrix::identity(dim, dim),
            measure: 1.0,
            values: DMatrix::zeros(0, 0),
        }
    }

    /// An axis-aligned scaling combined with a translation.
    pub fn scaling(factors: &[f64], translation: DVector<f64>) -> eyre::Result<Self> {
        let d = factors.len();
        let linear = DMatrix::from_diagonal(&DVector::from_row_slice(factors));
        ensure!(translation.len() == d, "translation dimension mismatch");
        Self::new(linear, translation)
    }
}

impl GeometryEvaluator for AffineGeometry {
    fn geometry_dim(&self) -> usize {
        self.linear.nrows()
    }

    fn evaluate_at(&mut self, points: &DMatrix<f64>) -> eyre::Result<()> {
        ensure!(
            points.nrows() == self.geometry_dim(),
            "point dimension {} does not match geometry dimension {}",
            points.nrows(),
            self.geometry_dim()
        );
        let mut values = &self.linear * points;
        for mut col in values.column_iter_mut() {
            col += &self.translation;
        }
        self.values = values;
        Ok(())
    }

    fn values(&self) -> &DMatrix<f64> {
        assert!(
            self.values.ncols() > 0,
            "evaluate_at must be called before accessing values"
        );
        &self.values
    }

    fn measure(&self, _k: usize) -> f64 {
        self.measure
    }

    fn jacobian(&self, _k: usize) -> DMatrix<f64> {
        self.linear.clone()
    }

    fn transform_gradients(&self, _k: usize, reference_gradients: &DMatrix<f64>) -> DMatrix<f64> {
        &self.inverse_transpose * reference_gradients
    }
}
