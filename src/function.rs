//! Coefficient functions on physical space, as consumed by the assembly
//! visitors.

use eyre::ensure;
use nalgebra::{DMatrix, DVector};

/// A function from physical space into `R^m`, evaluated in batches.
///
/// Matrix-valued coefficients (such as a diffusion tensor) are passed as
/// vector-valued functions with `m = d * d` components, packed column-major.
pub trait CoefficientFunction {
    /// The number of components `m` of a function value.
    fn target_dim(&self) -> usize;

    /// Evaluates the function at the given physical points (one column per
    /// point) into `values` (`m` rows, one column per point). The output is
    /// resized as needed.
    fn eval_into(&self, points: &DMatrix<f64>, values: &mut DMatrix<f64>) -> eyre::Result<()>;

    /// Convenience wrapper allocating the output.
    fn evaluate(&self, points: &DMatrix<f64>) -> eyre::Result<DMatrix<f64>> {
        let mut values = DMatrix::zeros(self.target_dim(), points.ncols());
        self.eval_into(points, &mut values)?;
        Ok(values)
    }
}

/// A constant (point-independent) coefficient.
#[derive(Debug, Clone)]
pub struct ConstantCoefficient {
    value: DVector<f64>,
}

impl ConstantCoefficient {
    pub fn scalar(value: f64) -> Self {
        Self {
            value: DVector::from_element(1, value),
        }
    }

    pub fn vector(value: DVector<f64>) -> Self {
        Self { value }
    }

    /// The constant matrix `s I` in dimension `d`, packed column-major.
    pub fn identity_matrix(dim: usize, scale: f64) -> Self {
        let mut value = DVector::zeros(dim * dim);
        for i in 0..dim {
            value[i * dim + i] = scale;
        }
        Self { value }
    }
}

impl CoefficientFunction for ConstantCoefficient {
    fn target_dim(&self) -> usize {
        self.value.len()
    }

    fn eval_into(&self, points: &DMatrix<f64>, values: &mut DMatrix<f64>) -> eyre::Result<()> {
        ensure!(points.ncols() > 0, "at least one evaluation point is required");
        *values = DMatrix::zeros(self.value.len(), points.ncols());
        for mut col in values.column_iter_mut() {
            col.copy_from(&self.value);
        }
        Ok(())
    }
}

/// A coefficient backed by a closure mapping one physical point to a value
/// vector.
pub struct FnCoefficient<F> {
    target_dim: usize,
    f: F,
}

impl<F> FnCoefficient<F>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    pub fn new(target_dim: usize, f: F) -> Self {
        Self { target_dim, f }
    }
}

impl<F> CoefficientFunction for FnCoefficient<F>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    fn target_dim(&self) -> usize {
        self.target_dim
    }

    fn eval_into(&self, points: &DMatrix<f64>, values: &mut DMatrix<f64>) -> eyre::Result<()> {
        *values = DMatrix::zeros(self.target_dim, points.ncols());
        for (k, point) in points.column_iter().enumerate() {
            let value = (self.f)(&point.clone_owned());
            ensure!(
                value.len() == self.target_dim,
                "coefficient returned {} components, expected {}",
                value.len(),
                self.target_dim
            );
            values.column_mut(k).copy_from(&value);
        }
        Ok(())
    }
}
