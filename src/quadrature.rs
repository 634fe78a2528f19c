//! Tensor-product Gauss quadrature on parametric elements.

use crate::basis::{Basis, Element};
use eyre::ensure;
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Recurrence relation for Legendre polynomials.
///
/// Note: the derivative formula is not defined at |x| == 1, so it is only
/// suitable for evaluation in the open interval (-1, 1).
#[derive(Debug, Default)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // The current value, i.e. p_n(x)
    p1: f64,
    // The previous value in the recurrence, i.e. p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        // Use recurrence relation
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        let mut p3;
        for m in 1..=n {
            let m = m as f64;
            p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }

        Self { n, x, p1, p2 }
    }

    fn value_and_derivative(&self) -> (f64, f64) {
        let Self { n, x, p1, p2 } = &self;
        let n = *n as f64;
        // dp_n/dx (x) = n * (x * p_n(x) - p_{n - 1}(x)) / (x^2 - 1)
        (*p1, n * (x * p1 - p2) / (x * x - 1.0))
    }
}

/// Gauss quadrature for the reference interval [0, 1].
///
/// Given `n` points, the rule integrates polynomials of degree up to
/// `2 n - 1` exactly. The weights sum to 1.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss_interval(num_points: usize) -> (Vec<f64>, Vec<f64>) {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    // Loosely based on the procedure used in
    // Numerical Recipes, The art of Scientific Computing, Third Edition (2007)
    let m = (n + 1) / 2;

    let mut points = vec![0.0; n];
    let mut weights = vec![0.0; n];

    // Only find the first m roots; the remaining roots follow by symmetry
    for i in 0..m {
        // A fairly accurate initial guess
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let (mut p, mut dp) = LegendreRecurrence::evaluate(n, x).value_and_derivative();

        // Newton's method
        loop {
            let dx = -p / dp;
            x += dx;
            let (p_new, dp_new) = LegendreRecurrence::evaluate(n, x).value_and_derivative();
            p = p_new;
            dp = dp_new;
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        // The weight of a known root is given explicitly by a standard formula
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        // Map from [-1, 1] to [0, 1]
        points[i] = 0.5 * (1.0 + x);
        weights[i] = 0.5 * w;
        points[n - i - 1] = 0.5 * (1.0 - x);
        weights[n - i - 1] = 0.5 * w;
    }

    (points, weights)
}

/// A tensor-product Gauss rule on the reference element `[0, 1]^d`.
///
/// `nodes` holds one column per quadrature node; `weights` sum to 1, the
/// volume of the reference element.
#[derive(Debug, Clone)]
pub struct GaussTensorRule {
    nodes: DMatrix<f64>,
    weights: DVector<f64>,
}

impl GaussTensorRule {
    /// Creates a rule with the given number of points per direction.
    pub fn new(points_per_dir: &[usize]) -> eyre::Result<Self> {
        let d = points_per_dir.len();
        ensure!(d >= 1, "quadrature dimension must be at least 1");
        ensure!(
            points_per_dir.iter().all(|&n| n > 0),
            "each direction needs at least one quadrature point"
        );
        let univariate: Vec<(Vec<f64>, Vec<f64>)> = points_per_dir
            .iter()
            .map(|&n| gauss_interval(n))
            .collect();
        let total: usize = points_per_dir.iter().product();

        let mut nodes = DMatrix::zeros(d, total);
        let mut weights = DVector::zeros(total);
        let mut index = vec![0usize; d];
        for k in 0..total {
            let mut w = 1.0;
            for dir in 0..d {
                nodes[(dir, k)] = univariate[dir].0[index[dir]];
                w *= univariate[dir].1[index[dir]];
            }
            weights[k] = w;
            crate::basis::advance(&mut index, points_per_dir);
        }
        Ok(Self { nodes, weights })
    }

    /// The default rule for a basis: `degree + 1` points per direction, which
    /// integrates products of two basis functions exactly on affine geometry.
    pub fn for_basis(basis: &dyn Basis) -> eyre::Result<Self> {
        let points: Vec<usize> = (0..basis.dim()).map(|dir| basis.degree(dir) + 1).collect();
        Self::new(&points)
    }

    pub fn dim(&self) -> usize {
        self.nodes.nrows()
    }

    pub fn num_points(&self) -> usize {
        self.nodes.ncols()
    }

    pub fn nodes(&self) -> &DMatrix<f64> {
        &self.nodes
    }

    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }

    /// Maps the reference rule onto a parametric element: nodes are placed
    /// inside the element, weights are scaled by its volume.
    pub fn map_to_element(&self, element: &Element) -> (DMatrix<f64>, DVector<f64>) {
        assert_eq!(element.dim(), self.dim(), "element dimension mismatch");
        let d = self.dim();
        let mut nodes = self.nodes.clone();
        for k in 0..nodes.ncols() {
            for dir in 0..d {
                nodes[(dir, k)] =
                    element.lower[dir] + nodes[(dir, k)] * (element.upper[dir] - element.lower[dir]);
            }
        }
        let weights = &self.weights * element.volume();
        (nodes, weights)
    }
}
