//! Basis abstractions: the capability set consumed by the multi-basis manager
//! and the assembly layer, plus concrete tensor-product and hierarchical
//! implementations.

use crate::htree::{ElementBox, HierarchicalTree};
use crate::topology::BoxSide;
use nalgebra::{DMatrix, DVector};

mod hierarchical;
mod tensor;

pub use hierarchical::*;
pub use tensor::*;

/// One element of a patch, given by its parametric corners in `[0,1]^d`.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl Element {
    pub fn new(lower: DVector<f64>, upper: DVector<f64>) -> Self {
        assert_eq!(lower.len(), upper.len(), "corner dimensions must agree");
        Self { lower, upper }
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// The parametric volume of the element.
    pub fn volume(&self) -> f64 {
        self.upper
            .iter()
            .zip(self.lower.iter())
            .map(|(u, l)| u - l)
            .product()
    }
}

/// Boundary degrees of freedom of a side together with their parametric
/// anchor points, used for cross-patch dof matching.
///
/// `anchors` has one column per dof (`d` rows, parametric coordinates on the
/// full patch domain), in the same order as `dofs`.
#[derive(Debug, Clone)]
pub struct BoundaryAnchors {
    pub dofs: Vec<usize>,
    pub anchors: DMatrix<f64>,
}

/// The capability set of a spline function space on one patch.
///
/// The required operations cover degree queries, active-function lookup,
/// derivative evaluation and boundary dof extraction. The `Option`-returning
/// methods are optional capabilities: a basis that does not expose a
/// hierarchical tree cannot take part in interface repair, and a basis
/// without boundary anchors cannot take part in conforming interface
/// matching. Callers must treat an absent capability as an unsupported
/// operation, never attempt a downcast.
pub trait Basis {
    /// The parametric dimension of the basis.
    fn dim(&self) -> usize;

    /// The number of degrees of freedom (basis functions).
    fn num_dofs(&self) -> usize;

    /// The polynomial degree in the given parameter direction.
    fn degree(&self, direction: usize) -> usize;

    fn max_degree(&self) -> usize {
        (0..self.dim()).map(|d| self.degree(d)).max().unwrap_or(0)
    }

    fn min_degree(&self) -> usize {
        (0..self.dim()).map(|d| self.degree(d)).min().unwrap_or(0)
    }

    /// Populates `actives` with the indices of the basis functions that are
    /// non-zero at the given parametric point.
    ///
    /// Within one element the active set is constant, so a single
    /// representative point (conventionally the first quadrature node) is
    /// sufficient for the whole element.
    fn active_into(&self, point: &DVector<f64>, actives: &mut Vec<usize>);

    /// Evaluates all active basis functions and their derivatives up to the
    /// given order (at most 2) at the given points (one column per point).
    ///
    /// All points must lie in a single element. The result contains one
    /// matrix per derivative order with one column per point:
    ///
    /// * order 0: row `i` holds the value of the `i`-th active function;
    /// * order 1: row `i * d + j` holds its derivative in direction `j`;
    /// * order 2: rows are packed per function with the `d (d + 1) / 2`
    ///   distinct second derivatives in the order `(∂²/∂x₀², ..., ∂²/∂x_{d-1}²)`
    ///   followed by the mixed derivatives `(01, 02, ..., 12, ...)`.
    ///
    /// Row ordering of active functions matches [`Basis::active_into`].
    fn evaluate_all_derivatives(
        &self,
        points: &DMatrix<f64>,
        order: usize,
    ) -> eyre::Result<Vec<DMatrix<f64>>>;

    /// Iterates over the elements of the basis' mesh. The sequence is finite
    /// and restartable (calling `elements` again starts over).
    fn elements(&self) -> Box<dyn Iterator<Item = Element> + '_>;

    /// The indices of the degrees of freedom supported on the given side.
    fn boundary_dofs(&self, side: BoxSide) -> Vec<usize>;

    /// Refines the elements covered by the given boxes, each expressed at its
    /// own level in this basis' local indexing.
    ///
    /// Fails for bases without refinement support.
    fn refine_elements(&mut self, boxes: &[ElementBox]) -> eyre::Result<()>;

    /// The hierarchical index tree underlying this basis, if any.
    fn tree(&self) -> Option<&HierarchicalTree> {
        None
    }

    /// The boundary dofs of a side with parametric anchors, if this basis
    /// supports anchor-based interface matching.
    fn boundary_anchors(&self, _side: BoxSide) -> Option<BoundaryAnchors> {
        None
    }
}

/// Advances a tensor multi-index (first direction fastest); returns `false`
/// when the index wraps around.
pub(crate) fn advance(index: &mut [usize], counts: &[usize]) -> bool {
    for d in 0..index.len() {
        index[d] += 1;
        if index[d] < counts[d] {
            return true;
        }
        index[d] = 0;
    }
    false
}

/// Number of distinct second derivatives in dimension `d`.
pub(crate) fn num_second_derivatives(d: usize) -> usize {
    d * (d + 1) / 2
}

/// The row offset of the mixed second derivative `∂²/∂x_j ∂x_k` (`j < k`)
/// within one function's packed second-derivative block.
pub(crate) fn mixed_derivative_offset(d: usize, j: usize, k: usize) -> usize {
    debug_assert!(j < k && k < d);
    // Pure derivatives occupy the first d slots; mixed pairs follow in
    // lexicographic order
    let mut offset = d;
    for jj in 0..d {
        for kk in (jj + 1)..d {
            if (jj, kk) == (j, k) {
                return offset;
            }
            offset += 1;
        }
    }
    unreachable!()
}
