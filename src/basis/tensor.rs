//! Tensor-product B-spline bases on uniform open knot vectors.

use crate::basis::{
    advance, mixed_derivative_offset, num_second_derivatives, Basis, BoundaryAnchors, Element,
};
use crate::htree::ElementBox;
use crate::topology::BoxSide;
use eyre::{bail, ensure};
use nalgebra::{DMatrix, DVector};

/// A tensor-product B-spline basis of arbitrary degree on a uniform open knot
/// vector over `[0,1]^d`.
///
/// This basis supports full derivative evaluation up to order 2 and
/// anchor-based interface matching, but is not hierarchical: it carries no
/// index tree and cannot be refined element-wise.
#[derive(Debug, Clone)]
pub struct TensorBsplineBasis {
    degrees: Vec<usize>,
    cells: Vec<usize>,
    // One open knot vector per direction
    knots: Vec<Vec<f64>>,
}

impl TensorBsplineBasis {
    /// Creates a basis with the given degree and number of elements per
    /// parameter direction.
    pub fn new(degrees: &[usize], cells: &[usize]) -> Self {
        assert_eq!(degrees.len(), cells.len(), "degree/cell dimensions must agree");
        assert!(!degrees.is_empty(), "basis dimension must be at least 1");
        assert!(degrees.iter().all(|&p| p >= 1), "degrees must be at least 1");
        assert!(cells.iter().all(|&n| n >= 1), "each direction needs at least one element");
        let knots = degrees
            .iter()
            .zip(cells)
            .map(|(&p, &n)| uniform_open_knots(p, n))
            .collect();
        Self {
            degrees: degrees.to_vec(),
            cells: cells.to_vec(),
            knots,
        }
    }

    fn dofs_per_direction(&self, dir: usize) -> usize {
        self.cells[dir] + self.degrees[dir]
    }

    /// The Greville abscissa of the `i`-th univariate function in direction
    /// `dir`.
    pub fn greville(&self, dir: usize, i: usize) -> f64 {
        let p = self.degrees[dir];
        let knots = &self.knots[dir];
        knots[i + 1..i + p + 1].iter().sum::<f64>() / p as f64
    }

    fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.dim()];
        for d in 1..self.dim() {
            strides[d] = strides[d - 1] * self.dofs_per_direction(d - 1);
        }
        strides
    }

    fn decompose(&self, mut flat: usize) -> Vec<usize> {
        let mut tensor = vec![0; self.dim()];
        for d in 0..self.dim() {
            tensor[d] = flat % self.dofs_per_direction(d);
            flat /= self.dofs_per_direction(d);
        }
        tensor
    }

    fn spans_at(&self, point: &DVector<f64>) -> Vec<usize> {
        (0..self.dim())
            .map(|d| find_span(&self.knots[d], self.degrees[d], point[d]))
            .collect()
    }
}

impl Basis for TensorBsplineBasis {
    fn dim(&self) -> usize {
        self.degrees.len()
    }

    fn num_dofs(&self) -> usize {
        (0..self.dim()).map(|d| self.dofs_per_direction(d)).product()
    }

    fn degree(&self, direction: usize) -> usize {
        self.degrees[direction]
    }

    fn active_into(&self, point: &DVector<f64>, actives: &mut Vec<usize>) {
        assert_eq!(point.len(), self.dim(), "point dimension mismatch");
        actives.clear();
        let spans = self.spans_at(point);
        let strides = self.strides();
        let counts: Vec<usize> = self.degrees.iter().map(|&p| p + 1).collect();
        let mut local = vec![0; self.dim()];
        loop {
            let flat: usize = (0..self.dim())
                .map(|d| (spans[d] - self.degrees[d] + local[d]) * strides[d])
                .sum();
            actives.push(flat);
            if !advance(&mut local, &counts) {
                break;
            }
        }
    }

    fn evaluate_all_derivatives(
        &self,
        points: &DMatrix<f64>,
        order: usize,
    ) -> eyre::Result<Vec<DMatrix<f64>>> {
        ensure!(order <= 2, "derivatives are only available up to order 2");
        ensure!(
            points.nrows() == self.dim(),
            "point dimension {} does not match basis dimension {}",
            points.nrows(),
            self.dim()
        );
        ensure!(points.ncols() > 0, "at least one evaluation point is required");
        let d = self.dim();
        let npts = points.ncols();
        let n_active: usize = self.degrees.iter().map(|&p| p + 1).product();
        let n2 = num_second_derivatives(d);

        // All points are assumed to lie in one element; the spans of the
        // first point determine the active set
        let spans = self.spans_at(&points.column(0).clone_owned());

        let mut result = Vec::with_capacity(order + 1);
        result.push(DMatrix::zeros(n_active, npts));
        if order >= 1 {
            result.push(DMatrix::zeros(d * n_active, npts));
        }
        if order >= 2 {
            result.push(DMatrix::zeros(n2 * n_active, npts));
        }

        let counts: Vec<usize> = self.degrees.iter().map(|&p| p + 1).collect();
        for k in 0..npts {
            // Univariate values and derivatives per direction, rows 0..=order
            // (rows beyond the polynomial degree stay zero)
            let uni: Vec<Vec<Vec<f64>>> = (0..d)
                .map(|dir| {
                    derivatives_basis_functions(
                        &self.knots[dir],
                        spans[dir],
                        points[(dir, k)],
                        self.degrees[dir],
                        order,
                    )
                })
                .collect();

            let mut local = vec![0; d];
            let mut f = 0;
            loop {
                let value: f64 = (0..d).map(|dir| uni[dir][0][local[dir]]).product();
                result[0][(f, k)] = value;
                if order >= 1 {
                    for j in 0..d {
                        let g: f64 = (0..d)
                            .map(|dir| {
                                let row = usize::from(dir == j);
                                uni[dir][row][local[dir]]
                            })
                            .product();
                        result[1][(f * d + j, k)] = g;
                    }
                }
                if order >= 2 {
                    for j in 0..d {
                        let h: f64 = (0..d)
                            .map(|dir| {
                                let row = if dir == j { 2 } else { 0 };
                                uni[dir][row][local[dir]]
                            })
                            .product();
                        result[2][(f * n2 + j, k)] = h;
                    }
                    for j in 0..d {
                        for l in (j + 1)..d {
                            let h: f64 = (0..d)
                                .map(|dir| {
                                    let row = usize::from(dir == j || dir == l);
                                    uni[dir][row][local[dir]]
                                })
                                .product();
                            result[2][(f * n2 + mixed_derivative_offset(d, j, l), k)] = h;
                        }
                    }
                }
                f += 1;
                if !advance(&mut local, &counts) {
                    break;
                }
            }
            debug_assert_eq!(f, n_active);
        }
        Ok(result)
    }

    fn elements(&self) -> Box<dyn Iterator<Item = Element> + '_> {
        let d = self.dim();
        let cells = self.cells.clone();
        let mut index = vec![0; d];
        let mut done = false;
        Box::new(std::iter::from_fn(move || {
            if done {
                return None;
            }
            let lower = DVector::from_iterator(
                d,
                index.iter().zip(&cells).map(|(&i, &n)| i as f64 / n as f64),
            );
            let upper = DVector::from_iterator(
                d,
                index
                    .iter()
                    .zip(&cells)
                    .map(|(&i, &n)| (i + 1) as f64 / n as f64),
            );
            done = !advance(&mut index, &cells);
            Some(Element::new(lower, upper))
        }))
    }

    fn boundary_dofs(&self, side: BoxSide) -> Vec<usize> {
        let dir = side.direction();
        assert!(dir < self.dim(), "side direction out of range");
        let fixed = if side.is_upper() {
            self.dofs_per_direction(dir) - 1
        } else {
            0
        };
        (0..self.num_dofs())
            .filter(|&flat| self.decompose(flat)[dir] == fixed)
            .collect()
    }

    fn refine_elements(&mut self, _boxes: &[ElementBox]) -> eyre::Result<()> {
        bail!("tensor B-spline bases do not support element-wise refinement")
    }

    fn boundary_anchors(&self, side: BoxSide) -> Option<BoundaryAnchors> {
        let dofs = self.boundary_dofs(side);
        let d = self.dim();
        let mut anchors = DMatrix::zeros(d, dofs.len());
        for (col, &flat) in dofs.iter().enumerate() {
            let tensor = self.decompose(flat);
            for dir in 0..d {
                anchors[(dir, col)] = self.greville(dir, tensor[dir]);
            }
        }
        Some(BoundaryAnchors { dofs, anchors })
    }
}

fn uniform_open_knots(degree: usize, cells: usize) -> Vec<f64> {
    let mut knots = Vec::with_capacity(cells + 2 * degree + 1);
    knots.extend(std::iter::repeat(0.0).take(degree + 1));
    knots.extend((1..cells).map(|i| i as f64 / cells as f64));
    knots.extend(std::iter::repeat(1.0).take(degree + 1));
    knots
}

/// Finds the knot span containing `u` (The NURBS Book, A2.1).
fn find_span(knots: &[f64], degree: usize, u: f64) -> usize {
    let n = knots.len() - degree - 2;
    if u >= knots[n + 1] {
        return n;
    }
    let mut low = degree;
    let mut high = n + 1;
    let mut mid = (low + high) / 2;
    while u < knots[mid] || u >= knots[mid + 1] {
        if u < knots[mid] {
            high = mid;
        } else {
            low = mid;
        }
        mid = (low + high) / 2;
    }
    mid
}

/// Evaluates the non-vanishing univariate basis functions and their
/// derivatives up to `order` at `u` (The NURBS Book, A2.3).
///
/// Returns `order + 1` rows of `degree + 1` entries each; rows of order
/// higher than the degree are zero.
fn derivatives_basis_functions(
    knots: &[f64],
    span: usize,
    u: f64,
    degree: usize,
    order: usize,
) -> Vec<Vec<f64>> {
    let p = degree;
    let nders = order.min(p);

    let mut ndu = vec![vec![0.0; p + 1]; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];
    ndu[0][0] = 1.0;
    for j in 1..=p {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;
        let mut saved = 0.0;
        for r in 0..j {
            // Lower triangle: knot differences; upper triangle: function values
            ndu[j][r] = right[r + 1] + left[j - r];
            let temp = ndu[r][j - 1] / ndu[j][r];
            ndu[r][j] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        ndu[j][j] = saved;
    }

    let mut ders = vec![vec![0.0; p + 1]; order + 1];
    for j in 0..=p {
        ders[0][j] = ndu[j][p];
    }

    let mut a = vec![vec![0.0; p + 1]; 2];
    for r in 0..=p {
        let mut s1 = 0;
        let mut s2 = 1;
        a[0][0] = 1.0;
        for k in 1..=nders {
            let mut dd = 0.0;
            let rk = r as isize - k as isize;
            let pk = (p - k) as isize;
            if r >= k {
                a[s2][0] = a[s1][0] / ndu[(pk + 1) as usize][rk as usize];
                dd = a[s2][0] * ndu[rk as usize][pk as usize];
            }
            let j1 = if rk >= -1 { 1 } else { (-rk) as usize };
            let j2 = if r as isize - 1 <= pk { k - 1 } else { p - r };
            for j in j1..=j2 {
                a[s2][j] =
                    (a[s1][j] - a[s1][j - 1]) / ndu[(pk + 1) as usize][(rk + j as isize) as usize];
                dd += a[s2][j] * ndu[(rk + j as isize) as usize][pk as usize];
            }
            if r as isize <= pk {
                a[s2][k] = -a[s1][k - 1] / ndu[(pk + 1) as usize][r];
                dd += a[s2][k] * ndu[r][pk as usize];
            }
            ders[k][r] = dd;
            std::mem::swap(&mut s1, &mut s2);
        }
    }

    let mut factor = p as f64;
    for k in 1..=nders {
        for j in 0..=p {
            ders[k][j] *= factor;
        }
        factor *= (p - k) as f64;
    }
    ders
}
