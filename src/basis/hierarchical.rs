//! Multilinear hierarchical bases on adaptive index trees.

use crate::basis::{mixed_derivative_offset, num_second_derivatives, Basis, BoundaryAnchors, Element};
use crate::htree::{ElementBox, HierarchicalTree};
use crate::topology::BoxSide;
use eyre::{ensure, eyre};
use nalgebra::{DMatrix, DVector};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// A hierarchical basis of multilinear (degree 1 per direction) functions on
/// an adaptive index tree.
///
/// The mesh consists of the cells of the tree's leaf regions, each at its
/// region's refinement level; one degree of freedom sits at every distinct
/// cell corner, ordered lexicographically by corner coordinates. The basis is
/// repairable: it exposes its tree and supports element-wise refinement.
#[derive(Debug, Clone)]
pub struct HierarchicalBasis {
    tree: HierarchicalTree,
}

/// A single mesh cell in index coordinates at the tree's index level.
#[derive(Debug, Clone)]
struct Cell {
    lower: Vec<u64>,
    upper: Vec<u64>,
}

impl HierarchicalBasis {
    /// Creates an unrefined basis over a grid with the given number of
    /// level-0 cells per direction.
    pub fn new(cells: &[usize]) -> Self {
        Self {
            tree: HierarchicalTree::new(cells),
        }
    }

    pub fn from_tree(tree: HierarchicalTree) -> Self {
        Self { tree }
    }

    /// Enumerates the mesh cells, coordinates at the tree's index level.
    fn cells(&self) -> Vec<Cell> {
        let d = self.tree.dim();
        let shift_up = self.tree.index_level() - self.tree.max_inserted_level();
        let mut cells = Vec::new();
        for leaf in self.tree.leaf_boxes() {
            let lower: Vec<u64> = leaf.lower.iter().map(|&c| c << shift_up).collect();
            let upper: Vec<u64> = leaf.upper.iter().map(|&c| c << shift_up).collect();
            let step = 1u64 << (self.tree.index_level() - leaf.level);
            // Per-direction breakpoints: the grid lines of the leaf's level
            // crossing the leaf, plus the leaf corners themselves (complement
            // pieces of finer refinements need not be grid-aligned at their
            // own level)
            let breaks: Vec<Vec<u64>> = (0..d)
                .map(|dir| {
                    let mut b = vec![lower[dir]];
                    let mut next = (lower[dir] / step + 1) * step;
                    while next < upper[dir] {
                        b.push(next);
                        next += step;
                    }
                    b.push(upper[dir]);
                    b
                })
                .collect();
            let counts: Vec<usize> = breaks.iter().map(|b| b.len() - 1).collect();
            let mut index = vec![0; d];
            loop {
                cells.push(Cell {
                    lower: (0..d).map(|dir| breaks[dir][index[dir]]).collect(),
                    upper: (0..d).map(|dir| breaks[dir][index[dir] + 1]).collect(),
                });
                if !crate::basis::advance(&mut index, &counts) {
                    break;
                }
            }
        }
        cells
    }

    /// All distinct cell corners in lexicographic order; the position of a
    /// corner in this sequence is its dof index.
    fn corners(&self) -> Vec<Vec<u64>> {
        let d = self.tree.dim();
        let mut set = BTreeSet::new();
        for cell in self.cells() {
            for mask in 0..(1usize << d) {
                let corner: Vec<u64> = (0..d)
                    .map(|dir| {
                        if (mask >> dir) & 1 == 1 {
                            cell.upper[dir]
                        } else {
                            cell.lower[dir]
                        }
                    })
                    .collect();
                set.insert(corner);
            }
        }
        set.into_iter().collect()
    }

    fn corner_indices(&self) -> FxHashMap<Vec<u64>, usize> {
        self.corners()
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c, i))
            .collect()
    }

    /// The cell containing the given parametric point.
    fn cell_at(&self, point: &DVector<f64>) -> eyre::Result<Cell> {
        let d = self.tree.dim();
        ensure!(point.len() == d, "point dimension mismatch");
        let upper = self.tree.upper_corner();
        let coords: Vec<u64> = (0..d)
            .map(|dir| {
                let scaled = point[dir] * upper[dir] as f64;
                (scaled.floor() as u64).min(upper[dir] - 1)
            })
            .collect();
        self.cells()
            .into_iter()
            .find(|cell| {
                (0..d).all(|dir| cell.lower[dir] <= coords[dir] && coords[dir] < cell.upper[dir])
            })
            .ok_or_else(|| eyre!("point lies outside the parametric domain"))
    }

    fn param(&self, coord: u64, dir: usize) -> f64 {
        coord as f64 / self.tree.upper_corner()[dir] as f64
    }
}

impl Basis for HierarchicalBasis {
    fn dim(&self) -> usize {
        self.tree.dim()
    }

    fn num_dofs(&self) -> usize {
        self.corners().len()
    }

    fn degree(&self, direction: usize) -> usize {
        assert!(direction < self.dim(), "direction out of range");
        1
    }

    fn active_into(&self, point: &DVector<f64>, actives: &mut Vec<usize>) {
        actives.clear();
        let d = self.dim();
        let cell = self.cell_at(point).expect("point must lie inside the domain");
        let indices = self.corner_indices();
        for mask in 0..(1usize << d) {
            let corner: Vec<u64> = (0..d)
                .map(|dir| {
                    if (mask >> dir) & 1 == 1 {
                        cell.upper[dir]
                    } else {
                        cell.lower[dir]
                    }
                })
                .collect();
            actives.push(indices[&corner]);
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
        let n_active = 1usize << d;
        let n2 = num_second_derivatives(d);

        let cell = self.cell_at(&points.column(0).clone_owned())?;
        let lo: Vec<f64> = (0..d).map(|dir| self.param(cell.lower[dir], dir)).collect();
        let up: Vec<f64> = (0..d).map(|dir| self.param(cell.upper[dir], dir)).collect();
        let extent: Vec<f64> = lo.iter().zip(&up).map(|(l, u)| u - l).collect();

        let mut result = Vec::with_capacity(order + 1);
        result.push(DMatrix::zeros(n_active, npts));
        if order >= 1 {
            result.push(DMatrix::zeros(d * n_active, npts));
        }
        if order >= 2 {
            result.push(DMatrix::zeros(n2 * n_active, npts));
        }

        for k in 0..npts {
            for f in 0..n_active {
                // Univariate hat factors and their slopes per direction
                let mut vals = vec![0.0; d];
                let mut slopes = vec![0.0; d];
                for dir in 0..d {
                    let t = (points[(dir, k)] - lo[dir]) / extent[dir];
                    if (f >> dir) & 1 == 1 {
                        vals[dir] = t;
                        slopes[dir] = 1.0 / extent[dir];
                    } else {
                        vals[dir] = 1.0 - t;
                        slopes[dir] = -1.0 / extent[dir];
                    }
                }
                result[0][(f, k)] = vals.iter().product();
                if order >= 1 {
                    for j in 0..d {
                        let g: f64 = (0..d)
                            .map(|dir| if dir == j { slopes[dir] } else { vals[dir] })
                            .product();
                        result[1][(f * d + j, k)] = g;
                    }
                }
                if order >= 2 {
                    // Pure second derivatives of multilinear functions vanish
                    for j in 0..d {
                        for l in (j + 1)..d {
                            let h: f64 = (0..d)
                                .map(|dir| {
                                    if dir == j || dir == l {
                                        slopes[dir]
                                    } else {
                                        vals[dir]
                                    }
                                })
                                .product();
                            result[2][(f * n2 + mixed_derivative_offset(d, j, l), k)] = h;
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    fn elements(&self) -> Box<dyn Iterator<Item = Element> + '_> {
        let d = self.dim();
        let cells = self.cells();
        let mut iter = cells.into_iter();
        Box::new(std::iter::from_fn(move || {
            let cell = iter.next()?;
            let lower = DVector::from_iterator(d, (0..d).map(|dir| self.param(cell.lower[dir], dir)));
            let upper = DVector::from_iterator(d, (0..d).map(|dir| self.param(cell.upper[dir], dir)));
            Some(Element::new(lower, upper))
        }))
    }

    fn boundary_dofs(&self, side: BoxSide) -> Vec<usize> {
        let dir = side.direction();
        assert!(dir < self.dim(), "side direction out of range");
        let bound = if side.is_upper() {
            self.tree.upper_corner()[dir]
        } else {
            0
        };
        self.corners()
            .iter()
            .enumerate()
            .filter(|(_, corner)| corner[dir] == bound)
            .map(|(i, _)| i)
            .collect()
    }

    fn refine_elements(&mut self, boxes: &[ElementBox]) -> eyre::Result<()> {
        for b in boxes {
            self.tree.refine(b)?;
        }
        Ok(())
    }

    fn tree(&self) -> Option<&HierarchicalTree> {
        Some(&self.tree)
    }

    fn boundary_anchors(&self, side: BoxSide) -> Option<BoundaryAnchors> {
        let d = self.dim();
        let dofs = self.boundary_dofs(side);
        let corners = self.corners();
        let mut anchors = DMatrix::zeros(d, dofs.len());
        for (col, &dof) in dofs.iter().enumerate() {
            for dir in 0..d {
                anchors[(dir, col)] = self.param(corners[dof][dir], dir);
            }
        }
        Some(BoundaryAnchors { dofs, anchors })
    }
}
