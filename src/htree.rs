//! Hierarchical index trees over regular multi-level grids.
//!
//! A [`HierarchicalTree`] tracks, per patch, which regions of the parametric
//! domain have been refined to which level. Coordinates are integers on a
//! regular grid whose resolution doubles with every level; every coordinate is
//! therefore only meaningful together with the level it is expressed at.
//! Conversions between levels are explicit shifts, see [`shift_index`].

use crate::topology::BoxSide;
use eyre::{ensure, eyre};
use serde::{Deserialize, Serialize};

/// The index level used by newly constructed trees.
///
/// Determines the finest level a tree can represent. Every level-0 cell spans
/// `2^DEFAULT_INDEX_LEVEL` index units, so refinement boxes down to this level
/// can be expressed exactly.
pub const DEFAULT_INDEX_LEVEL: u8 = 16;

/// Re-expresses a grid coordinate given at `from_level` at `to_level`.
///
/// Shifting to a finer level is exact. Shifting to a coarser level truncates,
/// so it is only exact for coordinates aligned with the coarser grid.
#[inline]
pub fn shift_index(value: u64, from_level: u8, to_level: u8) -> u64 {
    if to_level >= from_level {
        value << (to_level - from_level)
    } else {
        value >> (from_level - to_level)
    }
}

/// An axis-aligned box of grid cells expressed at a specific refinement level.
///
/// `lower` and `upper` are cell-corner coordinates at `level`, with
/// `lower < upper` componentwise. This is the currency of refinement commands
/// (`Basis::refine_elements`) and of the interface repair algorithms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementBox {
    pub level: u8,
    pub lower: Vec<u64>,
    pub upper: Vec<u64>,
}

impl ElementBox {
    pub fn new(level: u8, lower: Vec<u64>, upper: Vec<u64>) -> Self {
        assert_eq!(lower.len(), upper.len(), "corner dimensions must agree");
        Self { level, lower, upper }
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// Re-expresses both corners at the given level.
    pub fn shift_to_level(&self, level: u8) -> ElementBox {
        ElementBox {
            level,
            lower: self
                .lower
                .iter()
                .map(|&c| shift_index(c, self.level, level))
                .collect(),
            upper: self
                .upper
                .iter()
                .map(|&c| shift_index(c, self.level, level))
                .collect(),
        }
    }
}

/// A box on the boundary face of a tree, as reported by
/// [`HierarchicalTree::boxes_on_side`].
///
/// In contrast to [`ElementBox`], the corner coordinates are expressed at the
/// tree's `max_inserted_level`, while `level` records the refinement level of
/// the region the box belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideBox {
    pub lower: Vec<u64>,
    pub upper: Vec<u64>,
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Leaf {
    // Corner coordinates at the tree's index level
    lower: Vec<u64>,
    upper: Vec<u64>,
    level: u8,
}

impl Leaf {
    fn overlaps(&self, lower: &[u64], upper: &[u64]) -> bool {
        self.lower
            .iter()
            .zip(&self.upper)
            .zip(lower.iter().zip(upper))
            .all(|((&sl, &su), (&ol, &ou))| sl < ou && ol < su)
    }
}

/// A tree over a regular multi-level index grid recording per-region
/// refinement levels.
///
/// The tree starts out as a single region at level 0 covering a grid of
/// `cells` level-0 cells per direction. [`HierarchicalTree::refine`] raises
/// the level of a sub-box; the leaves always form a disjoint partition of the
/// domain. All leaf coordinates are stored at the fixed `index_level`, the
/// finest resolution the tree can address.
#[derive(Debug, Clone)]
pub struct HierarchicalTree {
    dim: usize,
    index_level: u8,
    max_inserted_level: u8,
    // Upper domain corner at `index_level`
    upper_corner: Vec<u64>,
    leaves: Vec<Leaf>,
}

impl HierarchicalTree {
    /// Creates a tree over a grid with the given number of level-0 cells per
    /// direction.
    pub fn new(cells: &[usize]) -> Self {
        Self::with_index_level(cells, DEFAULT_INDEX_LEVEL)
    }

    /// Creates a tree with an explicit index level.
    pub fn with_index_level(cells: &[usize], index_level: u8) -> Self {
        assert!(!cells.is_empty(), "tree dimension must be at least 1");
        assert!(
            cells.iter().all(|&n| n > 0),
            "each direction needs at least one cell"
        );
        assert!(index_level >= 1 && index_level < 48, "index level out of range");
        let upper_corner: Vec<u64> = cells.iter().map(|&n| (n as u64) << index_level).collect();
        let root = Leaf {
            lower: vec![0; cells.len()],
            upper: upper_corner.clone(),
            level: 0,
        };
        Self {
            dim: cells.len(),
            index_level,
            max_inserted_level: 0,
            upper_corner,
            leaves: vec![root],
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The level the tree's own index coordinates are expressed at.
    pub fn index_level(&self) -> u8 {
        self.index_level
    }

    /// The finest level any leaf has been refined to.
    pub fn max_inserted_level(&self) -> u8 {
        self.max_inserted_level
    }

    /// The upper domain corner, expressed at [`Self::index_level`].
    pub fn upper_corner(&self) -> &[u64] {
        &self.upper_corner
    }

    /// The upper domain corner re-expressed at the given level.
    pub fn upper_corner_at(&self, level: u8) -> Vec<u64> {
        self.upper_corner
            .iter()
            .map(|&c| shift_index(c, self.index_level, level))
            .collect()
    }

    /// Raises the refinement level of the cells covered by `region` to
    /// `region.level` (regions already at a finer level are left alone).
    pub fn refine(&mut self, region: &ElementBox) -> eyre::Result<()> {
        ensure!(
            region.dim() == self.dim,
            "refinement box dimension {} does not match tree dimension {}",
            region.dim(),
            self.dim
        );
        ensure!(
            region.level <= self.index_level,
            "refinement level {} exceeds the tree's index level {}",
            region.level,
            self.index_level
        );
        let lower: Vec<u64> = region
            .lower
            .iter()
            .map(|&c| shift_index(c, region.level, self.index_level))
            .collect();
        let upper: Vec<u64> = region
            .upper
            .iter()
            .map(|&c| shift_index(c, region.level, self.index_level))
            .collect();
        for d in 0..self.dim {
            ensure!(
                lower[d] < upper[d] && upper[d] <= self.upper_corner[d],
                "refinement box is empty or exceeds the domain in direction {}",
                d
            );
        }

        let mut result = Vec::with_capacity(self.leaves.len());
        for leaf in self.leaves.drain(..) {
            if leaf.level >= region.level || !leaf.overlaps(&lower, &upper) {
                result.push(leaf);
                continue;
            }
            // Intersect the leaf with the refinement region and carve the
            // intersection out, keeping the complement pieces at the old level
            let isect = Leaf {
                lower: leaf
                    .lower
                    .iter()
                    .zip(&lower)
                    .map(|(&a, &b)| a.max(b))
                    .collect(),
                upper: leaf
                    .upper
                    .iter()
                    .zip(&upper)
                    .map(|(&a, &b)| a.min(b))
                    .collect(),
                level: region.level,
            };
            let mut core = leaf.clone();
            for d in 0..self.dim {
                if core.lower[d] < isect.lower[d] {
                    let mut piece = core.clone();
                    piece.upper[d] = isect.lower[d];
                    core.lower[d] = isect.lower[d];
                    result.push(piece);
                }
                if isect.upper[d] < core.upper[d] {
                    let mut piece = core.clone();
                    piece.lower[d] = isect.upper[d];
                    core.upper[d] = isect.upper[d];
                    result.push(piece);
                }
            }
            debug_assert_eq!(core.lower, isect.lower);
            debug_assert_eq!(core.upper, isect.upper);
            result.push(isect);
        }
        self.leaves = result;
        self.max_inserted_level = self.max_inserted_level.max(region.level);
        Ok(())
    }

    /// Returns the boxes adjacent to the given domain face.
    ///
    /// Corner coordinates are expressed at [`Self::max_inserted_level`]; each
    /// box carries the refinement level of its region. The boxes partition the
    /// face.
    pub fn boxes_on_side(&self, side: BoxSide) -> Vec<SideBox> {
        let dir = side.direction();
        assert!(dir < self.dim, "side direction out of range");
        let shift_down = self.index_level - self.max_inserted_level;
        self.leaves
            .iter()
            .filter(|leaf| {
                if side.is_upper() {
                    leaf.upper[dir] == self.upper_corner[dir]
                } else {
                    leaf.lower[dir] == 0
                }
            })
            .map(|leaf| SideBox {
                lower: leaf.lower.iter().map(|&c| c >> shift_down).collect(),
                upper: leaf.upper.iter().map(|&c| c >> shift_down).collect(),
                level: leaf.level,
            })
            .collect()
    }

    /// Returns all leaf boxes, coordinates expressed at
    /// [`Self::max_inserted_level`].
    pub fn leaf_boxes(&self) -> Vec<SideBox> {
        let shift_down = self.index_level - self.max_inserted_level;
        self.leaves
            .iter()
            .map(|leaf| SideBox {
                lower: leaf.lower.iter().map(|&c| c >> shift_down).collect(),
                upper: leaf.upper.iter().map(|&c| c >> shift_down).collect(),
                level: leaf.level,
            })
            .collect()
    }

    /// Returns the refinement level at the cell containing the given point
    /// (coordinates at the tree's index level).
    pub fn level_at(&self, point: &[u64]) -> eyre::Result<u8> {
        ensure!(point.len() == self.dim, "query point dimension mismatch");
        self.leaves
            .iter()
            .find(|leaf| {
                leaf.lower
                    .iter()
                    .zip(&leaf.upper)
                    .zip(point)
                    .all(|((&lo, &up), &p)| lo <= p && p < up)
            })
            .map(|leaf| leaf.level)
            .ok_or_else(|| eyre!("query point lies outside the tree domain"))
    }

    /// Total domain volume in index units, for partition sanity checks.
    pub fn domain_volume(&self) -> u128 {
        self.upper_corner.iter().map(|&c| c as u128).product()
    }

    /// Summed volume of all leaves in index units.
    pub fn leaf_volume(&self) -> u128 {
        self.leaves
            .iter()
            .map(|leaf| {
                leaf.lower
                    .iter()
                    .zip(&leaf.upper)
                    .map(|(&lo, &up)| (up - lo) as u128)
                    .product::<u128>()
            })
            .sum()
    }
}
