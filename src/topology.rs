//! Box topology: patches, sides, interfaces and domain boundaries.

use eyre::{bail, ensure};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// One of the `2d` sides of a parametric box `[0,1]^d`.
///
/// A side is identified by the parameter direction it is orthogonal to and by
/// whether it lies at the upper end of that direction. The 1-based
/// [`BoxSide::index`] follows the conventional ordering west, east, south,
/// north, front, back.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxSide {
    direction: usize,
    is_upper: bool,
}

impl BoxSide {
    pub fn new(direction: usize, is_upper: bool) -> Self {
        Self { direction, is_upper }
    }

    /// The side at the lower end of the given direction (west/south/front).
    pub fn lower(direction: usize) -> Self {
        Self::new(direction, false)
    }

    /// The side at the upper end of the given direction (east/north/back).
    pub fn upper(direction: usize) -> Self {
        Self::new(direction, true)
    }

    /// The parameter direction this side is orthogonal to.
    pub fn direction(&self) -> usize {
        self.direction
    }

    pub fn is_upper(&self) -> bool {
        self.is_upper
    }

    /// The 1-based side index: west = 1, east = 2, south = 3, north = 4,
    /// front = 5, back = 6.
    pub fn index(&self) -> usize {
        2 * self.direction + 1 + usize::from(self.is_upper)
    }

    pub fn from_index(index: usize) -> Self {
        assert!(index >= 1, "side indices are 1-based");
        Self {
            direction: (index - 1) / 2,
            is_upper: (index - 1) % 2 == 1,
        }
    }
}

/// A side of a specific patch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchSide {
    pub patch: usize,
    pub side: BoxSide,
}

impl PatchSide {
    pub fn new(patch: usize, side: BoxSide) -> Self {
        Self { patch, side }
    }
}

/// An interface between two patch sides, together with the correspondence of
/// parameter directions across it.
///
/// `dir_map` is a permutation of `{0, ..., d-1}` taking directions of the
/// first patch to directions of the second; `dir_orientation[j]` records
/// whether the sense of direction `j` (of the first patch) is preserved when
/// crossing the interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchInterface {
    first: PatchSide,
    second: PatchSide,
    dir_map: Vec<usize>,
    dir_orientation: Vec<bool>,
}

impl PatchInterface {
    /// Creates an interface with explicit direction and orientation maps.
    pub fn new(
        first: PatchSide,
        second: PatchSide,
        dir_map: Vec<usize>,
        dir_orientation: Vec<bool>,
    ) -> eyre::Result<Self> {
        let d = dir_map.len();
        ensure!(
            dir_orientation.len() == d,
            "direction map and orientation must have equal length"
        );
        let mut seen = vec![false; d];
        for &j in &dir_map {
            ensure!(j < d, "direction map entry {} out of range", j);
            ensure!(!seen[j], "direction map is not a permutation");
            seen[j] = true;
        }
        ensure!(
            dir_map[first.side.direction()] == second.side.direction(),
            "direction map must pair the sides' normal directions"
        );
        Ok(Self {
            first,
            second,
            dir_map,
            dir_orientation,
        })
    }

    /// Creates an interface with maps inferred from the side geometry:
    /// normal directions are paired, the remaining directions are paired in
    /// increasing order with preserved orientation, and the normal direction
    /// preserves orientation exactly when the two sides face each other.
    pub fn with_inferred_maps(first: PatchSide, second: PatchSide, dim: usize) -> Self {
        let n1 = first.side.direction();
        let n2 = second.side.direction();
        assert!(n1 < dim && n2 < dim, "side direction out of range");
        let mut dir_map = vec![0; dim];
        dir_map[n1] = n2;
        let free2: Vec<usize> = (0..dim).filter(|&j| j != n2).collect();
        for (k, j1) in (0..dim).filter(|&j| j != n1).enumerate() {
            dir_map[j1] = free2[k];
        }
        let mut dir_orientation = vec![true; dim];
        dir_orientation[n1] = first.side.is_upper() != second.side.is_upper();
        Self {
            first,
            second,
            dir_map,
            dir_orientation,
        }
    }

    pub fn first(&self) -> PatchSide {
        self.first
    }

    pub fn second(&self) -> PatchSide {
        self.second
    }

    pub fn dir_map(&self) -> &[usize] {
        &self.dir_map
    }

    pub fn dir_orientation(&self) -> &[bool] {
        &self.dir_orientation
    }
}

/// The abstract topology of a multi-patch domain: a number of boxes with
/// pairwise interfaces and outer boundaries.
///
/// Invariant: every side of every box belongs to at most one interface, and
/// after [`BoxTopology::add_auto_boundaries`] to exactly one interface or the
/// boundary set.
#[derive(Debug, Clone, Default)]
pub struct BoxTopology {
    dim: usize,
    num_patches: usize,
    interfaces: Vec<PatchInterface>,
    boundaries: Vec<PatchSide>,
    assigned: FxHashSet<PatchSide>,
}

impl BoxTopology {
    pub fn new(dim: usize) -> Self {
        assert!(dim >= 1, "topology dimension must be at least 1");
        Self {
            dim,
            ..Default::default()
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_patches(&self) -> usize {
        self.num_patches
    }

    /// Appends a patch with `2d` unmatched sides; returns its index.
    pub fn add_box(&mut self) -> usize {
        self.num_patches += 1;
        self.num_patches - 1
    }

    /// Registers a bidirectional interface with inferred direction and
    /// orientation maps.
    pub fn add_interface(
        &mut self,
        patch1: usize,
        side1: BoxSide,
        patch2: usize,
        side2: BoxSide,
    ) -> eyre::Result<()> {
        let bi = PatchInterface::with_inferred_maps(
            PatchSide::new(patch1, side1),
            PatchSide::new(patch2, side2),
            self.dim,
        );
        self.add_interface_with_maps(bi)
    }

    /// Registers an interface with caller-provided maps.
    pub fn add_interface_with_maps(&mut self, bi: PatchInterface) -> eyre::Result<()> {
        for ps in [bi.first(), bi.second()] {
            ensure!(
                ps.patch < self.num_patches,
                "patch {} does not exist in the topology",
                ps.patch
            );
            ensure!(
                ps.side.direction() < self.dim,
                "side direction {} out of range for dimension {}",
                ps.side.direction(),
                self.dim
            );
            if self.assigned.contains(&ps) {
                bail!(
                    "side {} of patch {} is already matched or on the boundary",
                    ps.side.index(),
                    ps.patch
                );
            }
        }
        self.assigned.insert(bi.first());
        self.assigned.insert(bi.second());
        self.interfaces.push(bi);
        Ok(())
    }

    /// Declares all still-unmatched sides as domain boundary.
    pub fn add_auto_boundaries(&mut self) {
        for patch in 0..self.num_patches {
            for index in 1..=2 * self.dim {
                let ps = PatchSide::new(patch, BoxSide::from_index(index));
                if !self.assigned.contains(&ps) {
                    self.assigned.insert(ps);
                    self.boundaries.push(ps);
                }
            }
        }
    }

    pub fn interfaces(&self) -> &[PatchInterface] {
        &self.interfaces
    }

    pub fn boundaries(&self) -> &[PatchSide] {
        &self.boundaries
    }

    /// Whether the given side takes part in an interface or the boundary set.
    pub fn is_assigned(&self, side: PatchSide) -> bool {
        self.assigned.contains(&side)
    }
}

/// A set of Dirichlet sides, each associated with an unknown index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundaryConditions {
    dirichlet: Vec<(PatchSide, usize)>,
}

impl BoundaryConditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a patch side as Dirichlet for the given unknown.
    pub fn add_dirichlet(&mut self, side: PatchSide, unknown: usize) {
        self.dirichlet.push((side, unknown));
    }

    /// The Dirichlet sides registered for the given unknown.
    pub fn dirichlet_sides(&self, unknown: usize) -> impl Iterator<Item = PatchSide> + '_ {
        self.dirichlet
            .iter()
            .filter(move |(_, u)| *u == unknown)
            .map(|(ps, _)| *ps)
    }
}
