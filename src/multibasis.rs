//! A collection of bases forming a multi-patch discretization space.

use crate::basis::Basis;
use crate::dofmap::DofMapper;
use crate::repair::{find_mismatched_elements, find_mismatched_elements_2d};
use crate::topology::{BoundaryConditions, BoxTopology, PatchInterface};
use eyre::{ensure, eyre, WrapErr};
use rustc_hash::FxHashMap;

// Anchor coordinates are matched through a quantized hash key; 2^20 grid
// steps per unit length is far below any realistic knot spacing
const ANCHOR_QUANTIZATION: f64 = (1u64 << 20) as f64;

/// One basis per patch of a [`BoxTopology`], with operations that couple the
/// patches: global dof mapping across interfaces and interface repair for
/// hierarchical bases.
pub struct MultiBasis {
    bases: Vec<Box<dyn Basis>>,
    topology: BoxTopology,
}

impl MultiBasis {
    /// Creates an empty multi-basis over the given topology. Bases must be
    /// added in patch order via [`MultiBasis::add_basis`].
    pub fn new(topology: BoxTopology) -> Self {
        Self {
            bases: Vec::new(),
            topology,
        }
    }

    /// Appends the basis of the next patch.
    pub fn add_basis(&mut self, basis: Box<dyn Basis>) -> eyre::Result<()> {
        ensure!(
            basis.dim() == self.topology.dim(),
            "basis dimension {} does not match topology dimension {}",
            basis.dim(),
            self.topology.dim()
        );
        ensure!(
            self.bases.len() < self.topology.num_patches(),
            "topology has only {} patches",
            self.topology.num_patches()
        );
        self.bases.push(basis);
        Ok(())
    }

    pub fn num_bases(&self) -> usize {
        self.bases.len()
    }

    pub fn dim(&self) -> usize {
        self.topology.dim()
    }

    pub fn topology(&self) -> &BoxTopology {
        &self.topology
    }

    pub fn basis(&self, patch: usize) -> &dyn Basis {
        assert!(patch < self.bases.len(), "patch index out of range");
        &*self.bases[patch]
    }

    /// The largest degree in the given direction over all patches.
    pub fn max_degree(&self, direction: usize) -> eyre::Result<usize> {
        ensure!(!self.bases.is_empty(), "multi-basis holds no bases");
        Ok(self
            .bases
            .iter()
            .map(|b| b.degree(direction))
            .max()
            .unwrap_or(0))
    }

    /// The smallest degree in the given direction over all patches.
    pub fn min_degree(&self, direction: usize) -> eyre::Result<usize> {
        ensure!(!self.bases.is_empty(), "multi-basis holds no bases");
        Ok(self
            .bases
            .iter()
            .map(|b| b.degree(direction))
            .min()
            .unwrap_or(0))
    }

    /// The largest degree over all patches and directions.
    pub fn max_cwise_degree(&self) -> eyre::Result<usize> {
        ensure!(!self.bases.is_empty(), "multi-basis holds no bases");
        Ok(self.bases.iter().map(|b| b.max_degree()).max().unwrap_or(0))
    }

    /// The smallest degree over all patches and directions.
    pub fn min_cwise_degree(&self) -> eyre::Result<usize> {
        ensure!(!self.bases.is_empty(), "multi-basis holds no bases");
        Ok(self.bases.iter().map(|b| b.min_degree()).min().unwrap_or(0))
    }

    /// Builds a finalized dof mapper without boundary conditions.
    ///
    /// With `conforming` set, dofs on either side of every interface are
    /// identified by their parametric anchor points; otherwise the patches
    /// stay fully decoupled.
    pub fn mapper(&self, conforming: bool) -> eyre::Result<DofMapper> {
        self.mapper_with_bc(conforming, &BoundaryConditions::new(), 0)
    }

    /// Builds a finalized dof mapper, eliminating the dofs on all Dirichlet
    /// sides registered for `unknown`.
    pub fn mapper_with_bc(
        &self,
        conforming: bool,
        bc: &BoundaryConditions,
        unknown: usize,
    ) -> eyre::Result<DofMapper> {
        ensure!(
            self.bases.len() == self.topology.num_patches(),
            "multi-basis holds {} bases for {} patches",
            self.bases.len(),
            self.topology.num_patches()
        );
        let sizes: Vec<usize> = self.bases.iter().map(|b| b.num_dofs()).collect();
        let mut mapper = DofMapper::with_sizes(&sizes);

        if conforming {
            for bi in self.topology.interfaces() {
                self.match_interface(bi, &mut mapper)
                    .wrap_err_with(|| {
                        format!(
                            "cannot match interface between patch {} and patch {}",
                            bi.first().patch,
                            bi.second().patch
                        )
                    })?;
            }
        }

        for ps in bc.dirichlet_sides(unknown) {
            ensure!(
                ps.patch < self.bases.len(),
                "Dirichlet side refers to unknown patch {}",
                ps.patch
            );
            for dof in self.bases[ps.patch].boundary_dofs(ps.side) {
                mapper.eliminate_dof(ps.patch, dof)?;
            }
        }

        mapper.finalize();
        Ok(mapper)
    }

    /// Identifies the dofs on both sides of one interface by mapping the
    /// first side's anchor points into the second side's parameter domain.
    fn match_interface(&self, bi: &PatchInterface, mapper: &mut DofMapper) -> eyre::Result<()> {
        let d = self.dim();
        let (p0, p1) = (bi.first().patch, bi.second().patch);
        let anchors0 = self.bases[p0]
            .boundary_anchors(bi.first().side)
            .ok_or_else(|| {
                eyre!("basis of patch {} does not expose boundary anchors", p0)
            })?;
        let anchors1 = self.bases[p1]
            .boundary_anchors(bi.second().side)
            .ok_or_else(|| {
                eyre!("basis of patch {} does not expose boundary anchors", p1)
            })?;
        ensure!(
            anchors0.dofs.len() == anchors1.dofs.len(),
            "interface dofs do not match: {} on patch {} vs {} on patch {}",
            anchors0.dofs.len(),
            p0,
            anchors1.dofs.len(),
            p1
        );

        // Index the second side's anchors by quantized coordinates
        let mut lookup = FxHashMap::default();
        for (col, &dof) in anchors1.dofs.iter().enumerate() {
            let key: Vec<i64> = (0..d)
                .map(|j| (anchors1.anchors[(j, col)] * ANCHOR_QUANTIZATION).round() as i64)
                .collect();
            lookup.insert(key, dof);
        }

        let normal0 = bi.first().side.direction();
        let mut dofs0 = Vec::with_capacity(anchors0.dofs.len());
        let mut dofs1 = Vec::with_capacity(anchors0.dofs.len());
        for (col, &dof) in anchors0.dofs.iter().enumerate() {
            // Image of the anchor in the second patch's parameter domain
            let mut image = vec![0.0; d];
            for jj in 0..d {
                let j = bi.dir_map()[jj];
                image[j] = if jj == normal0 {
                    if bi.second().side.is_upper() {
                        1.0
                    } else {
                        0.0
                    }
                } else if bi.dir_orientation()[jj] {
                    anchors0.anchors[(jj, col)]
                } else {
                    1.0 - anchors0.anchors[(jj, col)]
                };
            }
            let key: Vec<i64> = image
                .iter()
                .map(|&x| (x * ANCHOR_QUANTIZATION).round() as i64)
                .collect();
            let partner = lookup.get(&key).copied().ok_or_else(|| {
                eyre!(
                    "interface dofs do not match: no partner on patch {} for \
                     dof {} of patch {}",
                    p1,
                    dof,
                    p0
                )
            })?;
            dofs0.push(dof);
            dofs1.push(partner);
        }

        mapper.match_dofs(p0, &dofs0, p1, &dofs1)
    }

    /// Repairs one interface: refines the coarser side wherever the meshes of
    /// the two patches do not match. Returns whether anything was refined.
    ///
    /// Both bases must be hierarchical (expose a tree); the interface must
    /// connect two distinct patches.
    pub fn repair_interface(&mut self, bi: &PatchInterface) -> eyre::Result<bool> {
        let (elts0, elts1) = {
            let (t0, t1) = self.interface_trees(bi)?;
            find_mismatched_elements(bi, t0, t1)?
        };
        self.apply_repair(bi, &elts0, &elts1)
    }

    /// Repairs one 2D interface using the sorted knot-span merge.
    pub fn repair_interface_2d(&mut self, bi: &PatchInterface) -> eyre::Result<bool> {
        let (elts0, elts1) = {
            let (t0, t1) = self.interface_trees(bi)?;
            find_mismatched_elements_2d(bi, t0, t1)?
        };
        self.apply_repair(bi, &elts0, &elts1)
    }

    fn interface_trees(
        &self,
        bi: &PatchInterface,
    ) -> eyre::Result<(&crate::htree::HierarchicalTree, &crate::htree::HierarchicalTree)> {
        let (p0, p1) = (bi.first().patch, bi.second().patch);
        ensure!(p0 < self.bases.len(), "interface refers to unknown patch {}", p0);
        ensure!(p1 < self.bases.len(), "interface refers to unknown patch {}", p1);
        ensure!(
            p0 != p1,
            "interface repair between two sides of the same patch is unsupported"
        );
        let t0 = self.bases[p0].tree().ok_or_else(|| {
            eyre!("basis of patch {} is not hierarchical; interface repair is unsupported", p0)
        })?;
        let t1 = self.bases[p1].tree().ok_or_else(|| {
            eyre!("basis of patch {} is not hierarchical; interface repair is unsupported", p1)
        })?;
        Ok((t0, t1))
    }

    fn apply_repair(
        &mut self,
        bi: &PatchInterface,
        elts_first: &[crate::htree::ElementBox],
        elts_second: &[crate::htree::ElementBox],
    ) -> eyre::Result<bool> {
        let changed = !elts_first.is_empty() || !elts_second.is_empty();
        if changed {
            log::debug!(
                "repairing interface between patch {} and patch {}: \
                 {} + {} refinement boxes",
                bi.first().patch,
                bi.second().patch,
                elts_first.len(),
                elts_second.len()
            );
            if !elts_first.is_empty() {
                self.bases[bi.first().patch].refine_elements(elts_first)?;
            }
            if !elts_second.is_empty() {
                self.bases[bi.second().patch].refine_elements(elts_second)?;
            }
        }
        Ok(changed)
    }

    /// Repairs all interfaces of the topology until nothing changes anymore.
    ///
    /// Repairing one interface can introduce mismatches on a neighboring one,
    /// so the interfaces are swept repeatedly. Each sweep strictly refines at
    /// least one patch, so termination is guaranteed; the pass bound only
    /// guards against defects.
    pub fn repair_to_fixpoint(&mut self) -> eyre::Result<()> {
        const MAX_PASSES: usize = 64;
        let interfaces = self.topology.interfaces().to_vec();
        for pass in 0..MAX_PASSES {
            let mut changed = false;
            for bi in &interfaces {
                changed |= self.repair_interface(bi)?;
            }
            if !changed {
                log::debug!("interfaces matched after {} repair sweeps", pass + 1);
                return Ok(());
            }
        }
        eyre::bail!("interface repair did not converge within {} sweeps", MAX_PASSES)
    }
}
