//! Mapping of patch-local degrees of freedom to a global numbering.

use eyre::ensure;

/// Maps `(patch, local dof)` pairs to global dof indices.
///
/// Dofs matched across patch interfaces collapse to a single global index;
/// dofs eliminated by Dirichlet conditions are numbered after all free dofs,
/// so `global >= free_dof_count()` identifies an eliminated dof and
/// `global - free_dof_count()` is its bounded index. The mapper is mutable
/// (matching, elimination) until [`DofMapper::finalize`] and immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct DofMapper {
    // Prefix offsets into the flattened (patch, local) index space
    offsets: Vec<usize>,
    parent: Vec<usize>,
    eliminated: Vec<bool>,
    numbering: Option<Vec<usize>>,
    free_count: usize,
    eliminated_count: usize,
}

impl DofMapper {
    /// Creates an unmatched mapper for patches with the given dof counts.
    pub fn with_sizes(patch_dof_counts: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(patch_dof_counts.len() + 1);
        offsets.push(0);
        for &n in patch_dof_counts {
            offsets.push(offsets.last().unwrap() + n);
        }
        let total = *offsets.last().unwrap();
        Self {
            offsets,
            parent: (0..total).collect(),
            eliminated: vec![false; total],
            numbering: None,
            free_count: 0,
            eliminated_count: 0,
        }
    }

    pub fn num_patches(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn patch_dof_count(&self, patch: usize) -> usize {
        assert!(patch < self.num_patches(), "patch index out of range");
        self.offsets[patch + 1] - self.offsets[patch]
    }

    pub fn is_finalized(&self) -> bool {
        self.numbering.is_some()
    }

    fn flat(&self, patch: usize, local: usize) -> usize {
        assert!(patch < self.num_patches(), "patch index out of range");
        assert!(
            local < self.patch_dof_count(patch),
            "local dof {} out of range for patch {}",
            local,
            patch
        );
        self.offsets[patch] + local
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            // Path halving
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        let eliminated = self.eliminated[ra] || self.eliminated[rb];
        self.parent[rb] = ra;
        self.eliminated[ra] = eliminated;
    }

    /// Declares the dofs `dofs1[k]` of `patch1` and `dofs2[k]` of `patch2`
    /// pairwise identical.
    pub fn match_dofs(
        &mut self,
        patch1: usize,
        dofs1: &[usize],
        patch2: usize,
        dofs2: &[usize],
    ) -> eyre::Result<()> {
        ensure!(!self.is_finalized(), "mapper is already finalized");
        ensure!(
            dofs1.len() == dofs2.len(),
            "matched dof lists must have equal length ({} vs {})",
            dofs1.len(),
            dofs2.len()
        );
        for (&d1, &d2) in dofs1.iter().zip(dofs2) {
            let a = self.flat(patch1, d1);
            let b = self.flat(patch2, d2);
            self.union(a, b);
        }
        Ok(())
    }

    /// Flags a dof (and everything matched to it) as eliminated.
    pub fn eliminate_dof(&mut self, patch: usize, local: usize) -> eyre::Result<()> {
        ensure!(!self.is_finalized(), "mapper is already finalized");
        let root = {
            let i = self.flat(patch, local);
            self.find(i)
        };
        self.eliminated[root] = true;
        Ok(())
    }

    /// Closes the mapper: assigns a contiguous global numbering with all free
    /// dofs first (in order of first appearance) and eliminated dofs after.
    pub fn finalize(&mut self) {
        if self.is_finalized() {
            return;
        }
        let total = self.parent.len();
        let mut roots_in_order = Vec::new();
        let mut root_of = vec![0; total];
        let mut seen = vec![false; total];
        for i in 0..total {
            let r = self.find(i);
            root_of[i] = r;
            if !seen[r] {
                seen[r] = true;
                roots_in_order.push(r);
            }
        }

        let free_count = roots_in_order
            .iter()
            .filter(|&&r| !self.eliminated[r])
            .count();
        let mut next_free = 0;
        let mut next_eliminated = free_count;
        let mut number_of_root = vec![usize::MAX; total];
        for &r in &roots_in_order {
            if self.eliminated[r] {
                number_of_root[r] = next_eliminated;
                next_eliminated += 1;
            } else {
                number_of_root[r] = next_free;
                next_free += 1;
            }
        }

        self.numbering = Some(root_of.iter().map(|&r| number_of_root[r]).collect());
        self.free_count = free_count;
        self.eliminated_count = roots_in_order.len() - free_count;
    }

    /// The global index of a patch-local dof.
    ///
    /// # Panics
    ///
    /// Panics if the mapper has not been finalized.
    pub fn index(&self, patch: usize, local: usize) -> usize {
        let numbering = self
            .numbering
            .as_ref()
            .expect("mapper must be finalized before indexing");
        numbering[self.flat(patch, local)]
    }

    /// The number of free (non-eliminated) global dofs.
    pub fn free_dof_count(&self) -> usize {
        assert!(self.is_finalized(), "mapper must be finalized");
        self.free_count
    }

    pub fn eliminated_dof_count(&self) -> usize {
        assert!(self.is_finalized(), "mapper must be finalized");
        self.eliminated_count
    }

    /// The total number of distinct global dofs (free plus eliminated).
    pub fn total_dof_count(&self) -> usize {
        assert!(self.is_finalized(), "mapper must be finalized");
        self.free_count + self.eliminated_count
    }

    /// Whether a global index refers to an eliminated dof.
    pub fn is_eliminated_index(&self, global: usize) -> bool {
        assert!(self.is_finalized(), "mapper must be finalized");
        global >= self.free_count
    }

    /// Whether the given patch-local dof is free.
    pub fn is_free(&self, patch: usize, local: usize) -> bool {
        !self.is_eliminated_index(self.index(patch, local))
    }
}
