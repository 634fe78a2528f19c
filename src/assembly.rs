//! Element-visitor assembly of sparse linear systems.
//!
//! The assembly drivers iterate over the elements of each patch and hand
//! every element to an [`ElementVisitor`] in four stages: `initialize` (once
//! per patch), `evaluate`, `assemble` and `local_to_global` (once per
//! element). The visitor owns the weak form; the driver owns the iteration
//! and the quadrature bookkeeping.

use crate::basis::Basis;
use crate::dofmap::DofMapper;
use crate::geometry::GeometryEvaluator;
use crate::multibasis::MultiBasis;
use eyre::ensure;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{coo::CooMatrix, csr::CsrMatrix};
use serde::{Deserialize, Serialize};

mod cdr;
mod visitor;

pub use cdr::*;
pub use visitor::*;

/// Stabilization of the discrete weak form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Stabilization {
    /// Plain Galerkin, no stabilization.
    #[default]
    None,
    /// Streamline-upwind Petrov-Galerkin.
    Supg,
}

/// Options controlling assembly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyOptions {
    /// Quadrature points per parameter direction. When absent, each patch
    /// uses `degree + 1` points per direction.
    pub quadrature_points: Option<Vec<usize>>,
    pub stabilization: Stabilization,
}

/// The global linear system under assembly: a COO matrix over the free dofs,
/// a right-hand side, and the dof mapper that produced the numbering.
///
/// Rows and columns of eliminated dofs never enter the matrix; their known
/// values are moved to the right-hand side during [`SparseSystem::push`].
pub struct SparseSystem {
    matrix: CooMatrix<f64>,
    rhs: DVector<f64>,
    mapper: DofMapper,
}

impl SparseSystem {
    pub fn new(mapper: DofMapper) -> eyre::Result<Self> {
        ensure!(
            mapper.is_finalized(),
            "the dof mapper must be finalized before assembly"
        );
        let n = mapper.free_dof_count();
        Ok(Self {
            matrix: CooMatrix::new(n, n),
            rhs: DVector::zeros(n),
            mapper,
        })
    }

    pub fn mapper(&self) -> &DofMapper {
        &self.mapper
    }

    /// Maps patch-local dof indices to global indices (free and eliminated).
    pub fn map_indices(&self, patch: usize, locals: &[usize]) -> Vec<usize> {
        locals
            .iter()
            .map(|&local| self.mapper.index(patch, local))
            .collect()
    }

    /// Adds one element contribution.
    ///
    /// `globals[i]` is the global index of row/column `i` of `local_matrix`.
    /// Rows of eliminated dofs are dropped; columns of eliminated dofs are
    /// folded into the right-hand side using their prescribed values
    /// (`eliminated_values[g - free_dof_count]` for eliminated index `g`).
    pub fn push(
        &mut self,
        local_matrix: &DMatrix<f64>,
        local_rhs: &DVector<f64>,
        globals: &[usize],
        eliminated_values: &DVector<f64>,
    ) {
        assert_eq!(local_matrix.nrows(), globals.len());
        assert_eq!(local_rhs.len(), globals.len());
        let free = self.mapper.free_dof_count();
        for (i, &gi) in globals.iter().enumerate() {
            if gi >= free {
                continue;
            }
            self.rhs[gi] += local_rhs[i];
            for (j, &gj) in globals.iter().enumerate() {
                if gj < free {
                    self.matrix.push(gi, gj, local_matrix[(i, j)]);
                } else {
                    self.rhs[gi] -= local_matrix[(i, j)] * eliminated_values[gj - free];
                }
            }
        }
    }

    pub fn matrix(&self) -> &CooMatrix<f64> {
        &self.matrix
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Consumes the system, compressing the matrix (duplicate entries are
    /// summed).
    pub fn into_csr(self) -> (CsrMatrix<f64>, DVector<f64>) {
        (CsrMatrix::from(&self.matrix), self.rhs)
    }
}

/// Assembles the contributions of one patch into the system.
///
/// `eliminated_values` holds the prescribed values of all eliminated dofs in
/// the mapper's eliminated numbering; pass zeros for homogeneous conditions.
pub fn assemble_patch(
    visitor: &mut dyn ElementVisitor,
    basis: &dyn Basis,
    geometry: &mut dyn GeometryEvaluator,
    patch: usize,
    options: &AssemblyOptions,
    eliminated_values: &DVector<f64>,
    system: &mut SparseSystem,
) -> eyre::Result<()> {
    ensure!(
        geometry.geometry_dim() == basis.dim(),
        "geometry dimension {} does not match basis dimension {}",
        geometry.geometry_dim(),
        basis.dim()
    );
    ensure!(
        eliminated_values.len() == system.mapper().eliminated_dof_count(),
        "expected {} eliminated dof values, got {}",
        system.mapper().eliminated_dof_count(),
        eliminated_values.len()
    );

    let (rule, _flags) = visitor.initialize(basis, patch, options)?;
    let mut count = 0usize;
    for element in basis.elements() {
        let (nodes, weights) = rule.map_to_element(&element);
        visitor.evaluate(basis, geometry, &nodes)?;
        visitor.assemble(&element, geometry, &weights)?;
        visitor.local_to_global(patch, eliminated_values, system)?;
        count += 1;
    }
    log::debug!("assembled {} elements on patch {}", count, patch);
    Ok(())
}

/// Assembles all patches of a multi-basis, one geometry evaluator per patch.
pub fn assemble_multipatch(
    visitor: &mut dyn ElementVisitor,
    bases: &MultiBasis,
    geometries: &mut [Box<dyn GeometryEvaluator>],
    options: &AssemblyOptions,
    eliminated_values: &DVector<f64>,
    system: &mut SparseSystem,
) -> eyre::Result<()> {
    ensure!(
        geometries.len() == bases.num_bases(),
        "got {} geometry evaluators for {} patches",
        geometries.len(),
        bases.num_bases()
    );
    for patch in 0..bases.num_bases() {
        assemble_patch(
            visitor,
            bases.basis(patch),
            &mut *geometries[patch],
            patch,
            options,
            eliminated_values,
            system,
        )?;
    }
    Ok(())
}
