//! Multi-patch isogeometric discretization tools.
//!
//! The crate covers the discretization side of an isogeometric solver for
//! scalar second-order PDEs on multi-patch domains:
//!
//! - [`htree`]: hierarchical index trees recording per-region refinement
//!   levels on integer grids.
//! - [`topology`]: the abstract multi-patch topology (boxes, sides,
//!   interfaces, boundaries) and Dirichlet boundary conditions.
//! - [`basis`]: the [`basis::Basis`] capability trait with tensor-product
//!   B-spline and hierarchical implementations.
//! - [`multibasis`]: one basis per patch, global dof mapping across
//!   conforming interfaces, and interface repair (refining the coarser side
//!   of a hierarchical interface until the meshes match).
//! - [`repair`]: the mismatch-detection algorithms behind interface repair.
//! - [`dofmap`]: patch-local to global dof numbering with elimination.
//! - [`quadrature`], [`geometry`], [`function`]: tensor Gauss rules, geometry
//!   maps and coefficient functions feeding the assembly layer.
//! - [`assembly`]: element-visitor assembly of sparse systems, with a
//!   convection-diffusion-reaction visitor supporting SUPG stabilization.

pub mod assembly;
pub mod basis;
pub mod dofmap;
pub mod function;
pub mod geometry;
pub mod htree;
pub mod multibasis;
pub mod quadrature;
pub mod repair;
pub mod topology;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
