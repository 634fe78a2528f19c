//! The element-visitor protocol driven by the assembly loop.

use crate::assembly::{AssemblyOptions, SparseSystem};
use crate::basis::{Basis, Element};
use crate::geometry::GeometryEvaluator;
use crate::quadrature::GaussTensorRule;
use nalgebra::{DMatrix, DVector};

/// The geometry quantities a visitor needs per element.
///
/// Returned by [`ElementVisitor::initialize`] so that a driver working with
/// expensive geometry maps can skip quantities the visitor never reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalFlags {
    pub need_values: bool,
    pub need_measure: bool,
    pub need_gradient_transform: bool,
    pub need_second_derivatives: bool,
}

/// A weak-form visitor invoked once per element.
///
/// The driver calls the stages in order: [`ElementVisitor::initialize`] once
/// per patch, then per element [`ElementVisitor::evaluate`] (basis and
/// coefficient evaluation at the quadrature nodes),
/// [`ElementVisitor::assemble`] (local matrix and right-hand side) and
/// [`ElementVisitor::local_to_global`] (scatter into the global system).
pub trait ElementVisitor {
    /// Prepares the visitor for a patch; returns the quadrature rule to use
    /// and the geometry quantities required on each element.
    fn initialize(
        &mut self,
        basis: &dyn Basis,
        patch: usize,
        options: &AssemblyOptions,
    ) -> eyre::Result<(GaussTensorRule, EvalFlags)>;

    /// Evaluates basis functions, geometry and coefficients at the quadrature
    /// nodes of one element (one column per node).
    fn evaluate(
        &mut self,
        basis: &dyn Basis,
        geometry: &mut dyn GeometryEvaluator,
        nodes: &DMatrix<f64>,
    ) -> eyre::Result<()>;

    /// Accumulates the local matrix and right-hand side of the element using
    /// the quadrature weights of the last [`ElementVisitor::evaluate`] batch.
    fn assemble(
        &mut self,
        element: &Element,
        geometry: &mut dyn GeometryEvaluator,
        weights: &DVector<f64>,
    ) -> eyre::Result<()>;

    /// Scatters the local contributions into the global system.
    fn local_to_global(
        &self,
        patch: usize,
        eliminated_values: &DVector<f64>,
        system: &mut SparseSystem,
    ) -> eyre::Result<()>;
}
