use crate::control::{ActiveSet, ControlVector};
use crate::numerics::linear::LinearSystem;
use crate::numerics::solver::SolverError;
use kryst::matrix::sparse::CsrMatrix;
use nalgebra::DVector;
use std::fmt;
use std::sync::Arc;

/// Which linearized system a sensitivity solve belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sensitivity {
    /// Linearized state equation forced by the test direction.
    Forward,
    /// Linearized adjoint equation forced by the forward sensitivity.
    Adjoint,
}

/// Named stage of a (possibly coupled) block solve, used in error reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    State,
    Adjoint,
    StateSensitivity,
    AdjointSensitivity,
}

impl From<Sensitivity> for Phase {
    fn from(kind: Sensitivity) -> Self {
        match kind {
            Sensitivity::Forward => Phase::StateSensitivity,
            Sensitivity::Adjoint => Phase::AdjointSensitivity,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::State => write!(f, "Picard iteration for the state system"),
            Phase::Adjoint => write!(f, "Picard iteration for the adjoint system"),
            Phase::StateSensitivity => {
                write!(f, "Picard iteration for the computation of the state sensitivity")
            }
            Phase::AdjointSensitivity => {
                write!(f, "Picard iteration for the computation of the adjoint sensitivity")
            }
        }
    }
}

/// Defines the contract between the Newton inner solver and a discretized
/// optimal control problem.
///
/// Implementors own the state/adjoint sensitivities and the current test
/// direction; the solver only drives the order in which systems are
/// assembled and solved.
pub trait FormHandler {
    /// Size of each control block.
    fn control_dims(&self) -> Vec<usize>;

    /// Number of state blocks.
    fn state_dim(&self) -> usize;

    /// Whether the state blocks are mutually coupled and need a Picard loop.
    fn state_is_picard(&self) -> bool;

    /// Inner product of the control space (not necessarily Euclidean).
    fn scalar_product(&self, a: &ControlVector, b: &ControlVector) -> f64;

    /// Current active sets with respect to the control bounds.
    fn compute_active_sets(&mut self) -> ActiveSet;

    /// Load the direction the next sensitivity systems are forced by.
    fn set_test_direction(&mut self, h: &ControlVector);

    /// Assemble block `block` of the linearized state (`Forward`) or adjoint
    /// (`Adjoint`) system, using the current values of the other blocks.
    fn sensitivity_system(&self, kind: Sensitivity, block: usize) -> LinearSystem;

    fn sensitivity(&self, kind: Sensitivity, block: usize) -> &DVector<f64>;

    fn set_sensitivity(&mut self, kind: Sensitivity, block: usize, value: DVector<f64>);

    /// Raw Hessian action on control block `block` as a functional (dual vector),
    /// evaluated from the current adjoint sensitivities.
    fn hessian_rhs(&self, block: usize) -> DVector<f64>;

    /// Matrix of the control-space inner product of block `block`.
    fn riesz_matrix(&self, block: usize) -> Arc<CsrMatrix<f64>>;
}

/// Recomputes the reduced gradient at the current controls.
pub trait GradientProblem<F> {
    fn solve(&mut self, form_handler: &mut F) -> Result<&ControlVector, SolverError>;
}
