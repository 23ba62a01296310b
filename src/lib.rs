//! Constrained truncated-Newton inner solver for PDE-constrained optimal
//! control with box constraints on the controls.
//!
//! [`HessianProblem`] computes an approximate Newton step with CG or CR,
//! applying the reduced Hessian through forward and adjoint sensitivity
//! solves. Problems plug in through [`FormHandler`] and [`GradientProblem`];
//! [`models::poisson`] is a finite-volume reference implementation.

pub mod config;
pub mod control;
pub mod discretization;
pub mod models;
pub mod numerics;
pub mod physics;
pub mod processing;

pub use config::{InnerNewton, PicardConfig, TnmConfig};
pub use control::{ActiveSet, ControlVector};
pub use numerics::krylov::{KrylovReport, KrylovStatus};
pub use numerics::linear::{
    DirectLinearSolver, KrylovLinearSolver, LinearSolveError, LinearSolver, LinearSolverOptions,
};
pub use numerics::reduced::ReducedHessian;
pub use numerics::solver::{HessianProblem, SolverError};
pub use physics::{FormHandler, GradientProblem, Phase, Sensitivity};
