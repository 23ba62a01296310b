use crate::config::{InnerNewton, TnmConfig};
use crate::control::{ActiveSet, ControlVector};
use crate::numerics::hessian::HessianOperator;
use crate::numerics::krylov::{
    conjugate_gradient, conjugate_residual, KrylovParams, KrylovReport, SolverWorkspace,
};
use crate::numerics::linear::{LinearSolveError, LinearSolver};
use crate::numerics::reduced::{ActiveSetOperator, ReducedHessian};
#[allow(unused)]
use crate::numerics::timing::{finalize_and_log, reset_timing};
use crate::physics::{FormHandler, GradientProblem, Phase};
use thiserror::Error;

#[cfg(feature = "timing")]
use std::time::Instant;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("{phase} failed to converge within {max_iterations} iterations")]
    NotConverged { phase: Phase, max_iterations: usize },
    #[error("invalid configuration for `{key}`: {reason}")]
    Configuration { key: &'static str, reason: String },
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),
    #[error("linear solve failed: {0}")]
    LinearSolve(#[from] LinearSolveError),
    #[error("control layout mismatch: expected blocks {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("invalid active set: {0}")]
    InvalidActiveSet(String),
}

/// Truncated Newton inner solver for one optimization problem.
///
/// Owns the form handler, the gradient problem and all scratch storage;
/// every call to [`HessianProblem::newton_solve`] reuses them.
pub struct HessianProblem<F, G, L> {
    form_handler: F,
    gradient_problem: G,
    hessian: HessianOperator<L>,
    strategy: ReducedHessian,
    inner_newton: InnerNewton,
    params: KrylovParams,
    dims: Vec<usize>,
    workspace: SolverWorkspace,
    last_report: Option<KrylovReport>,
}

impl<F, G, L> HessianProblem<F, G, L>
where
    F: FormHandler,
    G: GradientProblem<F>,
    L: LinearSolver,
{
    /// Problems with control bounds: active sets are computed by the form
    /// handler on every call and the Hessian acts as the identity on them.
    pub fn box_constrained(
        form_handler: F,
        gradient_problem: G,
        linear_solver: L,
        config: TnmConfig,
    ) -> Result<Self, SolverError> {
        Self::new(
            ReducedHessian::Passthrough,
            form_handler,
            gradient_problem,
            linear_solver,
            config,
        )
    }

    /// Problems where the caller supplies the active set on every call and
    /// active DOFs are held fixed.
    pub fn unconstrained(
        form_handler: F,
        gradient_problem: G,
        linear_solver: L,
        config: TnmConfig,
    ) -> Result<Self, SolverError> {
        Self::new(
            ReducedHessian::Clamped,
            form_handler,
            gradient_problem,
            linear_solver,
            config,
        )
    }

    fn new(
        strategy: ReducedHessian,
        form_handler: F,
        gradient_problem: G,
        linear_solver: L,
        config: TnmConfig,
    ) -> Result<Self, SolverError> {
        let dims = form_handler.control_dims();
        config.validate(dims.len(), form_handler.state_dim())?;

        Ok(Self {
            hessian: HessianOperator::new(linear_solver, &config),
            strategy,
            inner_newton: config.inner_newton,
            params: KrylovParams {
                max_iterations: config.max_it_inner_newton,
                tolerance: config.inner_newton_tolerance,
            },
            workspace: SolverWorkspace::new(&dims),
            dims,
            form_handler,
            gradient_problem,
            last_report: None,
        })
    }

    /// Compute a truncated Newton step at the current controls.
    ///
    /// `active` must be `None` for box-constrained problems and `Some` for
    /// unconstrained ones. The gradient is recomputed exactly once.
    pub fn newton_solve(&mut self, active: Option<&ActiveSet>) -> Result<ControlVector, SolverError> {
        match (self.strategy, active) {
            (ReducedHessian::Passthrough, Some(_)) => {
                return Err(SolverError::ContractViolation(
                    "box-constrained problems compute their own active sets",
                ));
            }
            (ReducedHessian::Clamped, None) => {
                return Err(SolverError::ContractViolation(
                    "unconstrained problems need an active set on every call",
                ));
            }
            _ => {}
        }
        if let Some(active) = active {
            self.check_active_set(active)?;
        }

        reset_timing();
        #[cfg(feature = "timing")]
        let solve_start = Instant::now();

        let gradient = self.gradient_problem.solve(&mut self.form_handler)?;
        if !gradient.has_layout(&self.dims) {
            return Err(SolverError::DimensionMismatch {
                expected: self.dims.clone(),
                found: gradient.dims(),
            });
        }
        self.workspace.rhs.copy_from(gradient);
        self.workspace.rhs.scale(-1.0);

        let computed;
        let active = match active {
            Some(active) => {
                active.zero_active(&mut self.workspace.rhs);
                active
            }
            None => {
                computed = self.form_handler.compute_active_sets();
                self.check_active_set(&computed)?;
                &computed
            }
        };

        let mut op = ActiveSetOperator {
            strategy: self.strategy,
            form: &mut self.form_handler,
            hessian: &mut self.hessian,
            active,
            scratch: &mut self.workspace.projection,
        };
        let report = match self.inner_newton {
            InnerNewton::Cg => conjugate_gradient(
                &mut op,
                &self.workspace.rhs,
                &mut self.workspace.krylov,
                &self.params,
            ),
            InnerNewton::Cr => conjugate_residual(
                &mut op,
                &self.workspace.rhs,
                &mut self.workspace.krylov,
                &self.params,
            ),
        }?;

        log::debug!(
            "{} inner Newton: {:?} after {} iterations ({} Hessian applications, {} active DOFs)",
            report.method,
            report.status,
            report.iterations,
            report.operator_applications,
            active.num_active()
        );
        self.last_report = Some(report);

        #[cfg(feature = "timing")]
        finalize_and_log(solve_start.elapsed());

        Ok(self.workspace.krylov.delta.clone())
    }

    fn check_active_set(&self, active: &ActiveSet) -> Result<(), SolverError> {
        let found = active.dims();
        if found != self.dims {
            return Err(SolverError::DimensionMismatch {
                expected: self.dims.clone(),
                found,
            });
        }
        Ok(())
    }

    /// Report of the most recent Krylov loop.
    pub fn last_report(&self) -> Option<&KrylovReport> {
        self.last_report.as_ref()
    }

    pub fn sensitivity_solves(&self) -> usize {
        self.hessian.sensitivity_solves()
    }

    pub fn strategy(&self) -> ReducedHessian {
        self.strategy
    }

    pub fn form_handler(&self) -> &F {
        &self.form_handler
    }

    pub fn form_handler_mut(&mut self) -> &mut F {
        &mut self.form_handler
    }

    pub fn gradient_problem(&self) -> &G {
        &self.gradient_problem
    }

    pub fn into_parts(self) -> (F, G) {
        (self.form_handler, self.gradient_problem)
    }
}
