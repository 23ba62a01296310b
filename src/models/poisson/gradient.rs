use super::poisson::PoissonControlModel;
use crate::config::PicardConfig;
use crate::control::ControlVector;
use crate::numerics::linear::{LinearSolver, LinearSolverOptions, LinearSystem};
use crate::numerics::solver::SolverError;
use crate::physics::{FormHandler, GradientProblem};

/// Reduced gradient of [`PoissonControlModel`]: state solve, adjoint solve,
/// then a Riesz projection of `alpha M u + M p_0` onto the control space.
pub struct ReducedGradient<L> {
    solver: L,
    picard: PicardConfig,
    riesz_options: LinearSolverOptions,
    gradient: ControlVector,
    evaluations: usize,
}

impl<L: LinearSolver> ReducedGradient<L> {
    pub fn new(solver: L, picard: PicardConfig, dims: &[usize]) -> Self {
        Self {
            solver,
            picard,
            riesz_options: LinearSolverOptions::riesz(),
            gradient: ControlVector::zeros(dims),
            evaluations: 0,
        }
    }

    pub fn with_riesz_options(mut self, options: LinearSolverOptions) -> Self {
        self.riesz_options = options;
        self
    }

    pub fn gradient(&self) -> &ControlVector {
        &self.gradient
    }

    /// Number of times the gradient has been recomputed.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}

impl<L: LinearSolver> GradientProblem<PoissonControlModel> for ReducedGradient<L> {
    fn solve(&mut self, model: &mut PoissonControlModel) -> Result<&ControlVector, SolverError> {
        model.solve_state(&mut self.solver, &self.picard)?;
        model.solve_adjoint(&mut self.solver, &self.picard)?;

        let system = LinearSystem::new(model.riesz_matrix(0), model.gradient_rhs());
        let g = self.gradient.block_mut(0);
        g.fill(0.0);
        self.solver.solve(&system, &self.riesz_options, g)?;

        self.evaluations += 1;
        log::trace!(
            "reduced gradient #{}: |g| = {:.3e}, J = {:.6e}",
            self.evaluations,
            model.scalar_product(&self.gradient, &self.gradient).sqrt(),
            model.objective()
        );
        Ok(&self.gradient)
    }
}
