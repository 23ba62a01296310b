use crate::config::{PicardConfig, TnmConfig};
use crate::control::ControlVector;
use crate::numerics::linear::{
    options_for, LinearSolver, LinearSolverOptions, LinearSystem,
};
use crate::numerics::picard::{picard_solve, solve_sequential, BlockOrder, BlockSystem};
use crate::numerics::solver::SolverError;
use crate::numerics::timing::{record_hessian_application, record_riesz_projection};
use crate::physics::{FormHandler, Sensitivity};
use nalgebra::DVector;

/// View of a form handler's forward or adjoint sensitivity blocks.
struct SensitivityBlocks<'a, F: ?Sized> {
    form: &'a mut F,
    kind: Sensitivity,
}

impl<F: FormHandler + ?Sized> BlockSystem for SensitivityBlocks<'_, F> {
    fn block_count(&self) -> usize {
        self.form.state_dim()
    }

    fn assemble(&self, block: usize) -> LinearSystem {
        self.form.sensitivity_system(self.kind, block)
    }

    fn solution(&self, block: usize) -> &DVector<f64> {
        self.form.sensitivity(self.kind, block)
    }

    fn store(&mut self, block: usize, value: DVector<f64>) {
        self.form.set_sensitivity(self.kind, block, value);
    }
}

/// Applies the (unrestricted) reduced Hessian: forward sensitivity,
/// adjoint sensitivity, then a Riesz projection per control block.
pub struct HessianOperator<L> {
    solver: L,
    state_options: Vec<LinearSolverOptions>,
    adjoint_options: Vec<LinearSolverOptions>,
    riesz_options: Vec<LinearSolverOptions>,
    picard: PicardConfig,
    sensitivity_solves: usize,
}

impl<L: LinearSolver> HessianOperator<L> {
    pub fn new(solver: L, config: &TnmConfig) -> Self {
        Self {
            solver,
            state_options: config.state_options.clone(),
            adjoint_options: config.adjoint_options.clone(),
            riesz_options: config.riesz_options.clone(),
            picard: config.picard,
            sensitivity_solves: 0,
        }
    }

    /// Number of sensitivity solves performed so far (two per application).
    pub fn sensitivity_solves(&self) -> usize {
        self.sensitivity_solves
    }

    /// `out = H h`. A failed sensitivity or projection solve aborts the application.
    pub fn apply<F: FormHandler + ?Sized>(
        &mut self,
        form: &mut F,
        h: &ControlVector,
        out: &mut ControlVector,
    ) -> Result<(), SolverError> {
        record_hessian_application(|| self.apply_inner(form, h, out))
    }

    fn apply_inner<F: FormHandler + ?Sized>(
        &mut self,
        form: &mut F,
        h: &ControlVector,
        out: &mut ControlVector,
    ) -> Result<(), SolverError> {
        form.set_test_direction(h);

        let coupled = form.state_is_picard() && form.state_dim() > 1;
        self.sensitivity_sweep(form, Sensitivity::Forward, coupled)?;
        self.sensitivity_sweep(form, Sensitivity::Adjoint, coupled)?;

        for block in 0..out.num_blocks() {
            let system = LinearSystem::new(form.riesz_matrix(block), form.hessian_rhs(block));
            let opts = options_for(&self.riesz_options, block, LinearSolverOptions::riesz());
            let x = out.block_mut(block);
            x.fill(0.0);
            let solver = &mut self.solver;
            record_riesz_projection(|| solver.solve(&system, &opts, x))?;
        }

        self.sensitivity_solves += 2;
        Ok(())
    }

    fn sensitivity_sweep<F: FormHandler + ?Sized>(
        &mut self,
        form: &mut F,
        kind: Sensitivity,
        coupled: bool,
    ) -> Result<(), SolverError> {
        let (options, order) = match kind {
            Sensitivity::Forward => (&self.state_options, BlockOrder::Forward),
            Sensitivity::Adjoint => (&self.adjoint_options, BlockOrder::Reverse),
        };
        let mut blocks = SensitivityBlocks { form, kind };

        if coupled {
            let report = picard_solve(
                &mut blocks,
                &mut self.solver,
                options,
                order,
                &self.picard,
                kind.into(),
            )?;
            log::trace!(
                "{kind:?} sensitivity: Picard converged after {} sweeps",
                report.iterations
            );
        } else {
            solve_sequential(&mut blocks, &mut self.solver, options, order)?;
        }
        Ok(())
    }
}
