use crate::control::{ActiveSet, ControlVector};
use crate::numerics::hessian::HessianOperator;
use crate::numerics::krylov::KrylovOperator;
use crate::numerics::linear::LinearSolver;
use crate::numerics::solver::SolverError;
use crate::physics::FormHandler;

/// How the reduced Hessian treats active (bound-pinned) control DOFs.
///
/// `Passthrough` acts as the identity on the active block, so active
/// directions still move. `Clamped` acts as zero on the active block in both
/// domain and range, keeping active DOFs fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReducedHessian {
    Passthrough,
    Clamped,
}

/// Scratch buffers for the active/inactive splits, sized to the control layout.
#[derive(Clone, Debug)]
pub struct ProjectionScratch {
    inactive_part: ControlVector,
    active_part: ControlVector,
    hessian_actions: ControlVector,
    temp1: ControlVector,
    temp2: ControlVector,
}

impl ProjectionScratch {
    pub fn new(dims: &[usize]) -> Self {
        Self {
            inactive_part: ControlVector::zeros(dims),
            active_part: ControlVector::zeros(dims),
            hessian_actions: ControlVector::zeros(dims),
            temp1: ControlVector::zeros(dims),
            temp2: ControlVector::zeros(dims),
        }
    }
}

impl ReducedHessian {
    /// `out = H_red h` for this strategy.
    pub fn apply<F, L>(
        self,
        hessian: &mut HessianOperator<L>,
        form: &mut F,
        active: &ActiveSet,
        h: &ControlVector,
        out: &mut ControlVector,
        scratch: &mut ProjectionScratch,
    ) -> Result<(), SolverError>
    where
        F: FormHandler + ?Sized,
        L: LinearSolver,
    {
        match self {
            ReducedHessian::Passthrough => {
                active.restrict_to_inactive_set(h, &mut scratch.inactive_part);
                hessian.apply(form, &scratch.inactive_part, &mut scratch.hessian_actions)?;
                active.restrict_to_inactive_set(&scratch.hessian_actions, &mut scratch.inactive_part);
                active.restrict_to_active_set(h, &mut scratch.active_part);

                out.copy_from(&scratch.active_part);
                out.axpy(1.0, &scratch.inactive_part);
            }
            ReducedHessian::Clamped => {
                scratch.temp1.copy_from(h);
                active.zero_active(&mut scratch.temp1);
                hessian.apply(form, &scratch.temp1, out)?;
                active.zero_active(out);
            }
        }
        Ok(())
    }

    /// Bilinear form used for the Krylov quadratic terms.
    ///
    /// For `Passthrough` the active and inactive parts are paired separately,
    /// matching how [`ReducedHessian::apply`] mixes them.
    pub fn pairing<F: FormHandler + ?Sized>(
        self,
        form: &F,
        active: &ActiveSet,
        a: &ControlVector,
        b: &ControlVector,
        scratch: &mut ProjectionScratch,
    ) -> f64 {
        match self {
            ReducedHessian::Passthrough => {
                active.restrict_to_active_set(a, &mut scratch.temp1);
                active.restrict_to_active_set(b, &mut scratch.temp2);
                let active_part = form.scalar_product(&scratch.temp1, &scratch.temp2);

                active.restrict_to_inactive_set(a, &mut scratch.temp1);
                active.restrict_to_inactive_set(b, &mut scratch.temp2);
                let inactive_part = form.scalar_product(&scratch.temp1, &scratch.temp2);

                active_part + inactive_part
            }
            ReducedHessian::Clamped => form.scalar_product(a, b),
        }
    }
}

/// The reduced Hessian bound to one active set, as seen by the Krylov loop.
pub struct ActiveSetOperator<'a, F: ?Sized, L> {
    pub strategy: ReducedHessian,
    pub form: &'a mut F,
    pub hessian: &'a mut HessianOperator<L>,
    pub active: &'a ActiveSet,
    pub scratch: &'a mut ProjectionScratch,
}

impl<F, L> KrylovOperator for ActiveSetOperator<'_, F, L>
where
    F: FormHandler + ?Sized,
    L: LinearSolver,
{
    fn apply(&mut self, h: &ControlVector, out: &mut ControlVector) -> Result<(), SolverError> {
        self.strategy
            .apply(self.hessian, self.form, self.active, h, out, self.scratch)
    }

    fn pairing(&mut self, a: &ControlVector, b: &ControlVector) -> f64 {
        self.strategy
            .pairing(&*self.form, self.active, a, b, self.scratch)
    }
}
