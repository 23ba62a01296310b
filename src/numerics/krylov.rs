use crate::config::InnerNewton;
use crate::control::ControlVector;
use crate::numerics::reduced::ProjectionScratch;
use crate::numerics::solver::SolverError;

/// A linear operator on control vectors together with the bilinear form the
/// Krylov recurrences use for their quadratic terms.
pub trait KrylovOperator {
    fn apply(&mut self, h: &ControlVector, out: &mut ControlVector) -> Result<(), SolverError>;

    fn pairing(&mut self, a: &ControlVector, b: &ControlVector) -> f64;
}

/// Vectors of the CG / CR recurrences. `delta` holds the accumulated step.
#[derive(Clone, Debug)]
pub struct KrylovWorkspace {
    pub delta: ControlVector,
    pub residual: ControlVector,
    pub p: ControlVector,
    pub q: ControlVector,
    /// Operator image of the residual (CR only).
    pub s: ControlVector,
}

impl KrylovWorkspace {
    pub fn new(dims: &[usize]) -> Self {
        Self {
            delta: ControlVector::zeros(dims),
            residual: ControlVector::zeros(dims),
            p: ControlVector::zeros(dims),
            q: ControlVector::zeros(dims),
            s: ControlVector::zeros(dims),
        }
    }

    fn reset(&mut self, rhs: &ControlVector) {
        self.delta.set_zero();
        self.residual.copy_from(rhs);
        self.p.copy_from(rhs);
        self.q.set_zero();
        self.s.set_zero();
    }
}

/// Everything a Newton solve needs besides the operator itself.
/// Allocated once per problem and reused across calls.
#[derive(Clone, Debug)]
pub struct SolverWorkspace {
    pub krylov: KrylovWorkspace,
    pub projection: ProjectionScratch,
    pub rhs: ControlVector,
}

impl SolverWorkspace {
    pub fn new(dims: &[usize]) -> Self {
        Self {
            krylov: KrylovWorkspace::new(dims),
            projection: ProjectionScratch::new(dims),
            rhs: ControlVector::zeros(dims),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KrylovParams {
    pub max_iterations: usize,
    /// Relative residual tolerance.
    pub tolerance: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KrylovStatus {
    Converged,
    /// The iteration cap was hit; the partial step is still usable.
    MaxIterations,
    /// A pairing denominator vanished or became non-finite.
    Breakdown,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KrylovReport {
    pub method: InnerNewton,
    pub iterations: usize,
    pub operator_applications: usize,
    /// Relative residual after every iteration.
    pub residual_history: Vec<f64>,
    pub status: KrylovStatus,
}

impl KrylovReport {
    fn new(method: InnerNewton) -> Self {
        Self {
            method,
            iterations: 0,
            operator_applications: 0,
            residual_history: Vec::new(),
            status: KrylovStatus::MaxIterations,
        }
    }

    fn finish(mut self, status: KrylovStatus) -> Self {
        self.status = status;
        self
    }

    pub fn final_residual(&self) -> Option<f64> {
        self.residual_history.last().copied()
    }
}

fn usable(denominator: f64) -> bool {
    denominator != 0.0 && denominator.is_finite()
}

fn breakdown(report: KrylovReport, what: &str, value: f64) -> KrylovReport {
    log::warn!(
        "{} breakdown after {} iterations: {what} = {value:e}, returning partial step",
        report.method,
        report.iterations
    );
    report.finish(KrylovStatus::Breakdown)
}

/// Conjugate gradient on `Op delta = rhs`, starting from `delta = 0`.
///
/// The step ends up in `ws.delta`. Every inner product, including `<r, r>` and
/// the residual norms, goes through [`KrylovOperator::pairing`]. For the
/// box-constrained operator that is the split product `<Ar, Ar> + <Ir, Ir>`,
/// which equals the plain scalar product only when the latter is
/// block-diagonal over the active/inactive split (true for lumped masses).
pub fn conjugate_gradient<O: KrylovOperator + ?Sized>(
    op: &mut O,
    rhs: &ControlVector,
    ws: &mut KrylovWorkspace,
    params: &KrylovParams,
) -> Result<KrylovReport, SolverError> {
    let mut report = KrylovReport::new(InnerNewton::Cg);
    ws.reset(rhs);

    let mut rsold = op.pairing(&ws.residual, &ws.residual);
    let eps_0 = rsold.sqrt();
    if eps_0 == 0.0 {
        return Ok(report.finish(KrylovStatus::Converged));
    }

    for _ in 0..params.max_iterations {
        op.apply(&ws.p, &mut ws.q)?;
        report.operator_applications += 1;

        let curvature = op.pairing(&ws.p, &ws.q);
        if !usable(curvature) {
            return Ok(breakdown(report, "<p, Hp>", curvature));
        }
        let alpha = rsold / curvature;
        ws.delta.axpy(alpha, &ws.p);
        ws.residual.axpy(-alpha, &ws.q);
        report.iterations += 1;

        let rsnew = op.pairing(&ws.residual, &ws.residual);
        let eps = rsnew.sqrt();
        log::debug!("Residual of the CG method: {:.3e} (relative)", eps / eps_0);
        report.residual_history.push(eps / eps_0);

        if eps / eps_0 < params.tolerance {
            return Ok(report.finish(KrylovStatus::Converged));
        }

        let beta = rsnew / rsold;
        ws.p.scale_add(beta, &ws.residual);
        rsold = rsnew;
    }

    Ok(report.finish(KrylovStatus::MaxIterations))
}

/// Conjugate residual on `Op delta = rhs`, starting from `delta = 0`.
///
/// Works for symmetric semi-definite operators. No operator application
/// happens after the final update. Residual norms use
/// [`KrylovOperator::pairing`], as in [`conjugate_gradient`].
pub fn conjugate_residual<O: KrylovOperator + ?Sized>(
    op: &mut O,
    rhs: &ControlVector,
    ws: &mut KrylovWorkspace,
    params: &KrylovParams,
) -> Result<KrylovReport, SolverError> {
    let mut report = KrylovReport::new(InnerNewton::Cr);
    ws.reset(rhs);

    let eps_0 = op.pairing(&ws.residual, &ws.residual).sqrt();
    if eps_0 == 0.0 {
        return Ok(report.finish(KrylovStatus::Converged));
    }
    if params.max_iterations == 0 {
        return Ok(report.finish(KrylovStatus::MaxIterations));
    }

    op.apply(&ws.residual, &mut ws.s)?;
    report.operator_applications += 1;
    ws.q.copy_from(&ws.s);
    let mut r_ar = op.pairing(&ws.residual, &ws.s);

    for i in 0..params.max_iterations {
        let q_norm = op.pairing(&ws.q, &ws.q);
        if !usable(q_norm) {
            return Ok(breakdown(report, "<Hp, Hp>", q_norm));
        }
        let alpha = r_ar / q_norm;
        ws.delta.axpy(alpha, &ws.p);
        ws.residual.axpy(-alpha, &ws.q);
        report.iterations += 1;

        let eps = op.pairing(&ws.residual, &ws.residual).sqrt();
        log::debug!("Residual of the CR method: {:.3e} (relative)", eps / eps_0);
        report.residual_history.push(eps / eps_0);

        if eps / eps_0 < params.tolerance {
            return Ok(report.finish(KrylovStatus::Converged));
        }
        if i + 1 == params.max_iterations {
            break;
        }
        if !usable(r_ar) {
            return Ok(breakdown(report, "<r, Hr>", r_ar));
        }

        op.apply(&ws.residual, &mut ws.s)?;
        report.operator_applications += 1;
        let r_ar_new = op.pairing(&ws.residual, &ws.s);
        let beta = r_ar_new / r_ar;

        ws.p.scale_add(beta, &ws.residual);
        ws.q.scale_add(beta, &ws.s);
        r_ar = r_ar_new;
    }

    Ok(report.finish(KrylovStatus::MaxIterations))
}
