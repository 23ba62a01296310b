use crate::config::PicardConfig;
use crate::numerics::linear::{options_for, LinearSolver, LinearSolverOptions, LinearSystem};
use crate::numerics::solver::SolverError;
use crate::numerics::timing::record_sensitivity_solve;
use crate::physics::Phase;
use nalgebra::DVector;

/// A set of block-linear systems where block `j` may depend on the current
/// values of the other blocks.
pub trait BlockSystem {
    fn block_count(&self) -> usize;

    /// Assemble block `block` with the latest values of all other blocks.
    fn assemble(&self, block: usize) -> LinearSystem;

    fn solution(&self, block: usize) -> &DVector<f64>;

    fn store(&mut self, block: usize, value: DVector<f64>);
}

/// Order in which the blocks of a sweep are solved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOrder {
    Forward,
    /// Adjoint systems propagate information backwards through the chain.
    Reverse,
}

impl BlockOrder {
    pub fn sequence(self, n: usize) -> Vec<usize> {
        match self {
            BlockOrder::Forward => (0..n).collect(),
            BlockOrder::Reverse => (0..n).rev().collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PicardReport {
    /// Number of sweeps performed.
    pub iterations: usize,
    /// Combined residual norm at exit.
    pub residual: f64,
}

/// Solve every block exactly once, in `order`.
pub fn solve_sequential<S, L>(
    system: &mut S,
    solver: &mut L,
    options: &[LinearSolverOptions],
    order: BlockOrder,
) -> Result<(), SolverError>
where
    S: BlockSystem + ?Sized,
    L: LinearSolver + ?Sized,
{
    for block in order.sequence(system.block_count()) {
        let assembled = system.assemble(block);
        let mut x = system.solution(block).clone();
        let opts = options_for(options, block, LinearSolverOptions::default());
        record_sensitivity_solve(|| solver.solve(&assembled, &opts, &mut x))?;
        system.store(block, x);
    }
    Ok(())
}

/// Root-sum-of-squares of the per-block residual norms `‖A_j x_j - b_j‖`.
pub fn combined_residual<S: BlockSystem + ?Sized>(system: &S) -> f64 {
    (0..system.block_count())
        .map(|j| {
            let assembled = system.assemble(j);
            assembled.residual(system.solution(j)).norm_squared()
        })
        .sum::<f64>()
        .sqrt()
}

/// Fixed-point (block Gauss-Seidel) iteration over coupled blocks.
///
/// Stops when the combined residual is exactly zero or meets
/// `config.tolerance()`. Reaching `config.max_iterations` sweeps without
/// meeting it is reported as [`SolverError::NotConverged`] for `phase`.
pub fn picard_solve<S, L>(
    system: &mut S,
    solver: &mut L,
    options: &[LinearSolverOptions],
    order: BlockOrder,
    config: &PicardConfig,
    phase: Phase,
) -> Result<PicardReport, SolverError>
where
    S: BlockSystem + ?Sized,
    L: LinearSolver + ?Sized,
{
    let tolerance = config.tolerance();
    let mut initial_residual = None;

    for iteration in 0..=config.max_iterations {
        let residual = combined_residual(system);
        if residual == 0.0 {
            return Ok(PicardReport { iterations: iteration, residual });
        }

        let init = *initial_residual.get_or_insert(residual);
        if config.verbose {
            log::info!(
                "{phase} {iteration}: ||res|| (abs): {residual:.3e}   ||res|| (rel): {:.3e}",
                residual / init
            );
        } else {
            log::trace!(
                "{phase} {iteration}: ||res|| (abs): {residual:.3e}   ||res|| (rel): {:.3e}",
                residual / init
            );
        }

        if tolerance.check_tolerance(residual, init) {
            return Ok(PicardReport { iterations: iteration, residual });
        }

        if iteration == config.max_iterations {
            break;
        }

        solve_sequential(system, solver, options, order)?;
    }

    Err(SolverError::NotConverged {
        phase,
        max_iterations: config.max_iterations,
    })
}
