use kryst::matrix::sparse::CsrMatrix;
use kryst::solver::LinearSolver as KspSolver;
use kryst::{
    parallel::{NoComm, UniverseComm},
    preconditioner::PcSide,
    ConvergedReason,
};
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinearSolveError {
    #[error("linear solve did not converge within {max_iterations} iterations ({reason})")]
    NotConverged { max_iterations: usize, reason: String },
    #[error("system matrix is singular")]
    Singular,
    #[error("linear solver produced NaN or Inf")]
    NonFinite,
    #[error("system is {rows}x{cols} but the right-hand side has {rhs} entries")]
    Dimension { rows: usize, cols: usize, rhs: usize },
}

/// Per-block options handed to a [`LinearSolver`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearSolverOptions {
    pub rtol: f64,
    pub max_iterations: usize,
}

impl Default for LinearSolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            max_iterations: 1000,
        }
    }
}

impl LinearSolverOptions {
    /// Fixed, tight options used for the Riesz projection solves.
    pub fn riesz() -> Self {
        Self {
            rtol: 1e-16,
            max_iterations: 100,
        }
    }
}

/// Pick the options for `block`, falling back to `fallback` when the list is short.
pub fn options_for(
    options: &[LinearSolverOptions],
    block: usize,
    fallback: LinearSolverOptions,
) -> LinearSolverOptions {
    options.get(block).copied().unwrap_or(fallback)
}

/// An assembled square system `A x = b`.
#[derive(Clone)]
pub struct LinearSystem {
    pub matrix: Arc<CsrMatrix<f64>>,
    pub rhs: DVector<f64>,
}

impl LinearSystem {
    pub fn new(matrix: Arc<CsrMatrix<f64>>, rhs: DVector<f64>) -> Self {
        Self { matrix, rhs }
    }

    pub fn dim(&self) -> usize {
        csr_rows(&self.matrix)
    }

    /// `A x - b`
    pub fn residual(&self, x: &DVector<f64>) -> DVector<f64> {
        csr_matvec(&self.matrix, x) - &self.rhs
    }

    fn check_dims(&self, x: &DVector<f64>) -> Result<(), LinearSolveError> {
        let n = self.dim();
        if self.rhs.len() != n || x.len() != n {
            return Err(LinearSolveError::Dimension {
                rows: n,
                cols: n,
                rhs: self.rhs.len(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LinearSolveStats {
    /// Iterations reported by the backend; zero for trivial right-hand sides.
    pub iterations: usize,
}

/// Injected linear-solve capability. `x` carries the initial guess in and the
/// solution out.
pub trait LinearSolver {
    fn solve(
        &mut self,
        system: &LinearSystem,
        options: &LinearSolverOptions,
        x: &mut DVector<f64>,
    ) -> Result<LinearSolveStats, LinearSolveError>;
}

/// BiCGStab from `kryst`, for the sparse systems coming out of the FV assembly.
#[derive(Clone, Debug, Default)]
pub struct KrylovLinearSolver;

impl LinearSolver for KrylovLinearSolver {
    fn solve(
        &mut self,
        system: &LinearSystem,
        options: &LinearSolverOptions,
        x: &mut DVector<f64>,
    ) -> Result<LinearSolveStats, LinearSolveError> {
        system.check_dims(x)?;
        let n = system.dim();

        if system.rhs.iter().all(|&v| v == 0.0) {
            x.fill(0.0);
            return Ok(LinearSolveStats::default());
        }
        if !system.rhs.iter().all(|v| v.is_finite()) {
            return Err(LinearSolveError::NonFinite);
        }

        let op = kryst::matrix::op::CsrOp::new(Arc::clone(&system.matrix));
        let mut bicgstab_solver =
            kryst::solver::bicgstab::BiCgStabSolver::new(options.rtol, options.max_iterations);
        let mut workspace = kryst::context::ksp_context::Workspace::new(n);
        bicgstab_solver.setup_workspace(&mut workspace);

        let result = bicgstab_solver.solve(
            &op,
            None,
            system.rhs.as_slice(),
            x.as_mut_slice(),
            PcSide::Left,
            &UniverseComm::NoComm(NoComm {}),
            None,
            Some(&mut workspace),
        );

        match result {
            Ok(stats) => {
                if !matches!(
                    stats.reason,
                    ConvergedReason::ConvergedRtol | ConvergedReason::ConvergedAtol
                ) {
                    return Err(LinearSolveError::NotConverged {
                        max_iterations: options.max_iterations,
                        reason: format!("{:?} after {} iterations", stats.reason, stats.iterations),
                    });
                }
                if !x.iter().all(|v| v.is_finite()) {
                    return Err(LinearSolveError::NonFinite);
                }
                Ok(LinearSolveStats {
                    iterations: stats.iterations,
                })
            }
            Err(e) => Err(LinearSolveError::NotConverged {
                max_iterations: options.max_iterations,
                reason: format!("{e:?}"),
            }),
        }
    }
}

/// Dense LU from `nalgebra`. Exact up to rounding, meant for small systems.
#[derive(Clone, Debug, Default)]
pub struct DirectLinearSolver;

impl LinearSolver for DirectLinearSolver {
    fn solve(
        &mut self,
        system: &LinearSystem,
        _options: &LinearSolverOptions,
        x: &mut DVector<f64>,
    ) -> Result<LinearSolveStats, LinearSolveError> {
        system.check_dims(x)?;
        let dense = csr_to_dense(&system.matrix);
        let solution = dense
            .lu()
            .solve(&system.rhs)
            .ok_or(LinearSolveError::Singular)?;
        if !solution.iter().all(|v| v.is_finite()) {
            return Err(LinearSolveError::NonFinite);
        }
        x.copy_from(&solution);
        Ok(LinearSolveStats { iterations: 1 })
    }
}

pub fn csr_rows(matrix: &CsrMatrix<f64>) -> usize {
    matrix.row_ptr().len().saturating_sub(1)
}

pub fn csr_matvec(matrix: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let n = csr_rows(matrix);
    let row_ptr = matrix.row_ptr();
    let col_idx = matrix.col_idx();
    let values = matrix.values();
    DVector::from_iterator(
        n,
        (0..n).map(|row| {
            (row_ptr[row]..row_ptr[row + 1])
                .map(|idx| values[idx] * x[col_idx[idx]])
                .sum::<f64>()
        }),
    )
}

pub fn csr_to_dense(matrix: &CsrMatrix<f64>) -> DMatrix<f64> {
    let n = csr_rows(matrix);
    let row_ptr = matrix.row_ptr();
    let col_idx = matrix.col_idx();
    let values = matrix.values();
    let mut dense = DMatrix::zeros(n, n);
    for row in 0..n {
        for idx in row_ptr[row]..row_ptr[row + 1] {
            dense[(row, col_idx[idx])] += values[idx];
        }
    }
    dense
}

/// Square CSR matrix from per-row `(column, value)` lists; duplicate columns are summed.
pub fn csr_from_rows(rows: Vec<Vec<(usize, f64)>>) -> CsrMatrix<f64> {
    let n = rows.len();
    let mut indptr = Vec::with_capacity(n + 1);
    let mut indices = Vec::new();
    let mut data = Vec::new();
    indptr.push(0);

    for mut row in rows {
        row.sort_unstable_by_key(|&(col, _)| col);
        let mut entries = row.into_iter();
        if let Some((mut curr_col, mut curr_sum)) = entries.next() {
            for (col, val) in entries {
                if col == curr_col {
                    curr_sum += val;
                } else {
                    indices.push(curr_col);
                    data.push(curr_sum);
                    curr_col = col;
                    curr_sum = val;
                }
            }
            indices.push(curr_col);
            data.push(curr_sum);
        }
        indptr.push(indices.len());
    }

    CsrMatrix::from_csr(n, n, indptr, indices, data)
}

/// Diagonal CSR matrix.
pub fn csr_diagonal(diag: &DVector<f64>) -> CsrMatrix<f64> {
    csr_from_rows(diag.iter().enumerate().map(|(i, &d)| vec![(i, d)]).collect())
}
