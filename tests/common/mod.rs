#![allow(dead_code)]

use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use tnm_rs::control::{ActiveSet, ControlVector};
use tnm_rs::numerics::linear::{csr_diagonal, LinearSystem};
use tnm_rs::physics::{FormHandler, GradientProblem, Sensitivity};
use tnm_rs::SolverError;

use kryst::matrix::sparse::CsrMatrix;

fn identity(n: usize) -> Arc<CsrMatrix<f64>> {
    Arc::new(csr_diagonal(&DVector::from_element(n, 1.0)))
}

/// Single-block problem whose reduced Hessian is a given dense matrix.
///
/// The forward sensitivity copies the direction, the adjoint sensitivity
/// multiplies it by `hessian`, and the Riesz matrix is the identity.
pub struct DenseForm {
    pub hessian: DMatrix<f64>,
    pub active: ActiveSet,
    pub directions: Vec<DVector<f64>>,
    direction: DVector<f64>,
    forward: DVector<f64>,
    adjoint: DVector<f64>,
}

impl DenseForm {
    pub fn new(hessian: DMatrix<f64>) -> Self {
        let n = hessian.nrows();
        Self {
            hessian,
            active: ActiveSet::empty(&[n]),
            directions: Vec::new(),
            direction: DVector::zeros(n),
            forward: DVector::zeros(n),
            adjoint: DVector::zeros(n),
        }
    }

    pub fn with_active(mut self, indices: Vec<usize>) -> Self {
        let n = self.hessian.nrows();
        self.active = ActiveSet::new(&[n], vec![indices]).unwrap();
        self
    }

    pub fn dim(&self) -> usize {
        self.hessian.nrows()
    }
}

impl FormHandler for DenseForm {
    fn control_dims(&self) -> Vec<usize> {
        vec![self.dim()]
    }

    fn state_dim(&self) -> usize {
        1
    }

    fn state_is_picard(&self) -> bool {
        false
    }

    fn scalar_product(&self, a: &ControlVector, b: &ControlVector) -> f64 {
        a.dot(b)
    }

    fn compute_active_sets(&mut self) -> ActiveSet {
        self.active.clone()
    }

    fn set_test_direction(&mut self, h: &ControlVector) {
        self.direction = h.block(0).clone();
        self.directions.push(self.direction.clone());
    }

    fn sensitivity_system(&self, kind: Sensitivity, _block: usize) -> LinearSystem {
        let rhs = match kind {
            Sensitivity::Forward => self.direction.clone(),
            Sensitivity::Adjoint => &self.hessian * &self.forward,
        };
        LinearSystem::new(identity(self.dim()), rhs)
    }

    fn sensitivity(&self, kind: Sensitivity, _block: usize) -> &DVector<f64> {
        match kind {
            Sensitivity::Forward => &self.forward,
            Sensitivity::Adjoint => &self.adjoint,
        }
    }

    fn set_sensitivity(&mut self, kind: Sensitivity, _block: usize, value: DVector<f64>) {
        match kind {
            Sensitivity::Forward => self.forward = value,
            Sensitivity::Adjoint => self.adjoint = value,
        }
    }

    fn hessian_rhs(&self, _block: usize) -> DVector<f64> {
        self.adjoint.clone()
    }

    fn riesz_matrix(&self, _block: usize) -> Arc<CsrMatrix<f64>> {
        identity(self.dim())
    }
}

/// Returns the same gradient on every call and counts the calls.
pub struct FixedGradient {
    pub gradient: ControlVector,
    pub calls: usize,
}

impl FixedGradient {
    pub fn new(values: &[f64]) -> Self {
        Self {
            gradient: ControlVector::from_slice(values),
            calls: 0,
        }
    }
}

impl<F> GradientProblem<F> for FixedGradient {
    fn solve(&mut self, _form_handler: &mut F) -> Result<&ControlVector, SolverError> {
        self.calls += 1;
        Ok(&self.gradient)
    }
}

/// Two scalar state blocks coupled as `x_j = s_j - c * x_k` (`k != j`).
/// Gauss-Seidel on it contracts only for `|c| < 1`.
pub struct CoupledScalarForm {
    pub coupling: f64,
    pub adjoint_coupling: f64,
    direction: f64,
    forward: [DVector<f64>; 2],
    adjoint: [DVector<f64>; 2],
}

impl CoupledScalarForm {
    pub fn new(coupling: f64) -> Self {
        Self {
            coupling,
            adjoint_coupling: coupling,
            direction: 0.0,
            forward: [DVector::zeros(1), DVector::zeros(1)],
            adjoint: [DVector::zeros(1), DVector::zeros(1)],
        }
    }

    pub fn with_adjoint_coupling(mut self, coupling: f64) -> Self {
        self.adjoint_coupling = coupling;
        self
    }

    fn blocks(&self, kind: Sensitivity) -> &[DVector<f64>; 2] {
        match kind {
            Sensitivity::Forward => &self.forward,
            Sensitivity::Adjoint => &self.adjoint,
        }
    }
}

impl FormHandler for CoupledScalarForm {
    fn control_dims(&self) -> Vec<usize> {
        vec![1]
    }

    fn state_dim(&self) -> usize {
        2
    }

    fn state_is_picard(&self) -> bool {
        true
    }

    fn scalar_product(&self, a: &ControlVector, b: &ControlVector) -> f64 {
        a.dot(b)
    }

    fn compute_active_sets(&mut self) -> ActiveSet {
        ActiveSet::empty(&[1])
    }

    fn set_test_direction(&mut self, h: &ControlVector) {
        self.direction = h.block(0)[0];
    }

    fn sensitivity_system(&self, kind: Sensitivity, block: usize) -> LinearSystem {
        let other = self.blocks(kind)[1 - block][0];
        let (source, coupling) = match (kind, block) {
            (Sensitivity::Forward, 0) => (self.direction, self.coupling),
            (Sensitivity::Forward, _) => (0.0, self.coupling),
            (Sensitivity::Adjoint, j) => (self.forward[j][0], self.adjoint_coupling),
        };
        LinearSystem::new(identity(1), DVector::from_element(1, source - coupling * other))
    }

    fn sensitivity(&self, kind: Sensitivity, block: usize) -> &DVector<f64> {
        &self.blocks(kind)[block]
    }

    fn set_sensitivity(&mut self, kind: Sensitivity, block: usize, value: DVector<f64>) {
        match kind {
            Sensitivity::Forward => self.forward[block] = value,
            Sensitivity::Adjoint => self.adjoint[block] = value,
        }
    }

    fn hessian_rhs(&self, _block: usize) -> DVector<f64> {
        self.adjoint[0].clone()
    }

    fn riesz_matrix(&self, _block: usize) -> Arc<CsrMatrix<f64>> {
        identity(1)
    }
}

/// Symmetric positive definite test matrix with off-diagonal coupling.
pub fn spd_matrix(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            4.0 + i as f64
        } else if i.abs_diff(j) == 1 {
            -1.0
        } else {
            0.0
        }
    })
}
