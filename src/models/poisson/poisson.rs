use crate::config::PicardConfig;
use crate::control::{ActiveSet, ControlVector};
use crate::discretization::generator::{create_flat_3d_mesh, create_perturbed_2d_grid};
use crate::discretization::mesh::Mesh;
use crate::numerics::linear::{csr_diagonal, csr_from_rows, LinearSolver, LinearSystem};
use crate::numerics::picard::{picard_solve, solve_sequential, BlockOrder, BlockSystem};
use crate::numerics::solver::SolverError;
use crate::physics::{FormHandler, Phase, Sensitivity};
use kryst::matrix::sparse::CsrMatrix;
use nalgebra::DVector;
use std::sync::Arc;

/// How the state equations talk to each other through their mass terms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Coupling {
    /// State `j` is driven by state `j - 1` with weight `-c`. Lower
    /// triangular, so one forward sweep solves it exactly.
    Cascade(f64),
    /// Every pair of distinct states is coupled with weight `c`.
    Mutual(f64),
}

impl Coupling {
    /// Weight `a(j, k)` of `M y_k` in equation `j`.
    pub fn weight(&self, j: usize, k: usize) -> f64 {
        match *self {
            _ if j == k => 0.0,
            Coupling::Cascade(c) => {
                if j == k + 1 {
                    -c
                } else {
                    0.0
                }
            }
            Coupling::Mutual(c) => c,
        }
    }

    pub fn needs_picard(&self) -> bool {
        matches!(self, Coupling::Mutual(_))
    }
}

#[derive(Clone, Debug)]
pub struct PoissonParams {
    /// Tikhonov weight of the control cost.
    pub alpha: f64,
    pub num_states: usize,
    pub coupling: Coupling,
    pub min_distance: f64,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            alpha: 1e-4,
            num_states: 1,
            coupling: Coupling::Cascade(0.0),
            min_distance: 1e-14,
        }
    }
}

/// Distributed control of `m` mass-coupled Poisson problems:
///
/// ```text
/// min  1/2 sum_j |y_j - y_d,j|_M^2 + alpha/2 |u|_M^2
/// s.t. K y_j + sum_{k != j} a(j,k) M y_k = delta_{j0} M u,   lower <= u <= upper
/// ```
///
/// `K` is the two-point-flux finite-volume Laplacian with homogeneous
/// Dirichlet data on lateral boundary faces, `M` the lumped cell mass.
pub struct PoissonControlModel {
    params: PoissonParams,
    stiffness: Arc<CsrMatrix<f64>>,
    mass: Arc<CsrMatrix<f64>>,
    mass_diag: DVector<f64>,
    targets: Vec<DVector<f64>>,
    lower: DVector<f64>,
    upper: DVector<f64>,
    control: ControlVector,
    direction: ControlVector,
    states: Vec<DVector<f64>>,
    adjoints: Vec<DVector<f64>>,
    state_sensitivities: Vec<DVector<f64>>,
    adjoint_sensitivities: Vec<DVector<f64>>,
}

/// Assemble the finite-volume Laplacian on `mesh`.
pub fn assemble_stiffness(mesh: &Mesh, min_distance: f64) -> CsrMatrix<f64> {
    let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); mesh.num_cells()];
    for face in &mesh.faces {
        let w = mesh.transmissibility(face, min_distance);
        match face.neighbor_cell_ids {
            (k, Some(l)) => {
                rows[k].push((k, w));
                rows[k].push((l, -w));
                rows[l].push((l, w));
                rows[l].push((k, -w));
            }
            (k, None) if face.is_lateral() => rows[k].push((k, w)),
            (_, None) => {}
        }
    }
    csr_from_rows(rows)
}

impl PoissonControlModel {
    /// `targets` holds one desired state per state equation.
    pub fn new(mesh: &Mesh, params: PoissonParams, targets: Vec<DVector<f64>>) -> Result<Self, SolverError> {
        let n = mesh.num_cells();
        let m = params.num_states;
        let found: Vec<usize> = targets.iter().map(|t| t.len()).collect();
        if m == 0 || found != vec![n; m] {
            return Err(SolverError::DimensionMismatch {
                expected: vec![n; m],
                found,
            });
        }

        let mass_diag = DVector::from_vec(mesh.volumes());
        Ok(Self {
            stiffness: Arc::new(assemble_stiffness(mesh, params.min_distance)),
            mass: Arc::new(csr_diagonal(&mass_diag)),
            mass_diag,
            targets,
            lower: DVector::from_element(n, f64::NEG_INFINITY),
            upper: DVector::from_element(n, f64::INFINITY),
            control: ControlVector::zeros(&[n]),
            direction: ControlVector::zeros(&[n]),
            states: vec![DVector::zeros(n); m],
            adjoints: vec![DVector::zeros(n); m],
            state_sensitivities: vec![DVector::zeros(n); m],
            adjoint_sensitivities: vec![DVector::zeros(n); m],
            params,
        })
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower.fill(lower);
        self.upper.fill(upper);
        self
    }

    pub fn params(&self) -> &PoissonParams {
        &self.params
    }

    pub fn num_cells(&self) -> usize {
        self.mass_diag.len()
    }

    pub fn controls(&self) -> &ControlVector {
        &self.control
    }

    pub fn set_controls(&mut self, control: &ControlVector) -> Result<(), SolverError> {
        if !control.has_layout(&self.control.dims()) {
            return Err(SolverError::DimensionMismatch {
                expected: self.control.dims(),
                found: control.dims(),
            });
        }
        self.control.copy_from(control);
        Ok(())
    }

    /// Clamp the controls into `[lower, upper]`.
    pub fn project_controls(&mut self) {
        let u = self.control.block_mut(0);
        for i in 0..u.len() {
            u[i] = u[i].clamp(self.lower[i], self.upper[i]);
        }
    }

    pub fn states(&self) -> &[DVector<f64>] {
        &self.states
    }

    fn mass_norm_squared(&self, v: &DVector<f64>) -> f64 {
        v.component_mul(v).dot(&self.mass_diag)
    }

    /// Cost functional at the current controls and states.
    pub fn objective(&self) -> f64 {
        let tracking: f64 = self
            .states
            .iter()
            .zip(&self.targets)
            .map(|(y, yd)| self.mass_norm_squared(&(y - yd)))
            .sum();
        0.5 * tracking + 0.5 * self.params.alpha * self.mass_norm_squared(self.control.block(0))
    }

    /// `sum_{k != j} weight(j, k) M x_k`, with `transpose` swapping the weight indices.
    fn coupling_term(&self, x: &[DVector<f64>], j: usize, transpose: bool) -> DVector<f64> {
        let mut acc = DVector::zeros(self.num_cells());
        for (k, xk) in x.iter().enumerate() {
            let w = if transpose {
                self.params.coupling.weight(k, j)
            } else {
                self.params.coupling.weight(j, k)
            };
            if w != 0.0 {
                acc += xk.component_mul(&self.mass_diag) * w;
            }
        }
        acc
    }

    /// Block `j` of the state (`Phase::State`) or adjoint (`Phase::Adjoint`) system.
    fn primal_system(&self, phase: Phase, j: usize) -> LinearSystem {
        let rhs = match phase {
            Phase::Adjoint => {
                (&self.states[j] - &self.targets[j]).component_mul(&self.mass_diag)
                    - self.coupling_term(&self.adjoints, j, true)
            }
            _ => {
                let mut source = -self.coupling_term(&self.states, j, false);
                if j == 0 {
                    source += self.control.block(0).component_mul(&self.mass_diag);
                }
                source
            }
        };
        LinearSystem::new(self.stiffness.clone(), rhs)
    }

    fn solve_primal<L: LinearSolver>(
        &mut self,
        phase: Phase,
        solver: &mut L,
        picard: &PicardConfig,
    ) -> Result<(), SolverError> {
        let order = match phase {
            Phase::Adjoint => BlockOrder::Reverse,
            _ => BlockOrder::Forward,
        };
        let coupled = self.state_is_picard() && self.params.num_states > 1;
        let mut blocks = PrimalBlocks { model: self, phase };
        if coupled {
            picard_solve(&mut blocks, solver, &[], order, picard, phase)?;
        } else {
            solve_sequential(&mut blocks, solver, &[], order)?;
        }
        Ok(())
    }

    pub fn solve_state<L: LinearSolver>(
        &mut self,
        solver: &mut L,
        picard: &PicardConfig,
    ) -> Result<(), SolverError> {
        self.solve_primal(Phase::State, solver, picard)
    }

    /// Requires up-to-date states.
    pub fn solve_adjoint<L: LinearSolver>(
        &mut self,
        solver: &mut L,
        picard: &PicardConfig,
    ) -> Result<(), SolverError> {
        self.solve_primal(Phase::Adjoint, solver, picard)
    }

    /// Gradient functional `alpha M u + M p_0` (before the Riesz projection).
    pub fn gradient_rhs(&self) -> DVector<f64> {
        (self.control.block(0) * self.params.alpha + &self.adjoints[0]).component_mul(&self.mass_diag)
    }

    /// Residual `|K y_j + ... - rhs_j|` of every state block, for diagnostics.
    pub fn state_residual(&self) -> f64 {
        (0..self.params.num_states)
            .map(|j| self.primal_system(Phase::State, j).residual(&self.states[j]).norm_squared())
            .sum::<f64>()
            .sqrt()
    }
}

struct PrimalBlocks<'a> {
    model: &'a mut PoissonControlModel,
    phase: Phase,
}

impl BlockSystem for PrimalBlocks<'_> {
    fn block_count(&self) -> usize {
        self.model.params.num_states
    }

    fn assemble(&self, block: usize) -> LinearSystem {
        self.model.primal_system(self.phase, block)
    }

    fn solution(&self, block: usize) -> &DVector<f64> {
        match self.phase {
            Phase::Adjoint => &self.model.adjoints[block],
            _ => &self.model.states[block],
        }
    }

    fn store(&mut self, block: usize, value: DVector<f64>) {
        match self.phase {
            Phase::Adjoint => self.model.adjoints[block] = value,
            _ => self.model.states[block] = value,
        }
    }
}

impl FormHandler for PoissonControlModel {
    fn control_dims(&self) -> Vec<usize> {
        self.control.dims()
    }

    fn state_dim(&self) -> usize {
        self.params.num_states
    }

    fn state_is_picard(&self) -> bool {
        self.params.coupling.needs_picard()
    }

    fn scalar_product(&self, a: &ControlVector, b: &ControlVector) -> f64 {
        a.block(0).component_mul(b.block(0)).dot(&self.mass_diag)
    }

    fn compute_active_sets(&mut self) -> ActiveSet {
        let u = self.control.block(0);
        let mask = (0..u.len())
            .map(|i| u[i] <= self.lower[i] || u[i] >= self.upper[i])
            .collect();
        ActiveSet::from_masks(vec![mask])
    }

    fn set_test_direction(&mut self, h: &ControlVector) {
        self.direction.copy_from(h);
    }

    fn sensitivity_system(&self, kind: Sensitivity, block: usize) -> LinearSystem {
        let rhs = match kind {
            Sensitivity::Forward => {
                let mut source = -self.coupling_term(&self.state_sensitivities, block, false);
                if block == 0 {
                    source += self.direction.block(0).component_mul(&self.mass_diag);
                }
                source
            }
            Sensitivity::Adjoint => {
                self.state_sensitivities[block].component_mul(&self.mass_diag)
                    - self.coupling_term(&self.adjoint_sensitivities, block, true)
            }
        };
        LinearSystem::new(self.stiffness.clone(), rhs)
    }

    fn sensitivity(&self, kind: Sensitivity, block: usize) -> &DVector<f64> {
        match kind {
            Sensitivity::Forward => &self.state_sensitivities[block],
            Sensitivity::Adjoint => &self.adjoint_sensitivities[block],
        }
    }

    fn set_sensitivity(&mut self, kind: Sensitivity, block: usize, value: DVector<f64>) {
        match kind {
            Sensitivity::Forward => self.state_sensitivities[block] = value,
            Sensitivity::Adjoint => self.adjoint_sensitivities[block] = value,
        }
    }

    fn hessian_rhs(&self, _block: usize) -> DVector<f64> {
        (self.direction.block(0) * self.params.alpha + &self.adjoint_sensitivities[0])
            .component_mul(&self.mass_diag)
    }

    fn riesz_matrix(&self, _block: usize) -> Arc<CsrMatrix<f64>> {
        self.mass.clone()
    }
}

/// Demo problem on a perturbed 2D Voronoi mesh of the unit square: the
/// first state should match a bump centred in the domain, every further
/// state should vanish.
pub fn poisson_problem_def(n: usize, params: PoissonParams) -> Result<(Mesh, PoissonControlModel), SolverError> {
    let width = [1.0, 1.0];
    let points = create_perturbed_2d_grid(width, n, n, 0.2);
    let mesh = create_flat_3d_mesh(&points, width, 1.0 / n as f64);

    let bump: DVector<f64> = DVector::from_iterator(
        mesh.num_cells(),
        mesh.cells.iter().map(|c| {
            let r2 = c.centroid[0].powi(2) + c.centroid[1].powi(2);
            (-r2 / 0.02).exp()
        }),
    );
    let mut targets = vec![DVector::zeros(mesh.num_cells()); params.num_states];
    if let Some(first) = targets.first_mut() {
        *first = bump;
    }

    let model = PoissonControlModel::new(&mesh, params, targets)?;
    Ok((mesh, model))
}
