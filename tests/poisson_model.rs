use approx::assert_relative_eq;
use nalgebra::DVector;
use tnm_rs::config::{PicardConfig, TnmConfig};
use tnm_rs::control::ControlVector;
use tnm_rs::discretization::generator::create_interval_mesh;
use tnm_rs::models::poisson::gradient::ReducedGradient;
use tnm_rs::models::poisson::poisson::{Coupling, PoissonControlModel, PoissonParams};
use tnm_rs::numerics::hessian::HessianOperator;
use tnm_rs::numerics::linear::{DirectLinearSolver, KrylovLinearSolver, LinearSolveError, LinearSolverOptions};
use tnm_rs::physics::{FormHandler, GradientProblem};
use tnm_rs::{HessianProblem, SolverError};

const N: usize = 12;

fn tight_picard() -> PicardConfig {
    PicardConfig {
        rtol: 1e-14,
        atol: 1e-16,
        ..PicardConfig::default()
    }
}

fn model(coupling: Coupling) -> PoissonControlModel {
    let mesh = create_interval_mesh(1.0, N);
    let params = PoissonParams {
        alpha: 1e-3,
        num_states: 2,
        coupling,
        ..PoissonParams::default()
    };
    let bump = DVector::from_fn(N, |i, _| ((i as f64 + 0.5) / N as f64 * std::f64::consts::PI).sin());
    let targets = vec![bump, DVector::from_element(N, 0.1)];
    PoissonControlModel::new(&mesh, params, targets).unwrap()
}

fn gradient_norm(model: &mut PoissonControlModel) -> f64 {
    let mut gradient = ReducedGradient::new(DirectLinearSolver, tight_picard(), &[N]);
    let g = gradient.solve(model).unwrap().clone();
    model.scalar_product(&g, &g).sqrt()
}

#[test]
fn one_newton_step_solves_the_unconstrained_problem() {
    for coupling in [Coupling::Cascade(0.8), Coupling::Mutual(0.3)] {
        let mut config = TnmConfig::default().with_tolerance(1e-13);
        config.picard = tight_picard();
        let gradient = ReducedGradient::new(DirectLinearSolver, tight_picard(), &[N]);
        let mut problem =
            HessianProblem::box_constrained(model(coupling), gradient, DirectLinearSolver, config).unwrap();

        let step = problem.newton_solve(None).unwrap();
        let (mut model, gradient) = problem.into_parts();
        let initial = model.scalar_product(gradient.gradient(), gradient.gradient()).sqrt();

        let mut next = model.controls().clone();
        next.axpy(1.0, &step);
        model.set_controls(&next).unwrap();

        let remaining = gradient_norm(&mut model);
        assert!(initial > 1e-3, "{coupling:?}: trivial problem");
        assert!(remaining < 1e-7 * initial, "{coupling:?}: {remaining:e} vs {initial:e}");
    }
}

#[test]
fn reduced_hessian_is_self_adjoint_in_the_mass_product() {
    let config = TnmConfig::default().with_picard(tight_picard());
    for coupling in [Coupling::Cascade(0.8), Coupling::Mutual(0.3)] {
        let mut model = model(coupling);
        let mut hessian = HessianOperator::new(DirectLinearSolver, &config);
        let a = ControlVector::from_blocks(vec![DVector::from_fn(N, |i, _| (i as f64).cos())]);
        let b = ControlVector::from_blocks(vec![DVector::from_fn(N, |i, _| 1.0 + (i % 3) as f64)]);
        let mut ha = ControlVector::zeros(&[N]);
        let mut hb = ControlVector::zeros(&[N]);

        hessian.apply(&mut model, &a, &mut ha).unwrap();
        hessian.apply(&mut model, &b, &mut hb).unwrap();

        let ahb = model.scalar_product(&a, &hb);
        let hab = model.scalar_product(&ha, &b);
        assert_relative_eq!(ahb, hab, max_relative = 1e-9);
        assert!(model.scalar_product(&a, &ha) > 0.0);
        assert_eq!(hessian.sensitivity_solves(), 4);
    }
}

#[test]
fn active_controls_follow_the_negative_gradient() {
    let mut model = model(Coupling::Cascade(0.5)).with_bounds(0.0, 2.0);
    let u = DVector::from_fn(N, |i, _| if i < 3 { 0.0 } else { 1.0 });
    model.set_controls(&ControlVector::from_blocks(vec![u])).unwrap();

    let gradient = ReducedGradient::new(DirectLinearSolver, PicardConfig::default(), &[N]);
    let config = TnmConfig::default().with_tolerance(1e-12);
    let mut problem = HessianProblem::box_constrained(model, gradient, DirectLinearSolver, config).unwrap();

    let step = problem.newton_solve(None).unwrap();
    let g = problem.gradient_problem().gradient().clone();
    let active = problem.form_handler_mut().compute_active_sets();
    assert_eq!(active.active_indices(0), &[0, 1, 2]);
    for &i in active.active_indices(0) {
        assert_relative_eq!(step[0][i], -g[0][i], max_relative = 1e-8, epsilon = 1e-12);
    }
}

#[test]
fn clamped_steps_keep_active_controls_fixed() {
    let model = model(Coupling::Mutual(0.2));
    let active = tnm_rs::ActiveSet::new(&[N], vec![vec![0, 5, 11]]).unwrap();
    let mut config = TnmConfig::default().with_tolerance(1e-12);
    config.picard = tight_picard();
    let gradient = ReducedGradient::new(DirectLinearSolver, tight_picard(), &[N]);
    let mut problem = HessianProblem::unconstrained(model, gradient, DirectLinearSolver, config).unwrap();

    let step = problem.newton_solve(Some(&active)).unwrap();
    for i in [0, 5, 11] {
        assert_eq!(step[0][i], 0.0);
    }
    assert!(step.norm() > 0.0);
    assert_eq!(problem.gradient_problem().evaluations(), 1);
}

#[test]
fn objective_decreases_along_the_newton_step() {
    let gradient = ReducedGradient::new(DirectLinearSolver, tight_picard(), &[N]);
    let mut config = TnmConfig::default().with_max_it(3);
    config.picard = tight_picard();
    let mut problem =
        HessianProblem::box_constrained(model(Coupling::Mutual(0.3)), gradient, DirectLinearSolver, config)
            .unwrap();

    let step = problem.newton_solve(None).unwrap();
    let (mut model, _) = problem.into_parts();
    let before = model.objective();

    let mut next = model.controls().clone();
    next.axpy(1.0, &step);
    model.set_controls(&next).unwrap();
    model.solve_state(&mut DirectLinearSolver, &tight_picard()).unwrap();

    assert!(model.objective() < before);
}

#[test]
fn unconverged_sensitivity_solve_aborts_the_hessian_action() {
    let capped = LinearSolverOptions {
        rtol: 1e-14,
        max_iterations: 2,
    };
    let mut config = TnmConfig::default();
    config.state_options = vec![capped; 2];
    config.adjoint_options = vec![capped; 2];
    let mut model = model(Coupling::Cascade(0.5));
    let mut hessian = HessianOperator::new(KrylovLinearSolver, &config);
    let h = ControlVector::from_blocks(vec![DVector::from_fn(N, |i, _| 1.0 + i as f64)]);
    let mut out = ControlVector::zeros(&[N]);

    let err = hessian.apply(&mut model, &h, &mut out).unwrap_err();

    assert!(matches!(
        err,
        SolverError::LinearSolve(LinearSolveError::NotConverged { max_iterations: 2, .. })
    ));
    assert_eq!(hessian.sensitivity_solves(), 0);
}
