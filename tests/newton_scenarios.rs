mod common;

use approx::assert_abs_diff_eq;
use common::{spd_matrix, DenseForm, FixedGradient};
use nalgebra::{DMatrix, DVector};
use tnm_rs::config::{InnerNewton, TnmConfig};
use tnm_rs::control::{ActiveSet, ControlVector};
use tnm_rs::numerics::hessian::HessianOperator;
use tnm_rs::numerics::krylov::KrylovStatus;
use tnm_rs::numerics::linear::{DirectLinearSolver, LinearSolverOptions};
use tnm_rs::numerics::reduced::{ProjectionScratch, ReducedHessian};
use tnm_rs::{HessianProblem, SolverError};

type DenseProblem = HessianProblem<DenseForm, FixedGradient, DirectLinearSolver>;

fn box_problem(form: DenseForm, gradient: &[f64], config: TnmConfig) -> DenseProblem {
    HessianProblem::box_constrained(form, FixedGradient::new(gradient), DirectLinearSolver, config).unwrap()
}

fn unconstrained_problem(form: DenseForm, gradient: &[f64], config: TnmConfig) -> DenseProblem {
    HessianProblem::unconstrained(form, FixedGradient::new(gradient), DirectLinearSolver, config).unwrap()
}

fn gradient_4() -> [f64; 4] {
    [1.0, -2.0, 0.5, 3.0]
}

#[test]
fn identity_hessian_gives_negative_gradient_in_one_iteration() {
    let config = TnmConfig::default()
        .with_inner_newton(InnerNewton::Cg)
        .with_tolerance(1e-12);
    let mut problem = box_problem(DenseForm::new(DMatrix::identity(4, 4)), &[2.0; 4], config);

    let step = problem.newton_solve(None).unwrap();

    assert_eq!(step.block(0), &DVector::from_element(4, -2.0));
    let report = problem.last_report().unwrap();
    assert_eq!(report.iterations, 1);
    assert_eq!(report.status, KrylovStatus::Converged);
    assert_eq!(problem.sensitivity_solves(), 2);
}

#[test]
fn zero_iteration_cap_returns_zero_step() {
    for method in [InnerNewton::Cg, InnerNewton::Cr] {
        let config = TnmConfig::default().with_inner_newton(method).with_max_it(0);
        let mut problem = box_problem(DenseForm::new(spd_matrix(4)), &gradient_4(), config);

        let step = problem.newton_solve(None).unwrap();

        assert_eq!(step.norm(), 0.0);
        assert_eq!(problem.last_report().unwrap().status, KrylovStatus::MaxIterations);
        assert_eq!(problem.sensitivity_solves(), 0);
        assert_eq!(problem.gradient_problem().calls, 1);
    }
}

#[test]
fn newton_step_solves_the_spd_system() {
    let h = spd_matrix(5);
    let g = DVector::from_vec(vec![1.0, 0.0, -1.0, 2.0, 0.5]);
    let expected = h.clone().lu().solve(&(-&g)).unwrap();

    for method in [InnerNewton::Cg, InnerNewton::Cr] {
        let config = TnmConfig::default().with_inner_newton(method).with_tolerance(1e-13);
        let mut problem = box_problem(DenseForm::new(h.clone()), g.as_slice(), config);
        let step = problem.newton_solve(None).unwrap();

        assert_abs_diff_eq!(step.block(0), &expected, epsilon = 1e-10);
        let report = problem.last_report().unwrap();
        assert_eq!(report.method, method);
        assert_eq!(problem.sensitivity_solves(), 2 * report.operator_applications);
    }
}

#[test]
fn successive_solves_start_from_zero() {
    let config = TnmConfig::default().with_max_it(2);
    let mut problem = box_problem(DenseForm::new(spd_matrix(6)), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], config);

    let first = problem.newton_solve(None).unwrap();
    let second = problem.newton_solve(None).unwrap();

    assert_eq!(first, second);
    assert_eq!(problem.gradient_problem().calls, 2);
}

#[test]
fn wrong_active_set_argument_is_rejected_before_any_work() {
    let active = ActiveSet::empty(&[4]);

    let mut boxed = box_problem(DenseForm::new(spd_matrix(4)), &gradient_4(), TnmConfig::default());
    let err = boxed.newton_solve(Some(&active)).unwrap_err();
    assert!(matches!(err, SolverError::ContractViolation(_)));
    assert_eq!(boxed.gradient_problem().calls, 0);

    let mut clamped = unconstrained_problem(DenseForm::new(spd_matrix(4)), &gradient_4(), TnmConfig::default());
    let err = clamped.newton_solve(None).unwrap_err();
    assert!(matches!(err, SolverError::ContractViolation(_)));
    assert_eq!(clamped.gradient_problem().calls, 0);
    assert_eq!(clamped.sensitivity_solves(), 0);
}

#[test]
fn active_set_with_wrong_layout_is_rejected() {
    let mut problem = unconstrained_problem(DenseForm::new(spd_matrix(4)), &gradient_4(), TnmConfig::default());
    let err = problem.newton_solve(Some(&ActiveSet::empty(&[3]))).unwrap_err();
    assert!(matches!(err, SolverError::DimensionMismatch { .. }));
}

#[test]
fn cg_directions_are_conjugate() {
    let h = spd_matrix(6);
    let config = TnmConfig::default()
        .with_inner_newton(InnerNewton::Cg)
        .with_tolerance(1e-10);
    let mut problem = box_problem(DenseForm::new(h.clone()), &[1.0, -1.0, 2.0, 0.0, 3.0, -2.0], config);
    problem.newton_solve(None).unwrap();

    let directions = &problem.form_handler().directions;
    assert!(directions.len() >= 3);
    for i in 0..directions.len() {
        for j in 0..i {
            let hp = &h * &directions[j];
            let cosine = directions[i].dot(&hp) / (directions[i].norm() * hp.norm());
            assert!(cosine.abs() < 1e-8, "directions {i} and {j}: {cosine:e}");
        }
    }
}

#[test]
fn cr_residual_history_never_increases() {
    let config = TnmConfig::default()
        .with_inner_newton(InnerNewton::Cr)
        .with_tolerance(1e-10);
    let mut problem = box_problem(DenseForm::new(spd_matrix(8)), &[1.0; 8], config);
    problem.newton_solve(None).unwrap();

    let history = &problem.last_report().unwrap().residual_history;
    assert!(history.len() > 2);
    for pair in history.windows(2) {
        assert!(pair[1] <= pair[0] * (1.0 + 1e-12), "{history:?}");
    }
}

#[test]
fn reduced_hessian_variants_differ_only_on_active_dofs() {
    let config = TnmConfig::default();
    let mut form = DenseForm::new(spd_matrix(5));
    let mut hessian = HessianOperator::new(DirectLinearSolver, &config);
    let mut scratch = ProjectionScratch::new(&[5]);
    let active = ActiveSet::new(&[5], vec![vec![1, 3]]).unwrap();
    let h = ControlVector::from_slice(&[1.0, 2.0, -1.0, 0.5, 3.0]);

    let mut passthrough = ControlVector::zeros(&[5]);
    let mut clamped = ControlVector::zeros(&[5]);
    ReducedHessian::Passthrough
        .apply(&mut hessian, &mut form, &active, &h, &mut passthrough, &mut scratch)
        .unwrap();
    ReducedHessian::Clamped
        .apply(&mut hessian, &mut form, &active, &h, &mut clamped, &mut scratch)
        .unwrap();

    for i in [0, 2, 4] {
        assert_eq!(passthrough[0][i], clamped[0][i]);
    }
    for i in [1, 3] {
        assert_eq!(passthrough[0][i], h[0][i]);
        assert_eq!(clamped[0][i], 0.0);
    }
}

#[test]
fn passthrough_and_clamped_steps_agree_off_the_active_set() {
    let g = [1.0, -2.0, 0.5, 3.0, -1.0];
    let active = ActiveSet::new(&[5], vec![vec![0, 3]]).unwrap();
    let config = TnmConfig::default().with_tolerance(1e-12);

    let mut boxed = box_problem(DenseForm::new(spd_matrix(5)).with_active(vec![0, 3]), &g, config.clone());
    let mut clamped = unconstrained_problem(DenseForm::new(spd_matrix(5)), &g, config);
    let a = boxed.newton_solve(None).unwrap();
    let b = clamped.newton_solve(Some(&active)).unwrap();

    // identity on the active block: step = -g there
    assert_abs_diff_eq!(a[0][0], -1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(a[0][3], -3.0, epsilon = 1e-10);
    assert_eq!(b[0][0], 0.0);
    assert_eq!(b[0][3], 0.0);
    for i in [1, 2, 4] {
        assert_abs_diff_eq!(a[0][i], b[0][i], epsilon = 1e-10);
    }
}

#[test]
fn zero_gradient_is_converged_without_hessian_applications() {
    let mut problem = box_problem(DenseForm::new(spd_matrix(3)), &[0.0; 3], TnmConfig::default());
    let step = problem.newton_solve(None).unwrap();
    assert_eq!(step.norm(), 0.0);
    assert_eq!(problem.last_report().unwrap().status, KrylovStatus::Converged);
    assert_eq!(problem.sensitivity_solves(), 0);
}

#[test]
fn singular_hessian_breaks_down_with_partial_step() {
    let config = TnmConfig::default().with_inner_newton(InnerNewton::Cg);
    let mut problem = box_problem(DenseForm::new(DMatrix::zeros(3, 3)), &[1.0, 1.0, 1.0], config);
    let step = problem.newton_solve(None).unwrap();
    assert_eq!(problem.last_report().unwrap().status, KrylovStatus::Breakdown);
    assert_eq!(step.norm(), 0.0);
}

#[test]
fn invalid_configuration_is_reported_at_construction() {
    let err = TnmConfig::default().with_inner_newton_str("minres").unwrap_err();
    assert!(matches!(err, SolverError::Configuration { key: "inner_newton", .. }));

    let mut config = TnmConfig::default();
    config.riesz_options = vec![LinearSolverOptions::riesz(); 2];
    let err = HessianProblem::box_constrained(
        DenseForm::new(spd_matrix(3)),
        FixedGradient::new(&[1.0; 3]),
        DirectLinearSolver,
        config,
    )
    .err()
    .unwrap();
    assert!(matches!(err, SolverError::Configuration { key: "riesz_options", .. }));
}

#[test]
fn gradient_with_wrong_layout_is_rejected() {
    let mut problem = box_problem(DenseForm::new(spd_matrix(3)), &[1.0; 4], TnmConfig::default());
    let err = problem.newton_solve(None).unwrap_err();
    assert!(matches!(err, SolverError::DimensionMismatch { .. }));
}

#[test]
fn passthrough_pairing_matches_diagonal_scalar_product() {
    let form = DenseForm::new(spd_matrix(5));
    let active = ActiveSet::new(&[5], vec![vec![1, 4]]).unwrap();
    let mut scratch = ProjectionScratch::new(&[5]);
    let a = ControlVector::from_slice(&[1.0, -2.0, 0.5, 3.0, -1.0]);
    let b = ControlVector::from_slice(&[0.25, 1.0, -4.0, 2.0, 6.0]);

    for (x, y) in [(&a, &a), (&a, &b)] {
        let split = ReducedHessian::Passthrough.pairing(&form, &active, x, y, &mut scratch);
        let plain = ReducedHessian::Clamped.pairing(&form, &active, x, y, &mut scratch);
        assert_abs_diff_eq!(split, plain, epsilon = 1e-13);
        assert_abs_diff_eq!(plain, x.dot(y), epsilon = 1e-13);
    }
}
