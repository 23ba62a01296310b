use nalgebra::DVector;
use std::fs;
use tnm_rs::discretization::mesh::Mesh;
use tnm_rs::models::poisson::gradient::ReducedGradient;
use tnm_rs::models::poisson::poisson::{poisson_problem_def, Coupling, PoissonControlModel, PoissonParams};
use tnm_rs::processing::csv_writer;
use tnm_rs::processing::summary::NewtonSummary;
use tnm_rs::{FormHandler, HessianProblem, KrylovLinearSolver, LinearSolverOptions, TnmConfig};

const MAX_OUTER: usize = 20;
const STEP_TOL: f64 = 1e-8;

fn main() {
    fs::create_dir_all("output/main").expect("Failed to create output directory");

    let params = PoissonParams {
        alpha: 1e-4,
        num_states: 2,
        coupling: Coupling::Mutual(0.5),
        ..PoissonParams::default()
    };
    let (mesh, model) = poisson_problem_def(24, params).expect("Failed to set up the problem");
    let model = model.with_bounds(0.0, 40.0);

    // reachable for BiCGStab on the lumped mass matrix
    let riesz = LinearSolverOptions {
        rtol: 1e-12,
        max_iterations: 100,
    };
    let mut config = TnmConfig::default().with_tolerance(1e-10);
    config.riesz_options = vec![riesz];

    let gradient = ReducedGradient::new(KrylovLinearSolver, config.picard, &model.control_dims())
        .with_riesz_options(riesz);
    let mut summary = NewtonSummary::from_problem(&mesh, &model, &config);

    let mut problem = HessianProblem::box_constrained(model, gradient, KrylovLinearSolver, config)
        .expect("Invalid solver configuration");

    println!("{} cells, {} faces\n", mesh.num_cells(), mesh.faces.len());
    println!("    Iter |   Objective  |   |grad|  |   |step|  | Active | Krylov");

    for outer in 0..MAX_OUTER {
        let step = match problem.newton_solve(None) {
            Ok(step) => step,
            Err(e) => {
                eprintln!("Newton step {outer} failed: {e}");
                break;
            }
        };
        let Some(report) = problem.last_report().cloned() else {
            break;
        };

        let model = problem.form_handler_mut();
        let objective = model.objective();
        let active = model.compute_active_sets().num_active();
        let step_norm = model.scalar_product(&step, &step).sqrt();
        let gradient = problem.gradient_problem().gradient();
        let gradient_norm = problem.form_handler().scalar_product(gradient, gradient).sqrt();

        println!(
            "{outer:>8} | {objective:>12.6e} | {gradient_norm:>9.3e} | {step_norm:>9.3e} | {active:>6} | {:>3} ({:?})",
            report.iterations, report.status
        );
        summary.add_step(objective, gradient_norm, step_norm, active, &report);
        csv_writer::write_residual_history(format!("output/main/krylov_{outer:02}.csv"), &report)
            .expect("Failed to write residual history");

        let model = problem.form_handler_mut();
        let mut next = model.controls().clone();
        next.axpy(1.0, &step);
        model.set_controls(&next).expect("Step has the control layout");
        model.project_controls();

        if step_norm < STEP_TOL {
            break;
        }
    }

    summary.sensitivity_solves = problem.sensitivity_solves();
    save_fields(&mesh, problem.form_handler());
    save_history(&summary);

    summary
        .write_to_file("output/main/newton_summary.txt")
        .expect("Failed to write summary");
    summary.print_to_console();

    println!("Summary saved to output/main/newton_summary.txt");
}

fn save_fields(mesh: &Mesh, model: &PoissonControlModel) {
    let control = model.controls().block(0);
    let mut names = vec!["u".to_string()];
    let mut fields: Vec<&DVector<f64>> = vec![control];
    for (j, y) in model.states().iter().enumerate() {
        names.push(format!("y{j}"));
        fields.push(y);
    }
    let names: Vec<&str> = names.iter().map(String::as_str).collect();

    csv_writer::write_cell_fields("output/main/solution.csv", mesh, &names, &fields)
        .expect("Failed to write solution");
    println!("Solution saved to output/main/solution.csv");
}

fn save_history(summary: &NewtonSummary) {
    let column = |f: fn(&tnm_rs::processing::summary::OuterStep) -> f64| -> Vec<f64> {
        summary.steps.iter().map(f).collect()
    };
    csv_writer::write_csv(
        "output/main/newton_history.csv",
        &["objective", "gradient_norm", "step_norm", "active_dofs", "krylov_iterations"],
        &[
            column(|s| s.objective),
            column(|s| s.gradient_norm),
            column(|s| s.step_norm),
            column(|s| s.active_dofs as f64),
            column(|s| s.krylov_iterations as f64),
        ],
    )
    .expect("Failed to write Newton history");
    println!("Newton history saved to output/main/newton_history.csv");
}
