use crate::config::TnmConfig;
use crate::discretization::mesh::Mesh;
use crate::models::poisson::poisson::{Coupling, PoissonControlModel};
use crate::numerics::krylov::{KrylovReport, KrylovStatus};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// One outer iteration of a projected Newton run.
#[derive(Clone, Debug)]
pub struct OuterStep {
    pub objective: f64,
    pub gradient_norm: f64,
    pub step_norm: f64,
    pub active_dofs: usize,
    pub krylov_iterations: usize,
    pub hessian_applications: usize,
    pub status: KrylovStatus,
}

pub struct NewtonSummary {
    // Mesh info
    pub num_cells: usize,
    pub num_faces: usize,
    pub min_cell_spacing: f64,
    pub max_cell_spacing: f64,
    pub total_volume: f64,

    // Problem info
    pub num_states: usize,
    pub alpha: f64,
    pub coupling: Coupling,

    // Solver settings
    pub method: String,
    pub max_it: usize,
    pub tolerance: f64,

    pub steps: Vec<OuterStep>,
    pub sensitivity_solves: usize,
}

impl NewtonSummary {
    pub fn from_problem(mesh: &Mesh, model: &PoissonControlModel, config: &TnmConfig) -> Self {
        let (min_spacing, max_spacing) = mesh.spacing().unwrap_or((0.0, 0.0));
        let params = model.params();

        Self {
            num_cells: mesh.num_cells(),
            num_faces: mesh.faces.len(),
            min_cell_spacing: min_spacing,
            max_cell_spacing: max_spacing,
            total_volume: mesh.total_volume(),
            num_states: params.num_states,
            alpha: params.alpha,
            coupling: params.coupling,
            method: config.inner_newton.to_string(),
            max_it: config.max_it_inner_newton,
            tolerance: config.inner_newton_tolerance,
            steps: Vec::new(),
            sensitivity_solves: 0,
        }
    }

    pub fn add_step(
        &mut self,
        objective: f64,
        gradient_norm: f64,
        step_norm: f64,
        active_dofs: usize,
        report: &KrylovReport,
    ) {
        self.steps.push(OuterStep {
            objective,
            gradient_norm,
            step_norm,
            active_dofs,
            krylov_iterations: report.iterations,
            hessian_applications: report.operator_applications,
            status: report.status,
        });
    }

    pub fn total_krylov_iterations(&self) -> usize {
        self.steps.iter().map(|s| s.krylov_iterations).sum()
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;

        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file, "TRUNCATED NEWTON SUMMARY")?;
        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file)?;

        writeln!(file, "MESH STATISTICS")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Number of cells:     {}", self.num_cells)?;
        writeln!(file, "Number of faces:     {}", self.num_faces)?;
        writeln!(file, "Min cell spacing:    {:.6e}", self.min_cell_spacing)?;
        writeln!(file, "Max cell spacing:    {:.6e}", self.max_cell_spacing)?;
        writeln!(file, "Total volume:        {:.6e}", self.total_volume)?;
        writeln!(file)?;

        writeln!(file, "PROBLEM")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "States:              {}", self.num_states)?;
        writeln!(file, "Coupling:            {:?}", self.coupling)?;
        writeln!(file, "Control cost alpha:  {:.3e}", self.alpha)?;
        writeln!(file)?;

        writeln!(file, "INNER SOLVER")?;
        writeln!(file, "{}", "-".repeat(60))?;
        writeln!(file, "Method:              {}", self.method)?;
        writeln!(file, "Max iterations:      {}", self.max_it)?;
        writeln!(file, "Tolerance:           {:.3e}", self.tolerance)?;
        writeln!(file, "Sensitivity solves:  {}", self.sensitivity_solves)?;
        writeln!(file)?;

        if !self.steps.is_empty() {
            writeln!(file, "OUTER ITERATIONS")?;
            writeln!(file, "{}", "-".repeat(60))?;
            writeln!(file, "Iter |   Objective  |   |grad|  |   |step|  | Active | Krylov")?;
            for (i, s) in self.steps.iter().enumerate() {
                writeln!(
                    file,
                    "{i:>4} | {:>12.6e} | {:>9.3e} | {:>9.3e} | {:>6} | {:>3} ({:?})",
                    s.objective, s.gradient_norm, s.step_norm, s.active_dofs, s.krylov_iterations, s.status
                )?;
            }
            writeln!(file)?;
        }

        writeln!(file, "{}", "=".repeat(60))?;
        Ok(())
    }

    pub fn print_to_console(&self) {
        println!("\n{}", "=".repeat(60));
        println!("TRUNCATED NEWTON SUMMARY");
        println!("{}", "=".repeat(60));
        println!("Mesh:          {} cells, {} faces", self.num_cells, self.num_faces);
        println!("States:        {} ({:?})", self.num_states, self.coupling);
        println!("Inner solver:  {} (max {} its, tol {:.1e})", self.method, self.max_it, self.tolerance);
        if let (Some(first), Some(last)) = (self.steps.first(), self.steps.last()) {
            println!("Objective:     {:.6e} -> {:.6e}", first.objective, last.objective);
            println!("|grad|:        {:.3e} -> {:.3e}", first.gradient_norm, last.gradient_norm);
        }
        println!(
            "Krylov:        {} iterations over {} outer steps, {} sensitivity solves",
            self.total_krylov_iterations(),
            self.steps.len(),
            self.sensitivity_solves
        );
        println!("{}\n", "=".repeat(60));
    }
}
