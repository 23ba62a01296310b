use crate::numerics::linear::LinearSolverOptions;
use crate::numerics::solver::SolverError;
use crate::numerics::Tolerance;
use std::fmt;
use std::str::FromStr;

/// Krylov method used for the inner Newton system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InnerNewton {
    /// Conjugate gradient.
    Cg,
    /// Conjugate residual; stays well-defined for semi-definite Hessians.
    #[default]
    Cr,
}

impl FromStr for InnerNewton {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cg" => Ok(InnerNewton::Cg),
            "cr" => Ok(InnerNewton::Cr),
            other => Err(SolverError::Configuration {
                key: "inner_newton",
                reason: format!("`{other}` is not a valid choice, needs to be either `cg` or `cr`"),
            }),
        }
    }
}

impl fmt::Display for InnerNewton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InnerNewton::Cg => write!(f, "CG"),
            InnerNewton::Cr => write!(f, "CR"),
        }
    }
}

/// Fixed-point loop settings for coupled state blocks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PicardConfig {
    pub rtol: f64,
    pub atol: f64,
    pub max_iterations: usize,
    /// Log every iteration at `info` level instead of `trace`.
    pub verbose: bool,
}

impl Default for PicardConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-10,
            atol: 1e-12,
            max_iterations: 50,
            verbose: false,
        }
    }
}

impl PicardConfig {
    pub fn tolerance(&self) -> Tolerance {
        Tolerance::Combined(self.atol, self.rtol)
    }
}

/// Settings of the truncated Newton inner solver.
///
/// Empty per-block option lists mean "defaults for every block"; otherwise
/// they must have one entry per state (or control) block.
#[derive(Clone, Debug, PartialEq)]
pub struct TnmConfig {
    pub inner_newton: InnerNewton,
    pub max_it_inner_newton: usize,
    /// Relative residual tolerance of the Krylov loop.
    pub inner_newton_tolerance: f64,
    pub picard: PicardConfig,
    pub state_options: Vec<LinearSolverOptions>,
    pub adjoint_options: Vec<LinearSolverOptions>,
    pub riesz_options: Vec<LinearSolverOptions>,
}

impl Default for TnmConfig {
    fn default() -> Self {
        Self {
            inner_newton: InnerNewton::default(),
            max_it_inner_newton: 50,
            inner_newton_tolerance: 1e-15,
            picard: PicardConfig::default(),
            state_options: Vec::new(),
            adjoint_options: Vec::new(),
            riesz_options: Vec::new(),
        }
    }
}

impl TnmConfig {
    pub fn with_inner_newton(mut self, inner_newton: InnerNewton) -> Self {
        self.inner_newton = inner_newton;
        self
    }

    /// Parse the method name the way it appears in configuration files.
    pub fn with_inner_newton_str(self, name: &str) -> Result<Self, SolverError> {
        Ok(self.with_inner_newton(name.parse()?))
    }

    pub fn with_max_it(mut self, max_it: usize) -> Self {
        self.max_it_inner_newton = max_it;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.inner_newton_tolerance = tol;
        self
    }

    pub fn with_picard(mut self, picard: PicardConfig) -> Self {
        self.picard = picard;
        self
    }

    /// Check tolerances and per-block option lists against the problem layout.
    pub fn validate(&self, control_blocks: usize, state_blocks: usize) -> Result<(), SolverError> {
        if !Tolerance::Relative(self.inner_newton_tolerance).is_valid() {
            return Err(SolverError::Configuration {
                key: "inner_newton_tolerance",
                reason: format!("must be finite and non-negative, got {}", self.inner_newton_tolerance),
            });
        }
        if !self.picard.tolerance().is_valid() {
            return Err(SolverError::Configuration {
                key: "picard",
                reason: format!(
                    "rtol ({}) and atol ({}) must be finite and non-negative",
                    self.picard.rtol, self.picard.atol
                ),
            });
        }

        let lists = [
            ("state_options", &self.state_options, state_blocks),
            ("adjoint_options", &self.adjoint_options, state_blocks),
            ("riesz_options", &self.riesz_options, control_blocks),
        ];
        for (key, list, expected) in lists {
            if !list.is_empty() && list.len() != expected {
                return Err(SolverError::Configuration {
                    key,
                    reason: format!("expected {expected} entries, got {}", list.len()),
                });
            }
            if let Some(bad) = list.iter().find(|o| !Tolerance::Relative(o.rtol).is_valid()) {
                return Err(SolverError::Configuration {
                    key,
                    reason: format!("invalid rtol {}", bad.rtol),
                });
            }
        }
        Ok(())
    }
}
