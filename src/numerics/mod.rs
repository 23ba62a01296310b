pub mod hessian;
pub mod krylov;
pub mod linear;
pub mod picard;
pub mod reduced;
pub mod solver;
pub mod timing;

/// Stopping rule on a residual norm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tolerance {
    Absolute(f64),
    Relative(f64),
    /// `(absolute, relative)`, met when either one is.
    Combined(f64, f64),
}

impl Tolerance {
    pub fn check_tolerance(&self, norm: f64, initial_norm: f64) -> bool {
        match *self {
            Tolerance::Absolute(tol) => norm < tol,
            Tolerance::Relative(tol) => norm / initial_norm < tol,
            Tolerance::Combined(abs_tol, rel_tol) => {
                norm < abs_tol || (norm / initial_norm) < rel_tol
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        let ok = |t: f64| t.is_finite() && t >= 0.0;
        match *self {
            Tolerance::Absolute(t) | Tolerance::Relative(t) => ok(t),
            Tolerance::Combined(a, r) => ok(a) && ok(r),
        }
    }
}
