pub mod gradient;
#[allow(clippy::module_inception)]
pub mod poisson;
