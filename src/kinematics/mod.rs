//! Forward and inverse kinematics over a six-joint revolute chain described
//! by modified Denavit-Hartenberg parameters.

mod chain;
mod solver;

pub use chain::*;
pub use solver::*;
