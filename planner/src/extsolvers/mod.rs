use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod gurobi;
pub mod highs;
pub mod lpmodel;
pub mod microlp;

pub use fleetmip_structs::solution::TerminationStatus as SolveStatus;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver backend: {0}")]
    Backend(String),
    #[error("cannot write model to {path}: {message}")]
    WriteModel { path: PathBuf, message: String },
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub best_bound: Option<f64>,
    pub gap: Option<f64>,
    /// Column values in the order the columns were added. Empty when there is
    /// no incumbent.
    pub values: Vec<f64>,
}

impl SolverOutput {
    pub fn without_solution(status: SolveStatus, best_bound: Option<f64>) -> Self {
        SolverOutput { status, objective: None, best_bound, gap: None, values: vec![] }
    }
}

/// Relative gap between incumbent and bound, as reported by most MIP solvers.
pub fn relative_gap(objective: f64, best_bound: f64) -> f64 {
    if objective == best_bound {
        return 0.0;
    }
    (objective - best_bound).abs() / objective.abs().max(1e-10)
}

/// Narrow interface to a MILP solver. New columns start with bounds
/// `[0, inf)`; rows are ranged `lb <= a.x <= ub` with infinite sides allowed.
pub trait LPSolver: Sized {
    type Var: Copy + Clone;
    fn new() -> Result<Self, SolverError>;
    fn add_var(&mut self, cost: f64) -> Result<Self::Var, SolverError>;
    fn set_binary(&mut self, var: Self::Var) -> Result<(), SolverError>;
    fn set_bounds(&mut self, var: Self::Var, lower: f64, upper: f64) -> Result<(), SolverError>;
    fn add_constraint(
        &mut self,
        lb: f64,
        ub: f64,
        idxs: &[Self::Var],
        coeffs: &[f64],
    ) -> Result<(), SolverError>;
    fn set_time_limit(&mut self, seconds: f64) -> Result<(), SolverError>;
    fn set_mip_gap(&mut self, gap: f64) -> Result<(), SolverError>;
    fn optimize(&mut self) -> Result<SolverOutput, SolverError>;
    fn inf(&self) -> f64;
    fn num_vars(&self) -> usize;
    fn write_model(&mut self, path: &Path) -> Result<(), SolverError>;
}
