#![cfg(feature = "microlp")]

use std::path::Path;

use good_lp::{
    solvers::microlp::microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use log::{debug, warn};

use super::{lpmodel::LpModel, LPSolver, SolveStatus, SolverError, SolverOutput};

/// Pure-Rust branch and bound through `good_lp`. Solves to optimality; time
/// limit and gap settings are accepted but not enforced.
#[derive(Debug, Default)]
pub struct MicroLpSolver {
    model: LpModel,
}

impl MicroLpSolver {
    pub fn model(&self) -> &LpModel {
        &self.model
    }
}

impl LPSolver for MicroLpSolver {
    type Var = usize;

    fn new() -> Result<Self, SolverError> {
        Ok(Self::default())
    }

    fn add_var(&mut self, cost: f64) -> Result<usize, SolverError> {
        self.model.add_var(cost)
    }

    fn set_binary(&mut self, var: usize) -> Result<(), SolverError> {
        self.model.set_binary(var)
    }

    fn set_bounds(&mut self, var: usize, lower: f64, upper: f64) -> Result<(), SolverError> {
        self.model.set_bounds(var, lower, upper)
    }

    fn add_constraint(
        &mut self,
        lb: f64,
        ub: f64,
        idxs: &[usize],
        coeffs: &[f64],
    ) -> Result<(), SolverError> {
        self.model.add_constraint(lb, ub, idxs, coeffs)
    }

    fn set_time_limit(&mut self, seconds: f64) -> Result<(), SolverError> {
        warn!("microlp ignores the time limit ({} s), solving to optimality", seconds);
        self.model.set_time_limit(seconds)
    }

    fn set_mip_gap(&mut self, gap: f64) -> Result<(), SolverError> {
        debug!("microlp ignores the relative gap {}", gap);
        self.model.set_mip_gap(gap)
    }

    fn optimize(&mut self) -> Result<SolverOutput, SolverError> {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("microlp optimize");

        let model = &self.model;
        let mut vars = ProblemVariables::new();
        let cols: Vec<Variable> = model
            .cols
            .iter()
            .map(|c| {
                let mut def = variable();
                if c.integer {
                    def = def.integer();
                }
                if c.lb.is_finite() {
                    def = def.min(c.lb);
                }
                if c.ub.is_finite() {
                    def = def.max(c.ub);
                }
                vars.add(def)
            })
            .collect();

        let mut objective = Expression::with_capacity(cols.len());
        for (c, var) in model.cols.iter().zip(cols.iter()) {
            if c.cost != 0.0 {
                objective.add_mul(c.cost, *var);
            }
        }

        let mut problem = vars.minimise(objective).using(microlp);
        for row in model.rows.iter() {
            if row.idxs.is_empty() {
                // Constant row, 0 must lie within its range.
                if row.lb > 0.0 || row.ub < 0.0 {
                    debug!("constant row [{}, {}] cannot hold", row.lb, row.ub);
                    return Ok(SolverOutput::without_solution(SolveStatus::Infeasible, None));
                }
                continue;
            }
            let mut expr = Expression::with_capacity(row.idxs.len());
            for (i, c) in row.idxs.iter().zip(row.coeffs.iter()) {
                expr.add_mul(*c, cols[*i]);
            }
            if row.lb == row.ub {
                problem.add_constraint(expr.eq(row.lb));
                continue;
            }
            if row.lb.is_finite() {
                problem.add_constraint(expr.clone().geq(row.lb));
            }
            if row.ub.is_finite() {
                problem.add_constraint(expr.leq(row.ub));
            }
        }

        debug!("microlp: {} columns, {} rows", model.cols.len(), model.rows.len());
        match problem.solve() {
            Ok(solution) => {
                let values = cols.iter().map(|v| solution.value(*v)).collect::<Vec<_>>();
                let objective = model.objective_value(&values);
                Ok(SolverOutput {
                    status: SolveStatus::Optimal,
                    objective: Some(objective),
                    best_bound: Some(objective),
                    gap: Some(0.0),
                    values,
                })
            }
            Err(ResolutionError::Infeasible) => {
                Ok(SolverOutput::without_solution(SolveStatus::Infeasible, None))
            }
            Err(e) => Err(SolverError::Backend(e.to_string())),
        }
    }

    fn inf(&self) -> f64 {
        f64::INFINITY
    }

    fn num_vars(&self) -> usize {
        self.model.num_vars()
    }

    fn write_model(&mut self, path: &Path) -> Result<(), SolverError> {
        self.model.write_model(path)
    }
}
