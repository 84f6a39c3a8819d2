#![cfg(feature = "gurobi")]

use std::{cell::RefCell, path::Path};

use grb::{expr::LinExpr, prelude::*};
use log::debug;

use super::{relative_gap, LPSolver, SolveStatus, SolverError, SolverOutput};

thread_local! {
static GLOBAL_GUROBI_ENV :RefCell<Option<grb::Env>> = const { RefCell::new(None) };
}

impl From<grb::Error> for SolverError {
    fn from(e: grb::Error) -> Self {
        SolverError::Backend(format!("gurobi: {}", e))
    }
}

pub struct GurobiSolver {
    grb: grb::Model,
    added_vars: Vec<grb::Var>,
}

impl LPSolver for GurobiSolver {
    type Var = grb::Var;

    fn new() -> Result<Self, SolverError> {
        let mut grb = GLOBAL_GUROBI_ENV.with_borrow_mut(|e| -> Result<grb::Model, SolverError> {
            if e.is_none() {
                *e = Some(grb::Env::new("")?);
            }
            match e.as_ref() {
                Some(env) => Ok(grb::Model::with_env("", env)?),
                None => Err(SolverError::Backend("gurobi environment missing".to_string())),
            }
        })?;
        grb.set_param(grb::param::OutputFlag, 0)?;
        Ok(Self { grb, added_vars: Vec::new() })
    }

    fn add_var(&mut self, cost: f64) -> Result<Self::Var, SolverError> {
        let model = &mut self.grb;
        let var = add_ctsvar!(model, obj: cost, bounds: 0.0..)?;
        self.added_vars.push(var);
        Ok(var)
    }

    fn set_binary(&mut self, var: Self::Var) -> Result<(), SolverError> {
        self.grb.set_obj_attr(grb::attr::VType, &var, VarType::Binary)?;
        Ok(())
    }

    fn set_bounds(&mut self, var: Self::Var, lower: f64, upper: f64) -> Result<(), SolverError> {
        self.grb.set_obj_attr(grb::attr::LB, &var, lower)?;
        self.grb.set_obj_attr(grb::attr::UB, &var, upper)?;
        Ok(())
    }

    fn add_constraint(
        &mut self,
        lb: f64,
        ub: f64,
        idxs: &[Self::Var],
        coeffs: &[f64],
    ) -> Result<(), SolverError> {
        let mut expr = LinExpr::new();
        for (v, c) in idxs.iter().zip(coeffs.iter()) {
            expr.add_term(*c, *v);
        }
        if lb == ub {
            self.grb.add_constr("", c!(expr == lb))?;
            return Ok(());
        }
        if lb.is_finite() {
            self.grb.add_constr("", c!(expr.clone() >= lb))?;
        }
        if ub.is_finite() {
            self.grb.add_constr("", c!(expr <= ub))?;
        }
        Ok(())
    }

    fn set_time_limit(&mut self, seconds: f64) -> Result<(), SolverError> {
        self.grb.set_param(grb::param::TimeLimit, seconds)?;
        Ok(())
    }

    fn set_mip_gap(&mut self, gap: f64) -> Result<(), SolverError> {
        self.grb.set_param(grb::param::MIPGap, gap)?;
        Ok(())
    }

    fn optimize(&mut self) -> Result<SolverOutput, SolverError> {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("gurobi optimize");

        self.grb.optimize()?;
        let status = self.grb.status()?;
        let sol_count = self.grb.get_attr(attr::SolCount)?;
        debug!("gurobi status {:?}, {} solutions", status, sol_count);

        let status = match status {
            Status::Optimal => SolveStatus::Optimal,
            Status::Infeasible | Status::InfOrUnbd => SolveStatus::Infeasible,
            Status::TimeLimit
            | Status::NodeLimit
            | Status::IterationLimit
            | Status::SolutionLimit
            | Status::Interrupted
            | Status::SubOptimal => {
                if sol_count > 0 {
                    SolveStatus::Feasible
                } else {
                    SolveStatus::TimeLimitNoSolution
                }
            }
            other => return Err(SolverError::Backend(format!("gurobi ended with status {:?}", other))),
        };

        let best_bound = self.grb.get_attr(attr::ObjBound).ok().filter(|b| b.is_finite());
        if !status.has_solution() {
            return Ok(SolverOutput::without_solution(status, best_bound));
        }

        let objective = self.grb.get_attr(attr::ObjVal)?;
        let values = self.grb.get_obj_attr_batch(grb::attr::X, self.added_vars.iter().cloned())?;
        let gap = best_bound.map(|b| relative_gap(objective, b));
        Ok(SolverOutput { status, objective: Some(objective), best_bound, gap, values })
    }

    fn inf(&self) -> f64 {
        f64::INFINITY
    }

    fn num_vars(&self) -> usize {
        self.added_vars.len()
    }

    fn write_model(&mut self, path: &Path) -> Result<(), SolverError> {
        self.grb.update()?;
        self.grb.write(&path.to_string_lossy()).map_err(|e| SolverError::WriteModel {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
