use std::path::PathBuf;

use fleetmip_structs::{
    problem::Problem,
    solution::{CostScaling, Solution},
    ModelError,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    decode::{decode, DEFAULT_REFUEL_THRESHOLD},
    extsolvers::{LPSolver, SolveStatus, SolverError},
    milp,
    reconcile::{reconcile, Tolerance},
    validate::validate,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerParams {
    pub time_limit_s: f64,
    /// Relative optimality gap at which the solver may stop.
    pub mip_gap: f64,
    /// Refuels below this many gallons are treated as solver noise.
    pub refuel_threshold: f64,
    pub tolerance: Tolerance,
    pub scaling: CostScaling,
    /// Write the model here before solving.
    pub model_path: Option<PathBuf>,
}

impl Default for PlannerParams {
    fn default() -> Self {
        PlannerParams {
            time_limit_s: 1800.0,
            mip_gap: 0.10,
            refuel_threshold: DEFAULT_REFUEL_THRESHOLD,
            tolerance: Tolerance::default(),
            scaling: CostScaling::identity(),
            model_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid problem: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("problem is infeasible")]
    Infeasible,
    #[error("no feasible solution within {time_limit_s} s (best bound {best_bound:?})")]
    NoSolution { time_limit_s: f64, best_bound: Option<f64> },
}

/// Builds, solves, decodes and reconciles one problem instance.
pub fn solve<LP: LPSolver>(problem: &Problem, params: &PlannerParams) -> Result<Solution, PlanError> {
    problem.validate()?;

    let mut lp = LP::new()?;
    let formulation = milp::build(&mut lp, problem, &params.scaling)?;
    if let Some(path) = params.model_path.as_ref() {
        lp.write_model(path)?;
        info!("model written to {}", path.display());
    }
    lp.set_time_limit(params.time_limit_s)?;
    lp.set_mip_gap(params.mip_gap)?;

    info!("optimizing {} columns, {} rows", formulation.num_cols(), formulation.num_rows);
    let output = {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("optimize");
        lp.optimize()?
    };
    info!(
        "solver finished: {:?}, objective {:?}, bound {:?}, gap {:?}",
        output.status, output.objective, output.best_bound, output.gap
    );

    let objective = match (output.status, output.objective) {
        (SolveStatus::Infeasible, _) => {
            warn!("solver proved the problem infeasible");
            return Err(PlanError::Infeasible);
        }
        (SolveStatus::TimeLimitNoSolution, _) => {
            warn!(
                "no incumbent after {} s, best bound {:?}",
                params.time_limit_s, output.best_bound
            );
            return Err(PlanError::NoSolution {
                time_limit_s: params.time_limit_s,
                best_bound: output.best_bound,
            });
        }
        (_, Some(objective)) if output.values.len() == formulation.num_cols() => objective,
        (status, _) => {
            error!("solver reported {:?} without a complete assignment", status);
            return Err(SolverError::Backend(format!(
                "{:?} with {} of {} column values",
                status,
                output.values.len(),
                formulation.num_cols()
            ))
            .into());
        }
    };
    if output.status == SolveStatus::Feasible {
        warn!("solution not proven optimal, gap {:?}", output.gap);
    }

    let decoding = decode(problem, &formulation, &output.values, params.refuel_threshold);
    let reconciled = reconcile(problem, &decoding, &params.scaling, objective, &params.tolerance);

    let mut warnings = decoding.warnings.clone();
    warnings.extend(reconciled.warnings.iter().cloned());
    for failure in decoding.failures() {
        let msg = format!(
            "vehicle {}: {}",
            problem.fleet.vehicle(failure.vehicle).id,
            failure.anomaly
        );
        error!("decode failure, {}", msg);
        warnings.push(msg);
    }
    let routes = decoding.routes().collect::<Vec<_>>();
    for violation in validate(problem, &routes) {
        warn!("{}", violation);
        warnings.push(violation.to_string());
    }

    let costs = reconciled.costs;
    info!(
        "{} vehicles, total cost {:.2} (fixed {:.2}, distance {:.2}, fuel {:.2}, toll {:.2})",
        reconciled.vehicles.len(),
        costs.total(),
        costs.fixed,
        costs.distance,
        costs.fuel,
        costs.toll
    );

    Ok(Solution {
        status: output.status,
        objective,
        best_bound: output.best_bound,
        gap: output.gap,
        scaling: params.scaling,
        vehicles: reconciled.vehicles,
        total_cost: costs.total(),
        costs,
        warnings,
    })
}
