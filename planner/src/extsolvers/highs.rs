#![cfg(feature = "highs")]

use std::{
    ffi::{c_void, CStr, CString},
    path::Path,
};

use highs_sys::*;
use log::{debug, trace};

use super::{relative_gap, LPSolver, SolveStatus, SolverError, SolverOutput};

const SOLUTION_STATUS_FEASIBLE: HighsInt = 2;

pub struct HighsSolver {
    ptr: *mut c_void,
}

impl Drop for HighsSolver {
    fn drop(&mut self) {
        unsafe {
            Highs_destroy(self.ptr);
        }
    }
}

fn check(what: &str, retval: HighsInt) -> Result<(), SolverError> {
    if retval == STATUS_ERROR {
        Err(SolverError::Backend(format!("HiGHS call {} failed", what)))
    } else {
        Ok(())
    }
}

impl HighsSolver {
    fn set_double_option(&mut self, name: &CStr, value: f64) -> Result<(), SolverError> {
        check("setDoubleOptionValue", unsafe {
            Highs_setDoubleOptionValue(self.ptr, name.as_ptr(), value)
        })
    }

    fn double_info(&self, name: &CStr) -> Option<f64> {
        let mut value = 0.0f64;
        let retval = unsafe { Highs_getDoubleInfoValue(self.ptr, name.as_ptr(), &mut value) };
        (retval != STATUS_ERROR && value.is_finite()).then_some(value)
    }

    fn int_info(&self, name: &CStr) -> Option<HighsInt> {
        let mut value: HighsInt = 0;
        let retval = unsafe { Highs_getIntInfoValue(self.ptr, name.as_ptr(), &mut value) };
        (retval != STATUS_ERROR).then_some(value)
    }

    fn has_incumbent(&self) -> bool {
        self.int_info(c"primal_solution_status") == Some(SOLUTION_STATUS_FEASIBLE)
    }

    fn solution(&self) -> Vec<f64> {
        let num_cols = unsafe { Highs_getNumCol(self.ptr) } as usize;
        let mut values = vec![0.0; num_cols];
        if num_cols > 0 {
            let null = std::ptr::null_mut();
            unsafe { Highs_getSolution(self.ptr, values.as_mut_ptr(), null, null, null) };
        }
        values
    }
}

impl LPSolver for HighsSolver {
    type Var = HighsInt;

    fn new() -> Result<Self, SolverError> {
        let ptr = unsafe { Highs_create() };
        if ptr.is_null() {
            return Err(SolverError::Backend("could not create HiGHS instance".to_string()));
        }
        let solver = HighsSolver { ptr };
        check("setStringOptionValue", unsafe {
            Highs_setStringOptionValue(ptr, c"presolve".as_ptr(), c"on".as_ptr())
        })?;
        check("setBoolOptionValue", unsafe {
            Highs_setBoolOptionValue(ptr, c"output_flag".as_ptr(), 0)
        })?;
        Ok(solver)
    }

    fn add_var(&mut self, cost: f64) -> Result<HighsInt, SolverError> {
        let idx = unsafe { Highs_getNumCol(self.ptr) };
        let inf = self.inf();
        check("addCol", unsafe {
            Highs_addCol(self.ptr, cost, 0.0, inf, 0, std::ptr::null(), std::ptr::null())
        })?;
        Ok(idx)
    }

    fn set_binary(&mut self, var: HighsInt) -> Result<(), SolverError> {
        check("changeColBounds", unsafe { Highs_changeColBounds(self.ptr, var, 0.0, 1.0) })?;
        check("changeColIntegrality", unsafe {
            Highs_changeColIntegrality(self.ptr, var, kHighsVarTypeInteger)
        })
    }

    fn set_bounds(&mut self, var: HighsInt, lower: f64, upper: f64) -> Result<(), SolverError> {
        check("changeColBounds", unsafe { Highs_changeColBounds(self.ptr, var, lower, upper) })
    }

    fn add_constraint(
        &mut self,
        lb: f64,
        ub: f64,
        idxs: &[HighsInt],
        coeffs: &[f64],
    ) -> Result<(), SolverError> {
        if idxs.len() != coeffs.len() {
            return Err(SolverError::Backend("row index/coefficient length mismatch".to_string()));
        }
        let inf = self.inf();
        let (lb, ub) = (lb.max(-inf), ub.min(inf));
        check("addRow", unsafe {
            Highs_addRow(self.ptr, lb, ub, idxs.len() as HighsInt, idxs.as_ptr(), coeffs.as_ptr())
        })
    }

    fn set_time_limit(&mut self, seconds: f64) -> Result<(), SolverError> {
        self.set_double_option(c"time_limit", seconds)
    }

    fn set_mip_gap(&mut self, gap: f64) -> Result<(), SolverError> {
        self.set_double_option(c"mip_rel_gap", gap)
    }

    fn optimize(&mut self) -> Result<SolverOutput, SolverError> {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("highs optimize");

        let retval = unsafe { Highs_run(self.ptr) };
        check("run", retval)?;
        let model_status = unsafe { Highs_getModelStatus(self.ptr) };
        debug!("HiGHS model status {}", model_status);

        let best_bound = self.double_info(c"mip_dual_bound");
        let status = match model_status {
            MODEL_STATUS_OPTIMAL | MODEL_STATUS_MODEL_EMPTY => SolveStatus::Optimal,
            MODEL_STATUS_INFEASIBLE => SolveStatus::Infeasible,
            MODEL_STATUS_REACHED_TIME_LIMIT
            | MODEL_STATUS_REACHED_ITERATION_LIMIT
            | MODEL_STATUS_OBJECTIVE_BOUND
            | MODEL_STATUS_OBJECTIVE_TARGET
            | MODEL_STATUS_UNKNOWN => {
                if self.has_incumbent() {
                    SolveStatus::Feasible
                } else {
                    SolveStatus::TimeLimitNoSolution
                }
            }
            MODEL_STATUS_UNBOUNDED_OR_INFEASIBLE => SolveStatus::Infeasible,
            other => {
                return Err(SolverError::Backend(format!("HiGHS ended with model status {}", other)))
            }
        };
        if !status.has_solution() {
            return Ok(SolverOutput::without_solution(status, best_bound));
        }

        let objective = self.double_info(c"objective_function_value");
        let gap = match (objective, best_bound) {
            (Some(obj), Some(bound)) => Some(relative_gap(obj, bound)),
            _ => self.double_info(c"mip_gap"),
        };
        trace!("HiGHS objective {:?} bound {:?} gap {:?}", objective, best_bound, gap);
        Ok(SolverOutput { status, objective, best_bound, gap, values: self.solution() })
    }

    fn inf(&self) -> f64 {
        unsafe { Highs_getInfinity(self.ptr) }
    }

    fn num_vars(&self) -> usize {
        unsafe { Highs_getNumCol(self.ptr) as usize }
    }

    fn write_model(&mut self, path: &Path) -> Result<(), SolverError> {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("write model");
        let err = |message: String| SolverError::WriteModel { path: path.to_path_buf(), message };
        let filename =
            CString::new(path.to_string_lossy().as_bytes()).map_err(|e| err(e.to_string()))?;
        let retval = unsafe { Highs_writeModel(self.ptr, filename.as_ptr()) };
        if retval == STATUS_ERROR {
            return Err(err("HiGHS could not write the model".to_string()));
        }
        Ok(())
    }
}
