use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use super::{LPSolver, SolverError, SolverOutput};

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub cost: f64,
    pub lb: f64,
    pub ub: f64,
    pub integer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub lb: f64,
    pub ub: f64,
    pub idxs: Vec<usize>,
    pub coeffs: Vec<f64>,
}

impl Row {
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.idxs.iter().zip(self.coeffs.iter()).map(|(i, c)| c * values[*i]).sum()
    }
}

/// In-memory MILP. Backs the pure-Rust solver, writes `.lp` files, and lets
/// tests check an assignment against every row.
#[derive(Debug, Clone, Default)]
pub struct LpModel {
    pub cols: Vec<Column>,
    pub rows: Vec<Row>,
    pub time_limit: Option<f64>,
    pub mip_gap: Option<f64>,
}

impl LpModel {
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.cols.iter().zip(values.iter()).map(|(c, v)| c.cost * v).sum()
    }

    /// Indices of rows violated by more than `tol`.
    pub fn violated_rows(&self, values: &[f64], tol: f64) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                let a = r.activity(values);
                a < r.lb - tol || a > r.ub + tol
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of columns outside their bounds or not integral when they must be.
    pub fn violated_cols(&self, values: &[f64], tol: f64) -> Vec<usize> {
        self.cols
            .iter()
            .zip(values.iter())
            .enumerate()
            .filter(|(_, (c, v))| {
                **v < c.lb - tol || **v > c.ub + tol || (c.integer && (**v - v.round()).abs() > tol)
            })
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_feasible(&self, values: &[f64], tol: f64) -> bool {
        values.len() == self.cols.len()
            && self.violated_rows(values, tol).is_empty()
            && self.violated_cols(values, tol).is_empty()
    }

    fn write_terms(out: &mut impl Write, idxs: &[usize], coeffs: &[f64]) -> std::io::Result<()> {
        if idxs.is_empty() {
            return write!(out, " 0");
        }
        for (i, c) in idxs.iter().zip(coeffs.iter()) {
            let sign = if *c < 0.0 { '-' } else { '+' };
            write!(out, " {} {} x{}", sign, c.abs(), i + 1)?;
        }
        Ok(())
    }

    /// CPLEX LP format. Ranged rows are split into two rows.
    pub fn write_lp(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(out, "\\ fleetmip model: {} columns, {} rows", self.cols.len(), self.rows.len())?;
        writeln!(out, "Minimize")?;
        write!(out, " obj:")?;
        let (idxs, coeffs): (Vec<usize>, Vec<f64>) = self
            .cols
            .iter()
            .enumerate()
            .filter(|(_, c)| c.cost != 0.0)
            .map(|(i, c)| (i, c.cost))
            .unzip();
        Self::write_terms(out, &idxs, &coeffs)?;
        writeln!(out)?;

        writeln!(out, "Subject To")?;
        for (r_idx, row) in self.rows.iter().enumerate() {
            let mut side = |suffix: &str, op: &str, rhs: f64| -> std::io::Result<()> {
                write!(out, " r{}{}:", r_idx + 1, suffix)?;
                Self::write_terms(out, &row.idxs, &row.coeffs)?;
                writeln!(out, " {} {}", op, rhs)
            };
            if row.lb == row.ub {
                side("", "=", row.lb)?;
            } else {
                if row.lb.is_finite() {
                    side(if row.ub.is_finite() { "_lo" } else { "" }, ">=", row.lb)?;
                }
                if row.ub.is_finite() {
                    side(if row.lb.is_finite() { "_hi" } else { "" }, "<=", row.ub)?;
                }
            }
        }

        writeln!(out, "Bounds")?;
        for (i, c) in self.cols.iter().enumerate() {
            match (c.lb.is_finite(), c.ub.is_finite()) {
                _ if c.lb == c.ub => writeln!(out, " x{} = {}", i + 1, c.lb)?,
                (true, true) => writeln!(out, " {} <= x{} <= {}", c.lb, i + 1, c.ub)?,
                (true, false) => writeln!(out, " x{} >= {}", i + 1, c.lb)?,
                (false, true) => writeln!(out, " -inf <= x{} <= {}", i + 1, c.ub)?,
                (false, false) => writeln!(out, " x{} free", i + 1)?,
            }
        }

        let integers = self.cols.iter().enumerate().filter(|(_, c)| c.integer).collect::<Vec<_>>();
        if !integers.is_empty() {
            writeln!(out, "Generals")?;
            for (i, _) in integers {
                writeln!(out, " x{}", i + 1)?;
            }
        }
        writeln!(out, "End")
    }
}

impl LPSolver for LpModel {
    type Var = usize;

    fn new() -> Result<Self, SolverError> {
        Ok(Self::default())
    }

    fn add_var(&mut self, cost: f64) -> Result<usize, SolverError> {
        self.cols.push(Column { cost, lb: 0.0, ub: f64::INFINITY, integer: false });
        Ok(self.cols.len() - 1)
    }

    fn set_binary(&mut self, var: usize) -> Result<(), SolverError> {
        let col = &mut self.cols[var];
        col.integer = true;
        col.lb = col.lb.max(0.0);
        col.ub = col.ub.min(1.0);
        Ok(())
    }

    fn set_bounds(&mut self, var: usize, lower: f64, upper: f64) -> Result<(), SolverError> {
        if lower > upper {
            return Err(SolverError::Backend(format!(
                "empty bounds [{}, {}] on column {}",
                lower, upper, var
            )));
        }
        self.cols[var].lb = lower;
        self.cols[var].ub = upper;
        Ok(())
    }

    fn add_constraint(
        &mut self,
        lb: f64,
        ub: f64,
        idxs: &[usize],
        coeffs: &[f64],
    ) -> Result<(), SolverError> {
        if idxs.len() != coeffs.len() {
            return Err(SolverError::Backend(format!(
                "row has {} columns but {} coefficients",
                idxs.len(),
                coeffs.len()
            )));
        }
        if let Some(bad) = idxs.iter().find(|i| **i >= self.cols.len()) {
            return Err(SolverError::Backend(format!("row references unknown column {}", bad)));
        }
        self.rows.push(Row { lb, ub, idxs: idxs.to_vec(), coeffs: coeffs.to_vec() });
        Ok(())
    }

    fn set_time_limit(&mut self, seconds: f64) -> Result<(), SolverError> {
        self.time_limit = Some(seconds);
        Ok(())
    }

    fn set_mip_gap(&mut self, gap: f64) -> Result<(), SolverError> {
        self.mip_gap = Some(gap);
        Ok(())
    }

    fn optimize(&mut self) -> Result<SolverOutput, SolverError> {
        Err(SolverError::Unsupported("optimize"))
    }

    fn inf(&self) -> f64 {
        f64::INFINITY
    }

    fn num_vars(&self) -> usize {
        self.cols.len()
    }

    fn write_model(&mut self, path: &Path) -> Result<(), SolverError> {
        let write_err = |e: std::io::Error| SolverError::WriteModel {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let mut out = BufWriter::new(File::create(path).map_err(write_err)?);
        self.write_lp(&mut out).map_err(write_err)?;
        out.flush().map_err(write_err)
    }
}
