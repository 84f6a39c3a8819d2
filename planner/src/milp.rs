//! Fleet routing MILP with load, fuel and MTZ ordering variables per vehicle.

use fleetmip_structs::{
    fleet::{EligibleArcs, VehicleIdx},
    network::{NodeIdx, NodeRole},
    problem::Problem,
    solution::CostScaling,
};
use log::{debug, info, trace};

use crate::extsolvers::{LPSolver, SolverError};

/// Meaning of a column. Indexed by column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarInfo {
    Use(VehicleIdx),
    Arc(VehicleIdx, NodeIdx, NodeIdx),
    Load(VehicleIdx, NodeIdx),
    Fuel(VehicleIdx, NodeIdx),
    Refuel(VehicleIdx, NodeIdx),
    Order(VehicleIdx, NodeIdx),
}

/// Column indices belonging to one vehicle.
#[derive(Debug, Clone)]
pub struct VehicleVars {
    pub used: usize,
    /// `(from, to, column)`, ordered by `(from, to)`.
    pub arcs: Vec<(NodeIdx, NodeIdx, usize)>,
    pub load: Vec<usize>,
    pub fuel: Vec<usize>,
    pub refuel: Vec<usize>,
    /// `None` for the depot.
    pub order: Vec<Option<usize>>,
}

impl VehicleVars {
    pub fn arc(&self, from: NodeIdx, to: NodeIdx) -> Option<usize> {
        self.arcs
            .binary_search_by(|(i, j, _)| (*i, *j).cmp(&(from, to)))
            .ok()
            .map(|pos| self.arcs[pos].2)
    }
}

#[derive(Debug, Clone)]
pub struct Formulation {
    pub var_info: Vec<VarInfo>,
    pub vehicles: Vec<VehicleVars>,
    pub eligible: EligibleArcs,
    pub scaling: CostScaling,
    pub num_rows: usize,
}

impl Formulation {
    pub fn num_cols(&self) -> usize {
        self.var_info.len()
    }
}

struct Builder<'a, LP: LPSolver> {
    lp: &'a mut LP,
    vars: Vec<LP::Var>,
    var_info: Vec<VarInfo>,
    num_rows: usize,
}

impl<LP: LPSolver> Builder<'_, LP> {
    fn col(&mut self, cost: f64, lb: f64, ub: f64, info: VarInfo) -> Result<usize, SolverError> {
        let var = self.lp.add_var(cost)?;
        self.lp.set_bounds(var, lb, ub)?;
        self.vars.push(var);
        self.var_info.push(info);
        Ok(self.vars.len() - 1)
    }

    fn binary(&mut self, cost: f64, info: VarInfo) -> Result<usize, SolverError> {
        let col = self.col(cost, 0.0, 1.0, info)?;
        self.lp.set_binary(self.vars[col])?;
        Ok(col)
    }

    fn row(&mut self, lb: f64, ub: f64, terms: &[(usize, f64)]) -> Result<(), SolverError> {
        let idxs = terms.iter().map(|(c, _)| self.vars[*c]).collect::<Vec<_>>();
        let coeffs = terms.iter().map(|(_, a)| *a).collect::<Vec<_>>();
        self.lp.add_constraint(lb, ub, &idxs, &coeffs)?;
        self.num_rows += 1;
        Ok(())
    }
}

/// Adds the complete model to `lp`.
pub fn build<LP: LPSolver>(
    lp: &mut LP,
    problem: &Problem,
    scaling: &CostScaling,
) -> Result<Formulation, SolverError> {
    #[cfg(feature = "prof")]
    let _p = hprof::enter("build formulation");

    let network = &problem.network;
    let n = network.len();
    let depot = network.depot();
    let inf = lp.inf();
    // Non-depot node count, the MTZ ordering range.
    let big_n = (n - 1) as f64;
    let eligible = problem.eligible_arcs();

    let mut b = Builder { lp, vars: Vec::new(), var_info: Vec::new(), num_rows: 0 };
    let mut vehicles = Vec::with_capacity(problem.fleet.len());

    for (v_idx, vehicle) in problem.fleet.vehicles().iter().enumerate() {
        let cap = vehicle.load_capacity;
        let tank = vehicle.tank_capacity;

        let used = b.binary(problem.costs.fixed_cost_per_vehicle, VarInfo::Use(v_idx))?;

        let mut arcs = Vec::with_capacity(eligible.for_vehicle(v_idx).len());
        for &(i, j) in eligible.for_vehicle(v_idx) {
            let col = b.binary(problem.arc_cost(v_idx, i, j), VarInfo::Arc(v_idx, i, j))?;
            arcs.push((i, j, col));
        }

        let mut load = Vec::with_capacity(n);
        let mut fuel = Vec::with_capacity(n);
        let mut refuel = Vec::with_capacity(n);
        let mut order = Vec::with_capacity(n);
        for (node_idx, node) in network.nodes().iter().enumerate() {
            let is_depot = node_idx == depot;
            let load_ub = if is_depot { 0.0 } else { cap };
            load.push(b.col(0.0, 0.0, load_ub, VarInfo::Load(v_idx, node_idx))?);

            // Vehicles leave the depot with a full tank.
            let fuel_lb = if is_depot { tank } else { 0.0 };
            fuel.push(b.col(0.0, fuel_lb, tank, VarInfo::Fuel(v_idx, node_idx))?);

            let (price, refuel_ub) = match node.role {
                NodeRole::Station { fuel_price } => (scaling.scaled_fuel_price(fuel_price), tank),
                _ => (0.0, 0.0),
            };
            refuel.push(b.col(price, 0.0, refuel_ub, VarInfo::Refuel(v_idx, node_idx))?);

            order.push(if is_depot {
                None
            } else {
                Some(b.col(0.0, 1.0, big_n, VarInfo::Order(v_idx, node_idx))?)
            });
        }

        // Depot departure and return match vehicle use.
        let mut out_terms = vec![(used, -1.0)];
        let mut in_terms = vec![(used, -1.0)];
        for &(i, j, col) in arcs.iter() {
            if i == depot {
                out_terms.push((col, 1.0));
            }
            if j == depot {
                in_terms.push((col, 1.0));
            }
        }
        b.row(0.0, 0.0, &out_terms)?;
        b.row(0.0, 0.0, &in_terms)?;

        // Flow conservation.
        let mut balance = vec![Vec::new(); n];
        for &(i, j, col) in arcs.iter() {
            balance[j].push((col, 1.0));
            balance[i].push((col, -1.0));
        }
        for (node_idx, terms) in balance.iter().enumerate() {
            if node_idx != depot && !terms.is_empty() {
                b.row(0.0, 0.0, terms)?;
            }
        }

        for &(i, j, col) in arcs.iter() {
            let consumption = problem.consumption(v_idx, i, j);

            // Activation.
            b.row(-inf, 0.0, &[(col, 1.0), (used, -1.0)])?;

            // Enough fuel in the tank to drive the arc.
            b.row(0.0, inf, &[(fuel[i], 1.0), (col, -consumption)])?;

            if j == depot {
                continue;
            }

            // load_j >= load_i + q_j - Q(1 - x)
            let demand = network.demand(j);
            b.row(demand - cap, inf, &[(load[j], 1.0), (load[i], -1.0), (col, -cap)])?;

            // fuel_j = fuel_i - c_ij + refuel_j when the arc is used.
            let big_m = tank + consumption;
            let fuel_terms = [(fuel[j], 1.0), (fuel[i], -1.0), (refuel[j], -1.0)];
            let mut lower = fuel_terms.to_vec();
            lower.push((col, -big_m));
            b.row(-consumption - big_m, inf, &lower)?;
            let mut upper = fuel_terms.to_vec();
            upper.push((col, big_m));
            b.row(-inf, big_m - consumption, &upper)?;

            // u_i - u_j + N x <= N - 1
            if let (Some(u_i), Some(u_j)) = (order[i], order[j]) {
                b.row(-inf, big_n - 1.0, &[(u_i, 1.0), (u_j, -1.0), (col, big_n)])?;
            }
        }

        // A used vehicle serves at least one client.
        let mut serve = vec![(used, -1.0)];
        serve.extend(
            arcs.iter()
                .filter(|(_, j, _)| network.node(*j).role.is_client())
                .map(|(_, _, col)| (*col, 1.0)),
        );
        b.row(0.0, inf, &serve)?;

        trace!("vehicle {} has {} arc columns", vehicle.id, arcs.len());
        vehicles.push(VehicleVars { used, arcs, load, fuel, refuel, order });
    }

    // Every client is entered exactly once over all vehicles.
    for client in network.clients() {
        let terms = vehicles
            .iter()
            .flat_map(|vv| vv.arcs.iter().filter(|(_, j, _)| *j == client).map(|(_, _, col)| (*col, 1.0)))
            .collect::<Vec<_>>();
        if terms.is_empty() {
            debug!("client {} cannot be reached by any vehicle", network.node(client).id);
        }
        b.row(1.0, 1.0, &terms)?;
    }

    info!(
        "formulation: {} vehicles, {} nodes, {} arc columns, {} columns, {} rows",
        problem.fleet.len(),
        n,
        eligible.total(),
        b.var_info.len(),
        b.num_rows
    );

    Ok(Formulation {
        var_info: b.var_info,
        vehicles,
        eligible,
        scaling: *scaling,
        num_rows: b.num_rows,
    })
}
