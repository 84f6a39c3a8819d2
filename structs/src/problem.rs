use serde::{Deserialize, Serialize};

use crate::{
    check_value,
    fleet::{EligibleArcs, Fleet, VehicleIdx},
    network::{Network, NodeIdx},
    ModelError,
};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostParams {
    pub fixed_cost_per_vehicle: f64,
    pub cost_per_km: f64,
    pub average_speed_kmh: f64,
}

impl Default for CostParams {
    fn default() -> Self {
        CostParams {
            fixed_cost_per_vehicle: 80_000.0,
            cost_per_km: 4_500.0,
            average_speed_kmh: 60.0,
        }
    }
}

/// Everything one optimization run reads. Treated as read-only once built.
#[derive(Clone, Debug)]
pub struct Problem {
    pub network: Network,
    pub fleet: Fleet,
    pub costs: CostParams,
}

impl Problem {
    pub fn new(network: Network, fleet: Fleet, costs: CostParams) -> Result<Self, ModelError> {
        let problem = Problem { network, fleet, costs };
        problem.validate()?;
        Ok(problem)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.fleet.is_empty() {
            return Err(ModelError::EmptyFleet);
        }
        for v in 0..self.fleet.len() {
            for (i, j) in self.fleet.restricted_arcs(v) {
                self.network.check_arc(i, j)?;
            }
        }
        check_value("costs", "fixed cost per vehicle", self.costs.fixed_cost_per_vehicle, false)?;
        check_value("costs", "cost per km", self.costs.cost_per_km, false)?;
        check_value("costs", "average speed", self.costs.average_speed_kmh, true)?;
        Ok(())
    }

    pub fn eligible_arcs(&self) -> EligibleArcs {
        self.fleet.eligible_arcs(&self.network)
    }

    pub fn is_eligible(&self, v: VehicleIdx, from: NodeIdx, to: NodeIdx) -> bool {
        from != to
            && !self.network.is_forbidden(from, to)
            && !self.fleet.is_restricted(v, from, to)
    }

    /// Gallons vehicle `v` burns on arc `from -> to`.
    pub fn consumption(&self, v: VehicleIdx, from: NodeIdx, to: NodeIdx) -> f64 {
        self.fleet.vehicle(v).consumption(self.network.dist(from, to))
    }

    pub fn toll_cost(&self, v: VehicleIdx, from: NodeIdx, to: NodeIdx) -> f64 {
        self.network
            .toll(from, to)
            .map(|t| t.cost_for(self.fleet.vehicle(v).load_capacity))
            .unwrap_or(0.0)
    }

    pub fn is_tolled(&self, from: NodeIdx, to: NodeIdx) -> bool {
        self.network.toll(from, to).is_some()
    }

    /// Distance and toll cost of vehicle `v` traversing `from -> to`.
    pub fn arc_cost(&self, v: VehicleIdx, from: NodeIdx, to: NodeIdx) -> f64 {
        self.costs.cost_per_km * self.network.dist(from, to) + self.toll_cost(v, from, to)
    }

    pub fn travel_time_h(&self, dist_km: f64) -> f64 {
        dist_km / self.costs.average_speed_kmh
    }
}
