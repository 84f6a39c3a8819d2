use std::fmt;

use serde::{Deserialize, Serialize};

/// How the solver run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationStatus {
    Optimal,
    /// Incumbent found, optimality not proven within the time/gap budget.
    Feasible,
    TimeLimitNoSolution,
    Infeasible,
}

impl TerminationStatus {
    pub fn has_solution(&self) -> bool {
        matches!(self, TerminationStatus::Optimal | TerminationStatus::Feasible)
    }
}

/// Rescaling applied to objective coefficients before handing the model to
/// the solver. Carried with the solution so reconciliation can undo it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CostScaling {
    pub version: u32,
    pub fuel_cost_factor: f64,
}

impl CostScaling {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn identity() -> Self {
        Self::fuel(1.0)
    }

    pub fn fuel(fuel_cost_factor: f64) -> Self {
        CostScaling { version: Self::CURRENT_VERSION, fuel_cost_factor }
    }

    pub fn scaled_fuel_price(&self, price: f64) -> f64 {
        price * self.fuel_cost_factor
    }

    /// Objective value the solver reports for a solution with these
    /// (unscaled) cost components.
    pub fn apply(&self, costs: &CostBreakdown) -> f64 {
        costs.fixed + costs.distance + costs.toll + costs.fuel * self.fuel_cost_factor
    }

    /// Turns a solver objective back into currency, given the unscaled fuel
    /// component it contains.
    pub fn invert(&self, objective: f64, fuel_cost: f64) -> f64 {
        objective - fuel_cost * self.fuel_cost_factor + fuel_cost
    }
}

impl Default for CostScaling {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub fixed: f64,
    pub distance: f64,
    pub fuel: f64,
    pub toll: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.fixed + self.distance + self.fuel + self.toll
    }

    pub fn add(&mut self, other: &CostBreakdown) {
        self.fixed += other.fixed;
        self.distance += other.distance;
        self.fuel += other.fuel;
        self.toll += other.toll;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientVisit {
    pub id: String,
    pub demand: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefuelEvent {
    pub station: String,
    pub gallons: f64,
    pub price: f64,
    pub cost: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TollCrossing {
    pub from: String,
    pub to: String,
    pub cost: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub vehicle_id: String,
    pub depot_id: String,
    /// Node ids, starting and ending at the depot.
    pub route: Vec<String>,
    pub clients: Vec<ClientVisit>,
    pub refuels: Vec<RefuelEvent>,
    pub tolls: Vec<TollCrossing>,
    pub distance_km: f64,
    pub fuel_used_gal: f64,
    pub travel_time_h: f64,
    pub demand_served: f64,
    pub costs: CostBreakdown,
    pub total_cost: f64,
}

/// Why a used vehicle's selected arcs could not be turned into a route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DecodeAnomaly {
    /// No selected arc leaves `at`.
    Dangling { at: String },
    /// `repeated` is reached a second time before returning to the depot.
    Cycle { repeated: String },
    IterationLimit { limit: usize },
    /// Selected arcs that are not on the depot-to-depot path.
    StrayArcs { arcs: Vec<(String, String)> },
}

impl fmt::Display for DecodeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeAnomaly::Dangling { at } => write!(f, "route dangles at {}", at),
            DecodeAnomaly::Cycle { repeated } => write!(f, "route revisits {}", repeated),
            DecodeAnomaly::IterationLimit { limit } => {
                write!(f, "route not closed after {} steps", limit)
            }
            DecodeAnomaly::StrayArcs { arcs } => {
                write!(f, "{} selected arcs off the route:", arcs.len())?;
                for (a, b) in arcs {
                    write!(f, " {}->{}", a, b)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodeFailure {
    pub vehicle_id: String,
    pub anomaly: DecodeAnomaly,
    /// Nodes walked before the anomaly was detected.
    pub partial_route: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VehicleOutcome {
    Route(RouteRecord),
    DecodeFailure(DecodeFailure),
}

impl VehicleOutcome {
    pub fn vehicle_id(&self) -> &str {
        match self {
            VehicleOutcome::Route(r) => &r.vehicle_id,
            VehicleOutcome::DecodeFailure(f) => &f.vehicle_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub status: TerminationStatus,
    /// Objective as reported by the solver, in scaled units.
    pub objective: f64,
    pub best_bound: Option<f64>,
    pub gap: Option<f64>,
    pub scaling: CostScaling,
    /// One entry per used vehicle.
    pub vehicles: Vec<VehicleOutcome>,
    /// Reconciled from the decoded routes, unscaled.
    pub costs: CostBreakdown,
    pub total_cost: f64,
    pub warnings: Vec<String>,
}

impl Solution {
    pub fn routes(&self) -> impl Iterator<Item = &RouteRecord> + '_ {
        self.vehicles.iter().filter_map(|v| match v {
            VehicleOutcome::Route(r) => Some(r),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &DecodeFailure> + '_ {
        self.vehicles.iter().filter_map(|v| match v {
            VehicleOutcome::DecodeFailure(f) => Some(f),
            _ => None,
        })
    }

    pub fn route_of(&self, vehicle_id: &str) -> Option<&RouteRecord> {
        self.routes().find(|r| r.vehicle_id == vehicle_id)
    }

    /// Vehicles with a decoded route. Decode failures are not counted.
    pub fn vehicles_used(&self) -> usize {
        self.routes().count()
    }
}
