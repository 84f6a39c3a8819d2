use fleetmip_structs::{
    problem::Problem,
    solution::{
        ClientVisit, CostBreakdown, CostScaling, DecodeFailure, RefuelEvent, RouteRecord,
        TollCrossing, VehicleOutcome,
    },
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::decode::{Decoding, DecodedRoute, RouteFailure};

/// Accepted difference between recomputed and reported objective:
/// `abs + rel * |reported|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub abs: f64,
    pub rel: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance { abs: 1e-3, rel: 1e-6 }
    }
}

impl Tolerance {
    pub fn allows(&self, expected: f64, reported: f64) -> bool {
        (expected - reported).abs() <= self.abs + self.rel * reported.abs()
    }
}

/// Output record of a decoded route with its costs recomputed from the input data.
pub fn route_record(problem: &Problem, route: &DecodedRoute) -> RouteRecord {
    let network = &problem.network;
    let vehicle = problem.fleet.vehicle(route.vehicle);

    let mut distance_km = 0.0;
    let mut fuel_used_gal = 0.0;
    let mut tolls = Vec::new();
    for (i, j) in route.arcs() {
        distance_km += network.dist(i, j);
        fuel_used_gal += problem.consumption(route.vehicle, i, j);
        if problem.is_tolled(i, j) {
            tolls.push(TollCrossing {
                from: network.node(i).id.clone(),
                to: network.node(j).id.clone(),
                cost: problem.toll_cost(route.vehicle, i, j),
            });
        }
    }

    let clients = route
        .nodes
        .iter()
        .filter(|n| network.node(**n).role.is_client())
        .map(|n| ClientVisit { id: network.node(*n).id.clone(), demand: network.demand(*n) })
        .collect::<Vec<_>>();

    let refuels = route
        .refuels
        .iter()
        .map(|(n, gallons)| {
            let price = network.node(*n).role.fuel_price().unwrap_or(0.0);
            RefuelEvent { station: network.node(*n).id.clone(), gallons: *gallons, price, cost: gallons * price }
        })
        .collect::<Vec<_>>();

    let costs = CostBreakdown {
        fixed: problem.costs.fixed_cost_per_vehicle,
        distance: problem.costs.cost_per_km * distance_km,
        fuel: refuels.iter().map(|r| r.cost).sum(),
        toll: tolls.iter().map(|t| t.cost).sum(),
    };

    RouteRecord {
        vehicle_id: vehicle.id.clone(),
        depot_id: network.node(network.depot()).id.clone(),
        route: route.nodes.iter().map(|n| network.node(*n).id.clone()).collect(),
        demand_served: clients.iter().map(|c| c.demand).sum(),
        clients,
        refuels,
        tolls,
        distance_km,
        fuel_used_gal,
        travel_time_h: problem.travel_time_h(distance_km),
        total_cost: costs.total(),
        costs,
    }
}

pub fn failure_record(problem: &Problem, failure: &RouteFailure) -> DecodeFailure {
    DecodeFailure {
        vehicle_id: problem.fleet.vehicle(failure.vehicle).id.clone(),
        anomaly: failure.anomaly.clone(),
        partial_route: failure.partial.iter().map(|n| problem.network.node(*n).id.clone()).collect(),
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub vehicles: Vec<VehicleOutcome>,
    /// Sum over decoded routes, unscaled.
    pub costs: CostBreakdown,
    /// What the solver objective should be for these routes.
    pub expected_objective: f64,
    pub warnings: Vec<String>,
}

/// Recomputes costs from the decoded routes and compares them with the
/// objective the solver reported, in the solver's scaled units.
pub fn reconcile(
    problem: &Problem,
    decoding: &Decoding,
    scaling: &CostScaling,
    objective: f64,
    tolerance: &Tolerance,
) -> Reconciliation {
    let mut vehicles = Vec::with_capacity(decoding.vehicles.len());
    let mut costs = CostBreakdown::default();
    let mut warnings = Vec::new();

    for outcome in decoding.vehicles.iter() {
        match outcome {
            Ok(route) => {
                let record = route_record(problem, route);
                costs.add(&record.costs);
                vehicles.push(VehicleOutcome::Route(record));
            }
            Err(failure) => vehicles.push(VehicleOutcome::DecodeFailure(failure_record(problem, failure))),
        }
    }

    let expected_objective = scaling.apply(&costs);
    let failed = decoding.failures().count();
    if failed > 0 {
        let msg = format!("objective not reconciled, {} vehicles failed to decode", failed);
        warn!("{}", msg);
        warnings.push(msg);
    } else if !tolerance.allows(expected_objective, objective) {
        let msg = format!(
            "cost discrepancy: routes give objective {:.6}, solver reported {:.6} (scaling v{}, fuel factor {})",
            expected_objective, objective, scaling.version, scaling.fuel_cost_factor
        );
        warn!("{}", msg);
        warnings.push(msg);
    } else {
        debug!("objective {} reconciled (expected {})", objective, expected_objective);
    }

    Reconciliation { vehicles, costs, expected_objective, warnings }
}
