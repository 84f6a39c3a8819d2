//! Checks decoded routes against the physical rules, independently of the
//! formulation that produced them.

use fleetmip_structs::problem::Problem;
use thiserror::Error;

use crate::decode::DecodedRoute;

const EPS: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Violation {
    #[error("client {0} is not served")]
    ClientNotServed(String),
    #[error("client {0} is served {1} times")]
    ClientServedRepeatedly(String, usize),
    #[error("vehicle {vehicle} carries {load} kg, capacity is {capacity} kg")]
    Overloaded { vehicle: String, load: f64, capacity: f64 },
    #[error("vehicle {vehicle} runs dry on the way to {at} (level {level:.3} gal)")]
    FuelExhausted { vehicle: String, at: String, level: f64 },
    #[error("vehicle {vehicle} holds {level:.3} gal at {at}, tank is {tank} gal")]
    TankOverflow { vehicle: String, at: String, level: f64, tank: f64 },
    #[error("route of vehicle {0} does not start and end at the depot")]
    NotClosed(String),
    #[error("vehicle {vehicle} visits {node} more than once")]
    RepeatedNode { vehicle: String, node: String },
    #[error("vehicle {vehicle} uses arc {from} -> {to}, which is closed to it")]
    IneligibleArc { vehicle: String, from: String, to: String },
    #[error("vehicle {vehicle} refuels at {at}, which is not a station")]
    RefuelOffStation { vehicle: String, at: String },
}

pub fn validate_route(problem: &Problem, route: &DecodedRoute) -> Vec<Violation> {
    let network = &problem.network;
    let vehicle = problem.fleet.vehicle(route.vehicle);
    let vid = || vehicle.id.clone();
    let id = |n: usize| network.node(n).id.clone();
    let mut out = Vec::new();

    let depot = network.depot();
    if route.nodes.len() < 2 || route.nodes[0] != depot || route.nodes[route.nodes.len() - 1] != depot {
        out.push(Violation::NotClosed(vid()));
        return out;
    }

    let inner = &route.nodes[1..route.nodes.len() - 1];
    let mut seen = vec![false; network.len()];
    for n in inner {
        if *n == depot || seen[*n] {
            out.push(Violation::RepeatedNode { vehicle: vid(), node: id(*n) });
        }
        seen[*n] = true;
    }

    let load: f64 = inner.iter().map(|n| network.demand(*n)).sum();
    if load > vehicle.load_capacity + EPS {
        out.push(Violation::Overloaded { vehicle: vid(), load, capacity: vehicle.load_capacity });
    }

    for (at, _) in route.refuels.iter() {
        if !network.node(*at).role.is_station() {
            out.push(Violation::RefuelOffStation { vehicle: vid(), at: id(*at) });
        }
    }

    let mut level = vehicle.tank_capacity;
    for (i, j) in route.arcs() {
        if !problem.is_eligible(route.vehicle, i, j) {
            out.push(Violation::IneligibleArc { vehicle: vid(), from: id(i), to: id(j) });
        }
        level -= problem.consumption(route.vehicle, i, j);
        if level < -EPS {
            out.push(Violation::FuelExhausted { vehicle: vid(), at: id(j), level });
        }
        if j != depot {
            level += route.refuel_at(j);
            if level > vehicle.tank_capacity + EPS {
                out.push(Violation::TankOverflow {
                    vehicle: vid(),
                    at: id(j),
                    level,
                    tank: vehicle.tank_capacity,
                });
            }
        }
    }
    out
}

/// Route-level checks plus exactly-once client coverage over all routes.
pub fn validate(problem: &Problem, routes: &[&DecodedRoute]) -> Vec<Violation> {
    let network = &problem.network;
    let mut out = Vec::new();
    let mut visits = vec![0usize; network.len()];
    for route in routes {
        out.extend(validate_route(problem, route));
        for n in route.nodes.iter() {
            visits[*n] += 1;
        }
    }
    for client in network.clients() {
        match visits[client] {
            1 => {}
            0 => out.push(Violation::ClientNotServed(network.node(client).id.clone())),
            k => out.push(Violation::ClientServedRepeatedly(network.node(client).id.clone(), k)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_instances::{
        capacity_split, forbidden_direct, restricted_and_tolled, station_detour, two_clients,
    };

    fn route(vehicle: usize, nodes: &[usize]) -> DecodedRoute {
        DecodedRoute { vehicle, nodes: nodes.to_vec(), refuels: vec![] }
    }

    #[test]
    fn valid_routes_pass() {
        let p = capacity_split(2);
        let (r1, r2) = (route(0, &[0, 1, 0]), route(1, &[0, 2, 0]));
        assert_eq!(validate(&p, &[&r1, &r2]), vec![]);
    }

    #[test]
    fn coverage() {
        let p = capacity_split(2);
        let (r1, r2) = (route(0, &[0, 1, 0]), route(1, &[0, 1, 0]));
        let v = validate(&p, &[&r1, &r2]);
        assert!(v.contains(&Violation::ClientNotServed("B".to_string())));
        assert!(v.contains(&Violation::ClientServedRepeatedly("A".to_string(), 2)));
    }

    #[test]
    fn capacity_and_closure() {
        let p = capacity_split(1);
        let v = validate_route(&p, &route(0, &[0, 1, 2, 0]));
        assert!(matches!(v.as_slice(), [Violation::Overloaded { load, .. }] if *load == 40.0));
        assert_eq!(validate_route(&p, &route(0, &[0, 1, 2])), vec![Violation::NotClosed("T1".to_string())]);
        let v = validate_route(&two_clients(), &route(0, &[0, 1, 2, 1, 0]));
        assert!(v.iter().any(|x| matches!(x, Violation::RepeatedNode { node, .. } if node == "A")));
    }

    #[test]
    fn fuel_simulation() {
        let p = station_detour();
        let (s, c) = (p.network.index_of("S").unwrap(), p.network.index_of("C").unwrap());
        let mut r = route(0, &[0, s, c, 0]);
        assert!(matches!(
            validate_route(&p, &r).as_slice(),
            [Violation::FuelExhausted { at, .. }] if at == "D"
        ));

        r.refuels = vec![(s, 40.0)];
        assert_eq!(validate_route(&p, &r), vec![]);

        r.refuels = vec![(s, 60.0)];
        assert!(matches!(validate_route(&p, &r).as_slice(), [Violation::TankOverflow { .. }]));

        r.refuels = vec![(c, 40.0)];
        let v = validate_route(&p, &r);
        assert!(v.iter().any(|x| matches!(x, Violation::RefuelOffStation { .. })));
    }

    #[test]
    fn forbidden_arc() {
        let p = forbidden_direct();
        let v = validate_route(&p, &route(0, &[0, 2, 1, 0]));
        assert_eq!(
            v,
            vec![Violation::IneligibleArc {
                vehicle: "T1".to_string(),
                from: "D".to_string(),
                to: "C".to_string()
            }]
        );
        assert!(validate_route(&p, &route(0, &[0, 1, 2, 0])).is_empty());
    }

    #[test]
    fn arc_closed_to_one_vehicle_only() {
        let p = restricted_and_tolled();
        let v = validate_route(&p, &route(0, &[0, 2, 0]));
        assert_eq!(
            v,
            vec![
                Violation::IneligibleArc { vehicle: "T1".to_string(), from: "D".to_string(), to: "B".to_string() },
                Violation::IneligibleArc { vehicle: "T1".to_string(), from: "B".to_string(), to: "D".to_string() },
            ]
        );
        assert!(validate_route(&p, &route(1, &[0, 2, 0])).is_empty());
        assert!(validate_route(&p, &route(0, &[0, 1, 0])).is_empty());
    }
}
